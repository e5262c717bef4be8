//! Record helpers
//!
//! Records are opaque JSON objects. The only fields the storage and sync
//! layers interpret are `id`, `dbKey`, `createdAt` and `updatedAt`; the
//! latter is the last-writer-wins signal between replicas.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

pub const FIELD_ID: &str = "id";
pub const FIELD_DB_KEY: &str = "dbKey";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

static LAST_TICK: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds, strictly increasing within this process.
pub fn now_millis() -> i64 {
    let wall = Utc::now().timestamp_millis();
    let mut last = LAST_TICK.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_TICK.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// `now_millis()` as an RFC 3339 string with millisecond precision
pub fn now_timestamp() -> String {
    format_millis(now_millis())
}

pub fn format_millis(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

/// Interpret a timestamp field: RFC 3339 string, numeric string or epoch millis
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| s.parse::<i64>().ok()),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

/// The record's `updatedAt` in millis, if present and non-empty
pub fn updated_at(record: &Value) -> Option<i64> {
    record.get(FIELD_UPDATED_AT).and_then(parse_timestamp)
}

/// True if `candidate` carries a strictly later `updatedAt` than `current`.
/// A record without a timestamp never wins against one that has it.
pub fn is_newer(candidate: &Value, current: &Value) -> bool {
    match (updated_at(candidate), updated_at(current)) {
        (Some(c), Some(cur)) => c > cur,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Resolve a dotted field path (`"meta.owner.name"`)
pub fn get_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a top-level field, turning non-objects into an object first
pub fn set_field(record: &mut Value, field: &str, value: Value) {
    if !record.is_object() {
        *record = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = record {
        map.insert(field.to_string(), value);
    }
}
