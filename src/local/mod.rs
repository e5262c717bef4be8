//! Local Store Module
//!
//! The authoritative local cache used by client actions.
//!
//! A missing key is `Ok(None)`; an unusable store is an error, so callers
//! can tell "not present" from "can't tell".

mod memory;

pub use memory::MemoryStore;

use serde_json::Value;

use crate::engine::Engine;
use crate::error::Result;
use crate::key::{DbKey, KeyFlags};

/// Upper bound used to turn a key prefix into an inclusive range
pub const RANGE_END: char = '\u{10FFFF}';

/// Key-value contract over JSON records, keyed by encoded `DbKey`
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn put(&self, key: &str, value: &Value) -> Result<()>;

    fn del(&self, key: &str) -> Result<()>;

    /// Entries with `gte <= key <= lte`, in key order
    fn scan(&self, gte: &str, lte: &str) -> Result<Vec<(String, Value)>>;

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let mut end = prefix.to_string();
        end.push(RANGE_END);
        self.scan(prefix, &end)
    }

    /// Every record of `user_id`, whatever its flags, in no particular order
    fn scan_user(&self, user_id: &str) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        for flags in KeyFlags::all() {
            out.extend(self.scan_prefix(&DbKey::user_prefix(flags, user_id))?);
        }
        Ok(out)
    }
}

impl LocalStore for Engine {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_record(key)
    }

    fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.set_record(key, value)
    }

    fn del(&self, key: &str) -> Result<()> {
        self.delete(key)
    }

    fn scan(&self, gte: &str, lte: &str) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        for (key, raw) in Engine::scan(self, gte, lte)? {
            match serde_json::from_str(&raw) {
                Ok(value) => out.push((key, value)),
                Err(_) => tracing::debug!(key = %key, "skipping non-JSON value in scan"),
            }
        }
        Ok(out)
    }

    /// One pass over the user's memory and files
    fn scan_user(&self, user_id: &str) -> Result<Vec<(String, Value)>> {
        self.user_records(user_id)
    }
}
