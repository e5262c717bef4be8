//! Simple field predicates
//!
//! `{field: {exists: bool}}`, `{field: {equals: v}}`, `{field: {after: date}}`,
//! `{field: {before: date}}`. Several predicates on one field must all hold.

use serde_json::Value;

use crate::record::{get_path, parse_timestamp};

/// Operator names understood by [`check_query`]
pub const SIMPLE_OPERATORS: [&str; 4] = ["exists", "equals", "after", "before"];

/// True when every field predicate in `conditions` holds for `record`.
/// An empty or non-object condition matches everything.
pub fn check_query(record: &Value, conditions: &Value) -> bool {
    let Value::Object(fields) = conditions else {
        return true;
    };
    fields
        .iter()
        .all(|(field, predicate)| check_predicate(get_path(record, field), predicate))
}

/// Evaluate one predicate object against a (possibly missing) field value.
/// A bare value is shorthand for `{equals: value}`.
pub fn check_predicate(value: Option<&Value>, predicate: &Value) -> bool {
    let Value::Object(ops) = predicate else {
        return value == Some(predicate);
    };

    ops.iter().all(|(op, arg)| match op.as_str() {
        "exists" => {
            let present = matches!(value, Some(v) if !v.is_null());
            present == arg.as_bool().unwrap_or(true)
        }
        "equals" => match value {
            Some(v) => v == arg,
            None => arg.is_null(),
        },
        "after" => compare_dates(value, arg).is_some_and(|(v, a)| v > a),
        "before" => compare_dates(value, arg).is_some_and(|(v, a)| v < a),
        other => {
            tracing::debug!(operator = other, "unknown condition operator");
            false
        }
    })
}

/// True when `predicate` is an object whose keys are all simple operators
pub fn is_simple_predicate(predicate: &Value) -> bool {
    match predicate {
        Value::Object(ops) => {
            !ops.is_empty() && ops.keys().all(|k| SIMPLE_OPERATORS.contains(&k.as_str()))
        }
        _ => false,
    }
}

fn compare_dates(value: Option<&Value>, arg: &Value) -> Option<(i64, i64)> {
    Some((parse_timestamp(value?)?, parse_timestamp(arg)?))
}
