//! Deep merge for partial updates
//!
//! `null` in the patch removes the field, nested objects merge recursively,
//! anything else (arrays included) replaces the target value.

use serde_json::{Map, Value};

/// Merge `source` into a copy of `target`
pub fn deep_merge(target: &Value, source: &Value) -> Value {
    let mut merged = target.clone();
    merge_into(&mut merged, source);
    merged
}

/// In-place variant of [`deep_merge`]
pub fn merge_into(target: &mut Value, source: &Value) {
    let patch = match source {
        Value::Object(patch) => patch,
        other => {
            *target = other.clone();
            return;
        }
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(base) = target else {
        return;
    };

    for (key, value) in patch {
        match value {
            Value::Null => {
                base.remove(key);
            }
            Value::Object(_) => match base.get_mut(key) {
                Some(existing @ Value::Object(_)) => merge_into(existing, value),
                _ => {
                    // A fresh subtree still must not carry null tombstones.
                    let mut fresh = Value::Object(Map::new());
                    merge_into(&mut fresh, value);
                    base.insert(key.clone(), fresh);
                }
            },
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
