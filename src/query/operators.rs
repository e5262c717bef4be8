//! Composite query operators
//!
//! MongoDB-style conditions used when scanning server log files:
//! logical `$and`/`$or`/`$nor`/`$not` at the top level and per-field
//! `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`,
//! `$size`, `$all`, `$elemMatch`, `$not`. The simple predicates from
//! [`super::conditions`] are accepted on fields as well.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{NoloError, Result};
use crate::record::{get_path, parse_timestamp};

use super::conditions::{check_predicate, is_simple_predicate};

/// Evaluate `condition` against `record`
pub fn matches(record: &Value, condition: &Value) -> Result<bool> {
    let clauses = match condition {
        Value::Null => return Ok(true),
        Value::Object(clauses) => clauses,
        other => {
            return Err(NoloError::Query(format!(
                "condition must be an object, got {}",
                other
            )))
        }
    };

    for (key, arg) in clauses {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in as_condition_list(key, arg)? {
                    if !matches(record, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in as_condition_list(key, arg)? {
                    if matches(record, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in as_condition_list(key, arg)? {
                    if matches(record, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$not" => !matches(record, arg)?,
            op if op.starts_with('$') => {
                return Err(NoloError::Query(format!("unknown operator {}", op)))
            }
            field => match_field(get_path(record, field), arg)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn as_condition_list<'a>(op: &str, arg: &'a Value) -> Result<&'a Vec<Value>> {
    arg.as_array()
        .ok_or_else(|| NoloError::Query(format!("{} expects an array", op)))
}

fn is_operator_object(arg: &Value) -> bool {
    match arg {
        Value::Object(ops) => !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Evaluate a field-level condition
fn match_field(value: Option<&Value>, arg: &Value) -> Result<bool> {
    if is_simple_predicate(arg) {
        return Ok(check_predicate(value, arg));
    }
    if !is_operator_object(arg) {
        return Ok(equals(value, arg));
    }

    let Value::Object(ops) = arg else {
        return Ok(false);
    };
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compare(value, operand) == Some(Ordering::Greater),
            "$gte" => matches!(
                compare(value, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "$lt" => compare(value, operand) == Some(Ordering::Less),
            "$lte" => matches!(
                compare(value, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            "$in" => as_condition_list(op, operand)?
                .iter()
                .any(|candidate| equals(value, candidate)),
            "$nin" => !as_condition_list(op, operand)?
                .iter()
                .any(|candidate| equals(value, candidate)),
            "$exists" => {
                let present = matches!(value, Some(v) if !v.is_null());
                present == operand.as_bool().unwrap_or(true)
            }
            "$size" => {
                let expected = operand
                    .as_u64()
                    .ok_or_else(|| NoloError::Query("$size expects a number".to_string()))?;
                matches!(value, Some(Value::Array(items)) if items.len() as u64 == expected)
            }
            "$all" => match value {
                Some(Value::Array(items)) => as_condition_list(op, operand)?
                    .iter()
                    .all(|wanted| items.contains(wanted)),
                _ => false,
            },
            "$elemMatch" => match value {
                Some(Value::Array(items)) => {
                    let mut any = false;
                    for item in items {
                        let hit = if is_operator_object(operand) {
                            match_field(Some(item), operand)?
                        } else {
                            matches(item, operand)?
                        };
                        if hit {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                _ => false,
            },
            "$not" => !match_field(value, operand)?,
            other => {
                return Err(NoloError::Query(format!("unknown operator {}", other)));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array membership: `{tags: "x"}` matches `tags: ["x", "y"]`
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(v) if v == expected => true,
        Some(Value::Array(items)) => items.contains(expected),
        Some(_) => false,
    }
}

fn compare(value: Option<&Value>, operand: &Value) -> Option<Ordering> {
    compare_values(value?, operand)
}

/// Order two JSON values of comparable type. Strings that are both
/// timestamps compare by instant; mixed timestamp forms are reconciled.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(tx), Some(ty)) if x.contains('T') && y.contains('T') => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(_), Value::Number(_)) | (Value::Number(_), Value::String(_)) => {
            Some(parse_timestamp(a)?.cmp(&parse_timestamp(b)?))
        }
        _ => None,
    }
}
