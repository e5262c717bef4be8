//! Query Module
//!
//! Declarative record filtering shared by the client-side local-store scan
//! and the server-side log scan.
//!
//! ## Responsibilities
//! - Simple field predicates (`exists`, `equals`, `after`, `before`)
//! - MongoDB-style composite operators for server queries
//! - Key-flag filtering, sorting and `skip`/`limit` pagination

mod conditions;
mod operators;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NoloError, Result};
use crate::key::DbKey;
use crate::record::get_path;

pub use conditions::{check_predicate, check_query};
pub use operators::{compare_values, matches};

/// Result cap applied when a request does not set `limit`
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// A query over one user's records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub user_id: String,
    pub condition: Value,
    pub is_object: bool,
    pub is_json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub skip: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpec>,
}

impl QueryRequest {
    pub fn new(user_id: impl Into<String>, condition: Value) -> Self {
        Self {
            user_id: user_id.into(),
            condition,
            ..Self::default()
        }
    }

    /// Whether a key belongs to this query's user and flag selection
    pub fn accepts_key(&self, key: &DbKey) -> bool {
        key.user_id == self.user_id
            && (!self.is_object || key.flags.is_object)
            && (!self.is_json || key.flags.is_json)
    }

    pub fn accepts_record(&self, record: &Value) -> Result<bool> {
        matches(record, &self.condition)
    }

    /// Sort, skip and limit an already-filtered result set
    pub fn apply_window(&self, mut records: Vec<Value>) -> Vec<Value> {
        if let Some(sort) = &self.sort {
            records.sort_by(|a, b| sort.compare(a, b));
        }
        records
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
            .collect()
    }
}

/// Ordered list of sort keys.
///
/// Accepts `{"updatedAt": -1}` or, when several keys must keep their order,
/// `[{"updatedAt": -1}, {"title": 1}]`. Directions may be `1`/`-1` or
/// `"asc"`/`"desc"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct SortSpec {
    pub fields: Vec<SortField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            fields: vec![SortField {
                field: field.into(),
                descending: true,
            }],
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            fields: vec![SortField {
                field: field.into(),
                descending: false,
            }],
        }
    }

    /// Missing or incomparable values sort after present ones
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for SortField { field, descending } in &self.fields {
            let ordering = match (get_path(a, field), get_path(b, field)) {
                (Some(x), Some(y)) => {
                    let o = compare_values(x, y).unwrap_or(Ordering::Equal);
                    if *descending {
                        o.reverse()
                    } else {
                        o
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn parse_direction(field: &str, v: &Value) -> Result<bool> {
    match v {
        Value::Number(n) if n.as_i64() == Some(-1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(false),
        Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(false),
        other => Err(NoloError::Query(format!(
            "invalid sort direction for {}: {}",
            field, other
        ))),
    }
}

impl TryFrom<Value> for SortSpec {
    type Error = NoloError;

    fn try_from(value: Value) -> Result<Self> {
        let objects = match value {
            Value::Object(_) => vec![value],
            Value::Array(items) => items,
            other => {
                return Err(NoloError::Query(format!(
                    "sort must be an object or array, got {}",
                    other
                )))
            }
        };

        let mut fields = Vec::new();
        for object in objects {
            let Value::Object(map) = object else {
                return Err(NoloError::Query("sort entries must be objects".to_string()));
            };
            for (field, direction) in map {
                let descending = parse_direction(&field, &direction)?;
                fields.push(SortField { field, descending });
            }
        }
        Ok(Self { fields })
    }
}

impl From<SortSpec> for Value {
    fn from(spec: SortSpec) -> Self {
        Value::Array(
            spec.fields
                .into_iter()
                .map(|f| {
                    let mut map = serde_json::Map::new();
                    map.insert(f.field, Value::from(if f.descending { -1 } else { 1 }));
                    Value::Object(map)
                })
                .collect(),
        )
    }
}
