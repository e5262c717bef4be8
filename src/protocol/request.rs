//! Request definitions

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{NoloError, Result};
use crate::key::KeyFlags;
use crate::query::{QueryRequest, SortSpec};

/// Body of `POST /write/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBody {
    pub data: Value,

    #[serde(default)]
    pub flags: KeyFlags,

    /// Record id, or a complete encoded key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,

    /// Namespace owner; defaults to the acting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// What `DELETE /delete/{id}` removes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteKind {
    /// The record alone
    #[default]
    Single,

    /// A dialog record and every message pointing at it
    Messages,
}

impl DeleteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteKind::Single => "single",
            DeleteKind::Messages => "messages",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default, rename = "type")]
    pub kind: DeleteKind,
}

/// Query string of `POST /query/{userId}`.
///
/// `isObject` and `isJSON` are presence flags: `?isObject` and
/// `?isObject=true` both enable the filter. `sort` is a JSON-encoded
/// [`SortSpec`], applied before `skip` and `limit`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default, rename = "isObject", deserialize_with = "presence_flag")]
    pub is_object: bool,

    #[serde(default, rename = "isJSON", deserialize_with = "presence_flag")]
    pub is_json: bool,

    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub skip: Option<usize>,

    #[serde(default)]
    pub sort: Option<String>,
}

impl QueryParams {
    pub fn into_request(self, user_id: impl Into<String>, condition: Value) -> Result<QueryRequest> {
        let sort = match self.sort.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let value: Value = serde_json::from_str(raw)
                    .map_err(|e| NoloError::Query(format!("invalid sort: {}", e)))?;
                Some(SortSpec::try_from(value)?)
            }
        };
        Ok(QueryRequest {
            user_id: user_id.into(),
            condition,
            is_object: self.is_object,
            is_json: self.is_json,
            limit: self.limit,
            skip: self.skip.unwrap_or(0),
            sort,
        })
    }

    /// Query-string pairs for a request, as sent by the client
    pub fn pairs(request: &QueryRequest) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if request.is_object {
            pairs.push(("isObject", "true".to_string()));
        }
        if request.is_json {
            pairs.push(("isJSON", "true".to_string()));
        }
        if let Some(limit) = request.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if request.skip > 0 {
            pairs.push(("skip", request.skip.to_string()));
        }
        if let Some(sort) = &request.sort {
            pairs.push(("sort", Value::from(sort.clone()).to_string()));
        }
        pairs
    }
}

fn presence_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw.as_deref() {
        None => false,
        Some("") | Some("1") => true,
        Some(other) => other.eq_ignore_ascii_case("true"),
    })
}
