//! Actor extraction and namespace authorization

use axum::http::HeaderMap;

use crate::config::Config;
use crate::error::{NoloError, Result};
use crate::protocol::ACTOR_HEADER;

/// The acting user from the `x-nolo-user` header
pub fn actor_from_headers(headers: &HeaderMap) -> Result<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| NoloError::Unauthorized(format!("missing {} header", ACTOR_HEADER)))
}

/// An actor may mutate its own namespace, or any namespace an allow rule grants
pub fn authorize(config: &Config, actor: &str, namespace: &str) -> Result<()> {
    if actor == namespace || config.allow_list.iter().any(|r| r.permits(actor, namespace)) {
        return Ok(());
    }
    Err(NoloError::Forbidden(format!(
        "{} may not modify data of {}",
        actor, namespace
    )))
}
