//! Route handlers
//!
//! Each handler validates and authorizes on the async side, then runs the
//! engine call on the blocking pool.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::engine::Engine;
use crate::error::{NoloError, Result};
use crate::key::DbKey;
use crate::merge::deep_merge;
use crate::protocol::{
    DeleteKind, DeleteParams, DeleteResponse, HealthResponse, QueryParams, WriteBody,
    WriteResponse,
};

use super::auth::{actor_from_headers, authorize};
use super::error::ApiError;
use super::server::AppState;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

async fn with_engine<T, F>(engine: &Arc<Engine>, op: F) -> Result<T>
where
    F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| NoloError::Storage(format!("engine task failed: {}", e)))?
}

/// Key a write lands on: a complete key in `customId`, else flags/user/id
fn resolve_write_key(body: &WriteBody, actor: &str) -> Result<DbKey> {
    let user_id = body.user_id.as_deref().unwrap_or(actor);
    match body.custom_id.as_deref() {
        Some(custom) => match DbKey::parse(custom) {
            Ok(key) => Ok(key),
            Err(_) => DbKey::new(body.flags, user_id, custom),
        },
        None => DbKey::generate(body.flags, user_id),
    }
}

pub async fn write(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WriteBody>,
) -> ApiResult<WriteResponse> {
    let actor = actor_from_headers(&headers)?;
    let key = resolve_write_key(&body, &actor)?;
    authorize(&state.config, &actor, &key.user_id)?;

    let data_id = key.to_string();
    let stored = data_id.clone();
    with_engine(&state.engine, move |engine| engine.set_record(&stored, &body.data)).await?;

    tracing::debug!(key = %data_id, actor = %actor, "write");
    Ok(Json(WriteResponse { data_id }))
}

pub async fn patch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(changes): Json<Value>,
) -> ApiResult<Value> {
    let actor = actor_from_headers(&headers)?;
    let key = DbKey::parse(&id)?;
    authorize(&state.config, &actor, &key.user_id)?;
    if !changes.is_object() {
        return Err(NoloError::MalformedInput("patch body must be a JSON object".to_string()).into());
    }

    let merged = with_engine(&state.engine, move |engine| {
        let current = engine
            .get_record(&id)?
            .ok_or_else(|| NoloError::NotFound(format!("Data not found for key: {}", id)))?;
        let merged = deep_merge(&current, &changes);
        engine.set_record(&id, &merged)?;
        Ok(merged)
    })
    .await?;

    Ok(Json(merged))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
    headers: HeaderMap,
) -> ApiResult<DeleteResponse> {
    let actor = actor_from_headers(&headers)?;
    let key = DbKey::parse(&id)?;
    authorize(&state.config, &actor, &key.user_id)?;

    let processing_ids = with_engine(&state.engine, move |engine| match params.kind {
        DeleteKind::Messages => engine.delete_messages(&id),
        DeleteKind::Single => engine.delete(&id).map(|_| vec![id]),
    })
    .await?;

    tracing::debug!(count = processing_ids.len(), kind = params.kind.as_str(), "delete");
    Ok(Json(DeleteResponse { processing_ids }))
}

pub async fn read(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    DbKey::parse(&id)?;
    let record = with_engine(&state.engine, move |engine| {
        engine
            .get_record(&id)?
            .ok_or_else(|| NoloError::NotFound(format!("Data not found for key: {}", id)))
    })
    .await?;
    Ok(Json(record))
}

pub async fn query(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<QueryParams>,
    Json(condition): Json<Value>,
) -> ApiResult<Vec<Value>> {
    let request = params.into_request(user_id, condition)?;
    let records = with_engine(&state.engine, move |engine| engine.query(&request)).await?;
    Ok(Json(records))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}
