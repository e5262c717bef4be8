//! Protocol Module
//!
//! JSON bodies exchanged between the sync coordinator and record servers.
//!
//! ## Routes (relative to `api_prefix`)
//! ```text
//! POST   /write/                      WriteBody        → WriteResponse
//! PATCH  /patch/{dbKey}               partial record   → merged record
//! DELETE /delete/{dbKey}?type=        -                → DeleteResponse
//! GET    /read/{dbKey}                -                → record | 404
//! POST   /query/{userId}?isObject&isJSON&limit&skip
//!                                     condition        → [record]
//! GET    /health                      -                → HealthResponse
//! ```
//!
//! ## Errors
//! Every non-2xx response carries `{"error": "..."}`.

mod request;
mod response;

pub use request::{DeleteKind, DeleteParams, QueryParams, WriteBody};
pub use response::{ApiErrorBody, DeleteResponse, HealthResponse, WriteResponse};

/// Header carrying the acting user id
pub const ACTOR_HEADER: &str = "x-nolo-user";
