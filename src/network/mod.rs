//! Network Module
//!
//! HTTP record server.
//!
//! ## Architecture
//! - axum router nested under `api_prefix`
//! - One shared `Engine` behind an `Arc`, injected as router state
//! - Engine calls run on the blocking pool; handlers stay async
//! - Mutations are authorized against the key's user namespace

mod auth;
mod error;
mod handlers;
mod server;

pub use auth::{actor_from_headers, authorize};
pub use error::{status_for, ApiError};
pub use server::{router, AppState, Server};
