//! HTTP Server
//!
//! Builds the router and runs it until shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;

use super::handlers;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

/// Record API routes nested under `config.api_prefix`
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/write/", post(handlers::write))
        .route("/patch/{id}", patch(handlers::patch))
        .route("/delete/{id}", delete(handlers::delete))
        .route("/read/{id}", get(handlers::read))
        .route("/query/{user_id}", post(handlers::query))
        .route("/health", get(handlers::health));

    let prefix = state.config.api_prefix.trim_end_matches('/').to_string();
    let app = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&prefix, api)
    };
    app.with_state(state)
}

/// HTTP server for NoloDB
pub struct Server {
    config: Arc<Config>,
    engine: Arc<Engine>,
}

impl Server {
    /// Create a new server with the given config and engine
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    fn state(&self) -> AppState {
        AppState {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
        }
    }

    /// Bind `listen_addr` and serve until Ctrl+C
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!(
            addr = %self.config.listen_addr,
            prefix = %self.config.api_prefix,
            "record server listening"
        );
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("received Ctrl+C, shutting down");
        })
        .await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        axum::serve(listener, router(self.state()))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
