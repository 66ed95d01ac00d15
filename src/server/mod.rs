//! HTTP server
//!
//! Maps the file-exchange API onto the storage layer:
//!
//! - `POST /files/{path}` stores a new version and streams the body in
//! - `GET /files/{path}` streams the current version out, following a
//!   still-running upload in real time
//! - `DELETE /files/{path}` drops the current version
//! - `GET /diagnostics` renders the repository snapshot
//!
//! Paths are folded to lowercase here before they reach the storage layer.

pub mod diagnostics;
pub mod handlers;
pub mod middleware;
pub mod routes;

use crate::signal::CancelHandle;
use crate::storage::Repository;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub bind_addr: String,
    /// HTTP port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload body size (bytes)
    pub max_body_size: usize,
    /// Drain window for uploads: how long a trailing chunk may still
    /// arrive after a transport abort, and how long in-flight uploads may
    /// finish after a shutdown signal before they are cancelled
    pub upload_grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: false,
            max_body_size: 16 * 1024 * 1024, // 16 MiB
            upload_grace_period: Duration::from_secs(2),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository>,
    pub config: ServerConfig,
    /// Fired to cancel all in-flight uploads during shutdown.
    pub uploads: CancelHandle,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish()
    }
}

/// Build the application router over the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body_size = state.config.max_body_size;
    let enable_cors = state.config.enable_cors;

    let app = Router::new()
        .merge(routes::file_routes())
        .merge(routes::diagnostics_routes())
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(Extension(state))
        .layer(DefaultBodyLimit::max(max_body_size));

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the pipedrop HTTP server and block until shutdown.
pub async fn start_server(config: ServerConfig, repository: Arc<Repository>) -> anyhow::Result<()> {
    let uploads = CancelHandle::new();
    let grace = config.upload_grace_period;

    let state = Arc::new(AppState {
        repository,
        config: config.clone(),
        uploads: uploads.clone(),
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Diagnostics: http://{}/diagnostics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(uploads, grace))
        .await
        .map_err(|e| {
            error!(error = %e, "Server error");
            anyhow::anyhow!("server failed: {}", e)
        })
}

/// Resolves on SIGINT so the listener stops accepting immediately.
///
/// In-flight uploads are not cut off with the listener: a detached task
/// gives them the grace period to finish before firing their cancel
/// tokens.
async fn shutdown_signal(uploads: CancelHandle, grace: Duration) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!(grace_secs = grace.as_secs(), "shutdown requested, draining uploads");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        uploads.cancel();
    });
}
