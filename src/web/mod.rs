//! HTTP API for netguard.
//!
//! ## Endpoints
//!
//! - `GET /` - service info
//! - `POST /api/backup-jobs` - run a batch backup and return its result
//! - `GET /api/health` - liveness and version
//! - `/api/devices`, `/api/devices/{id}` - device registry CRUD
//! - `/api/backups`, `/api/backups/{id}` - backup history; `POST /api/backups` backs up one device
//! - `GET /api/backups/{id}/download` - artifact content as a file

mod error;
mod handlers;

pub use error::ApiError;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use tokio::sync::broadcast;

use crate::context::AppContext;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct WebState {
    pub ctx: AppContext,
}

/// Build the API router over an application context.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/api/backup-jobs", post(handlers::create_backup_job))
        .route(
            "/api/devices",
            get(handlers::list_devices).post(handlers::create_device),
        )
        .route(
            "/api/devices/{id}",
            get(handlers::get_device)
                .put(handlers::update_device)
                .delete(handlers::delete_device),
        )
        .route(
            "/api/backups",
            get(handlers::list_backups).post(handlers::create_backup),
        )
        .route(
            "/api/backups/{id}",
            get(handlers::get_backup).delete(handlers::delete_backup),
        )
        .route("/api/backups/{id}/download", get(handlers::download_backup))
        .with_state(WebState { ctx })
}

/// HTTP server for the backup API.
pub struct WebServer {
    bind_addr: SocketAddr,
    ctx: AppContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebServer {
    pub fn new(ctx: AppContext, bind_addr: SocketAddr) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            bind_addr,
            ctx,
            shutdown_tx,
        }
    }

    /// Start the web server. Runs until shutdown() is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        let app = router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "HTTP API listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("HTTP API stopped");
        Ok(())
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
