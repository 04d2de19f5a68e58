//! Read-only HTTP server for stored images
//!
//! `GET /{phash}.jpg` returns the stored file; `GET /health` reports liveness.

use std::path::PathBuf;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::{Error, Result};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Serves the image directory
pub struct ImageServer {
    images_dir: PathBuf,
    host: String,
    port: u16,
}

impl ImageServer {
    #[must_use]
    pub fn new(images_dir: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self {
            images_dir: images_dir.into(),
            host: host.into(),
            port,
        }
    }

    /// Router with the health route and the image directory as fallback
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .fallback_service(ServeDir::new(&self.images_dir))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the process exits
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind image server on {addr}: {e}")))?;

        tracing::info!(%addr, dir = %self.images_dir.display(), "image server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("image server error: {e}")))?;
        Ok(())
    }

    /// Run the server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
