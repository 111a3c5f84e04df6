//! HTTP server for the Prometheus scrape endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sensorscrape_common::Broker;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::exposition::{CONTENT_TYPE, SharedAdapter};

/// Application state shared across handlers.
struct AppState<B: Broker> {
    adapter: SharedAdapter<B>,
}

impl<B: Broker> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
        }
    }
}

/// Create the HTTP router.
fn create_router<B: Broker + 'static>(adapter: SharedAdapter<B>, metrics_path: &str) -> Router {
    let state = AppState { adapter };

    Router::new()
        .route(metrics_path, get(metrics_handler::<B>))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<B>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint: refresh every pair, then render.
async fn metrics_handler<B: Broker + 'static>(State(state): State<AppState<B>>) -> Response {
    let body = state.adapter.scrape().await;
    debug!(bytes = body.len(), "Served scrape");

    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler<B: Broker + 'static>(State(state): State<AppState<B>>) -> Response {
    let stats = state.adapter.coordinator().stats();

    // Ready once any reading has been acquired from the broker
    if stats.acquisitions_ok > 0 {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no reading acquired yet\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer<B: Broker> {
    adapter: SharedAdapter<B>,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl<B: Broker + 'static> HttpServer<B> {
    /// Create a new HTTP server.
    pub fn new(adapter: SharedAdapter<B>, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            adapter,
            listen_addr,
            metrics_path,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let router = create_router(self.adapter, &self.metrics_path);

        info!(
            addr = %listener.local_addr().unwrap_or(self.listen_addr),
            path = %self.metrics_path,
            "HTTP server listening"
        );

        // Run server with graceful shutdown
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Wait for shutdown signal
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
