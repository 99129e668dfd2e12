//! Prometheus exposition endpoint

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use can_signal_decoder::registry::EXPOSITION_CONTENT_TYPE;
use can_signal_decoder::MetricRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The metrics listener could not be bound
#[derive(Debug, thiserror::Error)]
#[error("Failed to start metrics server on {addr}: {source}")]
pub struct MetricsServerStartError {
    pub addr: SocketAddr,
    #[source]
    pub source: std::io::Error,
}

/// Bind the metrics listener
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, MetricsServerStartError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| MetricsServerStartError { addr, source })
}

pub fn router(registry: Arc<MetricRegistry>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .with_state(registry)
}

/// Serve until the task is aborted
pub async fn serve(listener: TcpListener, registry: Arc<MetricRegistry>) -> std::io::Result<()> {
    axum::serve(listener, router(registry)).await
}

async fn index() -> &'static str {
    "CAN signal exporter. Metrics are served at /metrics\n"
}

async fn metrics(State(registry): State<Arc<MetricRegistry>>) -> Response {
    match registry.encode_text() {
        Ok(body) => ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            log::error!("Failed to render metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
