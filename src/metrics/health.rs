//! Health check endpoints and Prometheus metrics server
//!
//! This module provides HTTP endpoints for health checks, worker status and
//! Prometheus metrics for the triage queue service using Axum.

use crate::metrics::collector::MetricsCollector;
use crate::reconcile::ReconciliationWorker;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "triage-queue";

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    /// Numeric form used by the health status gauge
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Unhealthy => 0,
        }
    }
}

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub worker: Option<Arc<ReconciliationWorker>>,
}

impl HealthServerState {
    /// Healthy while the reconciliation worker is running
    pub fn health_status(&self) -> HealthStatus {
        match &self.worker {
            Some(worker) if worker.is_running() => HealthStatus::Healthy,
            _ => HealthStatus::Unhealthy,
        }
    }
}

/// Health server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    /// Create a new health server
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                worker: None,
            },
            shutdown_tx,
        }
    }

    /// Report on this worker's status
    pub fn with_worker(mut self, worker: Arc<ReconciliationWorker>) -> Self {
        self.state.worker = Some(worker);
        self
    }

    pub fn state(&self) -> &HealthServerState {
        &self.state
    }

    /// Start the health server
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    /// Create the Axum router with all health endpoints
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/worker", get(worker_handler))
            .with_state(self.state.clone())
    }

    /// Stop the health server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }

        Ok(())
    }
}

/// Root endpoint handler - shows service information
async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/alive", "/metrics", "/worker"]
    }))
}

/// Health check: healthy while the reconciliation worker runs
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    let status = state.health_status();
    state
        .metrics_collector
        .update_health_status(status.as_gauge());

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Liveness check: the process answers
async fn alive_handler() -> impl IntoResponse {
    (StatusCode::OK, "Alive")
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Metrics endpoint requested");

    match state.metrics_collector.encode_text() {
        Ok(metrics_output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.metrics_collector.content_type())],
            metrics_output,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

/// Reconciliation worker status as JSON
async fn worker_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(worker) = &state.worker else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Worker not configured" })),
        );
    };

    match worker.status() {
        Ok(status) => (StatusCode::OK, Json(json!(status))),
        Err(e) => {
            error!("Failed to read worker status: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read worker status" })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotificationSink;
    use crate::queue::{AgingConfig, PriorityEngine, QueueStore, StaticCapacityProvider};
    use crate::reconcile::{WorkerConfig, WorkerStatus};
    use crate::utils::SystemClock;
    use crate::wait_time::{DefaultWaitTimePredictor, PredictorConfig};
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt; // for oneshot

    fn worker() -> Arc<ReconciliationWorker> {
        let store = QueueStore::new(
            PriorityEngine::new(AgingConfig::default()).unwrap(),
            Arc::new(DefaultWaitTimePredictor::new(PredictorConfig::default()).unwrap()),
            Arc::new(StaticCapacityProvider::new()),
            Arc::new(SystemClock),
        );
        Arc::new(
            ReconciliationWorker::new(
                store,
                Arc::new(RecordingNotificationSink::new()),
                WorkerConfig::default(),
            )
            .unwrap(),
        )
    }

    fn server(worker: Option<Arc<ReconciliationWorker>>) -> HealthServer {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        let server = HealthServer::new(HealthServerConfig::default(), collector);
        match worker {
            Some(worker) => server.with_worker(worker),
            None => server,
        }
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let response = get(server(None).create_router(), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let server = server(None);
        server.state().metrics_collector.record_entry_removed();

        let response = get(server.create_router(), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("triage_entries_removed_total"));
    }

    #[tokio::test]
    async fn test_health_follows_worker() {
        let worker = worker();
        let app = server(Some(worker.clone())).create_router();

        let response = get(app.clone(), "/health").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let (_tx, rx) = tokio::sync::mpsc::channel::<()>(1);
        worker
            .start_with_ticks(tokio_stream::wrappers::ReceiverStream::new(rx))
            .await
            .unwrap();
        let response = get(app.clone(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        worker.stop().await.unwrap();
        let response = get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_worker_endpoint() {
        let worker = worker();
        worker.tick().await;

        let response = get(server(Some(worker)).create_router(), "/worker").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: WorkerStatus = serde_json::from_slice(&body).unwrap();
        assert!(!status.running);
        assert_eq!(status.ticks_completed, 1);
        assert!(status.last_tick_at.is_some());

        let response = get(server(None).create_router(), "/worker").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_alive_and_404() {
        let app = server(None).create_router();
        assert_eq!(get(app.clone(), "/alive").await.status(), StatusCode::OK);
        assert_eq!(
            get(app, "/nonexistent").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_health_server_config() {
        let config = HealthServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }
}
