//! HTTP API for health checks, Prometheus metrics and the current attribution table

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use podmapper_lib::{health::HealthRegistry, AttributionTable, ComponentStatus, MapperMetrics};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MapperMetrics,
    /// Latest table; `None` until the first successful refresh or while the
    /// node has no pod-resources socket
    pub attributions: RwLock<Option<AttributionTable>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: MapperMetrics) -> Self {
        Self {
            health_registry,
            metrics,
            attributions: RwLock::new(None),
        }
    }

    pub async fn set_attributions(&self, table: Option<AttributionTable>) {
        let mut attributions = self.attributions.write().await;
        *attributions = table;
    }
}

/// Health check response - returns 200 if operational, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Current device-to-pod table, 404 when attribution is unavailable
async fn attributions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.attributions.read().await.as_ref() {
        Some(table) => (StatusCode::OK, Json(table.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/attributions", get(attributions))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
