//! HTTP API for health checks, Prometheus metrics and snapshot reads

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tiering_core::{
    health::{ComponentStatus, HealthRegistry},
    observability::TieringMetrics,
    store::{Snapshot, SnapshotStore},
};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: TieringMetrics,
    pub store: Arc<SnapshotStore>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: TieringMetrics,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            store,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the first refresh has landed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

#[derive(Serialize)]
struct NotReady {
    error: &'static str,
}

/// Serve one projection of the latest snapshot, or 503 before the first refresh
async fn from_snapshot<T, F>(state: &AppState, project: F) -> Response
where
    T: Serialize,
    F: FnOnce(&Snapshot) -> T,
{
    let snapshot = state.store.snapshot().await;
    if snapshot.last_update.is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(NotReady {
                error: "no snapshot collected yet",
            }),
        )
            .into_response();
    }

    Json(project(&snapshot)).into_response()
}

async fn summary(State(state): State<Arc<AppState>>) -> Response {
    from_snapshot(&state, |s| s.summary.clone()).await
}

async fn recommendations(State(state): State<Arc<AppState>>) -> Response {
    from_snapshot(&state, |s| s.recommendations.clone()).await
}

async fn resources(State(state): State<Arc<AppState>>) -> Response {
    from_snapshot(&state, |s| s.resources.clone()).await
}

async fn policies(State(state): State<Arc<AppState>>) -> Response {
    from_snapshot(&state, |s| s.policies.clone()).await
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/summary", get(summary))
        .route("/api/v1/recommendations", get(recommendations))
        .route("/api/v1/resources", get(resources))
        .route("/api/v1/policies", get(policies))
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
