//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tiering_agent::api::{create_router, AppState};
use tiering_core::{
    health::{components, HealthRegistry},
    models::{CostSummary, Policy, PolicySelector, ResourceMetric, Tier, BYTES_PER_GIB},
    observability::TieringMetrics,
    store::{Snapshot, SnapshotStore},
};
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = TieringMetrics::new();
    let state = Arc::new(AppState::new(
        health_registry,
        metrics,
        Arc::new(SnapshotStore::new()),
    ));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn publish_snapshot(state: &AppState) {
    let mut volume = ResourceMetric::new("orders-db", "prod", "gp3", 100 * BYTES_PER_GIB);
    volume.monthly_cost = 8.0;

    state
        .store
        .replace(Snapshot {
            resources: vec![volume],
            summary: CostSummary {
                total_monthly_cost: 8.0,
                ..Default::default()
            },
            recommendations: Vec::new(),
            policies: vec![Policy {
                name: "default".to_string(),
                selector: PolicySelector::default(),
                tiers: vec![Tier::new("hot", "gp3", "0s")],
                auto_delete: false,
            }],
            last_update: Some(chrono::Utc::now()),
        })
        .await;
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["collector"].is_object());
    assert!(health["components"]["migration"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .record_failure(components::MIGRATION, "workflow engine slow")
        .await;

    let (status, body) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_after_repeated_failures() {
    let (app, state) = setup_test_app().await;

    for _ in 0..3 {
        state
            .health_registry
            .record_failure(components::COLLECTOR, "inventory unavailable")
            .await;
    }

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_before_and_after_first_refresh() {
    let (app, state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;

    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_snapshot_endpoints_unavailable_before_refresh() {
    let (app, _state) = setup_test_app().await;

    for uri in [
        "/api/v1/summary",
        "/api/v1/recommendations",
        "/api/v1/resources",
        "/api/v1/policies",
    ] {
        let (status, _) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
    }
}

#[tokio::test]
async fn test_snapshot_endpoints_serve_latest() {
    let (app, state) = setup_test_app().await;
    publish_snapshot(&state).await;

    let (status, body) = get(app.clone(), "/api/v1/summary").await;
    assert_eq!(status, StatusCode::OK);
    let summary: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(summary["total_monthly_cost"], 8.0);

    let (_, body) = get(app.clone(), "/api/v1/resources").await;
    let resources: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(resources[0]["name"], "orders-db");

    let (_, body) = get(app.clone(), "/api/v1/policies").await;
    let policies: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(policies[0]["tiers"][0]["storageClass"], "gp3");

    let (status, body) = get(app, "/api/v1/recommendations").await;
    assert_eq!(status, StatusCode::OK);
    let recs: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(recs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_collection_latency(0.001);
    state.metrics.observe_collection_latency(0.01);
    state.metrics.inc_migrations_submitted();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("tiering_collection_latency_seconds_bucket"));
    assert!(metrics_text.contains("tiering_collection_latency_seconds_count"));
    assert!(metrics_text.contains("tiering_migrations_submitted_total"));
    assert!(metrics_text.contains("tiering_fleet_monthly_cost"));
}
