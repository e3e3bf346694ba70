//! Health and metrics endpoint integration tests
//!
//! - GET /health - Full health check with dependency status
//! - GET /health/live - Liveness probe
//! - GET /metrics - Prometheus exposition

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::common::{snapshot_with, test_app};

#[tokio::test]
async fn test_health_endpoint_returns_proper_structure() {
    let app = test_app(snapshot_with(json!({})));

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime_seconds"].is_u64());
    assert!(json["timestamp"].is_string());
    assert_eq!(json["checks"]["config"]["status"], "healthy");
    assert_eq!(json["stats"]["tenants"], 0);
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let app = test_app(snapshot_with(json!({})));

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_health_is_not_subject_to_session_enforcement() {
    let app = test_app(snapshot_with(json!({
        "aiProxy": { "enforceSessionToken": true }
    })));

    let response = app.server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = test_app(snapshot_with(json!({})));

    let response = app.server.get("/v1/chat/completions").await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    egress_gateway::routes::metrics::init_metrics();
    let app = test_app(snapshot_with(json!({})));

    app.server.get("/health/live").await.assert_status_ok();
    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("gateway_requests_total"));
}
