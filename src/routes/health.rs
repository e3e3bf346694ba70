//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with dependency status
//! - `/health/live` - Liveness probe

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual dependency check result
#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dependency checks collection
#[derive(Debug, Serialize)]
pub struct DependencyChecks {
    pub config: DependencyCheck,
}

/// Application statistics
#[derive(Debug, Serialize)]
pub struct HealthStats {
    pub uptime_seconds: u64,
    pub tenants: usize,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub checks: DependencyChecks,
    pub stats: HealthStats,
}

/// Simple health response for liveness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

/// Check that settings writes have somewhere to go
///
/// Without a config file the store is memory-only and always healthy.
async fn check_config_store(state: &AppState) -> DependencyCheck {
    let start = Instant::now();

    let error = match &state.config.config_file {
        None => None,
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            match tokio::fs::metadata(dir).await {
                Ok(meta) if meta.is_dir() => None,
                Ok(_) => Some(format!("{} is not a directory", dir.display())),
                Err(e) => Some(format!("{}: {}", dir.display(), e)),
            }
        }
    };

    DependencyCheck {
        status: if error.is_some() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        },
        latency_ms: start.elapsed().as_millis() as u64,
        error,
    }
}

/// Full health check endpoint
///
/// A degraded config store still serves reads, so it reports 200.
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let config_check = check_config_store(&state).await;
    let overall_status = config_check.status.clone();

    let uptime = state.start_time.elapsed().as_secs();

    let response = HealthResponse {
        status: overall_status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: DependencyChecks {
            config: config_check,
        },
        stats: HealthStats {
            uptime_seconds: uptime,
            tenants: state.store.snapshot().tenant_count(),
        },
    };

    let status_code = match overall_status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Liveness probe endpoint
///
/// Returns 200 OK if the application is alive.
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
