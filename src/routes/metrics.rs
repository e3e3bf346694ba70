//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

/// Describe every metric the gateway emits
fn register_metrics() {
    metrics::describe_counter!(
        "egress_requests_total",
        "Outbound exchanges by outcome"
    );
    metrics::describe_counter!(
        "egress_denied_total",
        "Outbound requests refused by the egress policy, by reason"
    );
    metrics::describe_counter!(
        "egress_timeouts_total",
        "Outbound exchanges aborted by a timer, by kind"
    );
    metrics::describe_histogram!(
        "egress_exchange_duration_seconds",
        "Time from authorization to response head, redirects included"
    );
    metrics::describe_counter!(
        "gateway_requests_total",
        "Inbound gateway requests by route and status"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record an inbound request
pub fn record_gateway_request(route: &str, status: u16) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
