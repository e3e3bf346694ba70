//! HTTP routes for the gateway
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod health;
pub mod metrics;
pub mod models;
pub mod proxy;
pub mod settings;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use self::metrics::record_gateway_request;
use crate::{
    middleware::{auth::session_middleware, cors::cors_middleware},
    AppState,
};

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Browser-facing routes
    // Middleware is applied in reverse order (last applied runs first)
    // So: CORS runs first and answers preflights, then session auth
    let ai_routes = Router::new()
        .route("/ai-proxy", post(proxy::ai_proxy).options(preflight))
        .route(
            "/ai-settings",
            get(settings::get_settings)
                .post(settings::save_settings)
                .options(preflight),
        )
        .route("/ai-models", post(models::discover_models).options(preflight))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware));

    // Public routes (health checks, metrics)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(ai_routes)
        .route_layer(middleware::from_fn(track_requests))
        // Global middleware (applied to all routes)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Preflights are answered by the CORS middleware; this only gives the
/// method a route
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    record_gateway_request(&route, response.status().as_u16());
    response
}
