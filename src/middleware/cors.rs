//! CORS for the browser-facing endpoints
//!
//! Only origins listed in the tenant's `allowedCorsOrigins` get CORS headers.
//! Preflight requests are answered here and never reach a handler.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::tenant::tenant_from_headers;
use crate::AppState;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const DEFAULT_ALLOWED_HEADERS: &str = "Authorization, Content-Type";
const PREFLIGHT_MAX_AGE: &str = "600";

/// CORS middleware
pub async fn cors_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let tenant = tenant_from_headers(request.headers());
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let allowed = origin.filter(|origin| {
        let origins: Vec<String> = state
            .store
            .snapshot()
            .get_cfg(&tenant, "allowedCorsOrigins", Vec::new());
        origins.iter().any(|o| o == origin)
    });

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        match &allowed {
            Some(origin) => {
                apply_cors_headers(response.headers_mut(), origin);
                apply_preflight_headers(response.headers_mut(), request.headers());
            }
            None => debug!(tenant = %tenant, "Preflight from origin that is not allowed"),
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Some(origin) = &allowed {
        apply_cors_headers(response.headers_mut(), origin);
    }
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}

fn apply_preflight_headers(headers: &mut HeaderMap, request_headers: &HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    let requested = request_headers
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
}
