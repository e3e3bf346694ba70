//! `POST /ai-proxy`

use std::sync::Arc;

use axum::{extract::State, response::Response, Extension, Json};

use crate::{
    error::AppResult,
    gateway::{CallerContext, ProxyRequest},
    AppState,
};

/// Forward a browser request to the matching AI provider
pub async fn ai_proxy(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Json(request): Json<ProxyRequest>,
) -> AppResult<Response> {
    state.gateway.proxy(&caller, request).await
}
