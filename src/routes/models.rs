//! `POST /ai-models`

use std::sync::Arc;

use axum::{extract::State, Extension, Json};

use crate::{
    error::AppResult,
    gateway::{CallerContext, ModelsRequest, ModelsResponse},
    AppState,
};

/// Fetch a provider's model list
pub async fn discover_models(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Json(request): Json<ModelsRequest>,
) -> AppResult<Json<ModelsResponse>> {
    let models = state.gateway.discover_models(&caller, request).await?;
    Ok(Json(models))
}
