//! `GET|POST /ai-settings`
//!
//! Reads return the sanitized settings (no credentials), or `null` when no
//! action has a model assigned yet.

use std::sync::Arc;

use axum::{extract::State, Extension, Json};

use crate::{
    error::AppResult,
    gateway::{CallerContext, PluginSettings},
    AppState,
};

/// Current settings as the browser may see them
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
) -> Json<Option<PluginSettings>> {
    Json(state.gateway.interface_settings(&caller.tenant))
}

/// Save the submitted settings and answer with the sanitized result
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerContext>,
    Json(submitted): Json<PluginSettings>,
) -> AppResult<Json<Option<PluginSettings>>> {
    state.gateway.save_settings(&caller.tenant, submitted).await?;
    Ok(Json(state.gateway.interface_settings(&caller.tenant)))
}
