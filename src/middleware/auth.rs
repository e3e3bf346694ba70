//! Session authentication middleware
//!
//! Resolves the caller of an AI endpoint. When the tenant enforces session
//! tokens, a missing or invalid bearer token ends the request with 403 before
//! any upstream call.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use super::tenant::tenant_from_headers;
use crate::{error::AppError, gateway::CallerContext, AppState};

/// Extract the Authorization header and return the bearer token
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Hash a token for log correlation
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Session middleware
///
/// This middleware:
/// 1. Resolves the tenant from the `Host` header
/// 2. Reads `aiProxy.enforceSessionToken` for that tenant
/// 3. Verifies a bearer session token when present
/// 4. Adds a `CallerContext` to request extensions
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let tenant = tenant_from_headers(request.headers());
    let enforce = state
        .store
        .snapshot()
        .get_cfg(&tenant, "aiProxy.enforceSessionToken", false);

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token);

    let authenticated = match token {
        Some(token) => match state.sessions.validate(token) {
            Ok(claims) => {
                debug!(
                    token_hash = %&hash_token(token)[..12],
                    subject = ?claims.subject,
                    "Session token verified"
                );
                true
            }
            Err(e) if enforce => {
                warn!(tenant = %tenant, error = %e, "Session token rejected");
                return Err(AppError::Forbidden(e.to_string()));
            }
            Err(e) => {
                debug!(error = %e, "Ignoring invalid session token");
                false
            }
        },
        None if enforce => {
            warn!(tenant = %tenant, "Session token required but missing");
            return Err(AppError::Forbidden("session token required".to_string()));
        }
        None => false,
    };

    request.extensions_mut().insert(CallerContext {
        tenant,
        authenticated,
    });

    Ok(next.run(request).await)
}
