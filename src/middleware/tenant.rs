//! Tenant resolution
//!
//! A tenant is the host name the request was addressed to.

use axum::http::{header, HeaderMap};

/// Tenant used when the request carries no usable `Host`
pub const DEFAULT_TENANT: &str = "default";

/// `Host` header without port, lowercased
pub fn tenant_from_headers(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    let name = if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        rest.split(']').next().unwrap_or_default()
    } else {
        host.split(':').next().unwrap_or_default()
    };

    if name.is_empty() {
        DEFAULT_TENANT.to_string()
    } else {
        name.to_ascii_lowercase()
    }
}
