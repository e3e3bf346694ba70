//! Header utilities for provider proxying
//!
//! Filters what the browser asks to send upstream and what the upstream sends
//! back, so the gateway's own cookies and the provider credential never cross
//! the boundary.

use std::collections::BTreeMap;

use axum::http::header::{self, HeaderName};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use super::provider::Credential;
use crate::error::{AppError, AppResult};

/// Hop-by-hop headers that must never be forwarded
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Request headers the browser may not set on the upstream call
const RESERVED_REQUEST_HEADERS: &[HeaderName] = &[
    header::HOST,
    header::CONTENT_LENGTH,
    header::COOKIE,
    header::ORIGIN,
    header::REFERER,
];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name) || name.as_str() == "keep-alive"
}

/// Build the upstream header map from the headers named in a proxy request
pub fn build_upstream_headers(requested: &BTreeMap<String, String>) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in requested {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AppError::BadRequest(format!("invalid header name '{}'", name)))?;
        if is_hop_by_hop_header(&name) || RESERVED_REQUEST_HEADERS.contains(&name) {
            continue;
        }
        let value = HeaderValue::from_str(value)
            .map_err(|_| AppError::BadRequest(format!("invalid value for header '{}'", name)))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Default a JSON content type when the caller did not name one
pub fn ensure_json_content_type(headers: &mut HeaderMap) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
}

/// Filter an upstream response's headers before relaying them
///
/// Drops hop-by-hop headers, upstream CORS and cookies, and any header whose
/// value would reveal the credential.
pub fn filter_response_headers(response_headers: &HeaderMap, credential: &Credential) -> HeaderMap {
    let mut filtered = HeaderMap::new();

    for (name, value) in response_headers {
        if is_hop_by_hop_header(name)
            || *name == header::SET_COOKIE
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }
        if !credential.is_empty() && leaks(value, credential) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }

    filtered
}

fn leaks(value: &HeaderValue, credential: &Credential) -> bool {
    String::from_utf8_lossy(value.as_bytes()).contains(credential.expose())
}
