//! Relaying upstream responses back to the browser

use axum::{
    body::Body,
    http::header::CONTENT_LENGTH,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::info;

use super::headers::filter_response_headers;
use super::provider::Credential;
use crate::egress::{ExchangeContext, UpstreamFailure, UpstreamResponse};

/// Stream a successful upstream response to the caller
///
/// The body keeps running under the exchange timers; a timeout or reset
/// mid-stream ends the relayed body with an error.
pub fn relay_response(
    upstream: UpstreamResponse,
    credential: &Credential,
    ctx: ExchangeContext,
) -> Response {
    let status = upstream.status();
    let headers = filter_response_headers(upstream.headers(), credential);
    let (_, body) = upstream.into_body(None);

    info!(
        trace_id = %ctx.trace_id,
        tenant = %ctx.tenant,
        status = %status.as_u16(),
        elapsed_ms = %ctx.elapsed_ms(),
        "Relaying upstream response"
    );

    let body = body.inspect(move |chunk| {
        if let Err(e) = chunk {
            ctx.log_failure(e);
        }
    });

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Forward an upstream error response with its status and body copy
///
/// The copy may be truncated, so the upstream length is not forwarded.
pub fn relay_failure(failure: UpstreamFailure, credential: &Credential) -> Response {
    let mut headers = filter_response_headers(&failure.head.headers, credential);
    headers.remove(CONTENT_LENGTH);

    (failure.head.status, headers, failure.body).into_response()
}
