//! Error taxonomy for outbound exchanges
//!
//! Every failure of an egress call maps onto exactly one variant here. The
//! HTTP boundary (`crate::error::AppError`) decides how each one is surfaced.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode, Url};
use thiserror::Error;

use super::policy::DenyReason;
use super::target::display_url;
use super::timeout::format_duration;

/// Which of the two exchange timers fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// No headers or body bytes arrived within the inactivity window
    Inactivity,
    /// The absolute deadline covering all attempts and redirects passed
    WholeCycle,
}

impl TimeoutKind {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            TimeoutKind::Inactivity => "inactivity",
            TimeoutKind::WholeCycle => "whole_cycle",
        }
    }
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Inactivity => f.write_str("inactivity"),
            TimeoutKind::WholeCycle => f.write_str("whole cycle"),
        }
    }
}

/// Status line and headers of an upstream response
#[derive(Clone)]
pub struct ResponseHead {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

// Query strings may carry provider keys
impl fmt::Debug for ResponseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHead")
            .field("url", &display_url(&self.url))
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish()
    }
}

/// A terminal error response from the upstream with a best-effort body copy
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    pub head: ResponseHead,
    pub body: Bytes,
}

/// Errors produced by the egress client
#[derive(Debug, Error)]
pub enum EgressError {
    #[error("{0}")]
    PolicyDenied(DenyReason),

    #[error("ETIMEDOUT: {kind} {}", format_duration(.after))]
    Timeout { kind: TimeoutKind, after: Duration },

    #[error("message too large: limit is {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("redirect limit exceeded: more than {max} redirects")]
    RedirectLimitExceeded { max: usize, last: Box<ResponseHead> },

    #[error("invalid redirect location: {0}")]
    InvalidRedirect(String),

    #[error("upstream responded with status {}", .0.head.status)]
    Upstream(Box<UpstreamFailure>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("failed to write response body to sink: {0}")]
    Sink(#[source] std::io::Error),
}

impl From<reqwest::Error> for EgressError {
    /// The request URL is dropped; it may carry a credential in its query
    fn from(err: reqwest::Error) -> Self {
        EgressError::Network(err.without_url())
    }
}

impl EgressError {
    /// Short label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            EgressError::PolicyDenied(_) => "denied",
            EgressError::Timeout { .. } => "timeout",
            EgressError::TooLarge { .. } => "too_large",
            EgressError::RedirectLimitExceeded { .. } => "redirect_limit",
            EgressError::InvalidRedirect(_) => "invalid_redirect",
            EgressError::Upstream(_) => "upstream_error",
            EgressError::InvalidRequest(_) => "invalid_request",
            EgressError::Network(_) => "network_error",
            EgressError::Sink(_) => "sink_error",
        }
    }
}
