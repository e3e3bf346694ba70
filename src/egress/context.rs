//! Per-exchange logging context
//!
//! Carries a correlation id and timing for one egress call so every log line
//! of the call can be grouped together.

use std::time::{Duration, Instant};

use reqwest::{StatusCode, Url};
use tracing::{debug, error, info, warn, Span};
use uuid::Uuid;

use super::error::EgressError;
use super::target::display_url;

/// Context for tracking one outbound exchange
#[derive(Debug, Clone)]
pub struct ExchangeContext {
    /// Short identifier for log correlation
    pub trace_id: String,
    /// Tenant the call is made for
    pub tenant: String,
    /// Which caller initiated the exchange (e.g. `ai-proxy`)
    pub caller: String,
    pub start_time: Instant,
}

impl ExchangeContext {
    pub fn new(tenant: &str, caller: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string()[..8].to_string(),
            tenant: tenant.to_string(),
            caller: caller.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    pub fn log_allowed(&self, url: &Url, via_proxy: bool, allow_listed: bool) {
        debug!(
            trace_id = %self.trace_id,
            tenant = %self.tenant,
            url = %display_url(url),
            via_proxy,
            allow_listed,
            "Egress target authorized"
        );
    }

    pub fn log_denied(&self, url: &Url, reason: &str) {
        warn!(
            trace_id = %self.trace_id,
            tenant = %self.tenant,
            caller = %self.caller,
            url = %display_url(url),
            reason = %reason,
            "Egress target denied"
        );
    }

    pub fn log_attempt(&self, attempt: usize, method: &str, url: &Url) {
        debug!(
            trace_id = %self.trace_id,
            attempt,
            method = %method,
            url = %display_url(url),
            elapsed_ms = %self.elapsed_ms(),
            "Sending request upstream"
        );
    }

    pub fn log_redirect(&self, hop: usize, from: &Url, to: &Url) {
        debug!(
            trace_id = %self.trace_id,
            hop,
            from = %display_url(from),
            to = %display_url(to),
            "Following redirect"
        );
    }

    pub fn log_response(&self, url: &Url, status: StatusCode, content_length: Option<u64>) {
        info!(
            trace_id = %self.trace_id,
            tenant = %self.tenant,
            caller = %self.caller,
            url = %display_url(url),
            status = %status.as_u16(),
            content_length = ?content_length,
            elapsed_ms = %self.elapsed_ms(),
            "Response received from upstream"
        );
    }

    pub fn log_failure(&self, err: &EgressError) {
        match err {
            EgressError::Network(e) => error!(
                trace_id = %self.trace_id,
                tenant = %self.tenant,
                caller = %self.caller,
                elapsed_ms = %self.elapsed_ms(),
                error = ?e,
                "Egress exchange failed"
            ),
            EgressError::Upstream(failure) => warn!(
                trace_id = %self.trace_id,
                tenant = %self.tenant,
                caller = %self.caller,
                url = %display_url(&failure.head.url),
                status = %failure.head.status.as_u16(),
                elapsed_ms = %self.elapsed_ms(),
                "Upstream returned an error status"
            ),
            other => warn!(
                trace_id = %self.trace_id,
                tenant = %self.tenant,
                caller = %self.caller,
                elapsed_ms = %self.elapsed_ms(),
                error = %other,
                "Egress exchange failed"
            ),
        }
    }

    /// Create a tracing span for this exchange
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "egress",
            trace_id = %self.trace_id,
            tenant = %self.tenant,
            caller = %self.caller,
        )
    }
}

impl Default for ExchangeContext {
    fn default() -> Self {
        Self::new("default", "internal")
    }
}
