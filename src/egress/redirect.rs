//! Redirect interpretation
//!
//! Turns a 3xx response into the next hop, a terminal response, or an error.
//! The engine disables reqwest's own redirect handling and drives every hop
//! itself so each one passes the policy guard again.

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode, Url};

use super::error::{EgressError, ResponseHead};
use crate::store::ConfigSnapshot;

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Result of inspecting a response for redirection
#[derive(Debug)]
pub enum RedirectDecision {
    /// Issue the next attempt
    Follow {
        url: Url,
        method: Method,
        /// Whether the request body is sent again
        keep_body: bool,
    },
    /// The response is final
    Stop,
    Fail(EgressError),
}

/// Redirect rules for one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectResolver {
    pub follow: bool,
    pub max_redirects: usize,
}

impl Default for RedirectResolver {
    fn default() -> Self {
        Self {
            follow: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl RedirectResolver {
    pub fn new(follow: bool, max_redirects: usize) -> Self {
        Self {
            follow,
            max_redirects,
        }
    }

    /// Read `requestDefaults.followRedirect` / `requestDefaults.maxRedirects`
    pub fn from_snapshot(snapshot: &ConfigSnapshot, tenant: &str) -> Self {
        Self {
            follow: snapshot.get_cfg(tenant, "requestDefaults.followRedirect", true),
            max_redirects: snapshot.get_cfg(
                tenant,
                "requestDefaults.maxRedirects",
                DEFAULT_MAX_REDIRECTS,
            ),
        }
    }

    /// Decide what to do with a response
    ///
    /// `hops` is the number of redirects already followed. `body_replayable`
    /// is false once a one-shot upload stream has been consumed.
    pub fn next(
        &self,
        method: &Method,
        head: &ResponseHead,
        hops: usize,
        body_replayable: bool,
    ) -> RedirectDecision {
        if !is_followed_status(head.status) {
            return RedirectDecision::Stop;
        }
        let Some(location) = location(&head.headers) else {
            return RedirectDecision::Stop;
        };
        if !self.follow {
            return RedirectDecision::Stop;
        }
        if hops >= self.max_redirects {
            return RedirectDecision::Fail(EgressError::RedirectLimitExceeded {
                max: self.max_redirects,
                last: Box::new(head.clone()),
            });
        }

        // Relative locations resolve against the URL that produced this response.
        let url = match head.url.join(location) {
            Ok(url) => url,
            Err(e) => {
                return RedirectDecision::Fail(EgressError::InvalidRedirect(format!(
                    "{}: {}",
                    location, e
                )))
            }
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return RedirectDecision::Fail(EgressError::InvalidRedirect(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let preserves_method = matches!(
            head.status,
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
        );
        if preserves_method {
            if !body_replayable {
                return RedirectDecision::Stop;
            }
            return RedirectDecision::Follow {
                url,
                method: method.clone(),
                keep_body: true,
            };
        }

        let method = if *method == Method::HEAD {
            Method::HEAD
        } else if head.status == StatusCode::SEE_OTHER || *method != Method::GET {
            Method::GET
        } else {
            method.clone()
        };
        RedirectDecision::Follow {
            url,
            method,
            keep_body: false,
        }
    }
}

fn is_followed_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn location(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
