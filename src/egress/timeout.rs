//! Two-deadline timeout model
//!
//! Every exchange runs under two independent timers:
//! - an inactivity timer, restarted at each attempt, when the response head
//!   arrives and on every body chunk;
//! - a whole-cycle deadline fixed when the first attempt starts and never
//!   moved, covering every redirect and the full body transfer.
//!
//! Whichever fires first cancels the in-flight future. Dropping a reqwest
//! future closes its connection, so cancellation frees the socket at once.

use std::future::Future;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::time::{sleep, sleep_until, Instant};

use super::error::{EgressError, TimeoutKind};
use crate::store::ConfigSnapshot;

/// Default for both timers when the configuration sets neither
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*(ms|s|m|h)?\s*$").expect("valid duration regex"));

/// Durations for the two timers of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutSpec {
    /// Maximum silence between attempt start, headers and each body chunk
    pub connection_and_inactivity: Duration,
    /// Absolute ceiling from the first attempt to the end of the body
    pub whole_cycle: Duration,
}

impl TimeoutSpec {
    pub fn new(connection_and_inactivity: Duration, whole_cycle: Duration) -> Self {
        Self {
            connection_and_inactivity,
            whole_cycle,
        }
    }

    /// Read `timeout.connectionAndInactivity` / `timeout.wholeCycle` for a tenant
    pub fn from_snapshot(snapshot: &ConfigSnapshot, tenant: &str) -> Self {
        let read = |path: &str| {
            snapshot
                .lookup(tenant, path)
                .and_then(parse_duration)
                .unwrap_or(DEFAULT_TIMEOUT)
        };
        Self::new(
            read("timeout.connectionAndInactivity"),
            read("timeout.wholeCycle"),
        )
    }
}

/// Parse a configured duration: a number of milliseconds or `"<n>[ms|s|m|h]"`
pub fn parse_duration(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(n) => n.as_u64().map(Duration::from_millis),
        Value::String(s) => {
            let caps = DURATION_RE.captures(s)?;
            let amount: u64 = caps[1].parse().ok()?;
            let millis = match caps.get(2).map(|m| m.as_str()) {
                None | Some("ms") => amount,
                Some("s") => amount.checked_mul(1_000)?,
                Some("m") => amount.checked_mul(60_000)?,
                Some("h") => amount.checked_mul(3_600_000)?,
                Some(_) => return None,
            };
            Some(Duration::from_millis(millis))
        }
        _ => None,
    }
}

/// Render a duration the way timeout errors report it (`500ms`, `30s`)
pub fn format_duration(d: &Duration) -> String {
    let millis = d.as_millis();
    if millis % 1_000 == 0 {
        format!("{}s", millis / 1_000)
    } else {
        format!("{}ms", millis)
    }
}

/// Timer state for one exchange
#[derive(Debug, Clone)]
pub struct TimeoutController {
    spec: TimeoutSpec,
    deadline: Instant,
}

impl TimeoutController {
    /// Start the whole-cycle clock
    pub fn start(spec: TimeoutSpec) -> Self {
        Self {
            spec,
            deadline: Instant::now() + spec.whole_cycle,
        }
    }

    /// Instant at which the whole-cycle timer fires
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn inactivity(&self) -> Duration {
        self.spec.connection_and_inactivity
    }

    /// Run one phase of an attempt under both timers
    ///
    /// The inactivity window starts when this is called; the whole-cycle
    /// deadline is shared by every phase of the exchange.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, EgressError> {
        tokio::select! {
            biased;
            out = fut => Ok(out),
            _ = sleep_until(self.deadline) => Err(self.expired(TimeoutKind::WholeCycle)),
            _ = sleep(self.spec.connection_and_inactivity) => Err(self.expired(TimeoutKind::Inactivity)),
        }
    }

    /// Build the error for a fired timer and count it
    pub fn expired(&self, kind: TimeoutKind) -> EgressError {
        metrics::counter!("egress_timeouts_total", "kind" => kind.label()).increment(1);
        let after = match kind {
            TimeoutKind::Inactivity => self.spec.connection_and_inactivity,
            TimeoutKind::WholeCycle => self.spec.whole_cycle,
        };
        EgressError::Timeout { kind, after }
    }
}
