//! Guarded response body stream
//!
//! Wraps the upstream byte stream so that every consumer (buffering, piping
//! to a sink, relaying to a browser) gets the same enforcement: the
//! inactivity timer restarts on each chunk, the whole-cycle deadline keeps
//! running, and the running byte count is checked against the size ceiling.
//! On any violation the upstream stream is dropped immediately, which closes
//! the connection instead of draining it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::time::{sleep, sleep_until, Instant, Sleep};

use super::error::{EgressError, TimeoutKind};
use super::timeout::TimeoutController;

/// Upstream byte stream
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Response body under timeout and size enforcement
pub struct GuardedBody {
    upstream: Option<ByteStream>,
    controller: TimeoutController,
    idle: Pin<Box<Sleep>>,
    deadline: Pin<Box<Sleep>>,
    size_limit: Option<u64>,
    received: u64,
}

impl GuardedBody {
    /// Wrap a body; the inactivity window starts now
    pub fn new(upstream: ByteStream, controller: TimeoutController, size_limit: Option<u64>) -> Self {
        let idle = Box::pin(sleep(controller.inactivity()));
        let deadline = Box::pin(sleep_until(controller.deadline()));
        Self {
            upstream: Some(upstream),
            controller,
            idle,
            deadline,
            size_limit,
            received: 0,
        }
    }

    /// Bytes delivered so far
    pub fn received(&self) -> u64 {
        self.received
    }

    fn abort(&mut self, err: EgressError) -> Poll<Option<Result<Bytes, EgressError>>> {
        self.upstream = None;
        Poll::Ready(Some(Err(err)))
    }

    fn restart_idle(&mut self, window: Duration) {
        self.idle.as_mut().reset(Instant::now() + window);
    }
}

impl Stream for GuardedBody {
    type Item = Result<Bytes, EgressError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.as_mut().get_mut();
        let Some(upstream) = this.upstream.as_mut() else {
            return Poll::Ready(None);
        };

        if this.deadline.as_mut().poll(cx).is_ready() {
            let err = this.controller.expired(TimeoutKind::WholeCycle);
            return this.abort(err);
        }

        match upstream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.received += chunk.len() as u64;
                if let Some(limit) = this.size_limit {
                    if this.received > limit {
                        return this.abort(EgressError::TooLarge { limit });
                    }
                }
                let window = this.controller.inactivity();
                this.restart_idle(window);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => this.abort(EgressError::from(e)),
            Poll::Ready(None) => {
                this.upstream = None;
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.idle.as_mut().poll(cx).is_ready() {
                    let err = this.controller.expired(TimeoutKind::Inactivity);
                    return this.abort(err);
                }
                Poll::Pending
            }
        }
    }
}
