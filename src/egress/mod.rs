//! Resilient outbound HTTP client
//!
//! Everything the server sends to third parties goes through
//! [`HttpExchangeEngine`]: targets are authorized before any socket is opened,
//! two timers bound each exchange, redirects are followed hop by hop, and
//! bodies are buffered or streamed under a size ceiling.

pub mod address;
pub mod body;
pub mod consumer;
pub mod context;
pub mod engine;
pub mod error;
pub mod policy;
pub mod redirect;
pub mod request;
pub mod target;
pub mod timeout;

pub use body::GuardedBody;
pub use consumer::{
    BufferedResponse, ByteSink, ExchangeResult, ResponseConsumer, StreamedResponse,
    UpstreamResponse,
};
pub use context::ExchangeContext;
pub use engine::HttpExchangeEngine;
pub use error::{EgressError, ResponseHead, TimeoutKind, UpstreamFailure};
pub use policy::{
    DenyReason, EgressGrant, EgressPolicyGuard, ExternalRequestPolicy, HostResolver, ProxyRoute,
    ProxyUser, SystemResolver,
};
pub use redirect::{RedirectDecision, RedirectResolver};
pub use request::{RequestBody, RequestSpec, RequestStream};
pub use timeout::{TimeoutController, TimeoutSpec};
