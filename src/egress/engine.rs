//! Outbound exchange orchestration
//!
//! Drives the attempt/redirect loop: every hop is authorized by the policy
//! guard, every wait runs under the exchange's timeout controller, and a
//! terminal error status is turned into `EgressError::Upstream`.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE,
    PROXY_AUTHORIZATION, TRANSFER_ENCODING,
};
use reqwest::{redirect, Client, Method, Url};
use tracing::{debug, Instrument};

use super::body::GuardedBody;
use super::consumer::{ByteSink, ExchangeResult, ResponseConsumer, UpstreamResponse};
use super::context::ExchangeContext;
use super::error::{EgressError, ResponseHead, UpstreamFailure};
use super::policy::{EgressPolicyGuard, ExternalRequestPolicy, ProxyRoute, ProxyUser};
use super::redirect::{RedirectDecision, RedirectResolver};
use super::request::{RequestBody, RequestSpec};
use super::target::same_origin;
use super::timeout::{TimeoutController, TimeoutSpec};

/// Ceiling on the copy of an upstream error body
pub const ERROR_BODY_LIMIT: u64 = 64 * 1024;

type ClientKey = (String, Option<ProxyUser>);

/// Outbound HTTP client with policy, timeout and redirect enforcement
pub struct HttpExchangeEngine {
    direct: Client,
    proxied: Mutex<HashMap<ClientKey, Client>>,
    guard: EgressPolicyGuard,
    keep_alive: bool,
}

impl HttpExchangeEngine {
    /// Create an engine
    ///
    /// With `keep_alive` off no idle connection is kept for reuse.
    pub fn new(keep_alive: bool, guard: EgressPolicyGuard) -> Result<Self, EgressError> {
        Ok(Self {
            direct: build_client(keep_alive, None)?,
            proxied: Mutex::new(HashMap::new()),
            guard,
            keep_alive,
        })
    }

    pub fn guard(&self) -> &EgressPolicyGuard {
        &self.guard
    }

    /// Run an exchange up to the final response head
    ///
    /// The returned response still owns the connection; its body is read
    /// through a guarded stream that keeps enforcing both timers.
    pub async fn send(
        &self,
        ctx: &ExchangeContext,
        spec: RequestSpec,
        timeouts: TimeoutSpec,
        policy: &ExternalRequestPolicy,
    ) -> Result<UpstreamResponse, EgressError> {
        self.send_capped(ctx, spec, timeouts, policy, ERROR_BODY_LIMIT)
            .await
    }

    /// Run an exchange and consume the final body
    ///
    /// With a sink the body is piped into it and a streamed outcome is
    /// returned; without one the body is buffered and hashed.
    pub async fn execute(
        &self,
        ctx: &ExchangeContext,
        spec: RequestSpec,
        timeouts: TimeoutSpec,
        policy: &ExternalRequestPolicy,
        size_limit: Option<u64>,
        sink: Option<ByteSink<'_>>,
    ) -> Result<ExchangeResult, EgressError> {
        let error_cap = size_limit.map_or(ERROR_BODY_LIMIT, |l| l.min(ERROR_BODY_LIMIT));
        let response = self
            .send_capped(ctx, spec, timeouts, policy, error_cap)
            .await?;

        let result = ResponseConsumer::new(size_limit)
            .consume(response, sink)
            .await;
        if let Err(e) = &result {
            ctx.log_failure(e);
        }
        result
    }

    async fn send_capped(
        &self,
        ctx: &ExchangeContext,
        spec: RequestSpec,
        timeouts: TimeoutSpec,
        policy: &ExternalRequestPolicy,
        error_cap: u64,
    ) -> Result<UpstreamResponse, EgressError> {
        let result = self
            .run_attempts(ctx, spec, timeouts, policy, error_cap)
            .instrument(ctx.create_span())
            .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!("egress_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("egress_exchange_duration_seconds")
            .record(ctx.elapsed().as_secs_f64());

        if let Err(e) = &result {
            ctx.log_failure(e);
        }
        result
    }

    async fn run_attempts(
        &self,
        ctx: &ExchangeContext,
        spec: RequestSpec,
        timeouts: TimeoutSpec,
        policy: &ExternalRequestPolicy,
        error_cap: u64,
    ) -> Result<UpstreamResponse, EgressError> {
        let controller = TimeoutController::start(timeouts);
        let resolver = RedirectResolver::new(spec.follow_redirect, spec.max_redirects);

        let mut method = spec.method;
        let mut url = spec.url;
        let mut headers = spec.headers;
        let mut body = spec.body;
        let mut trusted = spec.is_trusted_source;
        let sensitive = spec.sensitive_headers;

        let mut hops = 0;
        let mut attempts = 0;
        // A one-shot upload stream cannot be sent twice
        let mut stream_sent = false;

        loop {
            let grant = controller
                .run(self.guard.authorize(ctx, policy, &url, trusted))
                .await??;
            let client = self.client_for(grant.via_proxy.as_ref())?;

            attempts += 1;
            ctx.log_attempt(attempts, method.as_str(), &url);

            let mut request_headers = headers.clone();
            if let Some(route) = &grant.via_proxy {
                merge_proxy_headers(&mut request_headers, route)?;
            }

            let mut request = client
                .request(method.clone(), url.clone())
                .headers(request_headers);
            match std::mem::replace(&mut body, RequestBody::Empty) {
                RequestBody::Empty => {}
                RequestBody::Bytes(bytes) => {
                    request = request.body(bytes.clone());
                    body = RequestBody::Bytes(bytes);
                }
                RequestBody::Stream { stream, length } => {
                    if let Some(length) = length {
                        request = request.header(CONTENT_LENGTH, length);
                    }
                    request = request.body(reqwest::Body::wrap_stream(stream));
                    stream_sent = true;
                }
            }

            let response = controller.run(request.send()).await??;
            let head = ResponseHead {
                url: url.clone(),
                status: response.status(),
                headers: response.headers().clone(),
            };
            ctx.log_response(&url, head.status, response.content_length());

            match resolver.next(&method, &head, hops, !stream_sent) {
                RedirectDecision::Follow {
                    url: next,
                    method: next_method,
                    keep_body,
                } => {
                    hops += 1;
                    ctx.log_redirect(hops, &url, &next);
                    drop(response);

                    if !same_origin(&url, &next) {
                        strip_credentials(&mut headers, &sensitive);
                        trusted = false;
                    }
                    if !keep_body {
                        body = RequestBody::Empty;
                        stream_sent = false;
                        for name in [CONTENT_TYPE, CONTENT_LENGTH, TRANSFER_ENCODING] {
                            headers.remove(name);
                        }
                    }
                    method = next_method;
                    url = next;
                }
                RedirectDecision::Stop => {
                    if head.status.as_u16() >= 400 {
                        let copy = read_error_body(response, &controller, error_cap).await;
                        return Err(EgressError::Upstream(Box::new(UpstreamFailure {
                            head,
                            body: copy.freeze(),
                        })));
                    }
                    return Ok(UpstreamResponse::new(head, attempts, response, controller));
                }
                RedirectDecision::Fail(e) => return Err(e),
            }
        }
    }

    fn client_for(&self, route: Option<&ProxyRoute>) -> Result<Client, EgressError> {
        let Some(route) = route else {
            return Ok(self.direct.clone());
        };

        let key = (route.url.clone(), route.user.clone());
        let mut cache = self
            .proxied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = cache.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(self.keep_alive, Some(route))?;
        debug!(proxy = %route.url, "Created proxied HTTP client");
        cache.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(keep_alive: bool, route: Option<&ProxyRoute>) -> Result<Client, EgressError> {
    let mut builder = Client::builder().redirect(redirect::Policy::none());
    if !keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }

    builder = match route {
        Some(route) => {
            let mut proxy = reqwest::Proxy::all(route.url.as_str()).map_err(|e| {
                EgressError::InvalidRequest(format!("invalid proxy url: {}", e))
            })?;
            if let Some(user) = &route.user {
                proxy = proxy.basic_auth(&user.username, &user.password);
            }
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    Ok(builder.build()?)
}

fn merge_proxy_headers(headers: &mut HeaderMap, route: &ProxyRoute) -> Result<(), EgressError> {
    for (name, value) in &route.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| EgressError::InvalidRequest(format!("invalid proxy header '{}'", name)))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            EgressError::InvalidRequest(format!("invalid value for proxy header '{}'", name))
        })?;
        headers.insert(name, value);
    }
    Ok(())
}

fn strip_credentials(headers: &mut HeaderMap, sensitive: &[HeaderName]) {
    for name in [AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION] {
        headers.remove(name);
    }
    for name in sensitive {
        headers.remove(name);
    }
}

/// Copy up to `cap` bytes of an error body; stops quietly on any failure
async fn read_error_body(
    response: reqwest::Response,
    controller: &TimeoutController,
    cap: u64,
) -> BytesMut {
    let cap = cap as usize;
    let mut body = GuardedBody::new(Box::pin(response.bytes_stream()), controller.clone(), None);
    let mut buffer = BytesMut::new();

    while let Some(Ok(chunk)) = body.next().await {
        let room = cap - buffer.len();
        buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buffer.len() >= cap {
            break;
        }
    }
    buffer
}

/// Parse a caller-supplied target into a URL
pub fn parse_target(target: &str) -> Result<Url, EgressError> {
    Url::parse(target).map_err(|e| EgressError::InvalidRequest(format!("invalid target url: {}", e)))
}

/// Build a request method from caller input, defaulting to GET
pub fn parse_method(method: Option<&str>) -> Result<Method, EgressError> {
    match method.map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok(Method::GET),
        Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
            .map_err(|_| EgressError::InvalidRequest(format!("invalid method '{}'", m))),
    }
}
