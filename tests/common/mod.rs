//! Common test utilities for the gateway
//!
//! Shared fixtures: engine and policy builders, a test app around a fixed
//! configuration snapshot, and raw TCP upstreams for behavior wiremock cannot
//! produce (stalls, trickles, chunked oversize bodies, forward proxies).

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use egress_gateway::egress::{
    EgressPolicyGuard, ExchangeContext, ExternalRequestPolicy, HttpExchangeEngine, TimeoutSpec,
};
use egress_gateway::{
    routes, AppState, Config, ConfigSnapshot, ConfigStore, HmacSessionValidator,
    SessionValidator, SharedConfigStore,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Test constants
pub mod constants {
    /// Tenant used by engine-level tests
    pub const TEST_TENANT: &str = "docs.example.com";
    /// Secret shared by the test session validator
    pub const TEST_SESSION_SECRET: &str = "test-session-secret";
    /// Provider key stored in test settings
    pub const TEST_PROVIDER_KEY: &str = "sk-test-provider-key";
    /// Browser origin allowed by test configuration
    pub const TEST_ORIGIN: &str = "https://editor.example.com";
}

/// Policy that lets tests reach wiremock on loopback
pub fn open_policy() -> ExternalRequestPolicy {
    ExternalRequestPolicy {
        block_private_ip: false,
        ..ExternalRequestPolicy::default()
    }
}

pub fn engine() -> HttpExchangeEngine {
    HttpExchangeEngine::new(true, EgressPolicyGuard::system()).expect("engine")
}

pub fn ctx() -> ExchangeContext {
    ExchangeContext::new(constants::TEST_TENANT, "test")
}

pub fn timeouts(inactivity_ms: u64, whole_cycle_ms: u64) -> TimeoutSpec {
    TimeoutSpec::new(
        Duration::from_millis(inactivity_ms),
        Duration::from_millis(whole_cycle_ms),
    )
}

pub fn generous_timeouts() -> TimeoutSpec {
    timeouts(5_000, 10_000)
}

/// Runtime defaults every gateway test starts from
pub fn base_defaults() -> Value {
    json!({
        "allowedCorsOrigins": [constants::TEST_ORIGIN],
        "externalRequest": {
            "action": { "allow": true, "blockPrivateIP": false }
        }
    })
}

/// Settings document with one OpenAI provider at `base_url`
pub fn ai_settings(base_url: &str, model_assigned: bool) -> Value {
    let model = if model_assigned {
        json!({ "provider": "OpenAI", "id": "gpt-4o" })
    } else {
        Value::Null
    };
    json!({
        "version": 1,
        "actions": {
            "chat": { "name": "Chat", "icon": "chat", "model": model, "capabilities": {} }
        },
        "providers": {
            "OpenAI": {
                "name": "OpenAI",
                "url": base_url,
                "key": constants::TEST_PROVIDER_KEY,
                "models": [{ "id": "gpt-4o", "name": "gpt-4o" }]
            }
        },
        "models": [],
        "customProviders": {}
    })
}

/// Snapshot with the base defaults plus `extra` merged in
pub fn snapshot_with(extra: Value) -> ConfigSnapshot {
    ConfigSnapshot::new(base_defaults()).merged(None, extra)
}

/// A running test app and handles to its collaborators
pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<dyn ConfigStore>,
}

/// Build the full router around a fixed snapshot
pub fn test_app(snapshot: ConfigSnapshot) -> TestApp {
    let store: Arc<dyn ConfigStore> = Arc::new(SharedConfigStore::new(snapshot));
    let sessions: Arc<dyn SessionValidator> = Arc::new(HmacSessionValidator::new(Some(
        constants::TEST_SESSION_SECRET,
    )));
    let state = AppState::from_parts(
        Config::default(),
        store.clone(),
        Arc::new(engine()),
        sessions,
    );

    let app = routes::create_router(Arc::new(state));
    let server = TestServer::new(app).expect("Failed to create test server");
    TestApp { server, store }
}

/// Session token valid for an hour
pub fn session_token() -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    HmacSessionValidator::new(Some(constants::TEST_SESSION_SECRET))
        .sign(&json!({ "sub": "user-1", "exp": exp }))
        .expect("sign")
}

/// Start a raw TCP upstream; each connection is handed to `handler`
///
/// Returns the base URL (`http://127.0.0.1:<port>`).
pub async fn raw_upstream<F, Fut>(handler: F) -> String
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handler(stream));
        }
    });
    format!("http://{}", addr)
}

/// Read a request head (up to the blank line)
pub async fn read_request_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Upstream that accepts the request and never answers
pub async fn stalling_upstream() -> String {
    raw_upstream(|mut stream| async move {
        read_request_head(&mut stream).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stream);
    })
    .await
}

/// Upstream that answers only after `delay`
pub async fn slow_upstream(delay: Duration) -> String {
    raw_upstream(move |mut stream| async move {
        read_request_head(&mut stream).await;
        tokio::time::sleep(delay).await;
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
            .await;
    })
    .await
}

/// Upstream that sends its head and part of the body, then goes silent
pub async fn trickling_upstream() -> String {
    raw_upstream(|mut stream| async move {
        read_request_head(&mut stream).await;
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n0123456789")
            .await;
        let _ = stream.flush().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    })
    .await
}

/// Upstream streaming a chunked body of `chunks` x `chunk_size` bytes with
/// no content-length
pub async fn chunked_upstream(chunks: usize, chunk_size: usize) -> String {
    raw_upstream(move |mut stream| async move {
        read_request_head(&mut stream).await;
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n")
            .await;
        for _ in 0..chunks {
            let mut chunk = format!("{:x}\r\n", chunk_size).into_bytes();
            chunk.extend(std::iter::repeat(b'a').take(chunk_size));
            chunk.extend_from_slice(b"\r\n");
            if stream.write_all(&chunk).await.is_err() {
                return;
            }
            let _ = stream.flush().await;
        }
        let _ = stream.write_all(b"0\r\n\r\n").await;
    })
    .await
}

/// Forward proxy stand-in that reports the request head it received
///
/// The head is sent to `tx` and the request is answered with 200.
pub async fn recording_proxy(tx: tokio::sync::mpsc::UnboundedSender<String>) -> String {
    raw_upstream(move |mut stream| {
        let tx = tx.clone();
        async move {
            let head = read_request_head(&mut stream).await;
            let _ = tx.send(head);
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 7\r\n\r\nproxied")
                .await;
        }
    })
    .await
}
