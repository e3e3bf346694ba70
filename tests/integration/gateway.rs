//! AI gateway endpoint tests
//!
//! Drive the full router with axum-test against wiremock providers:
//! - POST /ai-proxy - provider matching, credential injection, relaying
//! - GET|POST /ai-settings - sanitized reads and key-preserving writes
//! - POST /ai-models - model discovery
//! - CORS and session enforcement in front of all three

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{ai_settings, constants, session_token, snapshot_with, test_app, TestApp};

fn app_with_provider(server: &MockServer) -> TestApp {
    test_app(snapshot_with(json!({
        "aiSettings": ai_settings(&format!("{}/v1", server.uri()), true)
    })))
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn origin(value: &'static str) -> HeaderValue {
    HeaderValue::from_static(value)
}

// ============================================================================
// POST /ai-proxy
// ============================================================================

#[tokio::test]
async fn test_proxy_injects_credential_and_relays_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header_eq(
            "authorization",
            format!("Bearer {}", constants::TEST_PROVIDER_KEY).as_str(),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "chatcmpl-1", "choices": [] }))
                .insert_header("x-request-id", "req-1")
                .insert_header("set-cookie", "tracking=1"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "headers": { "x-client": "editor" },
            "data": { "model": "gpt-4o", "messages": [] }
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, json!({ "id": "chatcmpl-1", "choices": [] }));
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-1");
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let received = &server.received_requests().await.unwrap()[0];
    assert_eq!(received.headers.get("x-client").unwrap(), "editor");
    assert_eq!(
        received.headers.get("content-type").unwrap(),
        "application/json"
    );
    let sent: Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(sent, json!({ "model": "gpt-4o", "messages": [] }));
}

#[tokio::test]
async fn test_proxy_sends_string_data_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/completions", server.uri()),
            "headers": { "content-type": "text/plain" },
            "data": "raw prompt text"
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
    let received = &server.received_requests().await.unwrap()[0];
    assert_eq!(received.body, b"raw prompt text");
}

#[tokio::test]
async fn test_proxy_unmatched_target_is_forbidden_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": "https://collector.example.net/v1/chat/completions",
            "data": { "model": "gpt-4o" }
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "PROVIDER_UNMATCHED");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_proxy_prefix_match_respects_path_boundary() {
    let server = MockServer::start().await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1evil/steal", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_proxy_ignores_disabled_provider() {
    let server = MockServer::start().await;
    let mut settings = ai_settings(&format!("{}/v1", server.uri()), true);
    settings["providers"]["OpenAI"]["enable"] = json!(false);
    let app = test_app(snapshot_with(json!({ "aiSettings": settings })));

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_proxy_relays_upstream_error_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({ "error": { "message": "slow down" } }))
                .insert_header("retry-after", "7"),
        )
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("retry-after").unwrap(), "7");
    let body: Value = response.json();
    assert_eq!(body, json!({ "error": { "message": "slow down" } }));
}

#[tokio::test]
async fn test_proxy_never_relays_headers_echoing_the_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-debug-auth", constants::TEST_PROVIDER_KEY)
                .insert_header("access-control-allow-origin", "*"),
        )
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status_ok();
    assert!(response.headers().get("x-debug-auth").is_none());
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_proxy_injects_query_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .and(query_param("key", "gm-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .expect(1)
        .mount(&server)
        .await;
    let app = test_app(snapshot_with(json!({
        "aiSettings": {
            "providers": {
                "Google-Gemini": {
                    "name": "Google-Gemini",
                    "url": format!("{}/v1beta", server.uri()),
                    "key": "gm-key"
                }
            }
        }
    })));

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1beta/models/gemini-pro:generateContent", server.uri()),
            "data": { "contents": [] }
        }))
        .await;

    response.assert_status_ok();
    let received = &server.received_requests().await.unwrap()[0];
    assert!(received.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_proxy_policy_denial_is_forbidden() {
    let server = MockServer::start().await;
    let app = test_app(snapshot_with(json!({
        "externalRequest": { "action": { "blockPrivateIP": true } },
        "aiSettings": ai_settings(&format!("{}/v1", server.uri()), true)
    })));

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "POLICY_DENIED");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_proxy_network_failure_is_generic_500() {
    // Nothing listens on port 1
    let app = test_app(snapshot_with(json!({
        "aiSettings": ai_settings("http://127.0.0.1:1/v1", true)
    })));

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": "http://127.0.0.1:1/v1/chat/completions",
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "NETWORK_ERROR");
    assert_eq!(body["error"]["message"], "Upstream request failed");
}

// ============================================================================
// Session enforcement
// ============================================================================

fn enforcing_app(server: &MockServer) -> TestApp {
    test_app(snapshot_with(json!({
        "aiProxy": { "enforceSessionToken": true },
        "aiSettings": ai_settings(&format!("{}/v1", server.uri()), true)
    })))
}

#[tokio::test]
async fn test_missing_session_token_is_forbidden_before_upstream() {
    let server = MockServer::start().await;
    let app = enforcing_app(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_forged_session_token_is_forbidden() {
    let server = MockServer::start().await;
    let app = enforcing_app(&server);

    let response = app
        .server
        .get("/ai-settings")
        .add_header(header::AUTHORIZATION, bearer("eyJhbGciOiJIUzI1NiJ9.e30.forged"))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_valid_session_token_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    let app = enforcing_app(&server);

    let response = app
        .server
        .post("/ai-proxy")
        .add_header(header::AUTHORIZATION, bearer(&session_token()))
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_token_does_not_make_browser_target_trusted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    let app = test_app(snapshot_with(json!({
        "aiProxy": { "enforceSessionToken": true },
        "externalRequest": {
            "action": { "allow": false },
            "directIfIn": { "jwtToken": true }
        },
        "aiSettings": ai_settings(&format!("{}/v1", server.uri()), true)
    })));

    let response = app
        .server
        .post("/ai-proxy")
        .add_header(header::AUTHORIZATION, bearer(&session_token()))
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "POLICY_DENIED");
    assert!(server.received_requests().await.unwrap().is_empty());

    let response = app
        .server
        .post("/ai-models")
        .add_header(header::AUTHORIZATION, bearer(&session_token()))
        .json(&json!({ "name": "OpenAI", "url": format!("{}/v1", server.uri()), "key": "" }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// GET|POST /ai-settings
// ============================================================================

#[tokio::test]
async fn test_settings_read_never_exposes_credentials() {
    let server = MockServer::start().await;
    let mut settings = ai_settings(&format!("{}/v1", server.uri()), true);
    settings["customProviders"] = json!({
        "Local": { "name": "Local", "url": "http://llm.internal/v1", "key": "local-secret" }
    });
    let app = test_app(snapshot_with(json!({ "aiSettings": settings })));

    let response = app.server.get("/ai-settings").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["providers"]["OpenAI"]["key"], "");
    assert_eq!(body["customProviders"]["Local"]["key"], "");
    assert_eq!(body["providers"]["OpenAI"]["url"], format!("{}/v1", server.uri()));
    assert!(!response.text().contains(constants::TEST_PROVIDER_KEY));
    assert!(!response.text().contains("local-secret"));
}

#[tokio::test]
async fn test_settings_without_assigned_model_read_as_null() {
    let app = test_app(snapshot_with(json!({
        "aiSettings": ai_settings("https://api.openai.com/v1", false)
    })));

    let response = app.server.get("/ai-settings").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_settings_write_keeps_stored_key_for_unchanged_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_eq(
            "authorization",
            format!("Bearer {}", constants::TEST_PROVIDER_KEY).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    // The browser only ever sees blank keys and submits them back blank
    let mut submitted = ai_settings(&format!("{}/v1", server.uri()), true);
    submitted["providers"]["OpenAI"]["key"] = json!("");
    submitted["actions"]["chat"]["name"] = json!("Ask AI");

    let saved = app.server.post("/ai-settings").json(&submitted).await;
    saved.assert_status_ok();
    let body: Value = saved.json();
    assert_eq!(body["actions"]["chat"]["name"], "Ask AI");
    assert_eq!(body["providers"]["OpenAI"]["key"], "");

    let response = app
        .server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", server.uri()),
            "data": {}
        }))
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_settings_write_drops_key_when_url_changes() {
    let old = MockServer::start().await;
    let new = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&new)
        .await;
    let app = app_with_provider(&old);

    let mut submitted = ai_settings(&format!("{}/v1", new.uri()), true);
    submitted["providers"]["OpenAI"]["key"] = json!("");
    app.server
        .post("/ai-settings")
        .json(&submitted)
        .await
        .assert_status_ok();

    app.server
        .post("/ai-proxy")
        .json(&json!({
            "target": format!("{}/v1/chat/completions", new.uri()),
            "data": {}
        }))
        .await
        .assert_status_ok();

    let received = &new.received_requests().await.unwrap()[0];
    assert!(received.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_settings_write_removes_deleted_providers() {
    let server = MockServer::start().await;
    let app = app_with_provider(&server);

    let mut submitted = ai_settings(&format!("{}/v1", server.uri()), true);
    submitted["providers"] = json!({});
    submitted["actions"]["chat"]["model"] = json!({ "provider": "Other", "id": "m" });
    app.server
        .post("/ai-settings")
        .json(&submitted)
        .await
        .assert_status_ok();

    let body: Value = app.server.get("/ai-settings").await.json();
    assert_eq!(body["providers"], json!({}));
}

// ============================================================================
// POST /ai-models
// ============================================================================

#[tokio::test]
async fn test_model_discovery_uses_stored_key_for_stored_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header_eq(
            "authorization",
            format!("Bearer {}", constants::TEST_PROVIDER_KEY).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "gpt-4o-mini", "object": "model" },
                { "id": "o1", "object": "model", "name": "o1 preview" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_with_provider(&server);

    let response = app
        .server
        .post("/ai-models")
        .json(&json!({ "name": "OpenAI", "url": format!("{}/v1", server.uri()), "key": "" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({ "models": [
            { "id": "gpt-4o-mini", "name": "gpt-4o-mini" },
            { "id": "o1", "name": "o1 preview" }
        ] })
    );

    // Discovered models are written back to the stored provider
    let settings: Value = app.server.get("/ai-settings").await.json();
    assert_eq!(settings["providers"]["OpenAI"]["models"], body["models"]);
}

#[tokio::test]
async fn test_model_discovery_never_sends_stored_key_to_other_url() {
    let stored = MockServer::start().await;
    let other = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&other)
        .await;
    let app = app_with_provider(&stored);

    let response = app
        .server
        .post("/ai-models")
        .json(&json!({ "name": "OpenAI", "url": format!("{}/v1", other.uri()), "key": "" }))
        .await;

    response.assert_status_ok();
    let received = &other.received_requests().await.unwrap()[0];
    assert!(received.headers.get("authorization").is_none());

    // The stored model list is left alone
    let settings: Value = app.server.get("/ai-settings").await.json();
    assert_eq!(
        settings["providers"]["OpenAI"]["models"],
        json!([{ "id": "gpt-4o", "name": "gpt-4o" }])
    );
}

#[tokio::test]
async fn test_model_discovery_requires_url() {
    let app = test_app(snapshot_with(json!({})));

    let response = app
        .server
        .post("/ai-models")
        .json(&json!({ "name": "OpenAI", "url": "", "key": "sk-x" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_model_discovery_unreadable_list_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;
    let app = test_app(snapshot_with(json!({})));

    let response = app
        .server
        .post("/ai-models")
        .json(&json!({ "name": "OpenAI", "url": format!("{}/v1", server.uri()), "key": "sk-x" }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_preflight_from_allowed_origin() {
    let app = test_app(snapshot_with(json!({})));

    let response = app
        .server
        .method(Method::OPTIONS, "/ai-proxy")
        .add_header(header::ORIGIN, origin(constants::TEST_ORIGIN))
        .add_header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("content-type"),
        )
        .await;

    response.assert_status(StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        constants::TEST_ORIGIN
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .is_some());
    assert!(response.text().is_empty());
}

#[tokio::test]
async fn test_preflight_skips_session_enforcement() {
    let server = MockServer::start().await;
    let app = enforcing_app(&server);

    let response = app
        .server
        .method(Method::OPTIONS, "/ai-settings")
        .add_header(header::ORIGIN, origin(constants::TEST_ORIGIN))
        .await;

    response.assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_preflight_from_unknown_origin_gets_no_cors_headers() {
    let app = test_app(snapshot_with(json!({})));

    let response = app
        .server
        .method(Method::OPTIONS, "/ai-models")
        .add_header(header::ORIGIN, origin("https://attacker.example.org"))
        .await;

    response.assert_status(StatusCode::NO_CONTENT);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_cors_headers_on_regular_and_rejected_requests() {
    let server = MockServer::start().await;
    let app = enforcing_app(&server);

    // Rejected by session enforcement, still readable by the allowed origin
    let response = app
        .server
        .get("/ai-settings")
        .add_header(header::ORIGIN, origin(constants::TEST_ORIGIN))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        constants::TEST_ORIGIN
    );
    assert_eq!(
        response.headers().get(HeaderName::from_static("vary")).unwrap(),
        "Origin"
    );
}
