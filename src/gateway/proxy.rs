//! Provider proxy gateway
//!
//! Browser-facing façade over the egress engine: matches a requested target
//! to a configured provider, injects the provider credential, delegates the
//! call and relays the upstream response. Credentials only ever flow
//! outbound.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::headers::{build_upstream_headers, ensure_json_content_type};
use super::provider::{Credential, ModelInfo, Provider, ProviderConfig};
use super::registry::{provider_from, ProviderRegistry};
use super::relay::{relay_failure, relay_response};
use super::settings::{settings_for_interface, PluginSettings, SETTINGS_KEY};
use crate::egress::engine::{parse_method, parse_target};
use crate::egress::{
    EgressError, ExchangeContext, ExchangeResult, ExternalRequestPolicy, HttpExchangeEngine,
    RedirectResolver, RequestSpec, TimeoutSpec,
};
use crate::error::{AppError, AppResult};
use crate::store::{replacement_patch, ConfigStore};

/// Ceiling on a model-list response
pub const MODEL_LIST_LIMIT: u64 = 5 * 1024 * 1024;

/// Body of `POST /ai-proxy`
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub method: Option<String>,
    pub target: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// JSON payload, or a raw string sent as-is
    #[serde(default)]
    pub data: Option<Value>,
}

/// Body of `POST /ai-models`
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsRequest {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: Credential,
}

/// Response of `POST /ai-models`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// Per-request caller identity
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub tenant: String,
    /// A session token was presented and verified
    pub authenticated: bool,
}

/// The AI-specific gateway
pub struct ProviderProxyGateway {
    engine: Arc<HttpExchangeEngine>,
    store: Arc<dyn ConfigStore>,
}

impl ProviderProxyGateway {
    pub fn new(engine: Arc<HttpExchangeEngine>, store: Arc<dyn ConfigStore>) -> Self {
        Self { engine, store }
    }

    /// Forward a browser request to its provider and relay the answer
    ///
    /// The target is caller input and never counts as a trusted source,
    /// authenticated session or not.
    #[instrument(skip_all, fields(tenant = %caller.tenant, authenticated = caller.authenticated))]
    pub async fn proxy(&self, caller: &CallerContext, request: ProxyRequest) -> AppResult<Response> {
        let snapshot = self.store.snapshot();
        let settings = PluginSettings::from_snapshot(&snapshot, &caller.tenant);
        let registry = ProviderRegistry::from_settings(&settings);

        let provider = registry
            .resolve(&request.target)
            .ok_or(AppError::ProviderUnmatched)?;
        debug!(provider = %provider.name(), "Matched provider");

        let target = parse_target(&request.target)?;
        let url = provider.endpoint_url(&target);

        let mut headers = build_upstream_headers(&request.headers)?;
        let body = match request.data {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(Bytes::from(raw)),
            Some(doc) => {
                ensure_json_content_type(&mut headers);
                Some(Bytes::from(serde_json::to_vec(&doc)?))
            }
        };
        let method = match (request.method.as_deref(), &body) {
            (None, Some(_)) => reqwest::Method::POST,
            (method, _) => parse_method(method)?,
        };

        for (name, value) in provider.auth_headers()?.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let redirects = RedirectResolver::from_snapshot(&snapshot, &caller.tenant);
        let mut spec = RequestSpec::new(method, url)
            .with_headers(headers)
            .with_redirects(redirects.follow, redirects.max_redirects);
        if let Some(name) = provider.credential_header() {
            spec = spec.with_sensitive_header(name);
        }
        if let Some(body) = body {
            spec = spec.with_body(body);
        }

        let ctx = ExchangeContext::new(&caller.tenant, "ai-proxy");
        let policy = ExternalRequestPolicy::from_snapshot(&snapshot, &caller.tenant);
        let timeouts = TimeoutSpec::from_snapshot(&snapshot, &caller.tenant);

        match self.engine.send(&ctx, spec, timeouts, &policy).await {
            Ok(upstream) => Ok(relay_response(upstream, &provider.credential, ctx)),
            Err(EgressError::Upstream(failure)) => Ok(relay_failure(*failure, &provider.credential)),
            Err(e) => Err(e.into()),
        }
    }

    /// Settings as the browser may see them
    pub fn interface_settings(&self, tenant: &str) -> Option<PluginSettings> {
        let snapshot = self.store.snapshot();
        settings_for_interface(&PluginSettings::from_snapshot(&snapshot, tenant))
    }

    /// Store a settings document submitted by the browser
    #[instrument(skip_all, fields(tenant = %tenant))]
    pub async fn save_settings(&self, tenant: &str, submitted: PluginSettings) -> AppResult<()> {
        let snapshot = self.store.snapshot();
        let current = PluginSettings::from_snapshot(&snapshot, tenant);
        let next = current.with_submission(submitted);

        let patch = replacement_patch(
            snapshot.lookup(tenant, SETTINGS_KEY),
            serde_json::to_value(&next)?,
        );
        self.store
            .save_config(Some(tenant), json!({ SETTINGS_KEY: patch }))
            .await?;

        info!(providers = next.providers.len() + next.custom_providers.len(), "AI settings saved");
        Ok(())
    }

    /// Fetch a provider's model list
    ///
    /// The stored key is only used when the request targets the stored URL,
    /// so a browser cannot point a stored credential at a host of its choice.
    #[instrument(
        skip_all,
        fields(tenant = %caller.tenant, authenticated = caller.authenticated, provider = %request.name)
    )]
    pub async fn discover_models(
        &self,
        caller: &CallerContext,
        request: ModelsRequest,
    ) -> AppResult<ModelsResponse> {
        if request.url.is_empty() {
            return Err(AppError::BadRequest("provider url is required".to_string()));
        }

        let snapshot = self.store.snapshot();
        let settings = PluginSettings::from_snapshot(&snapshot, &caller.tenant);
        let stored = settings.provider(&request.name);
        let url_matches = stored.is_some_and(|entry| entry.url == request.url);

        let mut provider = match stored {
            Some(entry) => provider_from(&request.name, entry),
            None => ProviderConfig::for_name(&request.name, &request.url, Credential::default()),
        };
        provider.base_url = request.url.clone();
        provider.credential = match (request.key.is_empty(), stored) {
            (true, Some(entry)) if url_matches => entry.key.clone(),
            _ => request.key,
        };

        let mut spec = RequestSpec::get(provider.models_url()?)
            .with_headers(provider.auth_headers()?);
        if let Some(name) = provider.credential_header() {
            spec = spec.with_sensitive_header(name);
        }

        let ctx = ExchangeContext::new(&caller.tenant, "ai-models");
        let policy = ExternalRequestPolicy::from_snapshot(&snapshot, &caller.tenant);
        let timeouts = TimeoutSpec::from_snapshot(&snapshot, &caller.tenant);

        let result = self
            .engine
            .execute(&ctx, spec, timeouts, &policy, Some(MODEL_LIST_LIMIT), None)
            .await?;
        let body = match result {
            ExchangeResult::Buffered(buffered) => buffered.body,
            ExchangeResult::Streamed(_) => Bytes::new(),
        };
        let models = provider.parse_models(&body)?;

        if url_matches {
            let section = if settings.providers.contains_key(&request.name) {
                "providers"
            } else {
                "customProviders"
            };
            self.store
                .save_config(
                    Some(&caller.tenant),
                    json!({ SETTINGS_KEY: { section: { request.name.clone(): { "models": models } } } }),
                )
                .await?;
            debug!(count = models.len(), "Stored discovered models");
        }

        Ok(ModelsResponse { models })
    }
}
