//! AI provider descriptions
//!
//! Providers are data, not code: a base URL, a credential, an auth mode and a
//! model-list format. Built-in presets fill in the auth details for well-known
//! names; custom providers declare them in the settings document.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Provider API secret
///
/// Never printed; `Debug` shows only whether a value is set.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

/// Where the credential goes on an outgoing request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthMode {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `<name>: <key>`
    Header { name: String },
    /// `?<param>=<key>`
    Query { param: String },
}

/// Shape of a provider's model-list response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelListFormat {
    /// `{"data": [{"id", ...}]}` or a bare array of the same objects
    #[default]
    OpenAi,
    /// `{"models": [{"name": "models/<id>", "displayName"}]}`
    Gemini,
}

/// Model entry as shown to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Provider capability interface
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    /// Final request URL for `target`, with a query credential applied
    fn endpoint_url(&self, target: &Url) -> Url;

    /// Headers carrying the credential plus any fixed provider headers
    fn auth_headers(&self) -> AppResult<HeaderMap>;

    /// Model-list endpoint, credential applied
    fn models_url(&self) -> AppResult<Url>;

    fn parse_models(&self, body: &[u8]) -> AppResult<Vec<ModelInfo>>;
}

/// Data-described provider
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub credential: Credential,
    pub auth: AuthMode,
    /// Fixed headers sent with every request (e.g. an API version)
    pub extra_headers: BTreeMap<String, String>,
    pub models_path: String,
    pub model_format: ModelListFormat,
    pub models: Vec<ModelInfo>,
    pub enabled: bool,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .field("auth", &self.auth)
            .field("model_format", &self.model_format)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl ProviderConfig {
    /// Provider with preset details for `name`, or OpenAI-compatible defaults
    pub fn for_name(name: &str, base_url: &str, credential: Credential) -> Self {
        let mut config = match preset(name) {
            Some(preset) => preset.to_config(),
            None => Self {
                name: name.to_string(),
                base_url: String::new(),
                credential: Credential::default(),
                auth: AuthMode::Bearer,
                extra_headers: BTreeMap::new(),
                models_path: "/models".to_string(),
                model_format: ModelListFormat::OpenAi,
                models: Vec::new(),
                enabled: true,
            },
        };
        if !base_url.is_empty() {
            config.base_url = base_url.to_string();
        }
        config.credential = credential;
        config
    }

    /// Name of the header carrying the credential, if header-based
    pub fn credential_header(&self) -> Option<HeaderName> {
        match &self.auth {
            AuthMode::Bearer => Some(AUTHORIZATION),
            AuthMode::Header { name } => HeaderName::from_bytes(name.as_bytes()).ok(),
            AuthMode::Query { .. } => None,
        }
    }
}

impl Provider for ProviderConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, target: &Url) -> Url {
        let mut url = target.clone();
        if let AuthMode::Query { param } = &self.auth {
            if !self.credential.is_empty() {
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k != param.as_str())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                url.query_pairs_mut()
                    .clear()
                    .extend_pairs(kept)
                    .append_pair(param, self.credential.expose());
            }
        }
        url
    }

    fn auth_headers(&self) -> AppResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                AppError::BadRequest(format!("invalid header name for provider {}", self.name))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                AppError::BadRequest(format!("invalid header value for provider {}", self.name))
            })?;
            headers.insert(name, value);
        }

        if self.credential.is_empty() {
            return Ok(headers);
        }

        let value = match &self.auth {
            AuthMode::Bearer => format!("Bearer {}", self.credential.expose()),
            AuthMode::Header { .. } => self.credential.expose().to_string(),
            AuthMode::Query { .. } => return Ok(headers),
        };
        let name = self.credential_header().ok_or_else(|| {
            AppError::BadRequest(format!("invalid auth header for provider {}", self.name))
        })?;
        let mut value = HeaderValue::from_str(&value).map_err(|_| {
            AppError::BadRequest(format!("invalid credential for provider {}", self.name))
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);

        Ok(headers)
    }

    fn models_url(&self) -> AppResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.models_path.trim_start_matches('/')
        );
        let url = Url::parse(&joined)
            .map_err(|e| AppError::BadRequest(format!("invalid provider url: {}", e)))?;
        Ok(self.endpoint_url(&url))
    }

    fn parse_models(&self, body: &[u8]) -> AppResult<Vec<ModelInfo>> {
        let doc: Value = serde_json::from_slice(body).map_err(|e| {
            AppError::UpstreamError(format!("{} returned an unreadable model list: {}", self.name, e))
        })?;
        let models = match self.model_format {
            ModelListFormat::OpenAi => {
                let entries = doc
                    .get("data")
                    .and_then(Value::as_array)
                    .or_else(|| doc.as_array());
                entries
                    .map(|list| list.iter().filter_map(openai_model).collect())
                    .unwrap_or_default()
            }
            ModelListFormat::Gemini => doc
                .get("models")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(gemini_model).collect())
                .unwrap_or_default(),
        };
        Ok(models)
    }
}

fn openai_model(entry: &Value) -> Option<ModelInfo> {
    let id = entry.get("id").and_then(Value::as_str)?;
    let name = ["display_name", "name"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .unwrap_or(id);
    Some(ModelInfo {
        id: id.to_string(),
        name: name.to_string(),
    })
}

fn gemini_model(entry: &Value) -> Option<ModelInfo> {
    let full = entry.get("name").and_then(Value::as_str)?;
    let id = full.strip_prefix("models/").unwrap_or(full);
    let name = entry
        .get("displayName")
        .and_then(Value::as_str)
        .unwrap_or(id);
    Some(ModelInfo {
        id: id.to_string(),
        name: name.to_string(),
    })
}

/// Built-in provider definition
#[derive(Debug, Clone)]
pub struct ProviderPreset {
    pub name: &'static str,
    pub url: &'static str,
    pub auth: AuthMode,
    pub extra_headers: &'static [(&'static str, &'static str)],
    pub models_path: &'static str,
    pub model_format: ModelListFormat,
}

impl ProviderPreset {
    fn to_config(&self) -> ProviderConfig {
        ProviderConfig {
            name: self.name.to_string(),
            base_url: self.url.to_string(),
            credential: Credential::default(),
            auth: self.auth.clone(),
            extra_headers: self
                .extra_headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            models_path: self.models_path.to_string(),
            model_format: self.model_format,
            models: Vec::new(),
            enabled: true,
        }
    }
}

fn bearer(name: &'static str, url: &'static str) -> ProviderPreset {
    ProviderPreset {
        name,
        url,
        auth: AuthMode::Bearer,
        extra_headers: &[],
        models_path: "/models",
        model_format: ModelListFormat::OpenAi,
    }
}

pub static PRESETS: Lazy<Vec<ProviderPreset>> = Lazy::new(|| {
    vec![
        bearer("OpenAI", "https://api.openai.com/v1"),
        ProviderPreset {
            name: "Anthropic",
            url: "https://api.anthropic.com/v1",
            auth: AuthMode::Header {
                name: "x-api-key".to_string(),
            },
            extra_headers: &[("anthropic-version", "2023-06-01")],
            models_path: "/models",
            model_format: ModelListFormat::OpenAi,
        },
        ProviderPreset {
            name: "Google-Gemini",
            url: "https://generativelanguage.googleapis.com/v1beta",
            auth: AuthMode::Query {
                param: "key".to_string(),
            },
            extra_headers: &[],
            models_path: "/models",
            model_format: ModelListFormat::Gemini,
        },
        bearer("Deepseek", "https://api.deepseek.com"),
        bearer("Mistral", "https://api.mistral.ai/v1"),
        bearer("Groq", "https://api.groq.com/openai/v1"),
        bearer("xAI", "https://api.x.ai/v1"),
        bearer("OpenRouter", "https://openrouter.ai/api/v1"),
        bearer("Together AI", "https://api.together.xyz/v1"),
        bearer("Ollama", "http://localhost:11434/v1"),
    ]
});

/// Preset registered under `name`
pub fn preset(name: &str) -> Option<&'static ProviderPreset> {
    PRESETS.iter().find(|p| p.name == name)
}
