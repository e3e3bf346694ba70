//! AI plugin settings document
//!
//! Stored per tenant under `aiSettings`. The browser reads a sanitized copy
//! and writes the whole document back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::provider::{AuthMode, Credential, ModelInfo, ModelListFormat};
use crate::store::ConfigSnapshot;

/// Configuration key holding the settings document
pub const SETTINGS_KEY: &str = "aiSettings";

/// Model assigned to an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionModel {
    pub provider: String,
    pub id: String,
}

/// One editor action (chat, summarize, translate, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub model: Option<ActionModel>,
    #[serde(default)]
    pub capabilities: Value,
    /// Fields the gateway does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Provider entry as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: Credential,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default = "enabled_by_default")]
    pub enable: bool,
    /// Custom providers only; presets take theirs from the built-in table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_list_format: Option<ModelListFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            key: Credential::default(),
            models: Vec::new(),
            enable: true,
            auth: None,
            model_list_format: None,
            models_path: None,
            headers: BTreeMap::new(),
        }
    }
}

/// The whole settings document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionSettings>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    #[serde(default)]
    pub custom_providers: BTreeMap<String, ProviderSettings>,
}

impl PluginSettings {
    /// Settings of `tenant`, empty when none are stored
    pub fn from_snapshot(snapshot: &ConfigSnapshot, tenant: &str) -> Self {
        snapshot.get_cfg(tenant, SETTINGS_KEY, Self::default())
    }

    /// Whether any action has a model assigned
    pub fn has_assigned_model(&self) -> bool {
        self.actions.values().any(|action| {
            action
                .model
                .as_ref()
                .is_some_and(|m| !m.provider.is_empty() && !m.id.is_empty())
        })
    }

    /// Stored entry for a provider name, custom providers included
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers
            .get(name)
            .or_else(|| self.custom_providers.get(name))
    }

    /// Merge a browser submission over the stored document
    ///
    /// The browser never sees keys, so an empty key means "unchanged" as long
    /// as the provider still points at the same URL. A changed URL with an
    /// empty key clears the key.
    pub fn with_submission(&self, mut submitted: PluginSettings) -> PluginSettings {
        for (name, entry) in submitted
            .providers
            .iter_mut()
            .chain(submitted.custom_providers.iter_mut())
        {
            if !entry.key.is_empty() {
                continue;
            }
            if let Some(stored) = self.provider(name) {
                if stored.url == entry.url {
                    entry.key = stored.key.clone();
                }
            }
        }
        submitted
    }
}

/// Copy of the settings fit for the browser
///
/// Every credential is cleared. With no model assigned to any action the
/// result is `None` so the interface shows its first-run state.
pub fn settings_for_interface(settings: &PluginSettings) -> Option<PluginSettings> {
    if !settings.has_assigned_model() {
        return None;
    }

    let mut sanitized = settings.clone();
    for entry in sanitized
        .providers
        .values_mut()
        .chain(sanitized.custom_providers.values_mut())
    {
        entry.key.clear();
    }
    Some(sanitized)
}
