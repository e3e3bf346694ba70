//! Provider lookup for one tenant

use super::provider::{Provider, ProviderConfig};
use super::settings::{PluginSettings, ProviderSettings};
use crate::egress::target::matches_prefix;

/// Providers configured for a tenant, built from its settings snapshot
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    /// Build from a settings document
    ///
    /// Custom provider definitions take precedence over a preset of the same
    /// name.
    pub fn from_settings(settings: &PluginSettings) -> Self {
        let mut providers = Vec::new();
        for (name, entry) in &settings.providers {
            if settings.custom_providers.contains_key(name) {
                continue;
            }
            providers.push(provider_from(name, entry));
        }
        for (name, entry) in &settings.custom_providers {
            providers.push(provider_from(name, entry));
        }
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Provider whose base URL is a prefix of `target`
    ///
    /// Disabled and URL-less providers never match; the longest base URL
    /// wins when several do.
    pub fn resolve(&self, target: &str) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .filter(|p| p.enabled && !p.base_url.is_empty())
            .filter(|p| matches_prefix(target, p.base_url()))
            .max_by_key(|p| p.base_url.len())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Turn a stored entry into a provider, applying declared overrides
pub fn provider_from(name: &str, entry: &ProviderSettings) -> ProviderConfig {
    let mut config = ProviderConfig::for_name(name, &entry.url, entry.key.clone());
    // An entry with an explicit empty URL has no endpoint, preset or not
    config.base_url = entry.url.clone();
    config.enabled = entry.enable;
    config.models = entry.models.clone();
    if let Some(auth) = &entry.auth {
        config.auth = auth.clone();
    }
    if let Some(format) = entry.model_list_format {
        config.model_format = format;
    }
    if let Some(path) = &entry.models_path {
        config.models_path = path.clone();
    }
    for (k, v) in &entry.headers {
        config.extra_headers.insert(k.clone(), v.clone());
    }
    config
}
