//! AI provider proxy gateway
//!
//! Everything the browser-side AI plugin talks to: provider matching and
//! credential injection, the settings document, and model discovery.

pub mod headers;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod relay;
pub mod settings;

pub use provider::{AuthMode, Credential, ModelInfo, ModelListFormat, Provider, ProviderConfig};
pub use proxy::{CallerContext, ModelsRequest, ModelsResponse, ProviderProxyGateway, ProxyRequest};
pub use registry::ProviderRegistry;
pub use settings::{settings_for_interface, PluginSettings, ProviderSettings};
