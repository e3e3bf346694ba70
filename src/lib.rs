//! Egress Gateway - guarded outbound HTTP and AI provider proxying
//!
//! This library provides the core functionality for the gateway server.
//! Every outbound call goes through the egress engine, which enforces the
//! tenant's egress policy, timeouts, redirect rules and size limits. The AI
//! gateway on top of it lets browser code reach configured providers without
//! ever seeing their credentials.

pub mod config;
pub mod egress;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod store;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::info;

pub use crate::config::Config;
pub use crate::egress::{EgressPolicyGuard, HttpExchangeEngine};
pub use crate::gateway::ProviderProxyGateway;
pub use crate::session::{HmacSessionValidator, SessionValidator};
pub use crate::store::{ConfigSnapshot, ConfigStore, SharedConfigStore};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    /// Tenant-aware runtime configuration
    pub store: Arc<dyn ConfigStore>,
    /// Guarded outbound HTTP
    pub engine: Arc<HttpExchangeEngine>,
    pub gateway: ProviderProxyGateway,
    /// Verifies browser session tokens
    pub sessions: Arc<dyn SessionValidator>,
    pub start_time: Instant,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn ConfigStore> = match &config.config_file {
            Some(path) => {
                info!(path = %path.display(), "Loading runtime configuration");
                Arc::new(SharedConfigStore::load(path)?)
            }
            None => Arc::new(SharedConfigStore::new(ConfigSnapshot::default())),
        };

        let engine = Arc::new(HttpExchangeEngine::new(
            config.keep_alive,
            EgressPolicyGuard::system(),
        )?);

        let sessions: Arc<dyn SessionValidator> = Arc::new(HmacSessionValidator::new(
            config.session_secret.as_deref(),
        ));

        Ok(Self::from_parts(config, store, engine, sessions))
    }

    /// Assemble a state from prebuilt collaborators
    ///
    /// Tests use this to plug in a fixed snapshot, a stub resolver or a
    /// known session secret.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn ConfigStore>,
        engine: Arc<HttpExchangeEngine>,
        sessions: Arc<dyn SessionValidator>,
    ) -> Self {
        let gateway = ProviderProxyGateway::new(engine.clone(), store.clone());
        Self {
            config,
            store,
            engine,
            gateway,
            sessions,
            start_time: Instant::now(),
        }
    }
}
