//! Process configuration
//!
//! Configuration is loaded from environment variables. Tenant-aware runtime
//! settings (policies, providers, timeouts) live in [`crate::store`].

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Default ceiling for inbound request bodies
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// JSON runtime configuration file, rewritten on every settings write
    pub config_file: Option<PathBuf>,

    /// HMAC secret used to verify browser session tokens
    pub session_secret: Option<String>,

    /// Keep idle upstream connections for reuse
    pub keep_alive: bool,

    /// Largest accepted inbound request body
    pub max_body_bytes: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("config_file", &self.config_file)
            .field("session_secret", &self.session_secret.as_ref().map(|_| "***"))
            .field("keep_alive", &self.keep_alive)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            config_file: None,
            session_secret: None,
            keep_alive: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("GATEWAY_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid GATEWAY_PORT")?,

            config_file: env::var("GATEWAY_CONFIG_FILE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),

            session_secret: env::var("GATEWAY_SESSION_SECRET")
                .ok()
                .filter(|v| !v.is_empty()),

            keep_alive: env::var("GATEWAY_KEEP_ALIVE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            max_body_bytes: env::var("GATEWAY_MAX_BODY_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_BODY_BYTES.to_string())
                .parse()
                .context("Invalid GATEWAY_MAX_BODY_BYTES")?,
        })
    }
}
