//! Tenant-aware runtime configuration
//!
//! Runtime settings live in a JSON document with process defaults and
//! per-tenant overrides. Readers take an immutable [`ConfigSnapshot`]; writers
//! build a new snapshot and swap it in, so a call that grabbed a snapshot
//! sees one consistent version from start to finish.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::AppResult;

/// Immutable view of the runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    defaults: Value,
    #[serde(default)]
    tenants: HashMap<String, Value>,
}

impl ConfigSnapshot {
    /// Snapshot with only process defaults
    pub fn new(defaults: Value) -> Self {
        Self {
            defaults,
            tenants: HashMap::new(),
        }
    }

    /// Add or replace the override document of one tenant
    pub fn with_tenant(mut self, tenant: impl Into<String>, overrides: Value) -> Self {
        self.tenants.insert(tenant.into(), overrides);
        self
    }

    /// Find the value at a dotted path, tenant override first
    ///
    /// Fallback happens per leaf: a tenant overriding one key of an object
    /// still inherits the sibling keys from the defaults. `null` counts as
    /// absent.
    pub fn lookup(&self, tenant: &str, path: &str) -> Option<&Value> {
        self.tenants
            .get(tenant)
            .and_then(|root| walk(root, path))
            .or_else(|| walk(&self.defaults, path))
    }

    /// Typed lookup with a default
    ///
    /// A value of the wrong shape is logged and replaced by the default.
    pub fn get_cfg<T: DeserializeOwned>(&self, tenant: &str, path: &str, default: T) -> T {
        match self.lookup(tenant, path) {
            Some(value) => match T::deserialize(value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(tenant = %tenant, path = %path, error = %e, "Invalid configuration value, using default");
                    default
                }
            },
            None => default,
        }
    }

    /// Whether the tenant has its own override document
    pub fn has_tenant(&self, tenant: &str) -> bool {
        self.tenants.contains_key(tenant)
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    /// Copy of this snapshot with `partial` deep-merged into a tenant or the defaults
    pub fn merged(&self, tenant: Option<&str>, partial: Value) -> Self {
        let mut next = self.clone();
        let root = match tenant {
            Some(name) => next
                .tenants
                .entry(name.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            None => &mut next.defaults,
        };
        merge(root, partial);
        next
    }
}

fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, key| node.get(key))
        .filter(|value| !value.is_null())
}

/// Deep-merge `patch` into `target`
///
/// Objects merge key by key, a `null` member removes the key, anything else
/// replaces.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(&key);
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Patch that turns `current` into exactly `next` when merged
///
/// Keys present in `current` but missing from `next` become `null`.
pub fn replacement_patch(current: Option<&Value>, next: Value) -> Value {
    match (current, next) {
        (Some(Value::Object(current)), Value::Object(mut next)) => {
            for (key, old) in current {
                match next.remove(key) {
                    Some(value) => {
                        next.insert(key.clone(), replacement_patch(Some(old), value));
                    }
                    None => {
                        next.insert(key.clone(), Value::Null);
                    }
                }
            }
            Value::Object(next)
        }
        (_, next) => next,
    }
}

/// Accessor and mutator for the runtime configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current snapshot; never blocks on writers
    fn snapshot(&self) -> Arc<ConfigSnapshot>;

    /// Merge a partial document into a tenant (or the defaults when `None`)
    async fn save_config(&self, tenant: Option<&str>, partial: Value) -> AppResult<()>;
}

/// In-process store, optionally persisted to a JSON file
pub struct SharedConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
    path: Option<PathBuf>,
    writer: tokio::sync::Mutex<()>,
}

impl SharedConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            path: None,
            writer: tokio::sync::Mutex::new(()),
        }
    }

    /// Load from a file; a missing file starts an empty configuration
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let raw = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("Invalid runtime configuration in {}", path.display()))?
        } else {
            info!(path = %path.display(), "Runtime configuration file not found, starting empty");
            ConfigSnapshot::default()
        };

        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            path: Some(path),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    fn swap(&self, next: Arc<ConfigSnapshot>) {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
    }
}

#[async_trait]
impl ConfigStore for SharedConfigStore {
    fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn save_config(&self, tenant: Option<&str>, partial: Value) -> AppResult<()> {
        let _writer = self.writer.lock().await;

        let next = Arc::new(self.snapshot().merged(tenant, partial));

        if let Some(path) = &self.path {
            let document = serde_json::to_vec_pretty(next.as_ref())?;
            tokio::fs::write(path, document)
                .await
                .with_context(|| format!("Failed to persist {}", path.display()))?;
        }

        self.swap(next);
        debug!(tenant = ?tenant, "Runtime configuration updated");
        Ok(())
    }
}
