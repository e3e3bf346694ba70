//! Egress policy guard
//!
//! Decides whether a target URL may be contacted at all before any socket is
//! opened: allow-list, default posture, trusted-source exemption, private
//! address blocking and forward-proxy selection.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use super::address::{classify, AddressClass};
use super::context::ExchangeContext;
use super::error::EgressError;
use super::target::matches_prefix;
use crate::store::ConfigSnapshot;

/// Credentials presented to the forward proxy
#[derive(Clone, Default, Deserialize, PartialEq, Eq, Hash)]
pub struct ProxyUser {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for ProxyUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyUser")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Outbound request policy for one tenant
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRequestPolicy {
    /// Default posture for targets outside the allow-list
    pub allow: bool,
    /// Reject targets resolving to private, loopback, link-local or metadata ranges
    pub block_private_ip: bool,
    pub proxy_url: Option<String>,
    pub proxy_user: Option<ProxyUser>,
    pub proxy_headers: BTreeMap<String, String>,
    /// URL prefixes that are always permitted, directly, without address checks
    pub allow_list: Vec<String>,
    /// Trusted (signed) targets skip the `allow` check
    pub jwt_token_exempt: bool,
}

impl Default for ExternalRequestPolicy {
    fn default() -> Self {
        Self {
            allow: true,
            block_private_ip: true,
            proxy_url: None,
            proxy_user: None,
            proxy_headers: BTreeMap::new(),
            allow_list: Vec::new(),
            jwt_token_exempt: true,
        }
    }
}

impl ExternalRequestPolicy {
    /// Read the policy of `tenant` from a configuration snapshot
    pub fn from_snapshot(snapshot: &ConfigSnapshot, tenant: &str) -> Self {
        let defaults = Self::default();
        Self {
            allow: snapshot.get_cfg(tenant, "externalRequest.action.allow", defaults.allow),
            block_private_ip: snapshot.get_cfg(
                tenant,
                "externalRequest.action.blockPrivateIP",
                defaults.block_private_ip,
            ),
            proxy_url: snapshot
                .get_cfg::<Option<String>>(tenant, "externalRequest.action.proxyUrl", None)
                .filter(|url| !url.is_empty()),
            proxy_user: snapshot
                .get_cfg::<Option<ProxyUser>>(tenant, "externalRequest.action.proxyUser", None)
                .filter(|user| !user.username.is_empty()),
            proxy_headers: snapshot.get_cfg(
                tenant,
                "externalRequest.action.proxyHeaders",
                BTreeMap::new(),
            ),
            allow_list: snapshot
                .get_cfg::<Vec<String>>(tenant, "externalRequest.directIfIn.allowList", Vec::new())
                .into_iter()
                .map(normalize_prefix)
                .collect(),
            jwt_token_exempt: snapshot.get_cfg(
                tenant,
                "externalRequest.directIfIn.jwtToken",
                defaults.jwt_token_exempt,
            ),
        }
    }

    fn proxy_route(&self) -> Option<ProxyRoute> {
        self.proxy_url.as_ref().map(|url| ProxyRoute {
            url: url.clone(),
            user: self.proxy_user.clone(),
            headers: self.proxy_headers.clone(),
        })
    }
}

/// Bring an allow-list entry into the form `Url::as_str` produces
///
/// Scheme and host are lowercased and default ports dropped, so prefixes
/// compare against normalized targets. Entries that do not parse as URLs are
/// kept verbatim.
fn normalize_prefix(entry: String) -> String {
    match Url::parse(&entry) {
        Ok(url) => url.to_string(),
        Err(_) => entry,
    }
}

/// Forward proxy an allowed request must be routed through
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRoute {
    pub url: String,
    pub user: Option<ProxyUser>,
    pub headers: BTreeMap<String, String>,
}

/// A positive authorization decision
#[derive(Debug, Clone, PartialEq)]
pub struct EgressGrant {
    pub via_proxy: Option<ProxyRoute>,
    pub allow_listed: bool,
}

/// Why a target was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    ExternalRequestDisabled,
    UnsupportedScheme(String),
    MissingHost,
    PrivateAddress { host: String, class: AddressClass },
    Unresolvable { host: String },
}

impl DenyReason {
    /// Label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            DenyReason::ExternalRequestDisabled => "disabled",
            DenyReason::UnsupportedScheme(_) => "scheme",
            DenyReason::MissingHost => "host",
            DenyReason::PrivateAddress { .. } => "private_ip",
            DenyReason::Unresolvable { .. } => "dns",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::ExternalRequestDisabled => f.write_str("blocked: external request disabled"),
            DenyReason::UnsupportedScheme(scheme) => {
                write!(f, "blocked: unsupported scheme '{}'", scheme)
            }
            DenyReason::MissingHost => f.write_str("blocked: target has no host"),
            DenyReason::PrivateAddress { host, class } => {
                write!(f, "blocked: {} resolves to a {} address", host, class)
            }
            DenyReason::Unresolvable { host } => write!(f, "blocked: cannot resolve {}", host),
        }
    }
}

/// Name resolution used by the private-address check
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Gate run before every attempt, including every redirect hop
#[derive(Clone)]
pub struct EgressPolicyGuard {
    resolver: Arc<dyn HostResolver>,
}

impl EgressPolicyGuard {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// Guard backed by the system resolver
    pub fn system() -> Self {
        Self::new(Arc::new(SystemResolver))
    }

    /// Authorize one target URL
    ///
    /// Allow-listed prefixes win outright and go direct. Otherwise the default
    /// posture applies unless the target is trusted and trusted targets are
    /// exempt. Private-address blocking applies to everything not allow-listed.
    pub async fn authorize(
        &self,
        ctx: &ExchangeContext,
        policy: &ExternalRequestPolicy,
        url: &Url,
        is_trusted_source: bool,
    ) -> Result<EgressGrant, EgressError> {
        match self.evaluate(policy, url, is_trusted_source).await {
            Ok(grant) => {
                ctx.log_allowed(url, grant.via_proxy.is_some(), grant.allow_listed);
                Ok(grant)
            }
            Err(reason) => {
                ctx.log_denied(url, &reason.to_string());
                metrics::counter!("egress_denied_total", "reason" => reason.label()).increment(1);
                Err(EgressError::PolicyDenied(reason))
            }
        }
    }

    async fn evaluate(
        &self,
        policy: &ExternalRequestPolicy,
        url: &Url,
        is_trusted_source: bool,
    ) -> Result<EgressGrant, DenyReason> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(DenyReason::UnsupportedScheme(scheme.to_string()));
        }

        let target = url.as_str();
        if policy
            .allow_list
            .iter()
            .any(|prefix| matches_prefix(target, prefix))
        {
            return Ok(EgressGrant {
                via_proxy: None,
                allow_listed: true,
            });
        }

        let exempt = is_trusted_source && policy.jwt_token_exempt;
        if !exempt && !policy.allow {
            return Err(DenyReason::ExternalRequestDisabled);
        }

        if policy.block_private_ip {
            self.check_addresses(url).await?;
        }

        Ok(EgressGrant {
            via_proxy: policy.proxy_route(),
            allow_listed: false,
        })
    }

    async fn check_addresses(&self, url: &Url) -> Result<(), DenyReason> {
        let host = url.host_str().ok_or(DenyReason::MissingHost)?;
        let bare = host.trim_start_matches('[').trim_end_matches(']');

        let addrs = match bare.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => {
                let port = url.port_or_known_default().unwrap_or(80);
                match self.resolver.resolve(bare, port).await {
                    Ok(addrs) if !addrs.is_empty() => addrs,
                    _ => {
                        return Err(DenyReason::Unresolvable {
                            host: host.to_string(),
                        })
                    }
                }
            }
        };

        for addr in addrs {
            if let Some(class) = classify(addr) {
                return Err(DenyReason::PrivateAddress {
                    host: host.to_string(),
                    class,
                });
            }
        }
        Ok(())
    }
}

impl Default for EgressPolicyGuard {
    fn default() -> Self {
        Self::system()
    }
}
