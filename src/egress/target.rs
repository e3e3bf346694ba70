//! Target URL helpers shared by the policy guard and the provider registry

use reqwest::Url;

/// Boundary-aware prefix test
///
/// The prefix matches when the target equals it, when the prefix itself ends
/// with `/`, or when the next character of the target starts a path, query or
/// fragment. `https://api.example.com` therefore never matches
/// `https://api.example.com.attacker.net/`.
pub fn matches_prefix(target: &str, prefix: &str) -> bool {
    if prefix.is_empty() || !target.starts_with(prefix) {
        return false;
    }
    if target.len() == prefix.len() || prefix.ends_with('/') {
        return true;
    }
    matches!(target.as_bytes()[prefix.len()], b'/' | b'?' | b'#')
}

/// Render a URL for logs: scheme, host, port and path only
///
/// Userinfo and the query string are dropped because either may carry a
/// credential.
pub fn display_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Two URLs share an origin when scheme, host and effective port agree
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
