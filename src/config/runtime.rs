//! Validated, immutable proxy configuration shared by every request.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

/// Ordered header multimap. Duplicate names are kept and applied additively.
pub type HeaderList = Vec<(HeaderName, HeaderValue)>;

/// A literal `needle → value` body replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRule {
    pub needle: String,
    pub value: String,
}

/// Core configuration, built once at startup and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream origin (scheme and authority only).
    pub target: Url,

    /// The listener terminates TLS.
    pub use_tls: bool,

    /// Headers appended to every upstream request.
    pub request_headers: HeaderList,

    /// Headers appended to every response.
    pub response_headers: HeaderList,

    pub cors: bool,
    pub no_cache: bool,

    /// Tunnel references to other hosts through `forward_url`.
    pub proxy_external: bool,

    /// Hosts left alone even when tunneling is on.
    pub external_ignores: Vec<String>,

    /// Literal replacements, applied in order.
    pub replacements: Vec<ReplacementRule>,

    /// Files here are served instead of proxying `GET` requests.
    pub overwrite_folder: Option<PathBuf>,

    pub connect_timeout: Duration,

    /// Whole-exchange timeout, if any.
    pub request_timeout: Option<Duration>,
}

impl ProxyConfig {
    /// Configuration with every optional behavior at its default.
    pub fn new(target: Url) -> Self {
        Self {
            target,
            use_tls: false,
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            cors: false,
            no_cache: true,
            proxy_external: false,
            external_ignores: Vec::new(),
            replacements: Vec::new(),
            overwrite_folder: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }

    /// Scheme clients use to reach this proxy.
    pub fn proxy_scheme(&self) -> &'static str {
        if self.use_tls {
            "https"
        } else {
            "http"
        }
    }
}

/// `host[:port]` of a URL. The port is omitted when it is the scheme default.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
