//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration structure. Every field has a
//! default so a file only needs the settings it changes; command-line flags
//! are merged on top before validation.

use serde::{Deserialize, Serialize};

/// Root configuration as read from a TOML file or assembled from flags.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Upstream target and external host handling.
    pub upstream: UpstreamConfig,

    /// Extra headers and header-level switches.
    pub headers: HeaderConfig,

    /// Body rewriting settings.
    pub rewrite: RewriteConfig,

    /// Folder whose files are served instead of proxying `GET` requests.
    pub overwrite_folder: Option<String>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address to bind (e.g., "0.0.0.0").
    pub address: String,

    /// Port to bind. Defaults to 80, or 443 when TLS is configured.
    pub port: Option<u16>,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: None,
            tls: None,
        }
    }
}

impl ListenerConfig {
    /// `address:port` with the port defaulted from the TLS setting.
    pub fn bind_address(&self) -> String {
        let port = self
            .port
            .unwrap_or(if self.tls.is_some() { 443 } else { 80 });
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, port)
        } else {
            format!("{}:{}", self.address, port)
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream target settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream origin, e.g. "https://example.com". Path is ignored.
    pub target: String,

    /// Tunnel links to other hosts through `forward_url`.
    pub proxy_external: bool,

    /// Hosts never tunneled even when `proxy_external` is on.
    pub proxy_external_ignores: Vec<String>,
}

/// Extra headers and header switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// `key=value` pairs appended to every upstream request.
    pub request: Vec<String>,

    /// `key=value` pairs appended to every response.
    pub response: Vec<String>,

    /// Add permissive CORS headers to responses.
    pub cors: bool,

    /// Force `Cache-Control: no-cache` on responses.
    pub no_cache: bool,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            request: Vec::new(),
            response: Vec::new(),
            cors: false,
            no_cache: true,
        }
    }
}

/// Body rewriting settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RewriteConfig {
    /// `needle=value` literal replacements, applied in order.
    pub replace_content: Vec<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Whole-exchange timeout in seconds. 0 disables it.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus endpoint bind address. Metrics are off when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
