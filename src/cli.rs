//! Command-line interface.
//!
//! Flags are merged on top of an optional TOML file: scalar flags override
//! file values, repeatable flags extend the file's lists.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::{ConfigFile, TlsConfig};

#[derive(Debug, Parser)]
#[command(name = "forward")]
#[command(version, about = "Quickly set up a rewriting reverse proxy in front of a site", long_about = None)]
#[command(after_help = "EXAMPLES:
  forward http://example.com
  forward --port=8080 http://example.com
  forward --cors --req-header=\"foo=bar\" --req-header=\"hello=world\" http://example.com
  forward --tls-cert-file=cert.pem --tls-key-file=key.pem http://example.com")]
pub struct Cli {
    /// Upstream to proxy, e.g. http://example.com
    #[arg(value_name = "TARGET")]
    pub target: Option<String>,

    /// Address the proxy listens on [default: 0.0.0.0]
    #[arg(long)]
    pub address: Option<String>,

    /// Port the proxy listens on [default: 80, or 443 with TLS]
    #[arg(long)]
    pub port: Option<u16>,

    /// Tunnel links to external hosts through the proxy
    #[arg(long)]
    pub proxy_external: bool,

    /// External host that is never tunneled (repeatable)
    #[arg(long = "proxy-external-ignore", value_name = "HOST")]
    pub proxy_external_ignores: Vec<String>,

    /// Header attached to upstream requests, as key=value (repeatable)
    #[arg(long = "req-header", value_name = "KEY=VALUE")]
    pub req_headers: Vec<String>,

    /// Header attached to responses, as key=value (repeatable)
    #[arg(long = "res-header", value_name = "KEY=VALUE")]
    pub res_headers: Vec<String>,

    /// Enable permissive CORS headers
    #[arg(long)]
    pub cors: bool,

    /// Serve GET requests from this folder when a matching file exists
    #[arg(long, value_name = "FOLDER")]
    pub overwrite: Option<String>,

    /// Force `Cache-Control: no-cache` on responses [default: true]
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub no_cache: Option<bool>,

    /// Certificate file (PEM) for TLS
    #[arg(long, value_name = "FILE")]
    pub tls_cert_file: Option<String>,

    /// Private key file (PEM) for TLS
    #[arg(long, value_name = "FILE")]
    pub tls_key_file: Option<String>,

    /// Literal body replacement, as needle=value (repeatable)
    #[arg(long = "replace-content", value_name = "NEEDLE=VALUE")]
    pub replace_content: Vec<String>,

    /// TOML config file; flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Serve Prometheus metrics on this address, e.g. 127.0.0.1:9090
    #[arg(long, value_name = "ADDR")]
    pub metrics_address: Option<String>,
}

impl Cli {
    /// Merge the flags into `file`.
    pub fn apply(self, mut file: ConfigFile) -> ConfigFile {
        if let Some(target) = self.target {
            file.upstream.target = target;
        }
        if let Some(address) = self.address {
            file.listener.address = address;
        }
        if self.port.is_some() {
            file.listener.port = self.port;
        }

        if self.tls_cert_file.is_some() || self.tls_key_file.is_some() {
            let current = file.listener.tls.take();
            let (cert, key) = match current {
                Some(tls) => (tls.cert_path, tls.key_path),
                None => (String::new(), String::new()),
            };
            file.listener.tls = Some(TlsConfig {
                cert_path: self.tls_cert_file.unwrap_or(cert),
                key_path: self.tls_key_file.unwrap_or(key),
            });
        }

        if self.proxy_external {
            file.upstream.proxy_external = true;
        }
        file.upstream.proxy_external_ignores.extend(self.proxy_external_ignores);

        file.headers.request.extend(self.req_headers);
        file.headers.response.extend(self.res_headers);
        if self.cors {
            file.headers.cors = true;
        }
        if let Some(no_cache) = self.no_cache {
            file.headers.no_cache = no_cache;
        }

        file.rewrite.replace_content.extend(self.replace_content);

        if self.overwrite.is_some() {
            file.overwrite_folder = self.overwrite;
        }
        if let Some(level) = self.log_level {
            file.observability.log_level = level;
        }
        if self.metrics_address.is_some() {
            file.observability.metrics_address = self.metrics_address;
        }

        file
    }
}
