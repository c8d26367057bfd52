//! Target resolution and outbound request rewriting.
//!
//! # Responsibilities
//! - Pick the upstream for one request: `forward_url` query parameter, then
//!   `X-Proxy-Target` header, then the configured target
//! - Build the outbound URL
//! - Rewrite Host/Origin/Referrer and bookkeeping headers
//! - Append configured extra request headers
//!
//! # Design Decisions
//! - Resolution happens once; the resulting `RequestContext` is reused for
//!   the matching response
//! - Malformed overrides never fail the request, they fall back to the default

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use url::Url;

use crate::config::{authority, ProxyConfig};
use crate::error::ProxyError;
use crate::rewrite::FORWARD_URL_PARAM;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

/// Per-request upstream override header.
pub static X_PROXY_TARGET: HeaderName = HeaderName::from_static("x-proxy-target");

/// Client-facing host captured before rewriting.
pub static X_ORIGIN_HOST: HeaderName = HeaderName::from_static("x-origin-host");

static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static REFERRER: HeaderName = HeaderName::from_static("referrer");

/// How the upstream for a request was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideMode {
    None,
    QueryTunnel,
    HeaderOverride,
}

impl OverrideMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideMode::None => "none",
            OverrideMode::QueryTunnel => "query_tunnel",
            OverrideMode::HeaderOverride => "header_override",
        }
    }
}

/// What the director decided for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Resolved upstream for this request.
    pub target: Url,
    /// Client-facing `Host` value, e.g. `localhost:8080`.
    pub origin_host: String,
    pub mode: OverrideMode,
}

impl RequestContext {
    /// Authority of the resolved upstream.
    pub fn upstream_host(&self) -> String {
        authority(&self.target)
    }
}

/// Outbound URL plus the context to carry to the response.
#[derive(Debug, Clone)]
pub struct Directed {
    pub url: Url,
    pub context: RequestContext,
}

/// Resolve the upstream for a request without touching it.
pub fn resolve_target(config: &ProxyConfig, uri: &Uri, headers: &HeaderMap) -> (Url, OverrideMode) {
    if let Some(raw) = forward_url_param(uri) {
        match parse_override(&raw, config.use_tls) {
            Some(target) => return (target, OverrideMode::QueryTunnel),
            None => tracing::debug!(forward_url = %raw, "Ignoring malformed forward_url"),
        }
    } else if let Some(raw) = headers.get(&X_PROXY_TARGET).and_then(|v| v.to_str().ok()) {
        match parse_override(raw, config.use_tls) {
            Some(target) => return (target, OverrideMode::HeaderOverride),
            None => tracing::debug!(target = %raw, "Ignoring malformed X-Proxy-Target"),
        }
    }

    (config.target.clone(), OverrideMode::None)
}

/// Rewrite the inbound request headers for the upstream and build the
/// outbound URL.
pub fn direct(
    config: &ProxyConfig,
    uri: &Uri,
    headers: &mut HeaderMap,
    remote: SocketAddr,
) -> Result<Directed, ProxyError> {
    let (target, mode) = resolve_target(config, uri, headers);

    let origin_host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_default();

    let url = match mode {
        OverrideMode::QueryTunnel => dial_url(target.clone()),
        OverrideMode::None | OverrideMode::HeaderOverride => {
            let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
            let raw = format!("{}://{}{}", target.scheme(), authority(&target), path_and_query);
            let url = Url::parse(&raw).map_err(|e| ProxyError::InvalidUrl {
                url: raw.clone(),
                reason: e.to_string(),
            })?;
            dial_url(url)
        }
    };

    strip_hop_by_hop(headers);
    append_forwarded_for(headers, remote.ip());

    let target_host = authority(&target);
    let target_origin = format!("{}://{}", target.scheme(), target_host);

    headers.insert(X_ORIGIN_HOST.clone(), header_value("x-origin-host", &origin_host)?);
    headers.insert(header::HOST, header_value("host", &target_host)?);
    headers.insert(header::ORIGIN, header_value("origin", &target_origin)?);
    headers.insert(REFERRER.clone(), header_value("referrer", &target_origin)?);
    headers.insert(X_REAL_IP.clone(), header_value("x-real-ip", &remote.ip().to_string())?);

    for (name, value) in &config.request_headers {
        headers.append(name.clone(), value.clone());
    }

    Ok(Directed {
        url,
        context: RequestContext {
            target,
            origin_host,
            mode,
        },
    })
}

/// The decoded `forward_url` query value, if present and non-empty.
fn forward_url_param(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == FORWARD_URL_PARAM && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Parse an override value, defaulting a missing scheme from the TLS flag.
fn parse_override(raw: &str, use_tls: bool) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let default_scheme = if use_tls { "https" } else { "http" };
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("{default_scheme}://{rest}")
    } else {
        format!("{default_scheme}://{raw}")
    };

    let url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        _ => return None,
    }
    url.host_str()?;
    Some(url)
}

/// WebSocket targets are dialed over plain HTTP(S).
fn dial_url(mut url: Url) -> Url {
    let scheme = match url.scheme() {
        "ws" => "http",
        "wss" => "https",
        _ => return url,
    };
    // Switching between special schemes cannot fail.
    let _ = url.set_scheme(scheme);
    url
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value).map_err(|_| ProxyError::InvalidHeader {
        name,
        value: value.to_string(),
    })
}
