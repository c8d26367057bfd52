//! Response handling and transformation.
//!
//! # Responsibilities
//! - Rewrite upstream response headers in a fixed order
//! - Point redirects and cookies back at the proxy
//! - Decode, rewrite and re-encode text bodies
//! - Stream every other body through unchanged
//!
//! # Design Decisions
//! - Header steps run before the body is touched
//! - Body rewriting runs on the blocking pool
//! - Hop-by-hop headers stripped before the pipeline

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::director::{OverrideMode, RequestContext};
use crate::observability::metrics;
use crate::rewrite::{Codec, CodecError, ContentRewriter, ExtensionSet, HostRewriter, UrlMatcher};
use crate::security::headers::strip_hop_by_hop;

/// Marks every response that went through the proxy.
pub static X_PROXY_CLIENT: HeaderName = HeaderName::from_static("x-proxy-client");

pub const PROXY_CLIENT_NAME: &str = "Forward-Cli";

static EXPECT_CT: HeaderName = HeaderName::from_static("expect-ct");

/// What the body step needs to know about one response.
#[derive(Debug, Clone)]
pub struct ResponseTransformState {
    /// Upstream the response came from.
    pub target: Url,
    pub codec: Codec,
    pub extensions: ExtensionSet,
    /// The body will be decoded and rewritten.
    pub eligible: bool,
}

impl ResponseTransformState {
    pub fn new(context: &RequestContext, method: &Method, status: StatusCode, headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let encoding = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());

        let extensions = ExtensionSet::from_content_type(content_type);
        let codec = Codec::from_header(encoding);
        let has_body = *method != Method::HEAD
            && status != StatusCode::NO_CONTENT
            && status != StatusCode::NOT_MODIFIED;
        let eligible = has_body && extensions.is_rewritable() && codec.is_rewritable();

        Self {
            target: context.target.clone(),
            codec,
            extensions,
            eligible,
        }
    }
}

/// Applies the response pipeline. Cheap to clone, shared by all requests.
#[derive(Debug, Clone)]
pub struct ResponseTransformer {
    config: Arc<ProxyConfig>,
    matcher: Arc<UrlMatcher>,
    content: Arc<ContentRewriter>,
}

impl ResponseTransformer {
    pub fn new(config: Arc<ProxyConfig>, matcher: Arc<UrlMatcher>) -> Self {
        let content = Arc::new(ContentRewriter::new(config.replacements.clone()));
        Self {
            config,
            matcher,
            content,
        }
    }

    /// Turn an upstream response into the response sent to the client.
    pub async fn transform(
        &self,
        context: &RequestContext,
        method: &Method,
        mut upstream: reqwest::Response,
    ) -> Result<Response, ProxyError> {
        let mut status = upstream.status();
        let mut headers = std::mem::take(upstream.headers_mut());

        strip_hop_by_hop(&mut headers);
        let state = ResponseTransformState::new(context, method, status, &headers);
        self.transform_head(context, &mut status, &mut headers)?;

        let body = if state.eligible {
            let url = upstream.url().to_string();
            let raw = upstream
                .bytes()
                .await
                .map_err(|source| ProxyError::Upstream { url, source })?;
            let rewritten = self.rewrite_body(&state, context, raw).await?;
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
            Body::from(rewritten)
        } else {
            Body::from_stream(upstream.bytes_stream())
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Header steps of the pipeline, in order.
    pub fn transform_head(
        &self,
        context: &RequestContext,
        status: &mut StatusCode,
        headers: &mut HeaderMap,
    ) -> Result<(), ProxyError> {
        let config = &self.config;

        headers.insert(X_PROXY_CLIENT.clone(), HeaderValue::from_static(PROXY_CLIENT_NAME));
        headers.remove(&EXPECT_CT);

        if config.no_cache {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        }

        headers.remove(header::CONTENT_SECURITY_POLICY);

        if !config.use_tls {
            headers.remove(header::STRICT_TRANSPORT_SECURITY);
        }

        if *status == StatusCode::MOVED_PERMANENTLY {
            *status = StatusCode::FOUND;
        }

        rewrite_cookies(headers, host_name(&context.origin_host), config.use_tls)?;

        let upstream_host = context.upstream_host();
        let hosts = host_rewriter(config, &self.matcher, &upstream_host, &context.origin_host);
        rewrite_location(headers, context, &hosts)?;

        if config.cors {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        for (name, value) in &config.response_headers {
            headers.append(name.clone(), value.clone());
        }

        Ok(())
    }

    async fn rewrite_body(
        &self,
        state: &ResponseTransformState,
        context: &RequestContext,
        raw: Bytes,
    ) -> Result<Vec<u8>, ProxyError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let job = BodyRewrite {
            config: Arc::clone(&self.config),
            matcher: Arc::clone(&self.matcher),
            content: Arc::clone(&self.content),
            upstream_host: context.upstream_host(),
            proxy_host: context.origin_host.clone(),
            codec: state.codec.clone(),
            html: state.extensions.is_html(),
        };

        let codec = state.codec.name();
        let rewritten = tokio::task::spawn_blocking(move || job.run(&raw)).await??;

        metrics::record_rewrite(codec);
        tracing::debug!(
            codec,
            upstream = %state.target,
            bytes = rewritten.len(),
            "Rewrote response body"
        );
        Ok(rewritten)
    }
}

/// Owned inputs of a body rewrite, movable to the blocking pool.
struct BodyRewrite {
    config: Arc<ProxyConfig>,
    matcher: Arc<UrlMatcher>,
    content: Arc<ContentRewriter>,
    upstream_host: String,
    proxy_host: String,
    codec: Codec,
    html: bool,
}

impl BodyRewrite {
    fn run(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        let hosts = host_rewriter(&self.config, &self.matcher, &self.upstream_host, &self.proxy_host);
        let decoded = self.codec.decode(raw)?;
        let rewritten = self.content.rewrite(&decoded, &hosts, self.html);
        self.codec.encode(&rewritten)
    }
}

/// Host rewriter for one response, with the configured external settings.
pub fn host_rewriter<'a>(
    config: &'a ProxyConfig,
    matcher: &'a UrlMatcher,
    upstream_host: &'a str,
    proxy_host: &'a str,
) -> HostRewriter<'a> {
    HostRewriter::new(matcher, upstream_host, proxy_host, config.proxy_scheme())
        .with_external(config.proxy_external, &config.external_ignores)
}

fn rewrite_cookies(headers: &mut HeaderMap, domain: &str, use_tls: bool) -> Result<(), ProxyError> {
    let cookies: Vec<String> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|raw| rewrite_set_cookie(raw, domain, use_tls))
        .collect();

    if cookies.is_empty() {
        return Ok(());
    }

    headers.remove(header::SET_COOKIE);
    for cookie in cookies {
        headers.append(header::SET_COOKIE, header_value("set-cookie", &cookie)?);
    }
    Ok(())
}

/// Point a `Set-Cookie` value at `domain`, dropping `Secure` without TLS.
/// Other attributes keep their order.
pub fn rewrite_set_cookie(raw: &str, domain: &str, keep_secure: bool) -> String {
    let mut parts = raw.split(';').map(str::trim);
    let mut out: Vec<String> = Vec::new();
    if let Some(pair) = parts.next() {
        out.push(pair.to_string());
    }

    let mut has_domain = false;
    for attr in parts.filter(|a| !a.is_empty()) {
        let key = attr.split('=').next().unwrap_or_default().trim();
        if key.eq_ignore_ascii_case("domain") {
            if !has_domain && !domain.is_empty() {
                out.push(format!("Domain={domain}"));
            }
            has_domain = true;
        } else if key.eq_ignore_ascii_case("secure") && !keep_secure {
            continue;
        } else {
            out.push(attr.to_string());
        }
    }

    if !has_domain && !domain.is_empty() {
        out.push(format!("Domain={domain}"));
    }
    out.join("; ")
}

fn rewrite_location(
    headers: &mut HeaderMap,
    context: &RequestContext,
    hosts: &HostRewriter<'_>,
) -> Result<(), ProxyError> {
    let location = match headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => return Ok(()),
    };

    let rewritten = if is_http_url(&location) {
        Some(hosts.rewrite_str(&location))
    } else if context.mode == OverrideMode::QueryTunnel {
        context.target.join(&location).ok().map(String::from)
    } else {
        None
    };

    if let Some(value) = rewritten {
        headers.insert(header::LOCATION, header_value("location", &value)?);
    }
    Ok(())
}

fn is_http_url(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `Host` value without its port. IPv6 brackets are removed.
pub fn host_name(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value).map_err(|_| ProxyError::InvalidHeader {
        name,
        value: value.to_string(),
    })
}
