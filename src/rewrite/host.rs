//! Host and URL rewriting.
//!
//! Every absolute URL found in rewritten content is pointed back through the
//! proxy. References to the upstream host are rewritten in place; references
//! to other hosts are either left alone or wrapped into a `forward_url`
//! tunnel link, depending on the external-proxy settings.
//!
//! Query values are percent-decoded and rewritten recursively, so a URL nested
//! inside another URL's query string is handled at every depth.

use std::borrow::Cow;
use std::fmt;

use memchr::memmem::Finder;

use crate::rewrite::matcher::UrlMatcher;

/// Query parameter carrying a tunneled absolute URL.
pub const FORWARD_URL_PARAM: &str = "forward_url";

/// Nesting ceiling for URLs inside query values.
pub const MAX_REWRITE_DEPTH: usize = 10;

/// Rewrites absolute references for one response.
#[derive(Debug, Clone)]
pub struct HostRewriter<'a> {
    matcher: &'a UrlMatcher,
    /// Authority of the upstream the response came from.
    upstream_host: &'a str,
    /// Client-facing authority of the proxy.
    proxy_host: &'a str,
    /// Scheme clients use to reach the proxy.
    proxy_scheme: &'static str,
    proxy_external: bool,
    external_ignores: &'a [String],
}

impl<'a> HostRewriter<'a> {
    pub fn new(
        matcher: &'a UrlMatcher,
        upstream_host: &'a str,
        proxy_host: &'a str,
        proxy_scheme: &'static str,
    ) -> Self {
        Self {
            matcher,
            upstream_host,
            proxy_host,
            proxy_scheme,
            proxy_external: false,
            external_ignores: &[],
        }
    }

    /// Tunnel external hosts through `forward_url`, except the ignored ones.
    pub fn with_external(mut self, enabled: bool, ignores: &'a [String]) -> Self {
        self.proxy_external = enabled;
        self.external_ignores = ignores;
        self
    }

    /// Rewrite every reference in `content`.
    pub fn rewrite<'c>(&self, content: &'c [u8]) -> Cow<'c, [u8]> {
        self.rewrite_at(content, 0)
    }

    /// Rewrite a single header-like value such as `Location`.
    pub fn rewrite_str(&self, value: &str) -> String {
        String::from_utf8_lossy(&self.rewrite(value.as_bytes())).into_owned()
    }

    fn rewrite_at<'c>(&self, content: &'c [u8], depth: usize) -> Cow<'c, [u8]> {
        let replaced = self
            .matcher
            .replace_all(content, |found| self.rewrite_match(found, depth));

        let needle = format!("//{}", self.upstream_host);
        let replacement = format!("//{}", self.proxy_host);
        replace_literal(replaced, needle.as_bytes(), replacement.as_bytes())
    }

    fn rewrite_match(&self, found: &[u8], depth: usize) -> Vec<u8> {
        let Ok(text) = std::str::from_utf8(found) else {
            return found.to_vec();
        };
        let Some(mut url) = MatchedUrl::parse(text) else {
            return found.to_vec();
        };

        let on_proxy = url.host.eq_ignore_ascii_case(self.proxy_host);
        if let Some(query) = url.query.take() {
            url.query = Some(self.rewrite_query(&query, depth, on_proxy));
        }

        // Already points at the proxy, possibly as a tunnel link.
        if on_proxy {
            return url.to_string().into_bytes();
        }

        if url.host.eq_ignore_ascii_case(self.upstream_host) {
            url.scheme = match url.scheme.to_ascii_lowercase().as_str() {
                "https" => "http".to_string(),
                "wss" => "ws".to_string(),
                _ => url.scheme,
            };
            url.host = self.proxy_host.to_string();
            return url.to_string().into_bytes();
        }

        if !self.tunnels(&url.host) {
            return url.to_string().into_bytes();
        }

        let scheme = url.scheme.to_ascii_lowercase();
        let tunnel_scheme = if scheme == "http" || scheme == "https" || text.starts_with("//") {
            self.proxy_scheme
        } else if scheme == "ws" || scheme == "wss" {
            "ws"
        } else {
            return found.to_vec();
        };

        format!(
            "{}://{}/?{}={}",
            tunnel_scheme,
            self.proxy_host,
            FORWARD_URL_PARAM,
            query_escape(&url.to_string())
        )
        .into_bytes()
    }

    /// Whether an external host gets wrapped into a tunnel link.
    fn tunnels(&self, host: &str) -> bool {
        self.proxy_external
            && !self
                .external_ignores
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(host))
    }

    /// Rebuild a raw query term by term, keeping order and the difference
    /// between `key` and `key=`.
    ///
    /// On a proxy URL the `forward_url` value is already a tunnel target and
    /// is kept as is.
    fn rewrite_query(&self, query: &str, depth: usize, on_proxy: bool) -> String {
        query
            .split('&')
            .map(|term| match term.split_once('=') {
                None => term.to_string(),
                Some((key, value)) if on_proxy && key == FORWARD_URL_PARAM => format!("{key}={value}"),
                Some((key, value)) => format!("{}={}", key, self.rewrite_value(value, depth)),
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn rewrite_value(&self, escaped: &str, depth: usize) -> String {
        if depth + 1 >= MAX_REWRITE_DEPTH {
            return escaped.to_string();
        }

        match query_unescape(escaped) {
            Some(decoded) => {
                let rewritten = self.rewrite_at(decoded.as_bytes(), depth + 1);
                // Keep the original escaping when nothing changed.
                if rewritten.as_ref() == decoded.as_bytes() {
                    escaped.to_string()
                } else {
                    query_escape(&String::from_utf8_lossy(&rewritten))
                }
            }
            None => {
                String::from_utf8_lossy(&self.rewrite_at(escaped.as_bytes(), depth + 1)).into_owned()
            }
        }
    }
}

/// An absolute URL split into its raw components.
///
/// Components keep their original bytes so an untouched URL is rebuilt
/// exactly as it was matched.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MatchedUrl<'t> {
    scheme: String,
    userinfo: Option<&'t str>,
    host: String,
    path: &'t str,
    query: Option<String>,
    fragment: Option<&'t str>,
}

impl<'t> MatchedUrl<'t> {
    fn parse(text: &'t str) -> Option<Self> {
        let (scheme, rest) = text.split_once("://")?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((before, fragment)) => (before, Some(fragment)),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((before, query)) => (before, Some(query)),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        let (userinfo, host) = match authority.rsplit_once('@') {
            Some((userinfo, host)) => (Some(userinfo), host),
            None => (None, authority),
        };

        if host.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_string(),
            userinfo,
            host: host.to_string(),
            path,
            query: query.map(str::to_string),
            fragment,
        })
    }
}

impl fmt::Display for MatchedUrl<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(userinfo) = self.userinfo {
            write!(f, "{userinfo}@")?;
        }
        write!(f, "{}{}", self.host, self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

/// Escape a value for use inside a query string. Spaces become `+`.
pub fn query_escape(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Strictly decode a query value. `None` if an escape is malformed or the
/// result is not UTF-8.
pub fn query_unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(Cow::into_owned)
}

/// Replace every occurrence of `needle`, borrowing when there is none.
pub(crate) fn replace_literal<'c>(haystack: Cow<'c, [u8]>, needle: &[u8], replacement: &[u8]) -> Cow<'c, [u8]> {
    if needle.is_empty() {
        return haystack;
    }

    let finder = Finder::new(needle);
    if finder.find(&haystack).is_none() {
        return haystack;
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for idx in finder.find_iter(&haystack) {
        out.extend_from_slice(&haystack[last..idx]);
        out.extend_from_slice(replacement);
        last = idx + needle.len();
    }
    out.extend_from_slice(&haystack[last..]);
    Cow::Owned(out)
}
