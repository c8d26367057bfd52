//! Configuration validation.
//!
//! # Responsibilities
//! - Parse the upstream target and reject non-HTTP schemes
//! - Parse `key=value` header and replacement pairs
//! - Resolve and check the overwrite folder
//! - Check the TLS file pair is complete
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a function: ConfigFile → Result<ProxyConfig, Vec<ValidationError>>
//! - Runs before the listener is bound; any error is fatal at startup

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::runtime::{authority, HeaderList, ProxyConfig, ReplacementRule};
use crate::config::schema::ConfigFile;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("proxy target is required")]
    MissingTarget,

    #[error("invalid proxy target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid {kind} pair {pair:?}: {reason}")]
    InvalidPair {
        kind: &'static str,
        pair: String,
        reason: String,
    },

    #[error("overwrite folder {path:?} {reason}")]
    InvalidOverwriteFolder { path: String, reason: String },

    #[error("invalid TLS configuration: {0}")]
    InvalidTls(String),

    #[error("invalid listen address {0:?}")]
    InvalidListenAddress(String),
}

/// Validate a config file and build the runtime configuration.
pub fn validate_config(file: &ConfigFile) -> Result<ProxyConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let target = match parse_target(&file.upstream.target) {
        Ok(target) => Some(target),
        Err(e) => {
            errors.push(e);
            None
        }
    };

    let request_headers = parse_headers("request header", &file.headers.request, &mut errors);
    let response_headers = parse_headers("response header", &file.headers.response, &mut errors);

    let mut replacements = Vec::new();
    for pair in &file.rewrite.replace_content {
        match pair.split_once('=') {
            Some((needle, _)) if needle.is_empty() => errors.push(ValidationError::InvalidPair {
                kind: "replace-content",
                pair: pair.clone(),
                reason: "the text to replace is empty".into(),
            }),
            Some((needle, value)) => replacements.push(ReplacementRule {
                needle: needle.to_string(),
                value: value.to_string(),
            }),
            None => errors.push(ValidationError::InvalidPair {
                kind: "replace-content",
                pair: pair.clone(),
                reason: "expected `text=replacement`".into(),
            }),
        }
    }

    let overwrite_folder = match file.overwrite_folder.as_deref() {
        None | Some("") => None,
        Some(folder) => match resolve_overwrite_folder(folder) {
            Ok(path) => Some(path),
            Err(e) => {
                errors.push(e);
                None
            }
        },
    };

    if let Some(tls) = &file.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::InvalidTls(
                "both a certificate and a key file are required".into(),
            ));
        }
    }

    let bind = file.listener.bind_address();
    if bind.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidListenAddress(bind));
    }

    let external_ignores = file
        .upstream
        .proxy_external_ignores
        .iter()
        .map(|host| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .collect();

    match target {
        Some(target) if errors.is_empty() => {
            let request_timeout = match file.timeouts.request_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };

            Ok(ProxyConfig {
                target,
                use_tls: file.listener.tls.is_some(),
                request_headers,
                response_headers,
                cors: file.headers.cors,
                no_cache: file.headers.no_cache,
                proxy_external: file.upstream.proxy_external,
                external_ignores,
                replacements,
                overwrite_folder,
                connect_timeout: Duration::from_secs(file.timeouts.connect_secs),
                request_timeout,
            })
        }
        _ => Err(errors),
    }
}

/// Parse the upstream target down to `scheme://authority`.
fn parse_target(raw: &str) -> Result<Url, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::MissingTarget);
    }

    let invalid = |reason: String| ValidationError::InvalidTarget {
        target: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }

    Url::parse(&format!("{}://{}", url.scheme(), authority(&url))).map_err(|e| invalid(e.to_string()))
}

fn parse_headers(kind: &'static str, pairs: &[String], errors: &mut Vec<ValidationError>) -> HeaderList {
    let mut headers = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let invalid = |reason: &str| ValidationError::InvalidPair {
            kind,
            pair: pair.clone(),
            reason: reason.to_string(),
        };

        let Some((name, value)) = pair.split_once('=') else {
            errors.push(invalid("expected `key=value`"));
            continue;
        };
        let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) else {
            errors.push(invalid("invalid header name"));
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            errors.push(invalid("invalid header value"));
            continue;
        };
        headers.push((name, value));
    }
    headers
}

fn resolve_overwrite_folder(folder: &str) -> Result<PathBuf, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidOverwriteFolder {
        path: folder.to_string(),
        reason: reason.to_string(),
    };

    let path = Path::new(folder);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|_| invalid("cannot be resolved against the working directory"))?
            .join(path)
    };

    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => Ok(path),
        Ok(_) => Err(invalid("must be a folder")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(invalid("not found")),
        Err(e) => Err(invalid(&e.to_string())),
    }
}
