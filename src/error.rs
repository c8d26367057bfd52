//! Error types reported by the gateway while serving a request.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::rewrite::codec::CodecError;

/// Errors that fail a single proxied exchange.
///
/// Every variant is reported to the client as a `500` whose body carries the
/// error description. Client disconnects never reach this type: the handler
/// future is dropped instead.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Upstream connection, TLS or protocol failure.
    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body could not be decoded or re-encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The outbound URL could not be built.
    #[error("invalid upstream url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A header value produced by the rewrite pipeline is not valid.
    #[error("invalid header value for {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// Overwrite folder lookup failed for a reason other than a missing file.
    #[error("overwrite lookup for {path} failed: {source}")]
    Overwrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The blocking body rewrite task panicked or was cancelled.
    #[error("body rewrite task failed: {0}")]
    RewriteTask(#[from] tokio::task::JoinError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let message = report(&self);
        tracing::error!(error = %message, "Proxy request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{message}\n")).into_response()
    }
}

/// Render an error with its whole `source()` chain. Causes already spelled
/// out by an outer message are not repeated.
pub fn report(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
