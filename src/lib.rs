//! forward-proxy: a single-upstream reverse proxy that rewrites what it
//! serves so the client never needs to know the real upstream host.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ net (listener / TLS)
//!                      → http::server (router, in-flight guard)
//!                      → http::overwrite (local file, GET only)
//!                      → http::director (target resolution, request headers)
//!                      → upstream (reqwest)
//!     Client Response
//!     ◀───────────── http::response (header pipeline)
//!                      ← rewrite (codec → content → host/url → codec)
//!
//!     Cross-cutting: config, cli, observability, lifecycle, security
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rewrite;
pub mod security;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
