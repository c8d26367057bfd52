//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, handler)
//!     → overwrite.rs (GET served from the local folder, if present)
//!     → director.rs (resolve target, rewrite request headers)
//!     → upstream (reqwest)
//!     → response.rs (header pipeline, body rewrite)
//!     → Send to client
//! ```

pub mod director;
pub mod overwrite;
pub mod response;
pub mod server;

pub use director::{OverrideMode, RequestContext, X_ORIGIN_HOST, X_PROXY_TARGET};
pub use response::{ResponseTransformState, ResponseTransformer, X_PROXY_CLIENT};
pub use server::{HttpServer, ServerError};
