//! Response body rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream body bytes
//!     → codec.rs (decode per Content-Encoding)
//!     → content.rs (literal replacements)
//!     → host.rs (absolute URL rewriting, matcher.rs finds candidates)
//!     → content.rs (HTML integrity / CSP stripping)
//!     → codec.rs (re-encode with the same codec)
//! ```
//!
//! # Design Decisions
//! - Regex scanning over raw bytes, no document parsing
//! - Only absolute or protocol-relative references are touched
//! - Compiled patterns are built once at startup and shared read-only
//! - Eligibility is decided by mime.rs from the response Content-Type

pub mod codec;
pub mod content;
pub mod host;
pub mod matcher;
pub mod mime;

pub use codec::{Codec, CodecError};
pub use content::ContentRewriter;
pub use host::{HostRewriter, FORWARD_URL_PARAM};
pub use matcher::UrlMatcher;
pub use mime::ExtensionSet;
