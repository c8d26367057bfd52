//! Security-related request/response handling.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → headers.rs (strip hop-by-hop, append X-Forwarded-For)
//!     → upstream
//! upstream response
//!     → headers.rs (strip hop-by-hop)
//!     → response transformer
//! ```

pub mod headers;
