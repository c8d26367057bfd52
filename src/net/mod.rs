//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (plain bind) or tls.rs (rustls via axum-server)
//!     → HTTP layer
//!     → connection.rs (per-request in-flight tracking)
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{InFlightGuard, InFlightTracker};
