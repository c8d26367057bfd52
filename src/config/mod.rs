//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize into ConfigFile)
//!     → command-line flags merged on top (cli.rs)
//!     → validation.rs (semantic checks, pair parsing)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc with every request task
//! ```
//!
//! # Design Decisions
//! - Config is immutable once built; there is no reload
//! - All file fields have defaults to allow minimal configs
//! - Repeated entries (headers, ignores, replacements) keep order and duplicates

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod validation;

pub use loader::{build_config, read_config_file, ConfigError};
pub use runtime::{authority, HeaderList, ProxyConfig, ReplacementRule};
pub use schema::{ConfigFile, ListenerConfig, TlsConfig};
pub use validation::ValidationError;
