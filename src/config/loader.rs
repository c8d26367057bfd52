//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::runtime::ProxyConfig;
use crate::config::schema::ConfigFile;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a TOML config file without validating it, so flags can be merged
/// on top first.
pub fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Validate a merged config file into the runtime configuration.
pub fn build_config(file: &ConfigFile) -> Result<ProxyConfig, ConfigError> {
    validate_config(file).map_err(ConfigError::Validation)
}

/// Load and validate configuration from a TOML file.
#[cfg(test)]
fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    build_config(&read_config_file(path)?)
}
