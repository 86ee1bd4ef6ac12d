//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A configuration source could not be read or deserialized
    #[error("Configuration load error: {0}")]
    Load(String),

    /// A value was read but is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<config::ConfigError> for SettingsError {
    fn from(err: config::ConfigError) -> Self {
        SettingsError::Load(err.to_string())
    }
}
