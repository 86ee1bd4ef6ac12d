//! Error types for the HTTP index client.

use thiserror::Error;

/// Errors raised while setting up the HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Service settings are missing or malformed
    #[error("Client configuration error: {0}")]
    Config(String),

    /// The underlying HTTP client could not be built
    #[error("HTTP client build error: {0}")]
    Build(String),
}
