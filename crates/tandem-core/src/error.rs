//! Error types for the Tandem relay

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Identifier generation failed because the OS entropy source is unavailable
#[derive(Error, Debug, Clone)]
#[error("entropy source unavailable: {0}")]
pub struct IdError(pub String);

/// Errors surfaced by the transport adapter for a single connection.
///
/// None of these are fatal to the process; the connection task logs them and
/// the connection is torn down.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error(transparent)]
    Id(#[from] IdError),
}
