//! Error types for the query coordinator session layer

use thiserror::Error;

/// Session error types
///
/// Registry and node operations never fail; these cover configuration
/// loading and the background liveness monitor.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, Error>;
