//! Errors raised while reading configuration from the environment

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required environment variable
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable could not be parsed
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Environment variable is not a usable http(s) URL
    #[error("invalid URL format for {0}: {1}")]
    InvalidUrl(String, String),

    /// Values parsed but do not make sense together
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
