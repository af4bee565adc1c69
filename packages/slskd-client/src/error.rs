//! Error types for the slskd client

use thiserror::Error;

/// Errors that can occur when talking to slskd
#[derive(Error, Debug)]
pub enum SlskdError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to serialize/deserialize JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// slskd rejected the API key
    #[error("slskd rejected the API key")]
    Unauthorized,

    /// slskd returned a non-success status
    #[error("slskd API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Requested search or transfer does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Request timed out
    #[error("request to slskd timed out")]
    Timeout,

    /// slskd is not reachable
    #[error("connection refused. Is slskd running at {0}?")]
    ConnectionRefused(String),

    /// Invalid input provided to a client method
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SlskdError {
    /// Check if this error is transient
    ///
    /// Server errors, timeouts and connection failures are retryable;
    /// authentication and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SlskdError::Timeout | SlskdError::ConnectionRefused(_) => true,
            SlskdError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || matches!(e.status(), Some(status) if status.is_server_error())
            }
            SlskdError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for slskd operations
pub type SlskdResult<T> = Result<T, SlskdError>;
