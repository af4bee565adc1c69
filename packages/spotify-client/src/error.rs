//! Spotify client error types

use std::time::Duration;

use thiserror::Error;

/// Spotify Web API client errors
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Invalid input provided to API method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse Spotify response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Token missing, expired or lacking scope
    #[error("Spotify rejected the access token")]
    Unauthorized,

    /// Track or playlist does not exist or is private
    #[error("Not found on Spotify: {0}")]
    NotFound(String),

    /// Rate limited, with the server's `Retry-After` hint when present
    #[error("Rate limited by Spotify API")]
    RateLimited { retry_after: Option<Duration> },

    /// Spotify returned an unexpected status
    #[error("Spotify API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Request timeout
    #[error("Request to Spotify timed out")]
    Timeout,
}

impl SpotifyError {
    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            SpotifyError::Timeout | SpotifyError::RateLimited { .. } => true,
            SpotifyError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            SpotifyError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided wait before the next request
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SpotifyError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for Spotify operations
pub type SpotifyResult<T> = Result<T, SpotifyError>;
