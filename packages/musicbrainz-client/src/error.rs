//! MusicBrainz client error types

use thiserror::Error;

/// MusicBrainz client errors
#[derive(Error, Debug)]
pub enum MusicBrainzError {
    /// Invalid input provided to API method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse MusicBrainz response: {0}")]
    Parse(#[from] serde_json::Error),

    /// MusicBrainz returned an unexpected status
    #[error("MusicBrainz API error {status}: {message}")]
    Api { status: u16, message: String },

    /// No recording with that MBID
    #[error("Recording not found: {0}")]
    NotFound(String),

    /// MusicBrainz answers 503 when the per-client rate limit is exceeded
    #[error("Rate limited by MusicBrainz")]
    RateLimited,

    /// Request timeout
    #[error("Request to MusicBrainz timed out")]
    Timeout,
}

impl MusicBrainzError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Does NOT retry on client errors or missing recordings.
    pub fn is_retryable(&self) -> bool {
        match self {
            MusicBrainzError::Timeout | MusicBrainzError::RateLimited => true,
            MusicBrainzError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            MusicBrainzError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the lookup definitively found nothing
    pub fn is_not_found(&self) -> bool {
        matches!(self, MusicBrainzError::NotFound(_))
    }
}

/// Result type for MusicBrainz operations
pub type MusicBrainzResult<T> = Result<T, MusicBrainzError>;
