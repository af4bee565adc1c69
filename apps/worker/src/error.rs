//! Error handling for the Soulbridge worker
//!
//! One error enum for the whole worker crate. Client errors convert into it
//! with `?`, and [`WorkerError::is_retryable`] decides how a handler failure
//! is reported to the pool.

use std::time::Duration;

use soulbridge_musicbrainz_client::MusicBrainzError;
use soulbridge_shared_config::ConfigError;
use soulbridge_slskd_client::SlskdError;
use soulbridge_spotify_client::SpotifyError;
use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Main worker error type
#[derive(Error, Debug)]
pub enum WorkerError {
    // ========== Job Control Errors ==========
    /// Payload rejected at enqueue time
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// No job with that id
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Control call not allowed in the job's current status
    #[error("cannot {action} job {id} while it is {status}")]
    InvalidState {
        id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    // ========== Dependency Errors ==========
    /// Circuit breaker rejected the call
    #[error("circuit open for {dependency}, retry in {}s", .retry_after.as_secs())]
    CircuitOpen {
        dependency: String,
        retry_after: Duration,
    },

    /// slskd call failed
    #[error("slskd: {0}")]
    Slskd(#[from] SlskdError),

    /// MusicBrainz call failed
    #[error("MusicBrainz: {0}")]
    MusicBrainz(#[from] MusicBrainzError),

    /// Spotify call failed
    #[error("Spotify: {0}")]
    Spotify(#[from] SpotifyError),

    // ========== Persistence Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored record could not be decoded
    #[error("corrupt job record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    /// Payload (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== Configuration Errors ==========
    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal worker error (catch-all for unexpected errors)
    #[error("internal worker error: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Check if this error is transient
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::Database(_) => true,
            Self::Slskd(e) => e.is_retryable(),
            Self::MusicBrainz(e) => e.is_retryable(),
            Self::Spotify(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Minimum wait the failing dependency asked for
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            Self::Spotify(e) => e.retry_after(),
            _ => None,
        }
    }

    /// Get a severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Critical errors that should alert operators
            Self::Configuration(_) | Self::CorruptRecord { .. } => ErrorSeverity::Critical,

            // Errors that indicate service issues
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorSeverity::Error
            }

            // Warnings for expected dependency failures
            Self::CircuitOpen { .. }
            | Self::Slskd(_)
            | Self::MusicBrainz(_)
            | Self::Spotify(_) => ErrorSeverity::Warning,

            // Caller mistakes
            Self::InvalidPayload(_) | Self::NotFound(_) | Self::InvalidState { .. } => {
                ErrorSeverity::Info
            }
        }
    }

    /// Name of the external dependency involved, if any
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { dependency, .. } => Some(dependency),
            Self::Slskd(_) => Some(crate::sources::SLSKD),
            Self::MusicBrainz(_) => Some(crate::sources::MUSICBRAINZ),
            Self::Spotify(_) => Some(crate::sources::SPOTIFY),
            Self::Database(_) | Self::CorruptRecord { .. } => Some("database"),
            _ => None,
        }
    }

    /// Log the error with appropriate severity
    pub fn log(&self) {
        let dependency = self.dependency().unwrap_or("none");
        match self.severity() {
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = %self,
                    dependency = dependency,
                    retryable = self.is_retryable(),
                    "Critical worker error"
                );
            }
            ErrorSeverity::Error => {
                tracing::error!(
                    error = %self,
                    dependency = dependency,
                    retryable = self.is_retryable(),
                    "Worker error"
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error = %self,
                    dependency = dependency,
                    retryable = self.is_retryable(),
                    "Worker warning"
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error = %self,
                    dependency = dependency,
                    retryable = self.is_retryable(),
                    "Worker info"
                );
            }
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(id: JobId, status: JobStatus, action: &'static str) -> Self {
        Self::InvalidState { id, status, action }
    }

    /// Create a corrupt-record error
    pub fn corrupt_record(id: impl ToString, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that should trigger alerts
    Critical,
    /// Standard errors
    Error,
    /// Warnings for expected failures
    Warning,
    /// Informational messages
    Info,
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

// ========== Conversion Implementations ==========

impl From<ConfigError> for WorkerError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(WorkerError::CircuitOpen {
            dependency: "slskd".to_string(),
            retry_after: Duration::from_secs(5)
        }
        .is_retryable());
        assert!(WorkerError::Slskd(SlskdError::Timeout).is_retryable());
        assert!(WorkerError::MusicBrainz(MusicBrainzError::RateLimited).is_retryable());
        assert!(WorkerError::Database(sqlx::Error::PoolTimedOut).is_retryable());

        assert!(!WorkerError::InvalidPayload("test".to_string()).is_retryable());
        assert!(!WorkerError::Slskd(SlskdError::Unauthorized).is_retryable());
        assert!(!WorkerError::Spotify(SpotifyError::NotFound("x".to_string())).is_retryable());
    }

    #[test]
    fn test_retry_after_hints() {
        let limited = WorkerError::Spotify(SpotifyError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        });
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(WorkerError::Slskd(SlskdError::Timeout).retry_after(), None);
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(
            WorkerError::Configuration("test".to_string()).severity(),
            ErrorSeverity::Critical
        );
        assert_eq!(
            WorkerError::Database(sqlx::Error::PoolClosed).severity(),
            ErrorSeverity::Error
        );
        assert_eq!(
            WorkerError::Slskd(SlskdError::Timeout).severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            WorkerError::NotFound(JobId::new()).severity(),
            ErrorSeverity::Info
        );
    }

    #[test]
    fn test_error_display() {
        let id = JobId::new();
        let err = WorkerError::invalid_state(id, JobStatus::Succeeded, "pause");
        assert_eq!(
            err.to_string(),
            format!("cannot pause job {} while it is succeeded", id)
        );

        let err = WorkerError::from(ConfigError::MissingEnvVar("SLSKD_API_KEY".to_string()));
        assert!(err.to_string().contains("SLSKD_API_KEY"));
        assert_eq!(err.dependency(), None);
    }
}
