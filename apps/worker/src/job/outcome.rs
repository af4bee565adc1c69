//! What a handler reports back to the pool

use std::time::Duration;

use crate::error::WorkerError;

/// Result of one handler invocation
///
/// Handlers return this instead of failing with an error so the pool can
/// branch on the kind of failure.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Work done; the string summarises the result for the log
    Success(String),
    /// Transient problem, the retry policy decides what happens next
    RetryableFailure {
        reason: String,
        /// Minimum wait requested by the dependency (rate limit, open circuit)
        retry_after: Option<Duration>,
    },
    /// Permanent problem, never retried
    FatalFailure(String),
    /// The handler stopped because its token was interrupted
    Cancelled,
}

impl JobOutcome {
    pub fn success(summary: impl Into<String>) -> Self {
        Self::Success(summary.into())
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::RetryableFailure {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::FatalFailure(reason.into())
    }

    /// Classify an error by its retryability
    pub fn from_error(err: &WorkerError) -> Self {
        if err.is_retryable() {
            Self::RetryableFailure {
                reason: err.to_string(),
                retry_after: err.retry_after(),
            }
        } else {
            Self::FatalFailure(err.to_string())
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<WorkerError> for JobOutcome {
    fn from(err: WorkerError) -> Self {
        Self::from_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_classifies() {
        let open = WorkerError::CircuitOpen {
            dependency: "slskd".to_string(),
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(
            JobOutcome::from(open),
            JobOutcome::RetryableFailure {
                reason: "circuit open for slskd, retry in 42s".to_string(),
                retry_after: Some(Duration::from_secs(42)),
            }
        );

        let invalid = WorkerError::InvalidPayload("bad".to_string());
        assert_eq!(
            JobOutcome::from(invalid),
            JobOutcome::FatalFailure("invalid payload: bad".to_string())
        );
    }
}
