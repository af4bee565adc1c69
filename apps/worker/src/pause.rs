//! Global and per-job pause, cancel and shutdown signalling
//!
//! Each running job gets a [`JobToken`]: a cancellation token plus the reason
//! it was interrupted. Handlers check it between steps (or select on
//! [`JobToken::interrupted`]) and stop cooperatively; the pool then reads the
//! reason to decide whether the job is parked, released or cancelled.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::job::JobId;

// Zero means no interrupt requested
const REASON_SHUTDOWN: u8 = 1;
const REASON_PAUSE: u8 = 2;
const REASON_CANCEL: u8 = 3;

/// Why a running job was asked to stop
///
/// When several requests arrive the strongest wins: cancel over pause over
/// shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The process is stopping; the job goes back to the queue
    Shutdown,
    /// The user paused the job; it is parked
    Pause,
    /// The user cancelled the job
    Cancel,
}

impl InterruptReason {
    fn code(self) -> u8 {
        match self {
            Self::Shutdown => REASON_SHUTDOWN,
            Self::Pause => REASON_PAUSE,
            Self::Cancel => REASON_CANCEL,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            REASON_SHUTDOWN => Some(Self::Shutdown),
            REASON_PAUSE => Some(Self::Pause),
            REASON_CANCEL => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shutdown => "shutdown",
            Self::Pause => "paused",
            Self::Cancel => "cancelled",
        })
    }
}

/// Cancellation token handed to a handler for one run
#[derive(Debug, Clone, Default)]
pub struct JobToken {
    cancel: CancellationToken,
    reason: Arc<AtomicU8>,
}

impl JobToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the handler to stop; the strongest reason requested so far sticks
    pub fn interrupt(&self, reason: InterruptReason) {
        self.reason.fetch_max(reason.code(), Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn interrupt_reason(&self) -> Option<InterruptReason> {
        InterruptReason::from_code(self.reason.load(Ordering::SeqCst))
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn pause_requested(&self) -> bool {
        self.interrupt_reason() == Some(InterruptReason::Pause)
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupt_reason() == Some(InterruptReason::Cancel)
    }

    /// `Err(reason)` once the job was asked to stop
    pub fn checkpoint(&self) -> Result<(), InterruptReason> {
        match self.interrupt_reason() {
            Some(reason) if self.is_interrupted() => Err(reason),
            _ => Ok(()),
        }
    }

    /// Resolve when the job is asked to stop
    pub async fn interrupted(&self) -> InterruptReason {
        self.cancel.cancelled().await;
        self.interrupt_reason().unwrap_or(InterruptReason::Shutdown)
    }
}

/// Global pause flag and the tokens of running jobs
#[derive(Debug, Default)]
pub struct PauseController {
    globally_paused: AtomicBool,
    tokens: Mutex<HashMap<JobId, JobToken>>,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<JobId, JobToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop claiming new jobs; returns whether the flag changed
    pub fn pause_all(&self) -> bool {
        let changed = !self.globally_paused.swap(true, Ordering::SeqCst);
        if changed {
            info!("Queue paused");
        }
        changed
    }

    /// Resume claiming; returns whether the flag changed
    pub fn resume_all(&self) -> bool {
        let changed = self.globally_paused.swap(false, Ordering::SeqCst);
        if changed {
            info!("Queue resumed");
        }
        changed
    }

    pub fn is_globally_paused(&self) -> bool {
        self.globally_paused.load(Ordering::SeqCst)
    }

    /// Fresh token for a job that is starting to run
    pub(crate) fn register(&self, id: JobId) -> JobToken {
        let token = JobToken::new();
        self.tokens().insert(id, token.clone());
        token
    }

    pub(crate) fn is_registered(&self, id: JobId) -> bool {
        self.tokens().contains_key(&id)
    }

    pub(crate) fn unregister(&self, id: JobId) {
        self.tokens().remove(&id);
    }

    /// Interrupt one running job; false if it is not running
    pub(crate) fn request(&self, id: JobId, reason: InterruptReason) -> bool {
        let token = self.tokens().get(&id).cloned();
        match token {
            Some(token) => {
                debug!(job.id = %id, reason = %reason, "Interrupt requested");
                token.interrupt(reason);
                true
            }
            None => false,
        }
    }

    /// Interrupt every running job for shutdown
    pub(crate) fn shutdown_all(&self) -> usize {
        let tokens: Vec<JobToken> = self.tokens().values().cloned().collect();
        for token in &tokens {
            token.interrupt(InterruptReason::Shutdown);
        }
        tokens.len()
    }

    /// Number of jobs holding a token
    pub fn running(&self) -> usize {
        self.tokens().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_pause_all_is_idempotent() {
        let controller = PauseController::new();
        assert!(controller.pause_all());
        assert!(!controller.pause_all());
        assert!(controller.is_globally_paused());

        assert!(controller.resume_all());
        assert!(!controller.is_globally_paused());
        assert!(!controller.resume_all());
    }

    #[test]
    fn test_strongest_reason_wins() {
        let token = JobToken::new();
        assert_eq!(token.checkpoint(), Ok(()));

        token.interrupt(InterruptReason::Shutdown);
        token.interrupt(InterruptReason::Cancel);
        token.interrupt(InterruptReason::Pause);

        assert_eq!(token.interrupt_reason(), Some(InterruptReason::Cancel));
        assert_eq!(token.checkpoint(), Err(InterruptReason::Cancel));
        assert!(token.is_cancelled());
        assert!(!token.pause_requested());
    }

    #[test]
    fn test_request_only_reaches_registered_jobs() {
        let controller = PauseController::new();
        let running = JobId::new();
        let token = controller.register(running);

        assert!(controller.request(running, InterruptReason::Pause));
        assert!(!controller.request(JobId::new(), InterruptReason::Pause));
        assert!(token.pause_requested());

        controller.unregister(running);
        assert_eq!(controller.running(), 0);
    }

    #[tokio::test]
    async fn test_interrupted_resolves_with_reason() {
        let controller = PauseController::new();
        let token = controller.register(JobId::new());
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.interrupted().await }
        });

        assert_eq!(controller.shutdown_all(), 1);
        assert_matches!(waiter.await, Ok(InterruptReason::Shutdown));
    }
}
