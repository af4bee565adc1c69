//! Mock handlers for worker integration tests
//!
//! Provides a [`ScriptedHandler`] that plays back a list of steps, one per
//! invocation, so pool behaviour can be tested without network services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use soulbridge_worker::handlers::JobHandler;
use soulbridge_worker::job::{JobKind, JobOutcome, JobRecord};
use soulbridge_worker::pause::JobToken;

/// What a [`ScriptedHandler`] does on one invocation
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this outcome immediately
    Outcome(JobOutcome),
    /// Panic with this message
    Panic(&'static str),
    /// Block until the token is interrupted, then report `Cancelled`
    WaitForInterrupt,
    /// Block until a permit is released (success) or the token is
    /// interrupted (`Cancelled`)
    Hold,
}

/// Handler that replays scripted steps
///
/// When the script runs out every further invocation succeeds.
pub struct ScriptedHandler {
    kind: JobKind,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    gate: Arc<Semaphore>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the running count even when the step panics
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedHandler {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Outcome(JobOutcome::success("scripted success")),
            gate: Arc::new(Semaphore::new(0)),
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Download handler following `steps`
    pub fn downloads(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self::new(JobKind::Download).with_steps(steps))
    }

    pub fn with_steps(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .expect("script lock poisoned")
            .extend(steps);
        self
    }

    /// Step used once the script is exhausted
    pub fn with_fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    /// Let `n` held invocations finish
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Most invocations ever in flight at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn handle(&self, _job: &JobRecord, token: JobToken) -> JobOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        match self.next_step() {
            Step::Outcome(outcome) => outcome,
            Step::Panic(message) => panic!("{}", message),
            Step::WaitForInterrupt => {
                token.interrupted().await;
                JobOutcome::Cancelled
            }
            Step::Hold => {
                tokio::select! {
                    _ = token.interrupted() => JobOutcome::Cancelled,
                    permit = self.gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                        JobOutcome::success("released")
                    }
                }
            }
        }
    }
}
