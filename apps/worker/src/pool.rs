//! Worker pool
//!
//! A fixed set of slots pulls jobs from the [`JobQueue`], runs the handler
//! registered for the job's type and reports the outcome back. Slots sleep on
//! the queue's notification (enqueue, resume, a slot freeing up, a
//! concurrency change) or until the earliest backoff expires. The queue's
//! concurrency limit decides how many of them may hold a job at once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::breaker::{BreakerRegistry, BreakerStatus};
use crate::clock;
use crate::error::WorkerResult;
use crate::handlers::HandlerRegistry;
use crate::job::{JobOutcome, JobRecord};
use crate::pause::{InterruptReason, JobToken};
use crate::queue::{ClaimPoll, ClaimedJob, Completion, JobQueue, QueueSnapshot, MAX_CONCURRENCY};
use crate::retry::{FailureKind, RetryDecision, RetryPolicy};

/// Longest a slot sleeps without re-checking the queue
const DEFAULT_IDLE_POLL: Duration = Duration::from_secs(30);

/// Pool configuration and collaborators, consumed by [`WorkerPool::start`]
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    handlers: HandlerRegistry,
    retry: RetryPolicy,
    breakers: Arc<BreakerRegistry>,
    idle_poll: Duration,
}

struct PoolShared {
    queue: Arc<JobQueue>,
    handlers: HandlerRegistry,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    idle_poll: Duration,
}

/// Handle to a running pool
pub struct Orchestrator {
    queue: Arc<JobQueue>,
    breakers: Arc<BreakerRegistry>,
    shutdown: CancellationToken,
    slots: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        handlers: HandlerRegistry,
        retry: RetryPolicy,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self {
            queue,
            handlers,
            retry,
            breakers,
            idle_poll: DEFAULT_IDLE_POLL,
        }
    }

    /// Upper bound on how long an idle slot sleeps
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Spawn the slots on the current runtime
    pub fn start(self) -> Orchestrator {
        let shutdown = CancellationToken::new();
        let shared = Arc::new(PoolShared {
            queue: self.queue.clone(),
            handlers: self.handlers,
            retry: self.retry,
            shutdown: shutdown.clone(),
            idle_poll: self.idle_poll,
        });

        let slots = (0..MAX_CONCURRENCY)
            .map(|slot| {
                let shared = shared.clone();
                tokio::spawn(async move { shared.run_slot(slot).await })
            })
            .collect();

        info!(
            max_concurrent = self.queue.max_concurrent(),
            handlers = ?shared.handlers.kinds(),
            "Worker pool started"
        );

        Orchestrator {
            queue: self.queue,
            breakers: self.breakers,
            shutdown,
            slots,
        }
    }
}

impl PoolShared {
    async fn run_slot(&self, slot: usize) {
        let notify = self.queue.notifier();
        debug!(slot, "Worker slot started");

        while !self.shutdown.is_cancelled() {
            // Register interest before looking so a wake-up between the
            // claim attempt and the wait is not lost
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = match self.queue.poll_claim().await {
                ClaimPoll::Claimed(claimed) => {
                    if self.shutdown.is_cancelled() {
                        if let Err(e) = self.queue.release(claimed.record.id).await {
                            e.log();
                        }
                        break;
                    }
                    self.execute(claimed).await;
                    continue;
                }
                ClaimPoll::Gated => self.idle_poll,
                ClaimPoll::Idle(next) => next
                    .map(|at| clock::until(self.queue.clock().as_ref(), at))
                    .map_or(self.idle_poll, |wait| wait.min(self.idle_poll)),
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = &mut notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        debug!(slot, "Worker slot stopped");
    }

    async fn execute(&self, claimed: ClaimedJob) {
        let ClaimedJob { record, token } = claimed;
        let span = info_span!(
            "job",
            job.id = %record.id,
            job.kind = %record.kind(),
            attempt = record.attempt_count + 1
        );

        async {
            let started = Instant::now();
            let outcome = self.run_handler(&record, &token).await;
            debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                outcome = ?outcome,
                "Handler returned"
            );

            if let Err(e) = self.report(&record, &token, outcome).await {
                e.log();
            }
        }
        .instrument(span)
        .await
    }

    async fn run_handler(&self, record: &JobRecord, token: &JobToken) -> JobOutcome {
        let Some(handler) = self.handlers.get(record.kind()) else {
            return JobOutcome::fatal(format!("no handler registered for {} jobs", record.kind()));
        };

        match AssertUnwindSafe(handler.handle(record, token.clone()))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(panic = %message, "Handler panicked");
                JobOutcome::retryable(format!("handler panicked: {}", message))
            }
        }
    }

    async fn report(
        &self,
        job: &JobRecord,
        token: &JobToken,
        outcome: JobOutcome,
    ) -> WorkerResult<()> {
        let id = job.id;
        let interrupt = token
            .interrupt_reason()
            .filter(|_| token.is_interrupted());

        let outcome = match (outcome, interrupt) {
            (JobOutcome::Cancelled | JobOutcome::RetryableFailure { .. }, Some(reason)) => {
                return match reason {
                    InterruptReason::Pause => self.queue.park(id).await,
                    InterruptReason::Shutdown => self.queue.release(id).await,
                    InterruptReason::Cancel => self.queue.complete(id, Completion::Cancelled).await,
                };
            }
            (outcome, _) => outcome,
        };

        match outcome {
            JobOutcome::Success(summary) => {
                info!(summary = %summary, "Job succeeded");
                self.queue.complete(id, Completion::Succeeded).await
            }
            JobOutcome::FatalFailure(reason) => {
                self.queue.complete(id, Completion::Failed(reason)).await
            }
            JobOutcome::Cancelled => self.queue.complete(id, Completion::Cancelled).await,
            JobOutcome::RetryableFailure {
                reason,
                retry_after,
            } => match self
                .retry
                .decide(job.attempt_count, job.max_retries, FailureKind::Retryable)
            {
                RetryDecision::Retry(delay) => {
                    let delay = self.retry.with_hint(delay, retry_after);
                    self.queue.requeue_with_delay(id, delay, reason).await
                }
                RetryDecision::Terminal => {
                    let reason = format!(
                        "{} (gave up after {} attempts)",
                        reason,
                        job.attempt_count + 1
                    );
                    self.queue.complete(id, Completion::Failed(reason)).await
                }
            },
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Orchestrator {
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn breaker_status(&self) -> Vec<BreakerStatus> {
        self.breakers.snapshot()
    }

    /// Stop claiming, interrupt running handlers and wait for every slot
    ///
    /// Interrupted jobs go back to the queue without using an attempt.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let interrupted = self.queue.pause_controller().shutdown_all();
        info!(interrupted, "Worker pool shutting down");

        for result in futures_util::future::join_all(self.slots).await {
            if let Err(e) = result {
                error!(error = %e, "Worker slot ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}
