//! Priority job queue
//!
//! The queue owns the working set of jobs in memory behind a short
//! `std::sync::Mutex` critical section and writes every state change through
//! to the [`JobStore`] after the lock is released. Claim order is priority
//! first, then creation time, then insertion order; a job in backoff is
//! invisible until its `next_run_at` passes.
//!
//! Finished jobs are dropped from memory once their final state is stored;
//! only their counts remain. Every change bumps the record's `revision` under
//! the lock, so the store can discard write-throughs that arrive late.
//!
//! Lock order is queue state, then the pause controller's token map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::clock::{self, Clock};
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobId, JobPayload, JobRecord, JobStatus, Priority};
use crate::pause::{InterruptReason, JobToken, PauseController};
use crate::store::JobStore;

/// Upper bound on concurrently running jobs
pub const MAX_CONCURRENCY: usize = 10;

/// Longest a requeued job is held back
pub const MAX_REQUEUE_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Queue tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    /// Used by [`JobQueue::submit`]
    pub default_max_retries: u32,
    /// Restarts a running job survives before it is failed
    pub max_orphan_recoveries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_max_retries: 3,
            max_orphan_recoveries: 3,
        }
    }
}

/// How a running job finished for good
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// A job handed to a worker slot
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub record: JobRecord,
    pub token: JobToken,
}

/// Counts per status plus the global controls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub queued: usize,
    pub running: usize,
    pub paused: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub globally_paused: bool,
    pub active: usize,
    pub max_concurrent: usize,
}

impl QueueSnapshot {
    pub fn count(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Running => self.running,
            JobStatus::Paused => self.paused,
            JobStatus::Succeeded => self.succeeded,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }
}

/// Jobs rehydrated by [`JobQueue::restore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub loaded: usize,
    pub requeued: Vec<JobId>,
    pub failed: Vec<JobId>,
}

/// Result of one claim attempt, computed under a single lock
#[derive(Debug)]
pub(crate) enum ClaimPoll {
    Claimed(ClaimedJob),
    /// Paused or at the concurrency limit; wait for a notification
    Gated,
    /// Nothing ready; the earliest backoff expiry, if any
    Idle(Option<DateTime<Utc>>),
}

/// Jobs that reached a terminal status in this process
#[derive(Debug, Default)]
struct FinishedCounts {
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl FinishedCounts {
    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
            _ => {}
        }
    }
}

#[derive(Debug)]
struct QueueState {
    jobs: HashMap<JobId, JobRecord>,
    finished: FinishedCounts,
    next_seq: u64,
    active: usize,
    max_concurrent: usize,
}

impl QueueState {
    fn insert(&mut self, mut job: JobRecord) {
        job.seq = self.next_seq;
        self.next_seq += 1;
        self.jobs.insert(job.id, job);
    }
}

/// Shared job queue
#[derive(Debug)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Arc<Notify>,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    pause: Arc<PauseController>,
    settings: QueueSettings,
}

fn clamp_concurrency(n: usize) -> usize {
    n.clamp(1, MAX_CONCURRENCY)
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        let max_concurrent = clamp_concurrency(settings.max_concurrent);
        Self {
            state: Mutex::new(QueueState {
                jobs: HashMap::new(),
                finished: FinishedCounts::default(),
                next_seq: 0,
                active: 0,
                max_concurrent,
            }),
            notify: Arc::new(Notify::new()),
            store,
            clock,
            pause: Arc::new(PauseController::new()),
            settings: QueueSettings {
                max_concurrent,
                ..settings
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn pause_controller(&self) -> &Arc<PauseController> {
        &self.pause
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings
    }

    /// Notification fired whenever a job may have become claimable
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Make every waiting slot look at the queue again
    pub fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// Write a changed record through to the store; `false` if that failed
    async fn persist(&self, job: &JobRecord) -> bool {
        match self.store.update(job).await {
            Ok(()) => true,
            Err(e) => {
                warn!(job.id = %job.id, error = %e, "Failed to persist job state");
                false
            }
        }
    }

    /// Persist a record and, if it is finished and stored, drop it from memory
    async fn persist_and_evict(&self, job: &JobRecord) {
        if self.persist(job).await && job.status.is_terminal() {
            let mut state = self.lock();
            if state
                .jobs
                .get(&job.id)
                .is_some_and(|current| current.status.is_terminal())
            {
                state.jobs.remove(&job.id);
            }
        }
    }

    // ===== Producer side =====

    /// Validate and persist a new queued job
    pub async fn enqueue(
        &self,
        payload: JobPayload,
        priority: Priority,
        max_retries: u32,
    ) -> WorkerResult<JobId> {
        payload.validate()?;

        let job = JobRecord::new(payload, priority, max_retries, self.clock.now());
        self.store.save(&job).await?;

        let id = job.id;
        let kind = job.kind();
        self.lock().insert(job);
        self.wake();

        info!(job.id = %id, job.kind = %kind, priority = %priority, "Job enqueued");
        Ok(id)
    }

    /// Enqueue at normal priority with the default retry budget
    pub async fn submit(&self, payload: JobPayload) -> WorkerResult<JobId> {
        self.enqueue(payload, Priority::NORMAL, self.settings.default_max_retries)
            .await
    }

    // ===== Worker side =====

    /// Claim the next ready job, if the queue is not paused or saturated
    pub async fn try_claim(&self) -> Option<ClaimedJob> {
        match self.poll_claim().await {
            ClaimPoll::Claimed(claimed) => Some(claimed),
            ClaimPoll::Gated | ClaimPoll::Idle(_) => None,
        }
    }

    pub(crate) async fn poll_claim(&self) -> ClaimPoll {
        if self.pause.is_globally_paused() {
            return ClaimPoll::Gated;
        }

        let now = self.clock.now();
        let claimed = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.active >= state.max_concurrent {
                return ClaimPoll::Gated;
            }

            let next = state
                .jobs
                .values()
                .filter(|job| job.is_ready(now))
                .min_by_key(|job| job.claim_key())
                .map(|job| job.id);

            let Some(id) = next else {
                let earliest = state
                    .jobs
                    .values()
                    .filter(|job| job.status == JobStatus::Queued)
                    .filter_map(|job| job.next_run_at)
                    .min();
                return ClaimPoll::Idle(earliest);
            };
            let Some(job) = state.jobs.get_mut(&id) else {
                return ClaimPoll::Idle(None);
            };

            job.transition(JobStatus::Running, now);
            job.next_run_at = None;
            state.active += 1;
            ClaimedJob {
                record: job.clone(),
                token: self.pause.register(job.id),
            }
        };

        self.persist(&claimed.record).await;
        debug!(
            job.id = %claimed.record.id,
            job.kind = %claimed.record.kind(),
            attempt = claimed.record.attempt_count + 1,
            "Job claimed"
        );
        ClaimPoll::Claimed(claimed)
    }

    /// Leave `Running`, free the slot and drop the job's token
    fn finish_run(
        &self,
        id: JobId,
        action: &'static str,
        apply: impl FnOnce(&mut JobRecord, DateTime<Utc>),
    ) -> WorkerResult<JobRecord> {
        let now = self.clock.now();
        let record = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let job = state.jobs.get_mut(&id).ok_or(WorkerError::NotFound(id))?;
            if job.status != JobStatus::Running {
                return Err(WorkerError::invalid_state(id, job.status, action));
            }
            apply(job, now);
            job.touch(now);
            state.finished.record(job.status);
            state.active = state.active.saturating_sub(1);
            job.clone()
        };
        self.pause.unregister(id);
        self.wake();
        Ok(record)
    }

    /// Back to `Queued` after a failed attempt, claimable once `delay` passed
    pub async fn requeue_with_delay(
        &self,
        id: JobId,
        delay: Duration,
        error: impl Into<String>,
    ) -> WorkerResult<()> {
        let error = error.into();
        let delay = delay.min(MAX_REQUEUE_DELAY);
        let delay_chrono =
            chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(1));
        let job = self.finish_run(id, "requeue", |job, now| {
            let next_run_at = now
                .checked_add_signed(delay_chrono)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            job.status = JobStatus::Queued;
            job.attempt_count = job.attempt_count.saturating_add(1);
            job.next_run_at = Some(next_run_at);
            job.error_message = Some(error);
        })?;
        self.persist(&job).await;

        info!(
            job.id = %id,
            attempt = job.attempt_count,
            delay_ms = delay.as_millis() as u64,
            error = job.error_message.as_deref().unwrap_or_default(),
            "Job requeued with backoff"
        );
        Ok(())
    }

    /// Move a running job to its terminal status
    pub async fn complete(&self, id: JobId, completion: Completion) -> WorkerResult<()> {
        let job = self.finish_run(id, "complete", |job, _| match completion {
            Completion::Succeeded => job.status = JobStatus::Succeeded,
            Completion::Failed(reason) => {
                job.status = JobStatus::Failed;
                job.error_message = Some(reason);
            }
            Completion::Cancelled => job.status = JobStatus::Cancelled,
        })?;
        self.persist_and_evict(&job).await;

        match job.status {
            JobStatus::Failed => warn!(
                job.id = %id,
                attempts = job.attempt_count + 1,
                error = job.error_message.as_deref().unwrap_or_default(),
                "Job failed"
            ),
            status => info!(job.id = %id, status = %status, "Job finished"),
        }
        Ok(())
    }

    /// Hand a running job back without consuming an attempt
    pub async fn release(&self, id: JobId) -> WorkerResult<()> {
        let job = self.finish_run(id, "release", |job, _| {
            job.status = JobStatus::Queued;
            job.next_run_at = None;
        })?;
        self.persist(&job).await;
        debug!(job.id = %id, "Job released");
        Ok(())
    }

    /// Park a running job that stopped for a pause request
    pub async fn park(&self, id: JobId) -> WorkerResult<()> {
        let job = self.finish_run(id, "park", |job, _| {
            job.status = JobStatus::Paused;
            job.next_run_at = None;
        })?;
        self.persist(&job).await;
        info!(job.id = %id, "Job paused");
        Ok(())
    }

    /// Earliest backoff expiry among queued jobs
    pub fn next_ready_at(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Queued)
            .filter_map(|job| job.next_run_at)
            .min()
    }

    /// Time until the next backoff expires, zero if one already has
    pub fn time_until_next_ready(&self) -> Option<Duration> {
        self.next_ready_at()
            .map(|at| clock::until(self.clock.as_ref(), at))
    }

    // ===== Startup =====

    /// Load every non-terminal job from the store
    pub async fn load(&self) -> WorkerResult<usize> {
        let jobs = self.store.list_by_status(&JobStatus::ACTIVE).await?;
        let mut state = self.lock();
        let mut loaded = 0;
        for job in jobs {
            if !state.jobs.contains_key(&job.id) {
                state.insert(job);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Requeue jobs left `Running` by a previous process
    ///
    /// Attempts are not consumed. A job recovered more than
    /// `max_orphan_recoveries` times is failed instead.
    pub async fn recover_orphans(&self) -> RestoreReport {
        let now = self.clock.now();
        let cap = self.settings.max_orphan_recoveries;
        let mut report = RestoreReport::default();

        let changed: Vec<JobRecord> = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let changed: Vec<JobRecord> = state
                .jobs
                .values_mut()
                .filter(|job| job.status == JobStatus::Running && !self.pause.is_registered(job.id))
                .map(|job| {
                    if job.recovery_count >= cap {
                        job.status = JobStatus::Failed;
                        job.error_message = Some(format!(
                            "abandoned after {} interrupted runs",
                            job.recovery_count + 1
                        ));
                        report.failed.push(job.id);
                    } else {
                        job.status = JobStatus::Queued;
                        job.next_run_at = Some(now);
                        job.recovery_count += 1;
                        report.requeued.push(job.id);
                    }
                    job.touch(now);
                    job.clone()
                })
                .collect();
            state.finished.failed += report.failed.len();
            changed
        };

        for job in &changed {
            if job.status == JobStatus::Failed {
                warn!(
                    job.id = %job.id,
                    job.kind = %job.kind(),
                    recovery_count = job.recovery_count,
                    "Orphaned job exceeded recovery limit, marking failed"
                );
            } else {
                warn!(
                    job.id = %job.id,
                    job.kind = %job.kind(),
                    attempt_count = job.attempt_count,
                    recovery_count = job.recovery_count,
                    "Recovered orphaned job"
                );
            }
            self.persist_and_evict(job).await;
        }

        if !changed.is_empty() {
            self.wake();
        }
        report
    }

    /// `load` followed by `recover_orphans`
    pub async fn restore(&self) -> WorkerResult<RestoreReport> {
        let loaded = self.load().await?;
        let mut report = self.recover_orphans().await;
        report.loaded = loaded;
        info!(
            loaded,
            requeued = report.requeued.len(),
            failed = report.failed.len(),
            "Job queue restored"
        );
        Ok(report)
    }

    // ===== Queries =====

    /// Current record of a job
    pub async fn get_status(&self, id: JobId) -> WorkerResult<JobRecord> {
        let cached = self.lock().jobs.get(&id).cloned();
        match cached {
            Some(job) => Ok(job),
            None => self
                .store
                .load(id)
                .await?
                .ok_or(WorkerError::NotFound(id)),
        }
    }

    /// Unfinished jobs in claim order, optionally by status
    ///
    /// Finished jobs are only in the store; use [`JobQueue::get_status`].
    pub fn list(&self, status: Option<JobStatus>) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self
            .lock()
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.claim_key());
        jobs
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        let mut snapshot = QueueSnapshot {
            globally_paused: self.pause.is_globally_paused(),
            active: state.active,
            max_concurrent: state.max_concurrent,
            succeeded: state.finished.succeeded,
            failed: state.finished.failed,
            cancelled: state.finished.cancelled,
            ..QueueSnapshot::default()
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Queued => snapshot.queued += 1,
                JobStatus::Running => snapshot.running += 1,
                JobStatus::Paused => snapshot.paused += 1,
                JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => {}
            }
        }
        snapshot
    }

    // ===== Control =====

    /// Stop claiming new jobs; running jobs continue
    pub fn pause_all(&self) -> QueueSnapshot {
        self.pause.pause_all();
        self.snapshot()
    }

    pub fn resume_all(&self) -> QueueSnapshot {
        if self.pause.resume_all() {
            self.wake();
        }
        self.snapshot()
    }

    /// Error for a job not in memory: terminal leftovers from an earlier run
    /// are in the store only
    async fn missing(&self, id: JobId, action: &'static str) -> WorkerError {
        match self.store.load(id).await {
            Ok(Some(job)) => WorkerError::invalid_state(id, job.status, action),
            Ok(None) => WorkerError::NotFound(id),
            Err(e) => e,
        }
    }

    /// Apply a control action under the lock; `Ok(false)` from `apply`
    /// means nothing changed
    async fn control(
        &self,
        id: JobId,
        action: &'static str,
        apply: impl FnOnce(&mut JobRecord, DateTime<Utc>) -> WorkerResult<bool>,
    ) -> WorkerResult<()> {
        let now = self.clock.now();
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match state.jobs.get_mut(&id) {
                Some(job) => {
                    if apply(job, now)? {
                        job.touch(now);
                        state.finished.record(job.status);
                        Some(Some(job.clone()))
                    } else {
                        Some(None)
                    }
                }
                None => None,
            }
        };
        let Some(changed) = outcome else {
            return Err(self.missing(id, action).await);
        };

        if let Some(job) = changed {
            self.persist_and_evict(&job).await;
            debug!(job.id = %id, action, status = %job.status, "Job control applied");
        }
        Ok(())
    }

    /// Pause one job
    ///
    /// A queued job is parked right away; a running job is asked to stop at
    /// its next checkpoint.
    pub async fn pause(&self, id: JobId) -> WorkerResult<()> {
        let pause = self.pause.clone();
        self.control(id, "pause", |job, _| match job.status {
            JobStatus::Queued => {
                job.status = JobStatus::Paused;
                job.next_run_at = None;
                Ok(true)
            }
            JobStatus::Running => {
                pause.request(id, InterruptReason::Pause);
                Ok(false)
            }
            JobStatus::Paused => Ok(false),
            status => Err(WorkerError::invalid_state(id, status, "pause")),
        })
        .await
    }

    /// Make a paused job claimable immediately
    pub async fn resume(&self, id: JobId) -> WorkerResult<()> {
        let mut resumed = false;
        self.control(id, "resume", |job, now| match job.status {
            JobStatus::Paused => {
                job.status = JobStatus::Queued;
                job.next_run_at = Some(now);
                resumed = true;
                Ok(true)
            }
            JobStatus::Queued => Ok(false),
            status => Err(WorkerError::invalid_state(id, status, "resume")),
        })
        .await?;

        if resumed {
            self.wake();
        }
        Ok(())
    }

    /// Cancel a job; a running job is asked to stop
    pub async fn cancel(&self, id: JobId) -> WorkerResult<()> {
        let pause = self.pause.clone();
        self.control(id, "cancel", |job, _| match job.status {
            JobStatus::Queued | JobStatus::Paused => {
                job.status = JobStatus::Cancelled;
                job.next_run_at = None;
                Ok(true)
            }
            JobStatus::Running => {
                pause.request(id, InterruptReason::Cancel);
                Ok(false)
            }
            status => Err(WorkerError::invalid_state(id, status, "cancel")),
        })
        .await
    }

    /// Change the priority of a job that has not finished
    pub async fn set_priority(&self, id: JobId, priority: Priority) -> WorkerResult<()> {
        self.control(id, "reprioritize", |job, _| {
            if job.status.is_terminal() {
                return Err(WorkerError::invalid_state(id, job.status, "reprioritize"));
            }
            if job.priority == priority {
                return Ok(false);
            }
            job.priority = priority;
            Ok(true)
        })
        .await
    }

    /// Change the concurrency limit, clamped to 1..=10; returns the new value
    ///
    /// Running jobs above a lowered limit finish normally.
    pub fn set_max_concurrent(&self, n: usize) -> usize {
        let clamped = clamp_concurrency(n);
        self.lock().max_concurrent = clamped;
        self.wake();
        info!(max_concurrent = clamped, "Concurrency limit changed");
        clamped
    }

    pub fn max_concurrent(&self) -> usize {
        self.lock().max_concurrent
    }
}
