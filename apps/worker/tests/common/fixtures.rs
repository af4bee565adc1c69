//! Test fixtures for worker integration tests
//!
//! Provides job payloads, a queue wired to a manual clock and an in-memory
//! store, and a polling helper for asserting on background work.

use std::sync::Arc;
use std::time::Duration;

use soulbridge_worker::breaker::{BreakerConfig, BreakerRegistry};
use soulbridge_worker::clock::{Clock, ManualClock};
use soulbridge_worker::job::{JobId, JobPayload, JobRecord, JobStatus, Priority, TrackQuery};
use soulbridge_worker::queue::{JobQueue, QueueSettings};
use soulbridge_worker::retry::RetryPolicy;
use soulbridge_worker::store::{InMemoryJobStore, JobStore};

/// Directory used as the download target in payloads
pub const TARGET_DIR: &str = "/tmp/soulbridge-test";

/// How long [`wait_for`] waits before failing the test
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A download payload for `Test Artist - {title}`
pub fn download_payload(title: &str) -> JobPayload {
    JobPayload::download(
        TrackQuery::new("Test Artist", title).with_duration_ms(215_000),
        TARGET_DIR,
    )
}

/// Retry policy without jitter, so delays are exact
pub fn exact_retry_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(300)).with_jitter(false)
}

/// Queue, clock and store for one test
pub struct TestQueue {
    pub queue: Arc<JobQueue>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryJobStore>,
}

impl TestQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self::with_store(settings, InMemoryJobStore::new())
    }

    /// Queue over a store that already holds records
    pub fn with_store(settings: QueueSettings, store: InMemoryJobStore) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(store);
        let queue = Arc::new(JobQueue::new(
            store.clone() as Arc<dyn JobStore>,
            clock.clone() as Arc<dyn Clock>,
            settings,
        ));
        Self {
            queue,
            clock,
            store,
        }
    }

    /// Queue allowing `max_concurrent` running jobs, three retries
    pub fn with_concurrency(max_concurrent: usize) -> Self {
        Self::new(QueueSettings {
            max_concurrent,
            ..QueueSettings::default()
        })
    }

    /// Breakers sharing this queue's clock
    pub fn breakers(&self, config: BreakerConfig) -> Arc<BreakerRegistry> {
        Arc::new(BreakerRegistry::new(
            config,
            self.clock.clone() as Arc<dyn Clock>,
        ))
    }

    pub async fn enqueue(&self, title: &str, priority: Priority) -> JobId {
        self.queue
            .enqueue(download_payload(title), priority, 3)
            .await
            .expect("enqueue failed")
    }

    /// Record of a job without awaiting: the queue's copy while it is
    /// unfinished, the stored one after
    pub fn current(&self, id: JobId) -> Option<JobRecord> {
        self.queue
            .list(None)
            .into_iter()
            .find(|job| job.id == id)
            .or_else(|| self.store.get(id))
    }

    pub async fn record(&self, id: JobId) -> JobRecord {
        self.queue.get_status(id).await.expect("job not found")
    }

    pub async fn status(&self, id: JobId) -> JobStatus {
        self.record(id).await.status
    }

    /// Time from the manual clock's now until the job's `next_run_at`
    pub async fn backoff_of(&self, id: JobId) -> Duration {
        let record = self.record(id).await;
        let next = record.next_run_at.expect("job has no next_run_at");
        (next - self.clock.now())
            .to_std()
            .expect("next_run_at is in the past")
    }
}

/// A stored record as a crashed process would have left it
pub fn running_record(title: &str, recovery_count: u32, clock: &ManualClock) -> JobRecord {
    let mut record = JobRecord::new(download_payload(title), Priority::NORMAL, 3, clock.now());
    record.status = JobStatus::Running;
    record.recovery_count = recovery_count;
    record
}

/// Poll `condition` every 10ms until it holds, panicking after 5 seconds
pub async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the job reaches `status`
pub async fn wait_for_status(test: &TestQueue, id: JobId, status: JobStatus) {
    let what = format!("job {} to become {}", id, status);
    wait_for(&what, || test.current(id).map(|job| job.status) == Some(status)).await;
}
