//! Worker pool integration tests
//!
//! This module runs the pool against scripted handlers:
//! - Retry with exponential backoff until the budget is spent
//! - The concurrency bound under load
//! - Pause, cancel and shutdown of running jobs
//! - Panicking handlers

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{exact_retry_policy, wait_for, wait_for_status, ScriptedHandler, Step, TestQueue};
use soulbridge_worker::breaker::BreakerConfig;
use soulbridge_worker::handlers::HandlerRegistry;
use soulbridge_worker::job::{JobKind, JobOutcome, JobStatus, Priority};
use soulbridge_worker::pool::{Orchestrator, WorkerPool};
use soulbridge_worker::retry::MAX_RETRY_AFTER;

const IDLE_POLL: Duration = Duration::from_millis(20);

fn start_pool(test: &TestQueue, handler: Arc<ScriptedHandler>) -> Orchestrator {
    WorkerPool::new(
        test.queue.clone(),
        HandlerRegistry::new().register(handler),
        exact_retry_policy(),
        test.breakers(BreakerConfig::default()),
    )
    .with_idle_poll(IDLE_POLL)
    .start()
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_retryable_failures_back_off_then_fail() {
    let test = TestQueue::with_concurrency(3);
    let handler = Arc::new(
        ScriptedHandler::new(JobKind::Download)
            .with_fallback(Step::Outcome(JobOutcome::retryable("peer offline"))),
    );
    let pool = start_pool(&test, handler.clone());
    let id = test.enqueue("flaky", Priority::NORMAL).await;

    for (attempts, expected) in [(1, 1), (2, 2), (3, 4)] {
        wait_for("the job to be requeued", || {
            test.current(id).is_some_and(|record| {
                record.status == JobStatus::Queued && record.attempt_count == attempts
            })
        })
        .await;
        assert_eq!(test.backoff_of(id).await, Duration::from_secs(expected));
        test.clock.advance(Duration::from_secs(expected));
    }

    wait_for_status(&test, id, JobStatus::Failed).await;
    let record = test.record(id).await;
    assert_eq!(record.attempt_count, 3);
    assert_eq!(handler.calls(), 4);
    let error = record.error_message.unwrap();
    assert!(error.contains("peer offline"));
    assert!(error.contains("gave up after 4 attempts"));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_fatal_failure_is_not_retried() {
    let test = TestQueue::with_concurrency(3);
    let handler = ScriptedHandler::downloads([Step::Outcome(JobOutcome::fatal("no such track"))]);
    let pool = start_pool(&test, handler.clone());
    let id = test.enqueue("missing", Priority::NORMAL).await;

    wait_for_status(&test, id, JobStatus::Failed).await;
    let record = test.record(id).await;
    assert_eq!(record.attempt_count, 0);
    assert_eq!(record.error_message.as_deref(), Some("no such track"));
    assert_eq!(handler.calls(), 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_panicking_handler_is_retried() {
    let test = TestQueue::with_concurrency(3);
    let handler = ScriptedHandler::downloads([Step::Panic("decoder exploded")]);
    let pool = start_pool(&test, handler.clone());
    let id = test.enqueue("panics", Priority::NORMAL).await;

    wait_for("the panic to be recorded", || {
        test.current(id).is_some_and(|record| record.attempt_count == 1)
    })
    .await;
    let record = test.record(id).await;
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(
        record.error_message.as_deref(),
        Some("handler panicked: decoder exploded")
    );
    assert_eq!(handler.running(), 0);

    test.clock.advance(Duration::from_secs(1));
    wait_for_status(&test, id, JobStatus::Succeeded).await;
    assert_eq!(handler.calls(), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_retry_hint_longer_than_backoff_is_honoured() {
    let test = TestQueue::with_concurrency(3);
    let handler = ScriptedHandler::downloads([Step::Outcome(JobOutcome::RetryableFailure {
        reason: "rate limited".to_string(),
        retry_after: Some(Duration::from_secs(30)),
    })]);
    let pool = start_pool(&test, handler.clone());
    let id = test.enqueue("throttled", Priority::NORMAL).await;

    wait_for("the job to be requeued", || {
        test.current(id).is_some_and(|record| record.attempt_count == 1)
    })
    .await;
    assert_eq!(test.backoff_of(id).await, Duration::from_secs(30));

    test.clock.advance(Duration::from_secs(29));
    tokio::time::sleep(IDLE_POLL * 3).await;
    assert_eq!(handler.calls(), 1);

    test.clock.advance(Duration::from_secs(1));
    wait_for_status(&test, id, JobStatus::Succeeded).await;
    assert_eq!(handler.calls(), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_absurd_retry_hint_does_not_stall_the_queue() {
    let test = TestQueue::with_concurrency(1);
    let handler = ScriptedHandler::downloads([Step::Outcome(JobOutcome::RetryableFailure {
        reason: "come back much later".to_string(),
        retry_after: Some(Duration::from_secs(9_000_000_000_000)),
    })]);
    let pool = start_pool(&test, handler.clone());
    let first = test.enqueue("first", Priority::HIGH).await;
    let second = test.enqueue("second", Priority::LOW).await;

    wait_for_status(&test, second, JobStatus::Succeeded).await;
    let record = test.record(first).await;
    assert_eq!(record.status, JobStatus::Queued);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(test.backoff_of(first).await, MAX_RETRY_AFTER);
    assert_eq!(test.queue.snapshot().active, 0);

    pool.shutdown().await;
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_running_jobs_stay_within_limit() {
    let test = TestQueue::with_concurrency(2);
    let handler = ScriptedHandler::downloads(std::iter::repeat(Step::Hold).take(5));
    let pool = start_pool(&test, handler.clone());

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(test.enqueue(&format!("track {}", i), Priority::NORMAL).await);
    }

    wait_for("two jobs to run", || handler.running() == 2).await;
    tokio::time::sleep(IDLE_POLL * 3).await;
    assert_eq!(handler.running(), 2);
    assert_eq!(test.queue.snapshot().running, 2);

    handler.release(5);
    for id in &ids {
        wait_for_status(&test, *id, JobStatus::Succeeded).await;
    }
    assert_eq!(handler.peak(), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_raising_the_limit_starts_more_jobs() {
    let test = TestQueue::with_concurrency(1);
    let handler = ScriptedHandler::downloads(std::iter::repeat(Step::Hold).take(3));
    let pool = start_pool(&test, handler.clone());
    for i in 0..3 {
        test.enqueue(&format!("track {}", i), Priority::NORMAL).await;
    }

    wait_for("one job to run", || handler.running() == 1).await;
    assert_eq!(test.queue.set_max_concurrent(3), 3);
    wait_for("three jobs to run", || handler.running() == 3).await;

    handler.release(3);
    wait_for("all jobs to finish", || test.queue.snapshot().succeeded == 3).await;

    pool.shutdown().await;
}

// =============================================================================
// Pause, Cancel, Shutdown
// =============================================================================

#[tokio::test]
async fn test_pausing_a_running_job_keeps_its_attempts() {
    let test = TestQueue::with_concurrency(3);
    let handler = ScriptedHandler::downloads([Step::WaitForInterrupt]);
    let pool = start_pool(&test, handler.clone());
    let id = test.enqueue("long download", Priority::NORMAL).await;

    wait_for_status(&test, id, JobStatus::Running).await;
    test.queue.pause(id).await.unwrap();
    wait_for_status(&test, id, JobStatus::Paused).await;

    let record = test.record(id).await;
    assert_eq!(record.attempt_count, 0);
    assert_eq!(test.queue.snapshot().active, 0);

    test.queue.resume(id).await.unwrap();
    wait_for_status(&test, id, JobStatus::Succeeded).await;
    assert_eq!(handler.calls(), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_cancelling_a_running_job() {
    let test = TestQueue::with_concurrency(3);
    let handler = ScriptedHandler::downloads([Step::WaitForInterrupt]);
    let pool = start_pool(&test, handler.clone());
    let id = test.enqueue("unwanted", Priority::NORMAL).await;

    wait_for_status(&test, id, JobStatus::Running).await;
    test.queue.cancel(id).await.unwrap();
    wait_for_status(&test, id, JobStatus::Cancelled).await;
    assert_eq!(handler.calls(), 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_global_pause_holds_new_work() {
    let test = TestQueue::with_concurrency(3);
    let handler = Arc::new(ScriptedHandler::new(JobKind::Download));
    let pool = start_pool(&test, handler.clone());

    test.queue.pause_all();
    let id = test.enqueue("waits", Priority::NORMAL).await;
    tokio::time::sleep(IDLE_POLL * 3).await;
    assert_eq!(test.status(id).await, JobStatus::Queued);
    assert_eq!(handler.calls(), 0);

    test.queue.resume_all();
    wait_for_status(&test, id, JobStatus::Succeeded).await;

    pool.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_returns_running_jobs_to_the_queue() {
    let test = TestQueue::with_concurrency(3);
    let handler = ScriptedHandler::downloads([Step::WaitForInterrupt, Step::WaitForInterrupt]);
    let pool = start_pool(&test, handler.clone());
    let first = test.enqueue("first", Priority::NORMAL).await;
    let second = test.enqueue("second", Priority::NORMAL).await;

    wait_for("both jobs to run", || handler.running() == 2).await;
    tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
        .await
        .expect("shutdown did not finish");

    for id in [first, second] {
        let record = test.record(id).await;
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.attempt_count, 0);
    }
    assert_eq!(test.queue.snapshot().active, 0);
}

#[tokio::test]
async fn test_missing_handler_fails_the_job() {
    let test = TestQueue::with_concurrency(3);
    let handler = Arc::new(ScriptedHandler::new(JobKind::MetadataEnrich));
    let pool = start_pool(&test, handler);
    let id = test.enqueue("orphan kind", Priority::NORMAL).await;

    wait_for_status(&test, id, JobStatus::Failed).await;
    let error = test.record(id).await.error_message.unwrap();
    assert!(error.contains("no handler registered"));

    pool.shutdown().await;
}
