//! Job queue integration tests
//!
//! This module tests the queue as producers and control callers see it:
//! - Claim order by priority, then creation time
//! - Write-through persistence of every transition
//! - Global pause and per-job control

mod common;

use std::collections::HashSet;
use std::time::Duration;

use assert_matches::assert_matches;
use rstest::rstest;

use common::{download_payload, TestQueue};
use soulbridge_worker::error::WorkerError;
use soulbridge_worker::job::{JobId, JobPayload, JobStatus, Priority};
use soulbridge_worker::queue::{Completion, QueueSettings};
use soulbridge_worker::store::JobStore;

fn priority(value: u8) -> Priority {
    Priority::new(value).expect("valid priority")
}

// =============================================================================
// Claim Order
// =============================================================================

#[tokio::test]
async fn test_claims_follow_priority_then_submission_order() {
    let test = TestQueue::with_concurrency(10);
    let mut ids = Vec::new();
    for (title, value) in [("a", 2), ("b", 0), ("c", 1), ("d", 0), ("e", 2)] {
        ids.push(test.enqueue(title, priority(value)).await);
    }

    let mut claimed = Vec::new();
    while let Some(job) = test.queue.try_claim().await {
        claimed.push((job.record.id, job.record.priority.value()));
    }

    assert_eq!(
        claimed,
        vec![
            (ids[1], 0),
            (ids[3], 0),
            (ids[2], 1),
            (ids[0], 2),
            (ids[4], 2)
        ]
    );
}

#[tokio::test]
async fn test_older_job_wins_within_a_priority() {
    let test = TestQueue::with_concurrency(10);
    let older = test.enqueue("older", Priority::LOW).await;
    test.clock.advance(Duration::from_secs(1));
    let newer = test.enqueue("newer", Priority::LOW).await;

    assert_eq!(test.queue.try_claim().await.unwrap().record.id, older);
    assert_eq!(test.queue.try_claim().await.unwrap().record.id, newer);
}

#[rstest]
#[case(3)]
#[case(1)]
#[tokio::test]
async fn test_active_jobs_never_exceed_limit(#[case] limit: usize) {
    let test = TestQueue::with_concurrency(limit);
    for i in 0..5 {
        test.enqueue(&format!("track {}", i), Priority::NORMAL).await;
    }

    let mut claimed = Vec::new();
    while let Some(job) = test.queue.try_claim().await {
        claimed.push(job);
    }
    assert_eq!(claimed.len(), limit);
    assert_eq!(test.queue.snapshot().active, limit);

    test.queue
        .complete(claimed[0].record.id, Completion::Succeeded)
        .await
        .unwrap();
    assert!(test.queue.try_claim().await.is_some());
    assert!(test.queue.try_claim().await.is_none());
}

#[tokio::test]
async fn test_retried_job_keeps_its_place_by_creation_time() {
    let test = TestQueue::with_concurrency(10);
    let older = test.enqueue("older", Priority::NORMAL).await;
    test.queue.pause(older).await.unwrap();
    test.clock.advance(Duration::from_secs(1));
    let retried = test.enqueue("retried", Priority::NORMAL).await;

    assert_eq!(test.queue.try_claim().await.unwrap().record.id, retried);
    test.queue
        .requeue_with_delay(retried, Duration::from_secs(1), "peer offline")
        .await
        .unwrap();
    test.queue.resume(older).await.unwrap();
    test.clock.advance(Duration::from_secs(1));
    let newer = test.enqueue("newer", Priority::NORMAL).await;

    let mut claimed = Vec::new();
    while let Some(job) = test.queue.try_claim().await {
        claimed.push(job.record.id);
    }
    assert_eq!(claimed, vec![older, retried, newer]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_hand_out_a_job_twice() {
    let test = TestQueue::with_concurrency(10);
    for i in 0..10 {
        test.enqueue(&format!("track {}", i), Priority::NORMAL).await;
    }

    let claimers: Vec<_> = (0..20)
        .map(|_| {
            let queue = test.queue.clone();
            tokio::spawn(async move { queue.try_claim().await.map(|job| job.record.id) })
        })
        .collect();

    let mut claimed = Vec::new();
    for claimer in claimers {
        if let Some(id) = claimer.await.unwrap() {
            claimed.push(id);
        }
    }

    let unique: HashSet<JobId> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 10);
    assert_eq!(unique.len(), 10);
    assert_eq!(test.queue.snapshot().running, 10);
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_transitions_are_written_through() {
    let test = TestQueue::with_concurrency(3);
    let id = test.enqueue("a", Priority::NORMAL).await;

    let stored = test.store.load(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.max_retries, 3);

    test.queue.try_claim().await.unwrap();
    assert_eq!(
        test.store.load(id).await.unwrap().unwrap().status,
        JobStatus::Running
    );

    test.queue
        .requeue_with_delay(id, Duration::from_secs(1), "peer went offline")
        .await
        .unwrap();
    let stored = test.store.load(id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(stored.error_message.as_deref(), Some("peer went offline"));

    test.clock.advance(Duration::from_secs(1));
    test.queue.try_claim().await.unwrap();
    test.queue
        .complete(id, Completion::Failed("gave up".to_string()))
        .await
        .unwrap();
    assert_eq!(
        test.store.load(id).await.unwrap().unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_invalid_payloads_are_rejected() {
    let test = TestQueue::with_concurrency(3);
    let playlist = JobPayload::PlaylistSync {
        playlist_id: "not/a/playlist".to_string(),
        target_dir: common::TARGET_DIR.into(),
        download_priority: Priority::NORMAL,
    };

    assert_matches!(
        test.queue.submit(playlist).await,
        Err(WorkerError::InvalidPayload(_))
    );
    assert_matches!(
        test.queue.submit(download_payload("  ")).await,
        Err(WorkerError::InvalidPayload(_))
    );
    assert!(test.store.is_empty());
}

#[tokio::test]
async fn test_status_of_unknown_job() {
    let test = TestQueue::with_concurrency(3);
    assert_matches!(
        test.queue.get_status(JobId::new()).await,
        Err(WorkerError::NotFound(_))
    );
}

// =============================================================================
// Control
// =============================================================================

#[tokio::test]
async fn test_pause_all_is_idempotent() {
    let test = TestQueue::with_concurrency(3);
    test.enqueue("a", Priority::NORMAL).await;

    let first = test.queue.pause_all();
    let second = test.queue.pause_all();
    assert!(first.globally_paused);
    assert_eq!(first, second);
    assert!(test.queue.try_claim().await.is_none());

    let resumed = test.queue.resume_all();
    assert!(!resumed.globally_paused);
    assert_eq!(test.queue.resume_all(), resumed);
    assert!(test.queue.try_claim().await.is_some());
}

#[tokio::test]
async fn test_paused_job_keeps_its_place_after_resume() {
    let test = TestQueue::with_concurrency(1);
    let paused = test.enqueue("paused", Priority::HIGH).await;
    let other = test.enqueue("other", Priority::LOW).await;

    test.queue.pause(paused).await.unwrap();
    let claimed = test.queue.try_claim().await.unwrap();
    assert_eq!(claimed.record.id, other);
    test.queue
        .complete(other, Completion::Succeeded)
        .await
        .unwrap();

    test.queue.resume(paused).await.unwrap();
    assert_eq!(test.queue.try_claim().await.unwrap().record.id, paused);
}

#[tokio::test]
async fn test_cancel_queued_and_paused_jobs() {
    let test = TestQueue::with_concurrency(3);
    let queued = test.enqueue("queued", Priority::NORMAL).await;
    let paused = test.enqueue("paused", Priority::NORMAL).await;
    test.queue.pause(paused).await.unwrap();

    test.queue.cancel(queued).await.unwrap();
    test.queue.cancel(paused).await.unwrap();

    let snapshot = test.queue.snapshot();
    assert_eq!(snapshot.cancelled, 2);
    assert_eq!(snapshot.count(JobStatus::Queued), 0);
    assert_matches!(
        test.queue.resume(queued).await,
        Err(WorkerError::InvalidState {
            status: JobStatus::Cancelled,
            ..
        })
    );
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let test = TestQueue::with_concurrency(3);
    let first = test.enqueue("first", Priority::NORMAL).await;
    let second = test.enqueue("second", Priority::HIGH).await;
    test.queue.pause(first).await.unwrap();

    let all: Vec<JobId> = test.queue.list(None).iter().map(|job| job.id).collect();
    assert_eq!(all, vec![second, first]);

    let paused = test.queue.list(Some(JobStatus::Paused));
    assert_eq!(paused.len(), 1);
    assert_eq!(paused[0].id, first);
}

#[tokio::test]
async fn test_settings_default_retry_budget() {
    let test = TestQueue::new(QueueSettings {
        default_max_retries: 7,
        ..QueueSettings::default()
    });
    let id = test.queue.submit(download_payload("a")).await.unwrap();
    let record = test.record(id).await;
    assert_eq!(record.max_retries, 7);
    assert_eq!(record.priority, Priority::NORMAL);
}
