//! Download handler
//!
//! Searches the download network for the requested track, picks the best
//! offered file and follows the transfer until it completes. Every network
//! call goes through the `slskd` circuit breaker, and the job token is
//! watched throughout so a pause, cancel or shutdown stops the transfer.

use std::cmp::Reverse;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::JobHandler;
use crate::breaker::BreakerRegistry;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobKind, JobOutcome, JobPayload, JobRecord, TrackQuery};
use crate::pause::JobToken;
use crate::sources::{DownloadSource, SearchResult, TransferHandle, TransferStatus, SLSKD};

/// Extensions treated as audio
const AUDIO_FORMATS: &[&str] = &[
    "flac", "mp3", "m4a", "aac", "ogg", "opus", "wav", "aiff", "alac", "wma",
];

/// Largest accepted difference between expected and offered length
const DURATION_TOLERANCE_SECS: u64 = 15;

/// Consecutive transient poll errors tolerated before giving up
const MAX_POLL_ERRORS: u32 = 5;

/// Longest a single transfer is followed, whatever the configured timeout
pub const MAX_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub poll_interval: Duration,
    /// Whole transfer, from enqueue to completion
    pub timeout: Duration,
    /// Used when the payload names no formats
    pub preferred_formats: Vec<String>,
    /// Used when the payload sets no minimum
    pub min_bitrate: Option<u32>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30 * 60),
            preferred_formats: vec!["flac".to_string(), "mp3".to_string()],
            min_bitrate: None,
        }
    }
}

/// Filter and order search results, best candidate first
///
/// Non-audio files, files below `min_bitrate` (when the bitrate is known) and
/// files whose length is off by more than 15 seconds are dropped. The rest
/// are ordered by preferred format, closeness of length, free upload slot,
/// queue length, bitrate and upload speed.
pub fn rank_candidates(
    results: Vec<SearchResult>,
    track: &TrackQuery,
    preferred_formats: &[String],
    min_bitrate: Option<u32>,
) -> Vec<SearchResult> {
    let expected_secs = track.duration_ms.map(|ms| ms / 1000);
    let duration_diff = |result: &SearchResult| -> Option<u64> {
        match (expected_secs, result.duration_secs) {
            (Some(expected), Some(actual)) => Some(expected.abs_diff(u64::from(actual))),
            _ => None,
        }
    };
    let format_rank = |result: &SearchResult| -> usize {
        result
            .format
            .as_deref()
            .and_then(|format| {
                preferred_formats
                    .iter()
                    .position(|preferred| preferred.eq_ignore_ascii_case(format))
            })
            .unwrap_or(preferred_formats.len())
    };

    let mut candidates: Vec<SearchResult> = results
        .into_iter()
        .filter(|result| {
            result
                .format
                .as_deref()
                .is_some_and(|format| AUDIO_FORMATS.contains(&format))
        })
        .filter(|result| match (min_bitrate, result.bitrate) {
            (Some(min), Some(bitrate)) => bitrate >= min,
            _ => true,
        })
        .filter(|result| duration_diff(result).map_or(true, |diff| diff <= DURATION_TOLERANCE_SECS))
        .collect();

    candidates.sort_by_key(|result| {
        (
            format_rank(result),
            duration_diff(result).unwrap_or(u64::MAX),
            !result.has_free_slot,
            result.queue_length,
            Reverse(result.bitrate.unwrap_or(0)),
            Reverse(result.upload_speed),
        )
    });
    candidates
}

/// Handler for [`JobKind::Download`]
pub struct DownloadHandler {
    source: Arc<dyn DownloadSource>,
    breakers: Arc<BreakerRegistry>,
    settings: DownloadSettings,
}

impl DownloadHandler {
    pub fn new(
        source: Arc<dyn DownloadSource>,
        breakers: Arc<BreakerRegistry>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            source,
            breakers,
            settings,
        }
    }

    /// Run a source call through the slskd breaker
    ///
    /// Only transient errors count against the breaker.
    async fn guarded<T, F, Fut>(&self, f: F) -> WorkerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WorkerResult<T>>,
    {
        self.breakers
            .get(SLSKD)
            .call_filtered(f, WorkerError::is_retryable)
            .await
            .map_err(WorkerError::from)
    }

    async fn cancel_transfer(&self, handle: &TransferHandle) {
        if let Err(e) = self.guarded(|| self.source.cancel(handle)).await {
            warn!(transfer_id = %handle.id, error = %e, "Failed to cancel transfer");
        }
    }

    async fn run(
        &self,
        track: &TrackQuery,
        target_dir: &Path,
        preferred_formats: &[String],
        min_bitrate: Option<u32>,
        token: &JobToken,
    ) -> WorkerResult<JobOutcome> {
        if token.checkpoint().is_err() {
            return Ok(JobOutcome::Cancelled);
        }

        info!(query = %track.search_text(), "Searching for track");
        let results = tokio::select! {
            biased;
            _ = token.interrupted() => return Ok(JobOutcome::Cancelled),
            results = self.guarded(|| self.source.search(track)) => results?,
        };

        let offered = results.len();
        let candidates = rank_candidates(results, track, preferred_formats, min_bitrate);
        let Some(best) = candidates.first() else {
            return Ok(JobOutcome::fatal(format!(
                "no acceptable candidates for '{}' ({} results)",
                track, offered
            )));
        };
        debug!(
            offered,
            acceptable = candidates.len(),
            username = %best.username,
            filename = %best.filename,
            "Selected download candidate"
        );

        if token.checkpoint().is_err() {
            return Ok(JobOutcome::Cancelled);
        }

        let handle = self
            .guarded(|| self.source.begin_download(best, target_dir))
            .await?;
        info!(
            transfer_id = %handle.id,
            username = %handle.username,
            "Download started"
        );

        self.follow(&handle, token).await
    }

    /// Poll a transfer until it settles, the timeout passes or the job is
    /// interrupted
    async fn follow(&self, handle: &TransferHandle, token: &JobToken) -> WorkerResult<JobOutcome> {
        let timeout = self.settings.timeout.min(MAX_DOWNLOAD_TIMEOUT);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut poll_errors = 0;

        loop {
            tokio::select! {
                biased;
                reason = token.interrupted() => {
                    info!(transfer_id = %handle.id, reason = %reason, "Download interrupted");
                    self.cancel_transfer(handle).await;
                    return Ok(JobOutcome::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.cancel_transfer(handle).await;
                    return Ok(JobOutcome::retryable(format!(
                        "download timed out after {}s",
                        timeout.as_secs()
                    )));
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            match self.guarded(|| self.source.poll(handle)).await {
                Ok(TransferStatus::Completed) => {
                    return Ok(JobOutcome::success(format!(
                        "downloaded {} from {}",
                        handle.target_path.display(),
                        handle.username
                    )));
                }
                Ok(TransferStatus::Failed(state)) => {
                    return Ok(JobOutcome::retryable(format!(
                        "transfer from {} failed: {}",
                        handle.username, state
                    )));
                }
                Ok(TransferStatus::Cancelled) => {
                    return Ok(JobOutcome::retryable(format!(
                        "transfer from {} was cancelled remotely",
                        handle.username
                    )));
                }
                Ok(status) => {
                    poll_errors = 0;
                    if let TransferStatus::InProgress { percent } = status {
                        debug!(transfer_id = %handle.id, percent, "Download progress");
                    }
                }
                Err(e) if e.is_retryable() && poll_errors < MAX_POLL_ERRORS => {
                    poll_errors += 1;
                    warn!(transfer_id = %handle.id, error = %e, poll_errors, "Transfer poll failed");
                }
                Err(e) => {
                    self.cancel_transfer(handle).await;
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for DownloadHandler {
    fn kind(&self) -> JobKind {
        JobKind::Download
    }

    async fn handle(&self, job: &JobRecord, token: JobToken) -> JobOutcome {
        let JobPayload::Download {
            track,
            target_dir,
            min_bitrate,
            preferred_formats,
        } = &job.payload
        else {
            return JobOutcome::fatal(format!("download handler cannot run {} jobs", job.kind()));
        };

        let formats = if preferred_formats.is_empty() {
            &self.settings.preferred_formats
        } else {
            preferred_formats
        };
        let min_bitrate = min_bitrate.or(self.settings.min_bitrate);

        match self
            .run(track, target_dir, formats, min_bitrate, &token)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                e.log();
                JobOutcome::from_error(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn result(username: &str, format: &str) -> SearchResult {
        SearchResult {
            username: username.to_string(),
            filename: format!("Music\\{}\\track.{}", username, format),
            size: 10_000_000,
            format: Some(format.to_string()),
            bitrate: None,
            duration_secs: Some(215),
            has_free_slot: true,
            queue_length: 0,
            upload_speed: 1_000_000,
        }
    }

    fn track() -> TrackQuery {
        TrackQuery::new("Artist", "Title").with_duration_ms(215_000)
    }

    fn formats() -> Vec<String> {
        vec!["flac".to_string(), "mp3".to_string()]
    }

    fn names(ranked: &[SearchResult]) -> Vec<&str> {
        ranked.iter().map(|r| r.username.as_str()).collect()
    }

    #[test]
    fn test_preferred_format_wins() {
        let ranked = rank_candidates(
            vec![result("ogg", "ogg"), result("mp3", "mp3"), result("flac", "flac")],
            &track(),
            &formats(),
            None,
        );
        assert_eq!(names(&ranked), vec!["flac", "mp3", "ogg"]);
    }

    #[test]
    fn test_non_audio_is_dropped() {
        let ranked = rank_candidates(
            vec![result("cover", "jpg"), result("log", "cue"), result("ok", "mp3")],
            &track(),
            &formats(),
            None,
        );
        assert_eq!(names(&ranked), vec!["ok"]);
    }

    #[rstest]
    #[case(Some(320), true)]
    #[case(Some(128), false)]
    #[case(None, true)]
    fn test_min_bitrate_only_filters_known_bitrates(#[case] bitrate: Option<u32>, #[case] kept: bool) {
        let mut candidate = result("peer", "mp3");
        candidate.bitrate = bitrate;
        let ranked = rank_candidates(vec![candidate], &track(), &formats(), Some(256));
        assert_eq!(ranked.len() == 1, kept);
    }

    #[rstest]
    #[case(215, true)]
    #[case(230, true)]
    #[case(231, false)]
    #[case(60, false)]
    fn test_duration_tolerance(#[case] secs: u32, #[case] kept: bool) {
        let mut candidate = result("peer", "flac");
        candidate.duration_secs = Some(secs);
        let ranked = rank_candidates(vec![candidate], &track(), &formats(), None);
        assert_eq!(ranked.len() == 1, kept);
    }

    #[test]
    fn test_availability_breaks_format_ties() {
        let mut busy = result("busy", "flac");
        busy.has_free_slot = false;
        busy.queue_length = 40;
        let mut queued = result("queued", "flac");
        queued.queue_length = 3;
        let free = result("free", "flac");

        let ranked = rank_candidates(vec![busy, queued, free], &track(), &formats(), None);
        assert_eq!(names(&ranked), vec!["free", "queued", "busy"]);
    }

    #[test]
    fn test_closer_duration_ranks_first() {
        let mut off = result("off", "flac");
        off.duration_secs = Some(225);
        let exact = result("exact", "flac");

        let ranked = rank_candidates(vec![off, exact], &track(), &formats(), None);
        assert_eq!(names(&ranked), vec!["exact", "off"]);
    }
}
