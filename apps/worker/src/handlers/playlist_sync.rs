use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::JobHandler;
use crate::breaker::BreakerRegistry;
use crate::error::{WorkerError, WorkerResult};
use crate::job::{JobKind, JobOutcome, JobPayload, JobRecord, Priority, TrackQuery};
use crate::pause::JobToken;
use crate::queue::JobQueue;
use crate::sources::{PlaylistSource, SPOTIFY};

/// Handler for [`JobKind::PlaylistSync`]
///
/// Lists the playlist and enqueues one download per track. Tracks that
/// already have an unfinished download job are skipped, so an interrupted
/// sync can simply run again.
pub struct PlaylistSyncHandler {
    source: Arc<dyn PlaylistSource>,
    queue: Arc<JobQueue>,
    breakers: Arc<BreakerRegistry>,
    download_max_retries: u32,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SyncTally {
    enqueued: usize,
    already_queued: usize,
    invalid: usize,
}

impl PlaylistSyncHandler {
    pub fn new(
        source: Arc<dyn PlaylistSource>,
        queue: Arc<JobQueue>,
        breakers: Arc<BreakerRegistry>,
        download_max_retries: u32,
    ) -> Self {
        Self {
            source,
            queue,
            breakers,
            download_max_retries,
        }
    }

    async fn fetch(&self, playlist_id: &str) -> WorkerResult<Vec<TrackQuery>> {
        self.breakers
            .get(SPOTIFY)
            .call_filtered(
                || self.source.playlist_tracks(playlist_id),
                WorkerError::is_retryable,
            )
            .await
            .map_err(WorkerError::from)
    }

    /// Spotify ids with a download that has not finished yet
    fn pending_spotify_ids(&self) -> HashSet<String> {
        self.queue
            .list(None)
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .filter_map(|job| match job.payload {
                JobPayload::Download { track, .. } => track.spotify_id,
                _ => None,
            })
            .collect()
    }

    async fn enqueue_all(
        &self,
        tracks: Vec<TrackQuery>,
        target_dir: &Path,
        priority: Priority,
        token: &JobToken,
    ) -> WorkerResult<Option<SyncTally>> {
        let mut pending = self.pending_spotify_ids();
        let mut tally = SyncTally::default();

        for track in tracks {
            if token.checkpoint().is_err() {
                info!(enqueued = tally.enqueued, "Playlist sync interrupted");
                return Ok(None);
            }

            if let Some(id) = &track.spotify_id {
                if !pending.insert(id.clone()) {
                    tally.already_queued += 1;
                    continue;
                }
            }

            let description = track.to_string();
            match self
                .queue
                .enqueue(
                    JobPayload::download(track, target_dir),
                    priority,
                    self.download_max_retries,
                )
                .await
            {
                Ok(_) => tally.enqueued += 1,
                Err(WorkerError::InvalidPayload(reason)) => {
                    warn!(track = %description, reason = %reason, "Skipping playlist track");
                    tally.invalid += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(tally))
    }
}

#[async_trait]
impl JobHandler for PlaylistSyncHandler {
    fn kind(&self) -> JobKind {
        JobKind::PlaylistSync
    }

    async fn handle(&self, job: &JobRecord, token: JobToken) -> JobOutcome {
        let JobPayload::PlaylistSync {
            playlist_id,
            target_dir,
            download_priority,
        } = &job.payload
        else {
            return JobOutcome::fatal(format!("playlist handler cannot run {} jobs", job.kind()));
        };

        let tracks = tokio::select! {
            biased;
            _ = token.interrupted() => return JobOutcome::Cancelled,
            tracks = self.fetch(playlist_id) => tracks,
        };
        let tracks = match tracks {
            Ok(tracks) => tracks,
            Err(e) => {
                e.log();
                return JobOutcome::from_error(&e);
            }
        };
        let total = tracks.len();

        match self
            .enqueue_all(tracks, target_dir, *download_priority, &token)
            .await
        {
            Ok(Some(tally)) => {
                info!(
                    playlist_id = %playlist_id,
                    total,
                    enqueued = tally.enqueued,
                    already_queued = tally.already_queued,
                    invalid = tally.invalid,
                    "Playlist synced"
                );
                JobOutcome::success(format!(
                    "enqueued {} downloads ({} already queued, {} skipped)",
                    tally.enqueued, tally.already_queued, tally.invalid
                ))
            }
            Ok(None) => JobOutcome::Cancelled,
            Err(e) => {
                e.log();
                JobOutcome::from_error(&e)
            }
        }
    }
}
