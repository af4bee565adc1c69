use std::path::Path;

use async_trait::async_trait;
use soulbridge_slskd_client::{SearchResponse, SlskdClient, TransferState};

use super::{DownloadSource, SearchResult, TransferHandle, TransferStatus};
use crate::error::WorkerResult;
use crate::job::TrackQuery;

/// One result per offered file, peer details copied onto each
fn flatten(responses: Vec<SearchResponse>) -> Vec<SearchResult> {
    responses
        .into_iter()
        .flat_map(|peer| {
            let SearchResponse {
                username,
                has_free_upload_slot,
                queue_length,
                upload_speed,
                files,
            } = peer;
            files.into_iter().map(move |file| SearchResult {
                username: username.clone(),
                format: file.format(),
                filename: file.filename,
                size: file.size,
                bitrate: file.bit_rate,
                duration_secs: file.length,
                has_free_slot: has_free_upload_slot,
                queue_length,
                upload_speed,
            })
        })
        .collect()
}

/// Last component of a backslash or slash separated remote path
fn remote_basename(filename: &str) -> &str {
    filename
        .rsplit(|c: char| c == '\\' || c == '/')
        .next()
        .unwrap_or(filename)
}

#[async_trait]
impl DownloadSource for SlskdClient {
    async fn search(&self, query: &TrackQuery) -> WorkerResult<Vec<SearchResult>> {
        let responses = SlskdClient::search(self, &query.search_text()).await?;
        Ok(flatten(responses))
    }

    async fn begin_download(
        &self,
        candidate: &SearchResult,
        target_dir: &Path,
    ) -> WorkerResult<TransferHandle> {
        let id = self
            .enqueue_download(&candidate.username, &candidate.filename, candidate.size)
            .await?;
        Ok(TransferHandle {
            username: candidate.username.clone(),
            id,
            target_path: target_dir.join(remote_basename(&candidate.filename)),
        })
    }

    async fn poll(&self, transfer: &TransferHandle) -> WorkerResult<TransferStatus> {
        let current = self.transfer(&transfer.username, &transfer.id).await?;
        Ok(match current.state_kind() {
            TransferState::Queued => TransferStatus::Queued,
            TransferState::InProgress => TransferStatus::InProgress {
                percent: current.percent_complete,
            },
            TransferState::Succeeded => TransferStatus::Completed,
            TransferState::Failed => TransferStatus::Failed(current.state),
            TransferState::Cancelled => TransferStatus::Cancelled,
        })
    }

    async fn cancel(&self, transfer: &TransferHandle) -> WorkerResult<()> {
        self.cancel_download(&transfer.username, &transfer.id)
            .await?;
        Ok(())
    }
}
