use async_trait::async_trait;
use soulbridge_musicbrainz_client::{MusicBrainzClient, Recording};

use super::{LookupResult, Metadata, MetadataSource};
use crate::error::WorkerResult;
use crate::job::MetadataSourceKind;

impl From<Recording> for Metadata {
    fn from(recording: Recording) -> Self {
        let release = recording.first_release().cloned();
        Self {
            source: MetadataSourceKind::MusicBrainz,
            artist: recording.artist_name(),
            reference: recording.id,
            title: recording.title,
            album: release.as_ref().map(|r| r.title.clone()),
            release_date: release.and_then(|r| r.date),
            duration_ms: recording.length_ms,
            isrc: recording.isrcs.into_iter().next(),
        }
    }
}

#[async_trait]
impl MetadataSource for MusicBrainzClient {
    fn kind(&self) -> MetadataSourceKind {
        MetadataSourceKind::MusicBrainz
    }

    async fn lookup(&self, reference: &str) -> WorkerResult<LookupResult> {
        match self.lookup_recording(reference).await {
            Ok(recording) => Ok(LookupResult::Found(recording.into())),
            Err(e) if e.is_not_found() => Ok(LookupResult::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
