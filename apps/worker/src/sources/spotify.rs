use async_trait::async_trait;
use soulbridge_spotify_client::{SpotifyClient, SpotifyError, SpotifyTrack};

use super::{LookupResult, Metadata, MetadataSource, PlaylistSource};
use crate::error::WorkerResult;
use crate::job::{MetadataSourceKind, TrackQuery};

impl From<SpotifyTrack> for Metadata {
    fn from(track: SpotifyTrack) -> Self {
        Self {
            source: MetadataSourceKind::Spotify,
            artist: track.artist_name(),
            reference: track.id,
            title: track.name,
            album: track.album,
            release_date: track.release_date,
            duration_ms: Some(track.duration_ms).filter(|ms| *ms > 0),
            isrc: track.isrc,
        }
    }
}

/// Search query for a playlist entry; only the lead artist is searched for
impl From<SpotifyTrack> for TrackQuery {
    fn from(track: SpotifyTrack) -> Self {
        let artist = track.artists.first().cloned().unwrap_or_default();
        let mut query = TrackQuery::new(artist, track.name).with_spotify_id(track.id);
        if track.duration_ms > 0 {
            query = query.with_duration_ms(track.duration_ms);
        }
        if let Some(album) = track.album {
            query = query.with_album(album);
        }
        query
    }
}

#[async_trait]
impl MetadataSource for SpotifyClient {
    fn kind(&self) -> MetadataSourceKind {
        MetadataSourceKind::Spotify
    }

    async fn lookup(&self, reference: &str) -> WorkerResult<LookupResult> {
        match self.track(reference).await {
            Ok(track) => Ok(LookupResult::Found(track.into())),
            Err(SpotifyError::NotFound(_)) => Ok(LookupResult::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PlaylistSource for SpotifyClient {
    async fn playlist_tracks(&self, playlist_id: &str) -> WorkerResult<Vec<TrackQuery>> {
        let tracks = SpotifyClient::playlist_tracks(self, playlist_id).await?;
        Ok(tracks.into_iter().map(TrackQuery::from).collect())
    }
}
