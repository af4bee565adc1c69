//! Typed job payloads, one variant per job type

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::record::Priority;
use crate::error::{WorkerError, WorkerResult};

/// Maximum length of free-text payload fields
const MAX_FIELD_LENGTH: usize = 512;

/// Job type discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Download,
    MetadataEnrich,
    PlaylistSync,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::MetadataEnrich => "metadata_enrich",
            Self::PlaylistSync => "playlist_sync",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to look for on the download network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackQuery {
    pub artist: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Expected length, used to rank candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,
}

impl TrackQuery {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            album: None,
            duration_ms: None,
            spotify_id: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_spotify_id(mut self, spotify_id: impl Into<String>) -> Self {
        self.spotify_id = Some(spotify_id.into());
        self
    }

    /// Text sent to the search network
    pub fn search_text(&self) -> String {
        format!("{} {}", self.artist.trim(), self.title.trim())
    }
}

impl fmt::Display for TrackQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// Where enrichment metadata comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSourceKind {
    MusicBrainz,
    Spotify,
}

impl MetadataSourceKind {
    /// Circuit breaker name guarding this source
    pub fn dependency(&self) -> &'static str {
        match self {
            Self::MusicBrainz => crate::sources::MUSICBRAINZ,
            Self::Spotify => crate::sources::SPOTIFY,
        }
    }
}

impl fmt::Display for MetadataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dependency())
    }
}

/// Job payload; the variant is the job type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Fetch one track from the download network
    Download {
        track: TrackQuery,
        target_dir: PathBuf,
        #[serde(default)]
        min_bitrate: Option<u32>,
        #[serde(default)]
        preferred_formats: Vec<String>,
    },
    /// Look up canonical metadata for a track
    MetadataEnrich {
        source: MetadataSourceKind,
        reference: String,
        #[serde(default)]
        file_path: Option<PathBuf>,
    },
    /// Turn a playlist into download jobs
    PlaylistSync {
        playlist_id: String,
        target_dir: PathBuf,
        #[serde(default)]
        download_priority: Priority,
    },
}

impl JobPayload {
    /// Download payload with no format or bitrate preference
    pub fn download(track: TrackQuery, target_dir: impl Into<PathBuf>) -> Self {
        Self::Download {
            track,
            target_dir: target_dir.into(),
            min_bitrate: None,
            preferred_formats: Vec::new(),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Download { .. } => JobKind::Download,
            Self::MetadataEnrich { .. } => JobKind::MetadataEnrich,
            Self::PlaylistSync { .. } => JobKind::PlaylistSync,
        }
    }

    /// Reject payloads no handler could act on
    pub fn validate(&self) -> WorkerResult<()> {
        match self {
            Self::Download {
                track, target_dir, ..
            } => {
                require_text("track.artist", &track.artist)?;
                require_text("track.title", &track.title)?;
                require_path("target_dir", target_dir)
            }
            Self::MetadataEnrich {
                source, reference, ..
            } => {
                require_text("reference", reference)?;
                match source {
                    MetadataSourceKind::MusicBrainz => {
                        uuid::Uuid::parse_str(reference.trim()).map_err(|_| {
                            WorkerError::InvalidPayload(format!(
                                "MusicBrainz reference must be an MBID, got '{}'",
                                reference
                            ))
                        })?;
                    }
                    MetadataSourceKind::Spotify => require_base62("reference", reference)?,
                }
                Ok(())
            }
            Self::PlaylistSync {
                playlist_id,
                target_dir,
                ..
            } => {
                require_base62("playlist_id", playlist_id)?;
                require_path("target_dir", target_dir)
            }
        }
    }
}

fn require_text(field: &str, value: &str) -> WorkerResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkerError::InvalidPayload(format!("{} is required", field)));
    }
    if trimmed.len() > MAX_FIELD_LENGTH {
        return Err(WorkerError::InvalidPayload(format!(
            "{} too long (max {} characters)",
            field, MAX_FIELD_LENGTH
        )));
    }
    Ok(())
}

fn require_path(field: &str, value: &std::path::Path) -> WorkerResult<()> {
    if value.as_os_str().is_empty() {
        return Err(WorkerError::InvalidPayload(format!("{} is required", field)));
    }
    Ok(())
}

fn require_base62(field: &str, value: &str) -> WorkerResult<()> {
    require_text(field, value)?;
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WorkerError::InvalidPayload(format!(
            "{} must be alphanumeric, got '{}'",
            field, value
        )));
    }
    Ok(())
}
