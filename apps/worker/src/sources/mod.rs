//! Collaborators the handlers talk to
//!
//! Handlers depend on these traits rather than on the HTTP clients so tests
//! can swap in scripted fakes. The real implementations live next to this
//! module, one per external service; every call a handler makes through them
//! is wrapped in the circuit breaker named by the constants below.

mod musicbrainz;
mod slskd;
mod spotify;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::WorkerResult;
use crate::job::{MetadataSourceKind, TrackQuery};

/// Breaker name for the slskd download bridge
pub const SLSKD: &str = "slskd";
/// Breaker name for the Spotify Web API
pub const SPOTIFY: &str = "spotify";
/// Breaker name for MusicBrainz
pub const MUSICBRAINZ: &str = "musicbrainz";

/// One downloadable file offered by a peer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub username: String,
    /// Remote path as the peer shares it
    pub filename: String,
    pub size: u64,
    /// Lowercase extension, e.g. `flac`
    pub format: Option<String>,
    /// kbps
    pub bitrate: Option<u32>,
    pub duration_secs: Option<u32>,
    pub has_free_slot: bool,
    pub queue_length: u32,
    /// Bytes per second
    pub upload_speed: u64,
}

/// A started transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHandle {
    pub username: String,
    pub id: String,
    /// Where the finished file is expected to be filed
    pub target_path: PathBuf,
}

/// Progress of a transfer
#[derive(Debug, Clone, PartialEq)]
pub enum TransferStatus {
    Queued,
    InProgress { percent: f64 },
    Completed,
    /// Errored or rejected by the peer
    Failed(String),
    /// Cancelled on the bridge side
    Cancelled,
}

/// Canonical track metadata from a metadata source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub source: MetadataSourceKind,
    pub reference: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: Option<u64>,
    pub isrc: Option<String>,
}

/// Outcome of a metadata lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Found(Metadata),
    /// The source answered and has nothing for this reference
    NotFound,
}

/// A network audio files can be downloaded from
#[async_trait]
pub trait DownloadSource: Send + Sync {
    /// Every file any peer offers for the query
    async fn search(&self, query: &TrackQuery) -> WorkerResult<Vec<SearchResult>>;

    /// Start downloading `candidate`
    async fn begin_download(
        &self,
        candidate: &SearchResult,
        target_dir: &Path,
    ) -> WorkerResult<TransferHandle>;

    async fn poll(&self, transfer: &TransferHandle) -> WorkerResult<TransferStatus>;

    /// Stop a transfer; stopping one that is already gone is not an error
    async fn cancel(&self, transfer: &TransferHandle) -> WorkerResult<()>;
}

/// A service that resolves a reference to track metadata
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn kind(&self) -> MetadataSourceKind;

    async fn lookup(&self, reference: &str) -> WorkerResult<LookupResult>;
}

/// A service that lists the tracks of a playlist
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn playlist_tracks(&self, playlist_id: &str) -> WorkerResult<Vec<TrackQuery>>;
}
