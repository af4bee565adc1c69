//! MusicBrainz web service client for Soulbridge
//!
//! This crate looks up recordings by MBID so downloaded files can be tagged
//! with canonical metadata.
//!
//! # Example
//!
//! ```rust,no_run
//! use soulbridge_musicbrainz_client::MusicBrainzClient;
//! use soulbridge_shared_config::MusicBrainzConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MusicBrainzClient::new(&MusicBrainzConfig::default())?;
//!
//! let recording = client
//!     .lookup_recording("b1a9c0e9-d987-4042-ae91-78d6a3267d69")
//!     .await?;
//! println!("{} by {}", recording.title, recording.artist_name());
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `MUSICBRAINZ_URL`: web service base URL (default: https://musicbrainz.org)
//! - `MUSICBRAINZ_USER_AGENT`: contact user agent required by MusicBrainz

mod client;
mod error;
mod models;

pub use client::MusicBrainzClient;
pub use error::{MusicBrainzError, MusicBrainzResult};
pub use models::{ArtistCredit, Recording, ReleaseSummary};
