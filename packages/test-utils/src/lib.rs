//! Shared test utilities for Soulbridge workspace
//!
//! This crate provides mock implementations of the external services the
//! worker talks to, so client and handler tests run without network access.
//!
//! # Mock Services
//!
//! - [`MockSlskdServer`] - Mock slskd server for search and transfer tests
//! - [`MockMusicBrainzServer`] - Mock MusicBrainz web service for lookups
//! - [`MockSpotifyServer`] - Mock Spotify Web API for tracks and playlists
//!
//! # Example
//!
//! ```rust,ignore
//! use soulbridge_test_utils::{MockSlskdServer, SlskdPeerFixture, SlskdFileFixture};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let slskd = MockSlskdServer::start().await;
//!     slskd
//!         .mock_search(vec![SlskdPeerFixture::new("peer").with_file(
//!             SlskdFileFixture::flac("Music\\Artist\\01 Song.flac", 215),
//!         )])
//!         .await;
//!
//!     // Use slskd.url() and slskd.api_key() to configure your client
//! }
//! ```

mod musicbrainz;
mod slskd;
mod spotify;

pub use musicbrainz::{MockMusicBrainzServer, RecordingFixture};
pub use slskd::{MockSlskdServer, SlskdFileFixture, SlskdPeerFixture, MOCK_SEARCH_ID};
pub use spotify::{MockSpotifyServer, SpotifyTrackFixture};
