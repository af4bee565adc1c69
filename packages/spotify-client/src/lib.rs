//! Spotify Web API client for Soulbridge
//!
//! Read-only access to tracks and playlists using a bearer token obtained
//! elsewhere. Used to turn a playlist into download jobs.
//!
//! # Example
//!
//! ```rust,no_run
//! use soulbridge_shared_config::SpotifyConfig;
//! use soulbridge_spotify_client::SpotifyClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SpotifyClient::new(&SpotifyConfig::from_env()?)?;
//!
//! for track in client.playlist_tracks("37i9dQZF1DXcBWIGoYBM5M").await? {
//!     println!("{} - {}", track.artist_name(), track.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `SPOTIFY_ACCESS_TOKEN`: bearer token (required)
//! - `SPOTIFY_API_URL`: API base URL (default: https://api.spotify.com)

mod client;
mod error;
mod models;

pub use client::SpotifyClient;
pub use error::{SpotifyError, SpotifyResult};
pub use models::SpotifyTrack;
