//! Spotify Web API client implementation

use std::fmt;
use std::time::Duration;

use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use soulbridge_shared_config::SpotifyConfig;
use tracing::{debug, instrument, warn};

use crate::error::{SpotifyError, SpotifyResult};
use crate::models::{PlaylistTracksPage, RawTrack, SpotifyTrack};

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Page size for playlist item requests (Spotify maximum)
const PLAYLIST_PAGE_SIZE: usize = 100;

/// Upper bound on pages fetched for one playlist
const MAX_PLAYLIST_PAGES: usize = 100;

/// Spotify Web API client
#[derive(Clone)]
pub struct SpotifyClient {
    http_client: Client,
    config: SpotifyConfig,
}

impl fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("api_url", &self.config.api_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl SpotifyClient {
    /// Create a new Spotify client
    ///
    /// # Errors
    /// Returns `SpotifyError::InvalidInput` if the access token is empty
    pub fn new(config: &SpotifyConfig) -> SpotifyResult<Self> {
        if config.access_token.trim().is_empty() {
            return Err(SpotifyError::InvalidInput(
                "access token cannot be empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Soulbridge/0.1")
            .build()?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    /// Validate a Spotify base62 id
    fn validate_id<'a>(kind: &str, id: &'a str) -> SpotifyResult<&'a str> {
        let trimmed = id.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SpotifyError::InvalidInput(format!(
                "invalid {} id: '{}'",
                kind, id
            )));
        }
        Ok(trimmed)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> SpotifyResult<T> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpotifyError::Timeout
                } else {
                    SpotifyError::Http(e)
                }
            })?;

        let response = Self::check_status(response, what).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn check_status(response: Response, what: &str) -> SpotifyResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SpotifyError::Unauthorized),
            StatusCode::NOT_FOUND => Err(SpotifyError::NotFound(what.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                warn!(retry_after_secs = ?retry_after.map(|d| d.as_secs()), "Spotify API rate limited");
                Err(SpotifyError::RateLimited { retry_after })
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(SpotifyError::Api {
                    status: status.as_u16(),
                    message: message.chars().take(200).collect(),
                })
            }
        }
    }

    /// Get a single track
    ///
    /// # Errors
    /// - `SpotifyError::InvalidInput` - If the id is not base62
    /// - `SpotifyError::NotFound` - If the track does not exist
    #[instrument(skip(self))]
    pub async fn track(&self, track_id: &str) -> SpotifyResult<SpotifyTrack> {
        let track_id = Self::validate_id("track", track_id)?;

        let raw: RawTrack = self
            .get_json(
                &self.config.endpoint(&format!("tracks/{}", track_id)),
                &[],
                &format!("track {}", track_id),
            )
            .await?;

        raw.into_track()
            .ok_or_else(|| SpotifyError::NotFound(format!("track {}", track_id)))
    }

    /// Get every track in a playlist, following pagination
    ///
    /// Removed, unavailable and local tracks are skipped.
    #[instrument(skip(self))]
    pub async fn playlist_tracks(&self, playlist_id: &str) -> SpotifyResult<Vec<SpotifyTrack>> {
        let playlist_id = Self::validate_id("playlist", playlist_id)?;
        let url = self
            .config
            .endpoint(&format!("playlists/{}/tracks", playlist_id));
        let what = format!("playlist {}", playlist_id);

        let mut tracks = Vec::new();
        let mut offset = 0;
        for _ in 0..MAX_PLAYLIST_PAGES {
            let page: PlaylistTracksPage = self
                .get_json(
                    &url,
                    &[
                        ("offset", offset.to_string()),
                        ("limit", PLAYLIST_PAGE_SIZE.to_string()),
                    ],
                    &what,
                )
                .await?;

            let page_len = page.items.len();
            debug!(offset, page_len, total = page.total, "Fetched playlist page");

            tracks.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(RawTrack::into_track)),
            );

            if page.next.is_none() || page_len == 0 {
                break;
            }
            offset += page_len;
        }

        debug!(playlist_id = %playlist_id, track_count = tracks.len(), "Fetched playlist");
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_token() {
        let result = SpotifyClient::new(&SpotifyConfig::new("https://api.spotify.com", ""));
        assert!(matches!(result, Err(SpotifyError::InvalidInput(_))));
    }

    #[test]
    fn test_client_debug_redacts_token() {
        let client =
            SpotifyClient::new(&SpotifyConfig::new("https://api.spotify.com", "secret")).unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_id() {
        assert!(SpotifyClient::validate_id("playlist", "").is_err());
        assert!(SpotifyClient::validate_id("playlist", "abc/def").is_err());
        assert_eq!(
            SpotifyClient::validate_id("playlist", "37i9dQZF1DXcBWIGoYBM5M").unwrap(),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let limited = SpotifyError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(SpotifyError::Timeout.retry_after(), None);
        assert!(!SpotifyError::Unauthorized.is_retryable());
    }
}
