//! Spotify Web API configuration types
//!
//! Token acquisition (OAuth/PKCE) happens outside the worker; the worker only
//! needs a bearer token to read tracks and playlists.

use crate::{get_env_or_default, get_required_env, parse_env, validate_url, ConfigError, ConfigResult};

/// Spotify Web API configuration
#[derive(Clone)]
pub struct SpotifyConfig {
    /// API base URL
    pub api_url: String,

    /// Bearer access token
    pub access_token: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("api_url", &self.api_url)
            .field("access_token", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SpotifyConfig {
    /// Load Spotify configuration from environment variables
    ///
    /// Returns an error if `SPOTIFY_ACCESS_TOKEN` is not set, so callers can use
    /// `.ok()` to treat the integration as optional.
    pub fn from_env() -> ConfigResult<Self> {
        let access_token = get_required_env("SPOTIFY_ACCESS_TOKEN")?;
        if access_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "SPOTIFY_ACCESS_TOKEN".to_string(),
                "access token cannot be empty".to_string(),
            ));
        }

        let api_url = get_env_or_default("SPOTIFY_API_URL", "https://api.spotify.com");
        validate_url("SPOTIFY_API_URL", &api_url)?;

        Ok(Self {
            api_url,
            access_token,
            timeout_secs: parse_env("SPOTIFY_TIMEOUT", 15)?,
        })
    }

    /// Create a configuration with custom URL and token (useful for testing)
    pub fn new(api_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            access_token: access_token.into(),
            timeout_secs: 15,
        }
    }

    /// Get the full URL for a `v1` endpoint
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let config = SpotifyConfig::new("https://api.spotify.com/", "token");
        assert_eq!(
            config.endpoint("/tracks/abc"),
            "https://api.spotify.com/v1/tracks/abc"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = SpotifyConfig::new("https://api.spotify.com", "very-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_optional_when_token_missing() {
        temp_env::with_var("SPOTIFY_ACCESS_TOKEN", None::<&str>, || {
            assert!(SpotifyConfig::from_env().ok().is_none());
        });
    }
}
