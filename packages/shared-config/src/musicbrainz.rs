//! MusicBrainz configuration types

use crate::{get_env_or_default, parse_env, validate_url, ConfigResult};

/// MusicBrainz web service configuration
#[derive(Debug, Clone)]
pub struct MusicBrainzConfig {
    /// Web service base URL
    pub url: String,

    /// User agent sent with every request (MusicBrainz requires a contact)
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl MusicBrainzConfig {
    /// Load MusicBrainz configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_env_or_default("MUSICBRAINZ_URL", "https://musicbrainz.org");
        validate_url("MUSICBRAINZ_URL", &url)?;

        Ok(Self {
            url,
            user_agent: get_env_or_default(
                "MUSICBRAINZ_USER_AGENT",
                "Soulbridge/0.1 ( https://github.com/soulbridge/soulbridge )",
            ),
            timeout_secs: parse_env("MUSICBRAINZ_TIMEOUT", 10)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Get the full URL for a `ws/2` resource
    pub fn resource_url(&self, path: &str) -> String {
        format!(
            "{}/ws/2/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            url: "https://musicbrainz.org".to_string(),
            user_agent: "Soulbridge/0.1 ( https://github.com/soulbridge/soulbridge )".to_string(),
            timeout_secs: 10,
        }
    }
}
