//! slskd (Soulseek bridge) configuration types

use crate::{get_env_or_default, get_required_env, parse_env, validate_url, ConfigError, ConfigResult};

/// slskd download bridge configuration
#[derive(Debug, Clone)]
pub struct SlskdConfig {
    /// slskd server URL
    pub url: String,

    /// slskd API key
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// How long a search is left open to collect peer responses, in seconds
    pub search_timeout_secs: u64,

    /// Interval between transfer status polls, in milliseconds
    pub poll_interval_ms: u64,
}

impl SlskdConfig {
    /// Load slskd configuration from environment variables
    ///
    /// `SLSKD_API_KEY` is required; the URL defaults to a local instance.
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_env_or_default("SLSKD_URL", "http://localhost:5030");
        validate_url("SLSKD_URL", &url)?;

        let api_key = get_required_env("SLSKD_API_KEY")?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "SLSKD_API_KEY".to_string(),
                "API key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            url,
            api_key,
            timeout_secs: parse_env("SLSKD_TIMEOUT", 30)?,
            search_timeout_secs: parse_env("SLSKD_SEARCH_TIMEOUT", 15)?,
            poll_interval_ms: parse_env("SLSKD_POLL_INTERVAL_MS", 2000)?,
        })
    }

    /// Create a configuration with custom URL and API key (useful for testing)
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout_secs: 30,
            search_timeout_secs: 15,
            poll_interval_ms: 2000,
        }
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/api/v0/{}", base, path)
    }
}
