//! MusicBrainz web service client implementation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use soulbridge_shared_config::MusicBrainzConfig;
use tracing::{debug, instrument, warn};

use crate::error::{MusicBrainzError, MusicBrainzResult};
use crate::models::{RawRecording, Recording};

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Sub-resources requested with every recording lookup
const RECORDING_INCLUDES: &str = "artists+releases+isrcs";

/// Maximum MBID length accepted
const MAX_MBID_LENGTH: usize = 64;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// MusicBrainz web service client
#[derive(Clone)]
pub struct MusicBrainzClient {
    http_client: Client,
    config: MusicBrainzConfig,
    max_retries: u32,
}

impl fmt::Debug for MusicBrainzClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MusicBrainzClient")
            .field("url", &self.config.url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl MusicBrainzClient {
    /// Create a new MusicBrainz client
    pub fn new(config: &MusicBrainzConfig) -> MusicBrainzResult<Self> {
        if config.user_agent.trim().is_empty() {
            return Err(MusicBrainzError::InvalidInput(
                "a contact user agent is required".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            http_client,
            config: config.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Set how many times a transient failure is retried in-place
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn validate_mbid(mbid: &str) -> MusicBrainzResult<&str> {
        let trimmed = mbid.trim();
        if trimmed.is_empty() {
            return Err(MusicBrainzError::InvalidInput(
                "MBID cannot be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_MBID_LENGTH || trimmed.contains('/') {
            return Err(MusicBrainzError::InvalidInput(format!(
                "malformed MBID: {}",
                trimmed
            )));
        }
        Ok(trimmed)
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> MusicBrainzResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = MusicBrainzResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "MusicBrainz request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_recording(&self, mbid: &str) -> MusicBrainzResult<String> {
        let response = self
            .http_client
            .get(self.config.resource_url(&format!("recording/{}", mbid)))
            .query(&[("fmt", "json"), ("inc", RECORDING_INCLUDES)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MusicBrainzError::Timeout
                } else {
                    MusicBrainzError::Http(e)
                }
            })?;

        match response.status() {
            status if status.is_success() => response.text().await.map_err(MusicBrainzError::Http),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                Err(MusicBrainzError::NotFound(mbid.to_string()))
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
                warn!("MusicBrainz rate limited");
                Err(MusicBrainzError::RateLimited)
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(MusicBrainzError::Api {
                    status: status.as_u16(),
                    message: message.chars().take(200).collect(),
                })
            }
        }
    }

    /// Look up a recording by MBID
    ///
    /// # Errors
    /// - `MusicBrainzError::InvalidInput` - If the MBID is empty or malformed
    /// - `MusicBrainzError::NotFound` - If MusicBrainz has no such recording
    /// - `MusicBrainzError::RateLimited` - If retries are exhausted while throttled
    #[instrument(skip(self))]
    pub async fn lookup_recording(&self, mbid: &str) -> MusicBrainzResult<Recording> {
        let mbid = Self::validate_mbid(mbid)?;

        debug!(mbid = %mbid, "Looking up recording in MusicBrainz");

        let text = self
            .with_retry(|| async { self.fetch_recording(mbid).await })
            .await?;

        let raw: RawRecording = serde_json::from_str(&text)?;
        let recording: Recording = raw.into();

        debug!(
            mbid = %mbid,
            title = %recording.title,
            release_count = recording.releases.len(),
            "Found recording"
        );

        Ok(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_user_agent() {
        let config = MusicBrainzConfig {
            user_agent: "  ".to_string(),
            ..MusicBrainzConfig::default()
        };
        assert!(matches!(
            MusicBrainzClient::new(&config),
            Err(MusicBrainzError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_mbid() {
        assert!(MusicBrainzClient::validate_mbid("").is_err());
        assert!(MusicBrainzClient::validate_mbid("../artist").is_err());
        assert_eq!(
            MusicBrainzClient::validate_mbid(" b1a9c0e9-d987-4042-ae91-78d6a3267d69 ").unwrap(),
            "b1a9c0e9-d987-4042-ae91-78d6a3267d69"
        );
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(MusicBrainzError::Timeout.is_retryable());
        assert!(MusicBrainzError::RateLimited.is_retryable());
        assert!(MusicBrainzError::Api {
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!MusicBrainzError::NotFound("x".to_string()).is_retryable());
        assert!(MusicBrainzError::NotFound("x".to_string()).is_not_found());
    }
}
