//! Worker configuration loaded from environment variables
//!
//! This module provides configuration management for the Soulbridge worker.
//! Service endpoints come from the shared [`CommonConfig`]; the knobs below
//! tune the job engine itself. Every value has a default suitable for a
//! single-user install.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use soulbridge_shared_config::{parse_env, CommonConfig, ConfigError, ConfigResult, Environment};

use crate::breaker::BreakerConfig;
use crate::handlers::DownloadSettings;
use crate::queue::{QueueSettings, MAX_CONCURRENCY};
use crate::retry::RetryPolicy;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Job engine settings
    pub worker: WorkerSettings,
}

/// Job engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Maximum concurrent jobs, clamped to 1..=10
    pub max_concurrent_jobs: usize,

    /// Retry budget for jobs enqueued without an explicit one
    pub max_retries: u32,

    /// Delay before the first retry (exponential backoff)
    pub retry_base_delay: Duration,

    /// Upper bound on any retry delay
    pub retry_max_delay: Duration,

    /// Apply ±20% jitter to retry delays
    pub retry_jitter: bool,

    /// Restarts a running job survives before it is failed
    pub max_orphan_recoveries: u32,

    /// Consecutive failures that open a dependency's circuit
    pub breaker_failure_threshold: u32,

    /// How long an open circuit rejects calls
    pub breaker_reset_timeout: Duration,

    /// Longest a single download may take
    pub download_timeout: Duration,

    /// Formats preferred by downloads, best first
    pub preferred_formats: Vec<String>,

    /// Lowest acceptable bitrate in kbps, when the peer reports one
    pub min_bitrate: Option<u32>,

    /// How long shutdown waits for running jobs
    pub shutdown_grace: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_millis(300_000),
            retry_jitter: true,
            max_orphan_recoveries: 3,
            breaker_failure_threshold: 5,
            breaker_reset_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(1800),
            preferred_formats: vec!["flac".to_string(), "mp3".to_string()],
            min_bitrate: None,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

fn parse_formats(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|format| format.trim().trim_start_matches('.').to_lowercase())
        .filter(|format| !format.is_empty())
        .collect()
}

impl WorkerSettings {
    /// Load job engine settings from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();

        let max_concurrent_jobs: usize =
            parse_env("WORKER_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?;
        let retry_base_delay_ms: u64 = parse_env("WORKER_RETRY_BASE_DELAY_MS", 1000)?;
        let retry_max_delay_ms: u64 = parse_env("WORKER_RETRY_MAX_DELAY_MS", 300_000)?;

        let breaker_failure_threshold: u32 =
            parse_env("BREAKER_FAILURE_THRESHOLD", defaults.breaker_failure_threshold)?;
        if breaker_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "BREAKER_FAILURE_THRESHOLD".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let preferred_formats = match env::var("DOWNLOAD_PREFERRED_FORMATS") {
            Ok(raw) => parse_formats(&raw),
            Err(_) => defaults.preferred_formats,
        };

        let min_bitrate = match env::var("DOWNLOAD_MIN_BITRATE") {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("DOWNLOAD_MIN_BITRATE".to_string(), format!("{}", e))
            })?),
            _ => None,
        };

        Ok(Self {
            max_concurrent_jobs: max_concurrent_jobs.clamp(1, MAX_CONCURRENCY),
            max_retries: parse_env("WORKER_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(retry_max_delay_ms),
            retry_jitter: parse_env("WORKER_RETRY_JITTER", defaults.retry_jitter)?,
            max_orphan_recoveries: parse_env(
                "WORKER_MAX_ORPHAN_RECOVERIES",
                defaults.max_orphan_recoveries,
            )?,
            breaker_failure_threshold,
            breaker_reset_timeout: Duration::from_secs(parse_env(
                "BREAKER_RESET_TIMEOUT_SECS",
                60,
            )?),
            download_timeout: Duration::from_secs(parse_env("WORKER_DOWNLOAD_TIMEOUT_SECS", 1800)?),
            preferred_formats,
            min_bitrate,
            shutdown_grace: Duration::from_secs(parse_env("WORKER_SHUTDOWN_GRACE_SECS", 30)?),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_base_delay, self.retry_max_delay).with_jitter(self.retry_jitter)
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::new(self.breaker_failure_threshold, self.breaker_reset_timeout)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            max_concurrent: self.max_concurrent_jobs,
            default_max_retries: self.max_retries,
            max_orphan_recoveries: self.max_orphan_recoveries,
        }
    }

    /// Download settings, polling at `poll_interval`
    pub fn download_settings(&self, poll_interval: Duration) -> DownloadSettings {
        DownloadSettings {
            poll_interval,
            timeout: self.download_timeout,
            preferred_formats: self.preferred_formats.clone(),
            min_bitrate: self.min_bitrate,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env().context("Failed to load service configuration")?;
        let worker = WorkerSettings::from_env().context("Failed to load worker settings")?;
        Ok(Self { common, worker })
    }

    /// Interval between slskd transfer polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.common.slskd.poll_interval_ms)
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
