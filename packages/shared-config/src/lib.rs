//! Shared configuration types for Soulbridge services
//!
//! This crate provides the configuration types used by the worker and the
//! service clients, so every crate reads the same environment variables the
//! same way.

mod database;
mod error;
mod musicbrainz;
mod slskd;
mod spotify;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ConfigResult};
pub use musicbrainz::MusicBrainzConfig;
pub use slskd::SlskdConfig;
pub use spotify::SpotifyConfig;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Common configuration shared between all services
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Database configuration (optional, jobs are kept in memory without it)
    pub database: Option<DatabaseConfig>,

    /// slskd download bridge configuration
    pub slskd: SlskdConfig,

    /// Spotify Web API configuration (optional)
    pub spotify: Option<SpotifyConfig>,

    /// MusicBrainz configuration
    pub musicbrainz: MusicBrainzConfig,

    /// Directory completed downloads are filed into
    pub download_dir: PathBuf,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database: if DatabaseConfig::is_configured() {
                Some(DatabaseConfig::from_env()?)
            } else {
                None
            },
            slskd: SlskdConfig::from_env()?,
            spotify: SpotifyConfig::from_env().ok(),
            musicbrainz: MusicBrainzConfig::from_env()?,
            download_dir: PathBuf::from(get_env_or_default("DOWNLOAD_DIR", "/downloads")),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse()
                .unwrap_or_default(),
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Check if jobs are persisted to a database
    pub fn has_database(&self) -> bool {
        self.database.is_some()
    }

    /// Check if Spotify integration is configured
    pub fn has_spotify(&self) -> bool {
        self.spotify.is_some()
    }
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

/// Validate that a value is an absolute http(s) URL
pub fn validate_url(name: &str, value: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl(
            name.to_string(),
            format!("unsupported scheme '{}'", other),
        )),
    }
}
