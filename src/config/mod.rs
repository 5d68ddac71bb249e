//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//! - Secure API key storage via [`SecretString`]
//!
//! # Example
//!
//! ```
//! use room_dss::config::{Config, SecretString};
//!
//! // Create a config directly (use Config::from_env() in production)
//! let config = Config {
//!     scorer_url: Some("https://scoring.example.com".to_string()),
//!     scorer_api_key: Some(SecretString::new("scorer-secret")),
//!     ..Config::default()
//! };
//!
//! // API key is protected from accidental logging
//! let debug = format!("{:?}", config);
//! assert!(debug.contains("<REDACTED>"));
//! assert!(!debug.contains("scorer-secret"));
//! ```

mod secret;
mod validation;

pub use secret::SecretString;
pub use validation::{
    validate_config, MAX_MIN_STAGE_DISPLAY_MS, MAX_SCORER_RETRIES, MAX_SCORER_TIMEOUT_MS,
    MIN_SCORER_TIMEOUT_MS,
};

use crate::error::{ConfigError, InvalidInput};
use crate::model::CriteriaSet;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default bounded wait for the remote scorer in milliseconds.
pub const DEFAULT_SCORER_TIMEOUT_MS: u64 = 5_000;

/// Default retry attempts against the remote scorer.
pub const DEFAULT_SCORER_MAX_RETRIES: u32 = 1;

/// Session the cache is stored under when `SESSION_ID` is unset.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Default minimum display time per async stage (off).
pub const DEFAULT_MIN_STAGE_DISPLAY_MS: u64 = 0;

/// Application configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
/// With no `SCORER_URL` the pipeline scores locally only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Base URL of the remote scoring service.
    pub scorer_url: Option<String>,
    /// Bearer token for the remote scoring service.
    pub scorer_api_key: Option<SecretString>,
    /// Bounded wait for the remote scorer in milliseconds.
    pub scorer_timeout_ms: u64,
    /// Retry attempts against the remote scorer.
    pub scorer_max_retries: u32,
    /// `SQLite` file for the session cache; in-memory when unset.
    pub session_cache_path: Option<String>,
    /// Session the cache is stored under; a new batch replaces its entries.
    pub session_id: String,
    /// Cosmetic minimum time an async stage stays on screen.
    pub min_stage_display_ms: u64,
    /// Active criterion names; all six recognized criteria when unset.
    pub criteria: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            scorer_url: None,
            scorer_api_key: None,
            scorer_timeout_ms: DEFAULT_SCORER_TIMEOUT_MS,
            scorer_max_retries: DEFAULT_SCORER_MAX_RETRIES,
            session_cache_path: None,
            session_id: DEFAULT_SESSION_ID.to_string(),
            min_stage_display_ms: DEFAULT_MIN_STAGE_DISPLAY_MS,
            criteria: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables (with defaults):
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `SCORER_URL`: Remote scoring service base URL (default: none)
    /// - `SCORER_API_KEY`: Bearer token for the scoring service (default: none)
    /// - `SCORER_TIMEOUT_MS`: Bounded wait for remote scoring (default: `5000`)
    /// - `SCORER_MAX_RETRIES`: Remote retry attempts (default: `1`)
    /// - `SESSION_CACHE_PATH`: `SQLite` session cache file (default: in-memory)
    /// - `SESSION_ID`: Session the cache is stored under (default: `default`)
    /// - `MIN_STAGE_DISPLAY_MS`: Minimum async stage display time (default: `0`)
    /// - `CRITERIA`: Comma-separated criterion names (default: all six)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric variable does not parse or any
    /// value fails validation (see [`validate_config`]).
    #[must_use = "configuration should be used"]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into());
        let scorer_url = non_empty_env("SCORER_URL");
        let scorer_api_key = non_empty_env("SCORER_API_KEY").map(SecretString::new);
        let scorer_timeout_ms = parse_env_u64("SCORER_TIMEOUT_MS", DEFAULT_SCORER_TIMEOUT_MS)?;
        let scorer_max_retries = parse_env_u32("SCORER_MAX_RETRIES", DEFAULT_SCORER_MAX_RETRIES)?;
        let session_cache_path = non_empty_env("SESSION_CACHE_PATH");
        let session_id = non_empty_env("SESSION_ID")
            .map_or_else(|| DEFAULT_SESSION_ID.to_string(), |id| id.trim().to_string());
        let min_stage_display_ms =
            parse_env_u64("MIN_STAGE_DISPLAY_MS", DEFAULT_MIN_STAGE_DISPLAY_MS)?;
        let criteria = non_empty_env("CRITERIA").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        });

        let config = Self {
            log_level,
            scorer_url,
            scorer_api_key,
            scorer_timeout_ms,
            scorer_max_retries,
            session_cache_path,
            session_id,
            min_stage_display_ms,
            criteria,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// The active criteria set.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`] if a configured name is not recognized.
    pub fn criteria_set(&self) -> Result<CriteriaSet, InvalidInput> {
        self.criteria
            .as_deref()
            .map_or_else(|| Ok(CriteriaSet::standard()), CriteriaSet::from_names)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable as u64, using a default if not set.
fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a non-negative integer".into(),
        })
    })
}

/// Parse an environment variable as u32, using a default if not set.
fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a non-negative integer".into(),
        })
    })
}
