//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::Config;
use crate::error::ConfigError;

/// Minimum allowed scorer timeout in milliseconds.
pub const MIN_SCORER_TIMEOUT_MS: u64 = 100;

/// Maximum allowed scorer timeout in milliseconds (1 minute).
pub const MAX_SCORER_TIMEOUT_MS: u64 = 60_000;

/// Maximum allowed scorer retry count.
pub const MAX_SCORER_RETRIES: u32 = 5;

/// Maximum allowed minimum stage display time in milliseconds.
pub const MAX_MIN_STAGE_DISPLAY_MS: u64 = 10_000;

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `SCORER_URL` must start with `http://` or `https://`
/// - `SCORER_TIMEOUT_MS` must be between 100 and 60000
/// - `SCORER_MAX_RETRIES` must be between 0 and 5
/// - `MIN_STAGE_DISPLAY_MS` must be at most 10000
/// - `CRITERIA` must not be empty when set
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(url) = &config.scorer_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                var: "SCORER_URL".into(),
                reason: "must start with http:// or https://".into(),
            });
        }
    }

    if !(MIN_SCORER_TIMEOUT_MS..=MAX_SCORER_TIMEOUT_MS).contains(&config.scorer_timeout_ms) {
        return Err(ConfigError::InvalidValue {
            var: "SCORER_TIMEOUT_MS".into(),
            reason: format!(
                "must be between {MIN_SCORER_TIMEOUT_MS} and {MAX_SCORER_TIMEOUT_MS} ms"
            ),
        });
    }

    if config.scorer_max_retries > MAX_SCORER_RETRIES {
        return Err(ConfigError::InvalidValue {
            var: "SCORER_MAX_RETRIES".into(),
            reason: format!("must be between 0 and {MAX_SCORER_RETRIES}"),
        });
    }

    if config.min_stage_display_ms > MAX_MIN_STAGE_DISPLAY_MS {
        return Err(ConfigError::InvalidValue {
            var: "MIN_STAGE_DISPLAY_MS".into(),
            reason: format!("must be at most {MAX_MIN_STAGE_DISPLAY_MS} ms"),
        });
    }

    if config.criteria.as_ref().is_some_and(Vec::is_empty) {
        return Err(ConfigError::InvalidValue {
            var: "CRITERIA".into(),
            reason: "must name at least one criterion".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            scorer_url: Some("http://localhost:9000".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&create_valid_config()).is_ok());
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_bad_url_scheme() {
        let mut config = create_valid_config();
        config.scorer_url = Some("ftp://scoring".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "SCORER_URL"));
    }

    #[test]
    fn test_timeout_too_low() {
        let mut config = create_valid_config();
        config.scorer_timeout_ms = MIN_SCORER_TIMEOUT_MS - 1;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "SCORER_TIMEOUT_MS"));
    }

    #[test]
    fn test_timeout_too_high() {
        let mut config = create_valid_config();
        config.scorer_timeout_ms = MAX_SCORER_TIMEOUT_MS + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_boundary_timeouts() {
        let mut config = create_valid_config();
        config.scorer_timeout_ms = MIN_SCORER_TIMEOUT_MS;
        assert!(validate_config(&config).is_ok());
        config.scorer_timeout_ms = MAX_SCORER_TIMEOUT_MS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_retries() {
        let mut config = create_valid_config();
        config.scorer_max_retries = MAX_SCORER_RETRIES;
        assert!(validate_config(&config).is_ok());
        config.scorer_max_retries = MAX_SCORER_RETRIES + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "SCORER_MAX_RETRIES"));
    }

    #[test]
    fn test_min_stage_display() {
        let mut config = create_valid_config();
        config.min_stage_display_ms = MAX_MIN_STAGE_DISPLAY_MS + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { var, .. } if var == "MIN_STAGE_DISPLAY_MS")
        );
    }

    #[test]
    fn test_empty_criteria_list() {
        let mut config = create_valid_config();
        config.criteria = Some(Vec::new());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "CRITERIA"));
    }
}
