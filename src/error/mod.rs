//! Error types for the room scoring pipeline.
//!
//! This module defines a hierarchical error system:
//! - [`AppError`]: Top-level application errors
//! - [`InvalidInput`]: Malformed or incomplete data reaching a scoring stage
//! - [`RemoteScoringError`]: Remote decision-matrix computation failures
//! - [`FlowError`]: Staged flow orchestration errors
//! - [`CacheError`]: Session cache persistence errors
//! - [`ConfigError`]: Configuration errors
//!
//! All errors implement `Send + Sync` for async compatibility.
//!
//! [`InvalidInput`] is fatal to the current scoring attempt. [`RemoteScoringError`]
//! never is: the flow recovers with a locally computed decision matrix.

use thiserror::Error;

/// Top-level application error.
///
/// This is the main error type returned by the binary entry points.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum AppError {
    /// Scoring input error.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    /// Remote scoring error.
    #[error("Remote scoring unavailable: {0}")]
    RemoteScoring(#[from] RemoteScoringError),

    /// Flow orchestration error.
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// Session cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reading the request or writing the response failed.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },
}

/// Malformed or incomplete scoring input.
///
/// Every variant names the alternative and/or criterion involved so the caller
/// can point the user at the offending room and field.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidInput {
    /// An alternative does not supply a value for a required criterion.
    #[error("Alternative {alternative} is missing a value for criterion {criterion}")]
    MissingCriterion {
        /// The alternative id.
        alternative: String,
        /// The missing criterion name.
        criterion: String,
    },

    /// A raw value is not a finite number.
    #[error("Alternative {alternative} has a non-numeric value for criterion {criterion}: {value}")]
    NonNumeric {
        /// The alternative id.
        alternative: String,
        /// The criterion name.
        criterion: String,
        /// Rendering of the rejected value.
        value: String,
    },

    /// Weight vector length does not match the criterion count.
    #[error("Expected {expected} weights, got {actual}")]
    WeightCountMismatch {
        /// Number of criteria.
        expected: usize,
        /// Number of weights supplied.
        actual: usize,
    },

    /// A weight is zero, negative or not finite.
    #[error("Weight for criterion {criterion} must be positive, got {weight}")]
    NonPositiveWeight {
        /// The criterion name.
        criterion: String,
        /// The rejected weight.
        weight: f64,
    },

    /// A criterion's default weight is above 1.
    #[error("Default weight for criterion {criterion} must be at most 1, got {weight}")]
    WeightOutOfRange {
        /// The criterion name.
        criterion: String,
        /// The rejected weight.
        weight: f64,
    },

    /// The batch has no alternatives.
    #[error("Batch contains no alternatives")]
    EmptyBatch,

    /// No criteria were supplied.
    #[error("No criteria supplied")]
    EmptyCriteria,

    /// Matrix rows/columns do not match the declared labels.
    #[error("Matrix shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        /// Expected row count.
        expected_rows: usize,
        /// Expected column count.
        expected_cols: usize,
        /// Actual row count (or offending row length).
        rows: usize,
        /// Actual column count.
        cols: usize,
    },

    /// Two alternatives share the same id.
    #[error("Duplicate alternative id: {alternative}")]
    DuplicateAlternative {
        /// The duplicated id.
        alternative: String,
    },

    /// A criterion name is not recognized or does not match the matrix headers.
    #[error("Unknown criterion: {name}")]
    UnknownCriterion {
        /// The unrecognized name.
        name: String,
    },

    /// Two criteria share the same name.
    #[error("Duplicate criterion: {name}")]
    DuplicateCriterion {
        /// The duplicated name.
        name: String,
    },

    /// A required field of an explanation request is absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },
}

/// Remote scoring failures.
///
/// These represent the `RemoteScoringUnavailable` condition: the optional
/// network-backed decision-matrix computation failed or timed out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteScoringError {
    /// No remote scorer is configured.
    #[error("No remote scorer configured")]
    NotConfigured,

    /// The request did not finish within the bounded wait.
    #[error("Remote scorer timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Network communication error.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The scorer answered with a non-success status.
    #[error("Remote scorer returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (may be truncated).
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what was unexpected.
        message: String,
    },

    /// The returned matrix does not match the batch shape.
    #[error("Remote matrix shape {rows}x{cols} does not match batch {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        /// Expected row count.
        expected_rows: usize,
        /// Expected column count.
        expected_cols: usize,
        /// Returned row count.
        rows: usize,
        /// Returned column count.
        cols: usize,
    },

    /// The circuit breaker is open after repeated failures.
    #[error("Remote scorer circuit open")]
    CircuitOpen,
}

impl RemoteScoringError {
    /// Returns true if this error is worth retrying.
    ///
    /// Timeouts, network errors and server-side statuses are retryable.
    /// Client errors and malformed responses are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Staged flow orchestration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    /// The requested action is not allowed in the current stage.
    #[error("Cannot {action} while in stage {stage}")]
    InvalidTransition {
        /// Current stage name.
        stage: String,
        /// The attempted action.
        action: String,
    },

    /// No batch has been started.
    #[error("No batch in progress")]
    NoBatch,

    /// An outcome belongs to a batch that is no longer current.
    #[error("Result for batch {batch_id} is stale")]
    StaleBatch {
        /// The outdated batch id.
        batch_id: String,
    },

    /// Pending work was abandoned.
    #[error("Pending work for batch {batch_id} was cancelled")]
    Cancelled {
        /// The abandoned batch id.
        batch_id: String,
    },

    /// The stage has no cached snapshot to return to.
    #[error("Stage {stage} has not been computed for this batch")]
    NotCached {
        /// Stage name.
        stage: String,
    },

    /// Scoring input error raised by a stage.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInput),
}

/// Session cache persistence errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Failed to connect to the database.
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        /// Description of the connection failure.
        message: String,
    },

    /// A database query failed.
    #[error("Query failed: {query} - {message}")]
    QueryFailed {
        /// The query that failed.
        query: String,
        /// Description of the failure.
        message: String,
    },

    /// Database migration failed.
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed {
        /// The migration version that failed.
        version: String,
        /// Description of the failure.
        message: String,
    },

    /// Payload could not be serialized or deserialized.
    #[error("Serialization failed for {key}: {message}")]
    Serialization {
        /// Cache key involved.
        key: String,
        /// Description of the failure.
        message: String,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required configuration is missing.
    #[error("Missing required: {var}")]
    MissingRequired {
        /// The missing variable name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(AppError: Send, Sync, std::error::Error);
    assert_impl_all!(InvalidInput: Send, Sync, std::error::Error, Clone);
    assert_impl_all!(RemoteScoringError: Send, Sync, std::error::Error, Clone);
    assert_impl_all!(FlowError: Send, Sync, std::error::Error, Clone);
    assert_impl_all!(CacheError: Send, Sync, std::error::Error, Clone);
    assert_impl_all!(ConfigError: Send, Sync, std::error::Error, Clone);

    #[test]
    fn test_missing_criterion_names_alternative_and_criterion() {
        let err = InvalidInput::MissingCriterion {
            alternative: "room-7".into(),
            criterion: "securityScore".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("room-7"));
        assert!(msg.contains("securityScore"));
    }

    #[test]
    fn test_duplicate_criterion_display() {
        let err = InvalidInput::DuplicateCriterion {
            name: "price".into(),
        };
        assert_eq!(err.to_string(), "Duplicate criterion: price");
    }

    #[test]
    fn test_app_error_display_invalid_input() {
        let err = AppError::InvalidInput(InvalidInput::EmptyBatch);
        assert_eq!(err.to_string(), "Invalid input: Batch contains no alternatives");
    }

    #[test]
    fn test_app_error_display_remote() {
        let err = AppError::RemoteScoring(RemoteScoringError::Timeout { timeout_ms: 500 });
        assert_eq!(
            err.to_string(),
            "Remote scoring unavailable: Remote scorer timed out after 500ms"
        );
    }

    #[test]
    fn test_app_error_display_config() {
        let err = AppError::Config(ConfigError::MissingRequired {
            var: "SCORER_URL".to_string(),
        });
        assert_eq!(err.to_string(), "Configuration error: Missing required: SCORER_URL");
    }

    #[test]
    fn test_flow_error_wraps_invalid_input_transparently() {
        let err: FlowError = InvalidInput::EmptyCriteria.into();
        assert_eq!(err.to_string(), "No criteria supplied");
    }

    #[test]
    fn test_app_error_display_io() {
        let err = AppError::Io {
            message: "Failed to parse request: EOF".into(),
        };
        assert_eq!(err.to_string(), "I/O error: Failed to parse request: EOF");
    }

    #[test]
    fn test_app_error_from_flow_error() {
        let err: AppError = FlowError::NoBatch.into();
        assert!(matches!(err, AppError::Flow(FlowError::NoBatch)));
    }

    #[test]
    fn test_app_error_from_cache_error() {
        let err: AppError = CacheError::ConnectionFailed {
            message: "locked".into(),
        }
        .into();
        assert!(matches!(err, AppError::Cache(_)));
    }

    #[test]
    fn test_remote_retryable() {
        assert!(RemoteScoringError::Timeout { timeout_ms: 1 }.is_retryable());
        assert!(RemoteScoringError::Network {
            message: "reset".into()
        }
        .is_retryable());
        assert!(RemoteScoringError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(RemoteScoringError::Status {
            status: 429,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_remote_not_retryable() {
        assert!(!RemoteScoringError::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!RemoteScoringError::UnexpectedResponse {
            message: "bad json".into()
        }
        .is_retryable());
        assert!(!RemoteScoringError::CircuitOpen.is_retryable());
        assert!(!RemoteScoringError::NotConfigured.is_retryable());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = FlowError::InvalidTransition {
            stage: "normalized".into(),
            action: "rank".into(),
        };
        assert_eq!(err.to_string(), "Cannot rank while in stage normalized");
    }
}
