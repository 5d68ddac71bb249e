//! Trait definitions for mockable dependencies.
//!
//! This module defines traits for:
//! - [`DecisionMatrixProvider`]: computes the decision matrix X from raw data
//! - [`CacheStore`]: persists session cache entries
//!
//! # Mocking
//!
//! All traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, RemoteScoringError};
use crate::model::DecisionMatrix;
use crate::storage::CacheKey;

/// Per-request context passed to a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringContext {
    /// Batch the request belongs to.
    pub batch_id: String,
    /// Search filters the batch was produced with, forwarded as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_context: Option<serde_json::Value>,
}

impl ScoringContext {
    /// Create a context for a batch.
    #[must_use]
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            filter_context: None,
        }
    }

    /// Attach the search filter context.
    #[must_use]
    pub fn with_filter_context(mut self, filter_context: serde_json::Value) -> Self {
        self.filter_context = Some(filter_context);
        self
    }
}

/// Computes the decision matrix X for a batch.
///
/// Implementations must return a matrix with the same row ids and headers as
/// `raw`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionMatrixProvider: Send + Sync {
    /// Short provider name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Compute X from the raw attribute matrix.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteScoringError`] if the matrix cannot be produced.
    async fn compute_decision_matrix(
        &self,
        raw: &DecisionMatrix,
        context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError>;
}

/// Persistence for session cache entries.
///
/// One entry per `(session_id, key)`; saving again overwrites.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Save or replace an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    async fn save_entry(
        &self,
        session_id: &str,
        key: CacheKey,
        payload: &serde_json::Value,
    ) -> Result<(), CacheError>;

    /// Load an entry.
    ///
    /// Returns `None` if the entry doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the read fails.
    async fn load_entry(
        &self,
        session_id: &str,
        key: CacheKey,
    ) -> Result<Option<serde_json::Value>, CacheError>;

    /// Remove one entry, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    async fn remove_entry(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError>;

    /// Remove every entry of a session.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    async fn clear_session(&self, session_id: &str) -> Result<(), CacheError>;
}
