//! Session cache storage.
//!
//! This module provides:
//! - [`CacheKey`]: the fixed set of per-session cache entries
//! - [`MemoryCacheStore`]: process-local store, the default
//! - [`SqliteCacheStore`]: `SQLite`-backed store via `sqlx`
//!
//! Both implement [`CacheStore`](crate::traits::CacheStore). Payloads are
//! opaque JSON values; the flow decides what goes under each key.
//!
//! # Example
//!
//! ```ignore
//! use room_dss::storage::{CacheKey, SqliteCacheStore};
//! use room_dss::traits::CacheStore;
//!
//! let store = SqliteCacheStore::new("./data/session-cache.db").await?;
//! store.save_entry("session-1", CacheKey::InitMatrix, &payload).await?;
//! ```

mod memory;
mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use serde::{Deserialize, Serialize};

/// Per-session cache entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKey {
    /// Raw attribute matrix, stored provisionally before X is known.
    InitMatrix,
    /// X.
    DecisionMatrix,
    /// R.
    NormalizedMatrix,
    /// V.
    WeightedMatrix,
    /// Ideal solutions, distances, closeness and ranking.
    Result,
}

impl CacheKey {
    /// Every key in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::InitMatrix,
        Self::DecisionMatrix,
        Self::NormalizedMatrix,
        Self::WeightedMatrix,
        Self::Result,
    ];

    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InitMatrix => "init-matrix",
            Self::DecisionMatrix => "decision-matrix",
            Self::NormalizedMatrix => "normalized-matrix",
            Self::WeightedMatrix => "weighted-matrix",
            Self::Result => "result",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
