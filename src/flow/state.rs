//! Flow stages.

use serde::{Deserialize, Serialize};

use crate::storage::CacheKey;

/// Stage of the staged scoring flow, in pipeline order.
///
/// ```text
/// Init ──(async X)──▶ Decision ──▶ Normalized ──(confirm weights)──▶ Weighted ──▶ Complete
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStage {
    /// Raw matrix stored, X not yet known.
    Init,
    /// X available.
    Decision,
    /// R available; waiting for weights.
    Normalized,
    /// V available.
    Weighted,
    /// Ranking available.
    Complete,
}

impl FlowStage {
    /// Every stage in pipeline order.
    pub const ALL: [Self; 5] = [
        Self::Init,
        Self::Decision,
        Self::Normalized,
        Self::Weighted,
        Self::Complete,
    ];

    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Decision => "decision",
            Self::Normalized => "normalized",
            Self::Weighted => "weighted",
            Self::Complete => "complete",
        }
    }

    /// Cache entry holding this stage's artifact.
    #[must_use]
    pub const fn cache_key(&self) -> CacheKey {
        match self {
            Self::Init => CacheKey::InitMatrix,
            Self::Decision => CacheKey::DecisionMatrix,
            Self::Normalized => CacheKey::NormalizedMatrix,
            Self::Weighted => CacheKey::WeightedMatrix,
            Self::Complete => CacheKey::Result,
        }
    }

    /// Stage whose artifact is stored under `key`.
    #[must_use]
    pub const fn from_cache_key(key: CacheKey) -> Self {
        match key {
            CacheKey::InitMatrix => Self::Init,
            CacheKey::DecisionMatrix => Self::Decision,
            CacheKey::NormalizedMatrix => Self::Normalized,
            CacheKey::WeightedMatrix => Self::Weighted,
            CacheKey::Result => Self::Complete,
        }
    }

    /// Returns true for the stage whose entry is reached asynchronously.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Self::Decision)
    }
}

impl std::fmt::Display for FlowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
