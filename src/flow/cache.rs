//! Per-batch session cache.
//!
//! Holds the artifact of every completed stage so the flow can step back
//! without recomputing. Only the orchestrator mutates it.

use serde::Serialize;

use crate::model::{DecisionMatrix, MatrixSnapshot, NormalizedMatrix, WeightedMatrix};
use crate::scoring::IdealSolutionResult;
use crate::storage::CacheKey;

/// A cached stage artifact, as readers see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CacheEntry {
    /// `matrix`, `headers` and `rowIds` of a matrix stage.
    Matrix(MatrixSnapshot),
    /// Final ranking stage.
    Result(IdealSolutionResult),
}

impl CacheEntry {
    /// The matrix snapshot, if this is a matrix stage.
    #[must_use]
    pub const fn as_matrix(&self) -> Option<&MatrixSnapshot> {
        match self {
            Self::Matrix(snapshot) => Some(snapshot),
            Self::Result(_) => None,
        }
    }

    /// The ranking result, if this is the final stage.
    #[must_use]
    pub const fn as_result(&self) -> Option<&IdealSolutionResult> {
        match self {
            Self::Result(result) => Some(result),
            Self::Matrix(_) => None,
        }
    }
}

/// Artifacts of the current batch, one slot per [`CacheKey`].
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    init: Option<DecisionMatrix>,
    decision: Option<DecisionMatrix>,
    normalized: Option<NormalizedMatrix>,
    weighted: Option<WeightedMatrix>,
    result: Option<IdealSolutionResult>,
}

impl SessionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Drop one entry.
    pub fn remove(&mut self, key: CacheKey) {
        match key {
            CacheKey::InitMatrix => self.init = None,
            CacheKey::DecisionMatrix => self.decision = None,
            CacheKey::NormalizedMatrix => self.normalized = None,
            CacheKey::WeightedMatrix => self.weighted = None,
            CacheKey::Result => self.result = None,
        }
    }

    /// Returns true if `key` holds an artifact.
    #[must_use]
    pub const fn contains(&self, key: CacheKey) -> bool {
        match key {
            CacheKey::InitMatrix => self.init.is_some(),
            CacheKey::DecisionMatrix => self.decision.is_some(),
            CacheKey::NormalizedMatrix => self.normalized.is_some(),
            CacheKey::WeightedMatrix => self.weighted.is_some(),
            CacheKey::Result => self.result.is_some(),
        }
    }

    /// Keys currently filled, in pipeline order.
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        CacheKey::ALL
            .into_iter()
            .filter(|key| self.contains(*key))
            .collect()
    }

    /// Snapshot of one entry.
    #[must_use]
    pub fn snapshot(&self, key: CacheKey) -> Option<CacheEntry> {
        match key {
            CacheKey::InitMatrix => self.init.as_ref().map(|m| CacheEntry::Matrix(m.snapshot())),
            CacheKey::DecisionMatrix => self
                .decision
                .as_ref()
                .map(|m| CacheEntry::Matrix(m.snapshot())),
            CacheKey::NormalizedMatrix => self
                .normalized
                .as_ref()
                .map(|m| CacheEntry::Matrix(m.snapshot())),
            CacheKey::WeightedMatrix => self
                .weighted
                .as_ref()
                .map(|m| CacheEntry::Matrix(m.snapshot())),
            CacheKey::Result => self.result.clone().map(CacheEntry::Result),
        }
    }

    /// Raw attribute matrix.
    #[must_use]
    pub const fn init(&self) -> Option<&DecisionMatrix> {
        self.init.as_ref()
    }

    /// X.
    #[must_use]
    pub const fn decision(&self) -> Option<&DecisionMatrix> {
        self.decision.as_ref()
    }

    /// R.
    #[must_use]
    pub const fn normalized(&self) -> Option<&NormalizedMatrix> {
        self.normalized.as_ref()
    }

    /// V.
    #[must_use]
    pub const fn weighted(&self) -> Option<&WeightedMatrix> {
        self.weighted.as_ref()
    }

    /// Ranking result.
    #[must_use]
    pub const fn result(&self) -> Option<&IdealSolutionResult> {
        self.result.as_ref()
    }

    pub(crate) fn put_init(&mut self, matrix: DecisionMatrix) {
        self.init = Some(matrix);
    }

    pub(crate) fn put_decision(&mut self, matrix: DecisionMatrix) {
        self.decision = Some(matrix);
    }

    pub(crate) fn put_normalized(&mut self, matrix: NormalizedMatrix) {
        self.normalized = Some(matrix);
    }

    pub(crate) fn put_weighted(&mut self, matrix: WeightedMatrix) {
        self.weighted = Some(matrix);
    }

    pub(crate) fn put_result(&mut self, result: IdealSolutionResult) {
        self.result = Some(result);
    }
}
