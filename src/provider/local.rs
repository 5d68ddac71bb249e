//! Local deterministic scorer.

use async_trait::async_trait;

use crate::error::RemoteScoringError;
use crate::model::DecisionMatrix;
use crate::traits::{DecisionMatrixProvider, ScoringContext};

/// Uses the raw attribute matrix as X.
///
/// Always available and always deterministic, so it backs every remote
/// failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalScorer;

impl LocalScorer {
    /// Provider name.
    pub const NAME: &'static str = "local";

    /// Compute X without going through the async trait.
    #[must_use]
    pub fn decision_matrix(raw: &DecisionMatrix) -> DecisionMatrix {
        raw.clone()
    }
}

#[async_trait]
impl DecisionMatrixProvider for LocalScorer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn compute_decision_matrix(
        &self,
        raw: &DecisionMatrix,
        _context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        Ok(Self::decision_matrix(raw))
    }
}
