//! Multi-criteria scoring stages.
//!
//! Each stage is a pure function over labeled matrices:
//!
//! ```text
//! alternatives ─▶ build_decision_matrix ─▶ X ─▶ normalize ─▶ R
//!                                                            │
//!            IdealSolutionResult ◀─ rank ◀─ V ◀─ apply_weights
//! ```
//!
//! [`ExplanationBuilder`] turns one row of the finished batch into a
//! human-readable justification.

mod explain;
mod normalize;
mod pipeline;
mod topsis;
mod weighting;

pub use explain::{
    CriterionContribution, DssExplanation, ExplanationBuilder, ExplanationRequest, ScoredBatch,
    TRADEOFF_THRESHOLD,
};
pub use normalize::{build_decision_matrix, normalize};
pub use pipeline::{score_batch, score_listings, score_matrix, ScoreReport};
pub use topsis::{rank, IdealSolutionResult, RankedAlternative};
pub use weighting::{apply_weights, WeightVector};
