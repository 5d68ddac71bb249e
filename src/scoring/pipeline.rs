//! Synchronous scoring facade.
//!
//! Runs normalize → weight → rank in one call with X taken directly from the
//! raw attributes. The staged flow uses the same stage functions one at a time.

use serde::Serialize;

use super::explain::ScoredBatch;
use super::{apply_weights, build_decision_matrix, normalize, rank, IdealSolutionResult};
use crate::error::InvalidInput;
use crate::model::{
    alternatives_from_listings, Alternative, CriteriaSet, DecisionMatrix, NormalizedMatrix,
    RoomListing, WeightedMatrix,
};

/// Every artifact of one scored batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    /// X.
    pub decision: DecisionMatrix,
    /// R.
    pub normalized: NormalizedMatrix,
    /// V.
    pub weighted: WeightedMatrix,
    /// Ideals, distances, closeness and ranking.
    pub result: IdealSolutionResult,
}

impl ScoredBatch for ScoreReport {
    fn raw_matrix(&self) -> &DecisionMatrix {
        &self.decision
    }

    fn normalized_matrix(&self) -> &NormalizedMatrix {
        &self.normalized
    }

    fn weighted_matrix(&self) -> &WeightedMatrix {
        &self.weighted
    }

    fn ideal_solution(&self) -> &IdealSolutionResult {
        &self.result
    }
}

/// Score a batch of alternatives.
///
/// # Errors
///
/// Returns [`InvalidInput`] from whichever stage rejects the data.
pub fn score_batch(
    alternatives: &[Alternative],
    criteria: &CriteriaSet,
    weights: &[f64],
) -> Result<ScoreReport, InvalidInput> {
    let decision = build_decision_matrix(alternatives, criteria)?;
    score_matrix(decision, criteria, weights)
}

/// Score a batch of listings as received from the search API.
///
/// # Errors
///
/// Returns [`InvalidInput`] for a listing with a missing or non-numeric
/// attribute, or from any later stage.
pub fn score_listings(
    listings: &[RoomListing],
    criteria: &CriteriaSet,
    weights: &[f64],
) -> Result<ScoreReport, InvalidInput> {
    let alternatives = alternatives_from_listings(listings, criteria)?;
    score_batch(&alternatives, criteria, weights)
}

/// Score an already-built decision matrix.
///
/// # Errors
///
/// Returns [`InvalidInput`] from normalization, weighting or ranking.
pub fn score_matrix(
    decision: DecisionMatrix,
    criteria: &CriteriaSet,
    weights: &[f64],
) -> Result<ScoreReport, InvalidInput> {
    let normalized = normalize(&decision, criteria)?;
    let weighted = apply_weights(&normalized, weights)?;
    let result = rank(&weighted)?;
    Ok(ScoreReport {
        decision,
        normalized,
        weighted,
        result,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::{AlternativeId, Criterion};
    use crate::scoring::ExplanationBuilder;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn five_criteria() -> CriteriaSet {
        CriteriaSet::from_names(&["price", "area", "distance", "rating", "securityScore"]).unwrap()
    }

    fn room(id: i64, price: f64, area: f64, distance: f64, rating: f64, security: f64) -> Alternative {
        Alternative::new(id)
            .with_attribute("price", price)
            .with_attribute("area", area)
            .with_attribute("distance", distance)
            .with_attribute("rating", rating)
            .with_attribute("securityScore", security)
    }

    fn three_rooms() -> Vec<Alternative> {
        vec![
            room(1, 1500.0, 25.0, 2.0, 4.0, 10.0),
            room(2, 1000.0, 30.0, 1.0, 5.0, 0.0),
            room(3, 2000.0, 20.0, 3.0, 3.0, 5.0),
        ]
    }

    #[test]
    fn test_price_only_cheaper_room_wins() {
        let criteria = CriteriaSet::new(vec![Criterion::cost("price")]).unwrap();
        let rooms = vec![
            Alternative::new(1).with_attribute("price", 1000.0),
            Alternative::new(2).with_attribute("price", 2000.0),
        ];
        let report = score_batch(&rooms, &criteria, &[1.0]).unwrap();
        assert_eq!(report.normalized.rows(), &[vec![1.0], vec![0.0]]);
        assert_eq!(report.result.c_star, vec![1.0, 0.0]);
        assert_eq!(
            report.result.ordered_ids(),
            vec![AlternativeId::Number(1), AlternativeId::Number(2)]
        );
    }

    #[test]
    fn test_raising_security_weight_promotes_secure_room() {
        let criteria = five_criteria();
        let before = score_batch(&three_rooms(), &criteria, &[1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let after = score_batch(&three_rooms(), &criteria, &[1.0, 1.0, 1.0, 1.0, 5.0]).unwrap();

        let a = AlternativeId::Number(1);
        assert_eq!(before.result.rank_of(&a), Some(2));
        assert_eq!(after.result.rank_of(&a), Some(1));
    }

    #[test]
    fn test_weight_scale_does_not_change_ranking() {
        let criteria = five_criteria();
        let unit = score_batch(&three_rooms(), &criteria, &[1.0, 2.0, 1.0, 1.0, 3.0]).unwrap();
        let scaled = score_batch(&three_rooms(), &criteria, &[10.0, 20.0, 10.0, 10.0, 30.0]).unwrap();
        assert_eq!(unit.result.ordered_ids(), scaled.result.ordered_ids());
    }

    #[test]
    fn test_score_listings_missing_security_score() {
        let criteria = CriteriaSet::standard();
        let mut second = RoomListing::new(2, 1200.0, 22.0, 2.0, 4.5, 2, 7.0);
        second.security_score = None;
        let listings = vec![RoomListing::new(1, 1000.0, 20.0, 1.0, 4.0, 3, 8.0), second];
        let err = score_listings(&listings, &criteria, &[1.0; 6]).unwrap_err();
        assert_eq!(
            err,
            InvalidInput::MissingCriterion {
                alternative: "2".into(),
                criterion: "securityScore".into()
            }
        );
    }

    #[test]
    fn test_report_explains_every_alternative() {
        let criteria = five_criteria();
        let report = score_batch(&three_rooms(), &criteria, &[1.0; 5]).unwrap();
        let explanations = ExplanationBuilder::new(criteria).explain_all(&report).unwrap();

        assert_eq!(explanations.len(), 3);
        for (i, e) in explanations.iter().enumerate() {
            assert_eq!(Some(e.total_score), report.weighted.row_total(i));
            assert_eq!(report.result.rank_of(&e.alternative_id), Some(e.rank));
        }
    }

    proptest! {
        #[test]
        fn prop_scoring_is_idempotent(
            values in prop::collection::vec(prop::collection::vec(0.0f64..10_000.0, 5), 1..15),
            weights in prop::collection::vec(0.01f64..10.0, 5)
        ) {
            let rooms: Vec<Alternative> = values
                .iter()
                .enumerate()
                .map(|(i, v)| room(i64::try_from(i).unwrap(), v[0], v[1], v[2], v[3], v[4]))
                .collect();
            let criteria = five_criteria();
            let first = score_batch(&rooms, &criteria, &weights).unwrap();
            let second = score_batch(&rooms, &criteria, &weights).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
