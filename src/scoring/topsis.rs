//! Ideal-solution ranker (TOPSIS) over the weighted matrix V.
//!
//! Every column of V is benefit-oriented because normalization already
//! inverted cost criteria, so the positive ideal `A*` is the column maximum and
//! the negative ideal `A-` the column minimum.

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;
use crate::model::{AlternativeId, WeightedMatrix};

/// One entry of the final ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAlternative {
    /// Alternative id.
    pub alternative_id: AlternativeId,
    /// Closeness coefficient (0-1, higher is better).
    pub c_star: f64,
    /// Rank (1 = best).
    pub rank: usize,
}

/// Ideal solutions, distances, closeness and ranking for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdealSolutionResult {
    /// Positive ideal per criterion.
    pub a_star: Vec<f64>,
    /// Negative ideal per criterion.
    pub a_sub: Vec<f64>,
    /// Distance of each row to `a_star`.
    pub s_star: Vec<f64>,
    /// Distance of each row to `a_sub`.
    pub s_sub: Vec<f64>,
    /// Closeness coefficient per row.
    pub c_star: Vec<f64>,
    /// Row labels, in input order.
    pub row_ids: Vec<AlternativeId>,
    /// Rows ordered by descending `c_star`, ties kept in input order.
    pub ranking: Vec<RankedAlternative>,
}

impl IdealSolutionResult {
    /// 1-based rank of an alternative.
    #[must_use]
    pub fn rank_of(&self, id: &AlternativeId) -> Option<usize> {
        self.ranking
            .iter()
            .find(|r| &r.alternative_id == id)
            .map(|r| r.rank)
    }

    /// Closeness coefficient of an alternative.
    #[must_use]
    pub fn closeness_of(&self, id: &AlternativeId) -> Option<f64> {
        self.row_ids
            .iter()
            .position(|r| r == id)
            .and_then(|i| self.c_star.get(i).copied())
    }

    /// Ranked ids, best first.
    #[must_use]
    pub fn ordered_ids(&self) -> Vec<AlternativeId> {
        self.ranking.iter().map(|r| r.alternative_id.clone()).collect()
    }
}

/// Rank the alternatives of V by relative closeness to the ideal solution.
///
/// `c*[i] = s-[i] / (s*[i] + s-[i])`, defined as 0 when both distances are 0
/// (every row identical).
///
/// # Errors
///
/// Returns [`InvalidInput::EmptyBatch`] or [`InvalidInput::EmptyCriteria`] for
/// an empty matrix and [`InvalidInput::NonNumeric`] for a non-finite cell.
pub fn rank(weighted: &WeightedMatrix) -> Result<IdealSolutionResult, InvalidInput> {
    let (n, m) = (weighted.n_rows(), weighted.n_cols());
    if n == 0 {
        return Err(InvalidInput::EmptyBatch);
    }
    if m == 0 {
        return Err(InvalidInput::EmptyCriteria);
    }

    let mut a_star = vec![f64::NEG_INFINITY; m];
    let mut a_sub = vec![f64::INFINITY; m];
    for (i, row) in weighted.rows().iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            if !v.is_finite() {
                return Err(InvalidInput::NonNumeric {
                    alternative: weighted.row_ids()[i].to_string(),
                    criterion: weighted.headers()[j].clone(),
                    value: v.to_string(),
                });
            }
            a_star[j] = a_star[j].max(v);
            a_sub[j] = a_sub[j].min(v);
        }
    }

    let s_star: Vec<f64> = weighted
        .rows()
        .iter()
        .map(|row| euclidean(row, &a_star))
        .collect();
    let s_sub: Vec<f64> = weighted
        .rows()
        .iter()
        .map(|row| euclidean(row, &a_sub))
        .collect();
    let c_star: Vec<f64> = s_star
        .iter()
        .zip(&s_sub)
        .map(|(plus, minus)| {
            let total = plus + minus;
            if total > 0.0 {
                minus / total
            } else {
                0.0
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    // Vec::sort_by is stable, so equal closeness keeps input order.
    order.sort_by(|&a, &b| c_star[b].total_cmp(&c_star[a]));
    let ranking = order
        .iter()
        .enumerate()
        .map(|(pos, &i)| RankedAlternative {
            alternative_id: weighted.row_ids()[i].clone(),
            c_star: c_star[i],
            rank: pos + 1,
        })
        .collect();

    tracing::debug!(
        alternatives = n,
        criteria = m,
        best = ?order.first().map(|&i| &weighted.row_ids()[i]),
        "Ranked alternatives by closeness"
    );

    Ok(IdealSolutionResult {
        a_star,
        a_sub,
        s_star,
        s_sub,
        c_star,
        row_ids: weighted.row_ids().to_vec(),
        ranking,
    })
}

fn euclidean(row: &[f64], ideal: &[f64]) -> f64 {
    row.iter()
        .zip(ideal)
        .map(|(v, a)| (v - a).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::model::DecisionMatrix;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn v(rows: Vec<Vec<f64>>, weights: Vec<f64>) -> WeightedMatrix {
        let ids = (1..=rows.len())
            .map(|i| AlternativeId::Number(i64::try_from(i).unwrap()))
            .collect();
        let headers = (0..weights.len()).map(|j| format!("c{j}")).collect();
        WeightedMatrix::from_parts(DecisionMatrix::new(ids, headers, rows).unwrap(), weights)
    }

    #[test]
    fn test_single_cost_criterion_two_rooms() {
        let result = rank(&v(vec![vec![1.0], vec![0.0]], vec![1.0])).unwrap();
        assert_eq!(result.a_star, vec![1.0]);
        assert_eq!(result.a_sub, vec![0.0]);
        assert_eq!(result.c_star, vec![1.0, 0.0]);
        assert_eq!(
            result.ordered_ids(),
            vec![AlternativeId::Number(1), AlternativeId::Number(2)]
        );
        assert_eq!(result.rank_of(&AlternativeId::Number(2)), Some(2));
    }

    #[test]
    fn test_identical_rows_degenerate() {
        let rows = vec![vec![1.0, 2.0]; 3];
        let result = rank(&v(rows, vec![1.0, 2.0])).unwrap();
        assert_eq!(result.s_star, vec![0.0; 3]);
        assert_eq!(result.s_sub, vec![0.0; 3]);
        assert_eq!(result.c_star, vec![0.0; 3]);
        let ranks: Vec<usize> = result.ranking.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(
            result.ordered_ids(),
            vec![1, 2, 3].into_iter().map(AlternativeId::Number).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_ideal_and_anti_ideal_rows() {
        let result = rank(&v(
            vec![vec![0.5, 0.5], vec![1.0, 2.0], vec![0.0, 0.0]],
            vec![1.0, 2.0],
        ))
        .unwrap();
        assert_eq!(result.c_star[1], 1.0);
        assert_eq!(result.c_star[2], 0.0);
        assert_eq!(result.ranking[0].alternative_id, AlternativeId::Number(2));
        assert_eq!(result.ranking[2].alternative_id, AlternativeId::Number(3));
    }

    #[test]
    fn test_distances() {
        let result = rank(&v(vec![vec![0.0, 0.0], vec![3.0, 4.0]], vec![1.0, 1.0])).unwrap();
        assert_eq!(result.s_star, vec![5.0, 0.0]);
        assert_eq!(result.s_sub, vec![0.0, 5.0]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        // rows 1 and 3 are mirror images and tie on closeness
        let result = rank(&v(
            vec![vec![1.0, 0.0], vec![0.0, 0.0], vec![0.0, 1.0]],
            vec![1.0, 1.0],
        ))
        .unwrap();
        assert_eq!(result.c_star[0], result.c_star[2]);
        assert_eq!(
            result.ordered_ids(),
            vec![1, 3, 2].into_iter().map(AlternativeId::Number).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_closeness_of() {
        let result = rank(&v(vec![vec![1.0], vec![0.0]], vec![1.0])).unwrap();
        assert_eq!(result.closeness_of(&AlternativeId::Number(1)), Some(1.0));
        assert_eq!(result.closeness_of(&AlternativeId::Number(9)), None);
    }

    #[test]
    fn test_non_finite_cell() {
        let err = rank(&v(vec![vec![f64::NAN], vec![0.0]], vec![1.0])).unwrap_err();
        assert!(matches!(err, InvalidInput::NonNumeric { .. }));
    }

    #[test]
    fn test_serializes_camel_case_keys() {
        let result = rank(&v(vec![vec![1.0], vec![0.0]], vec![1.0])).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        for key in ["aStar", "aSub", "sStar", "sSub", "cStar", "rowIds", "ranking"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["ranking"][0]["alternativeId"], serde_json::json!(1));
    }

    proptest! {
        #[test]
        fn prop_closeness_in_unit_range_and_sorted(
            rows in prop::collection::vec(prop::collection::vec(0.0f64..=1.0, 3), 1..25),
            weights in prop::collection::vec(0.1f64..5.0, 3)
        ) {
            let scaled = rows
                .iter()
                .map(|r| r.iter().zip(&weights).map(|(x, w)| x * w).collect())
                .collect();
            let result = rank(&v(scaled, weights)).unwrap();
            for c in &result.c_star {
                prop_assert!((0.0..=1.0).contains(c));
            }
            for pair in result.ranking.windows(2) {
                prop_assert!(pair[0].c_star >= pair[1].c_star);
                if pair[0].c_star == pair[1].c_star {
                    let a = result.row_ids.iter().position(|r| *r == pair[0].alternative_id).unwrap();
                    let b = result.row_ids.iter().position(|r| *r == pair[1].alternative_id).unwrap();
                    prop_assert!(a < b);
                }
            }
        }
    }
}
