//! Normalizer: raw attributes → X → R.
//!
//! [`build_decision_matrix`] arranges raw attribute values into a labeled
//! matrix and rejects incomplete data. [`normalize`] rescales each column to
//! [0, 1] with min–max scaling, inverting cost columns so that 1 always means
//! most favorable. A constant column normalizes to 1 for every alternative.

use std::collections::HashSet;

use crate::error::InvalidInput;
use crate::model::{Alternative, CriteriaSet, DecisionMatrix, NormalizationMethod, NormalizedMatrix};

/// Arrange raw attributes into a decision matrix, one column per criterion.
///
/// # Errors
///
/// Returns [`InvalidInput`] when the batch is empty, an id repeats, a criterion
/// value is missing, or a value is not finite. Nothing is produced on error.
pub fn build_decision_matrix(
    alternatives: &[Alternative],
    criteria: &CriteriaSet,
) -> Result<DecisionMatrix, InvalidInput> {
    if alternatives.is_empty() {
        return Err(InvalidInput::EmptyBatch);
    }

    let mut seen = HashSet::with_capacity(alternatives.len());
    let mut values = Vec::with_capacity(alternatives.len());
    for alternative in alternatives {
        if !seen.insert(&alternative.id) {
            return Err(InvalidInput::DuplicateAlternative {
                alternative: alternative.id.to_string(),
            });
        }
        let row = criteria
            .iter()
            .map(|criterion| {
                let value = alternative.attribute(&criterion.name).ok_or_else(|| {
                    InvalidInput::MissingCriterion {
                        alternative: alternative.id.to_string(),
                        criterion: criterion.name.clone(),
                    }
                })?;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(InvalidInput::NonNumeric {
                        alternative: alternative.id.to_string(),
                        criterion: criterion.name.clone(),
                        value: value.to_string(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        values.push(row);
    }

    let matrix = DecisionMatrix::new(
        alternatives.iter().map(|a| a.id.clone()).collect(),
        criteria.names(),
        values,
    )?;
    tracing::debug!(
        rows = matrix.n_rows(),
        cols = matrix.n_cols(),
        "Built raw decision matrix"
    );
    Ok(matrix)
}

/// Min–max normalize every column of `matrix`.
///
/// Benefit: `(x - min) / (max - min)`. Cost: `(max - x) / (max - min)`.
/// When `max == min` the column does not discriminate and every entry is 1.
///
/// # Errors
///
/// Returns [`InvalidInput::UnknownCriterion`] if the matrix headers do not
/// match `criteria` in order, [`InvalidInput::ShapeMismatch`] on a column
/// count mismatch, and [`InvalidInput::NonNumeric`] for a non-finite cell.
pub fn normalize(
    matrix: &DecisionMatrix,
    criteria: &CriteriaSet,
) -> Result<NormalizedMatrix, InvalidInput> {
    check_headers(matrix, criteria)?;

    let mut values = vec![vec![0.0; matrix.n_cols()]; matrix.n_rows()];
    for (j, criterion) in criteria.iter().enumerate() {
        let (min, max) = column_range(matrix, j, &criterion.name)?;
        let span = max - min;
        let degenerate = span <= 0.0;
        if degenerate {
            tracing::debug!(criterion = %criterion.name, value = min, "Constant column normalized to 1");
        }
        for (i, row) in values.iter_mut().enumerate() {
            let x = matrix.value(i, j).unwrap_or(min);
            row[j] = if degenerate {
                1.0
            } else if criterion.is_cost() {
                (max - x) / span
            } else {
                (x - min) / span
            };
        }
    }

    Ok(NormalizedMatrix::from_parts(
        matrix.with_values(values)?,
        NormalizationMethod::MinMax,
    ))
}

/// Minimum and maximum of column `j`, rejecting non-finite cells.
fn column_range(
    matrix: &DecisionMatrix,
    j: usize,
    criterion: &str,
) -> Result<(f64, f64), InvalidInput> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (i, x) in matrix.column(j).enumerate() {
        if !x.is_finite() {
            return Err(InvalidInput::NonNumeric {
                alternative: matrix.row_ids()[i].to_string(),
                criterion: criterion.to_string(),
                value: x.to_string(),
            });
        }
        min = min.min(x);
        max = max.max(x);
    }
    Ok((min, max))
}

fn check_headers(matrix: &DecisionMatrix, criteria: &CriteriaSet) -> Result<(), InvalidInput> {
    if matrix.n_cols() != criteria.len() {
        return Err(InvalidInput::ShapeMismatch {
            expected_rows: matrix.n_rows(),
            expected_cols: criteria.len(),
            rows: matrix.n_rows(),
            cols: matrix.n_cols(),
        });
    }
    for (header, criterion) in matrix.headers().iter().zip(criteria) {
        if *header != criterion.name {
            return Err(InvalidInput::UnknownCriterion {
                name: header.clone(),
            });
        }
    }
    Ok(())
}
