//! Weighting stage: R → V.
//!
//! Weights are relative priorities. They do not need to sum to 1; ranking by
//! closeness is unchanged by scaling all weights together, but their ratios
//! matter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;
use crate::model::{NormalizedMatrix, WeightedMatrix};

/// A per-criterion weight vector in column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// Wrap raw weights without validation.
    #[must_use]
    pub const fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Equal priority (1.0) for `n` criteria.
    #[must_use]
    pub fn equal(n: usize) -> Self {
        Self(vec![1.0; n])
    }

    /// Weights as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of weights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no weights.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the vector against criterion names.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::WeightCountMismatch`] when lengths differ and
    /// [`InvalidInput::NonPositiveWeight`] for a weight that is not a finite
    /// positive number.
    pub fn validate(&self, criteria: &[String]) -> Result<(), InvalidInput> {
        if self.0.len() != criteria.len() {
            return Err(InvalidInput::WeightCountMismatch {
                expected: criteria.len(),
                actual: self.0.len(),
            });
        }
        for (w, name) in self.0.iter().zip(criteria) {
            if !(w.is_finite() && *w > 0.0) {
                return Err(InvalidInput::NonPositiveWeight {
                    criterion: name.clone(),
                    weight: *w,
                });
            }
        }
        Ok(())
    }

    /// Rescaled copy whose entries sum to 1, for display.
    #[must_use]
    pub fn to_unit_sum(&self) -> Self {
        let total: f64 = self.0.iter().sum();
        if total > 0.0 {
            Self(self.0.iter().map(|w| w / total).collect())
        } else {
            self.clone()
        }
    }

    /// Pair weights with criterion names.
    #[must_use]
    pub fn by_name(&self, criteria: &[String]) -> BTreeMap<String, f64> {
        criteria.iter().cloned().zip(self.0.iter().copied()).collect()
    }
}

impl From<Vec<f64>> for WeightVector {
    fn from(weights: Vec<f64>) -> Self {
        Self(weights)
    }
}

impl AsRef<[f64]> for WeightVector {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// Multiply every column of R by its weight.
///
/// # Errors
///
/// Returns [`InvalidInput`] if `weights` does not have one positive, finite
/// entry per column.
pub fn apply_weights(
    normalized: &NormalizedMatrix,
    weights: &[f64],
) -> Result<WeightedMatrix, InvalidInput> {
    let vector = WeightVector::new(weights.to_vec());
    vector.validate(normalized.headers())?;

    let values: Vec<Vec<f64>> = normalized
        .rows()
        .iter()
        .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).collect())
        .collect();

    Ok(WeightedMatrix::from_parts(
        normalized.with_values(values)?,
        vector.0,
    ))
}
