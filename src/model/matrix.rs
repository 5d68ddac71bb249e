//! Labeled decision matrices.
//!
//! A [`DecisionMatrix`] is an alternatives × criteria table whose rows keep the
//! alternative id and whose columns keep the criterion name. The shape is fixed
//! at construction. [`NormalizedMatrix`] (R) and [`WeightedMatrix`] (V) wrap the
//! same table to mark which pipeline stage produced it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;

/// Identifier of one alternative (room). Integer or string, as the listing API
/// sends it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlternativeId {
    /// Numeric id.
    Number(i64),
    /// Textual id.
    Text(String),
}

impl fmt::Display for AlternativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AlternativeId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for AlternativeId {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

impl From<&str> for AlternativeId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AlternativeId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// One candidate room with its raw criterion values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alternative {
    /// Stable identifier.
    pub id: AlternativeId,
    /// Criterion name → raw value.
    pub raw_attributes: BTreeMap<String, f64>,
}

impl Alternative {
    /// Create an alternative with no attributes.
    #[must_use]
    pub fn new(id: impl Into<AlternativeId>) -> Self {
        Self {
            id: id.into(),
            raw_attributes: BTreeMap::new(),
        }
    }

    /// Add a raw attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: f64) -> Self {
        self.raw_attributes.insert(name.into(), value);
        self
    }

    /// Get a raw attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.raw_attributes.get(name).copied()
    }
}

/// Serializable form of a matrix: `{ matrix, headers, rowIds }`.
///
/// This is the shape stored under each session cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixSnapshot {
    /// Row-major values.
    pub matrix: Vec<Vec<f64>>,
    /// Column labels (criterion names).
    pub headers: Vec<String>,
    /// Row labels (alternative ids).
    pub row_ids: Vec<AlternativeId>,
}

/// An alternatives × criteria numeric table with row and column labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixSnapshot", into = "MatrixSnapshot")]
pub struct DecisionMatrix {
    row_ids: Vec<AlternativeId>,
    headers: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl DecisionMatrix {
    /// Create a matrix, checking that the values match the labels.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::EmptyBatch`] with no rows,
    /// [`InvalidInput::EmptyCriteria`] with no columns and
    /// [`InvalidInput::ShapeMismatch`] when any row length or the row count
    /// disagrees with the labels.
    pub fn new(
        row_ids: Vec<AlternativeId>,
        headers: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, InvalidInput> {
        if row_ids.is_empty() {
            return Err(InvalidInput::EmptyBatch);
        }
        if headers.is_empty() {
            return Err(InvalidInput::EmptyCriteria);
        }
        let shape_error = |rows: usize, cols: usize| InvalidInput::ShapeMismatch {
            expected_rows: row_ids.len(),
            expected_cols: headers.len(),
            rows,
            cols,
        };
        if values.len() != row_ids.len() {
            return Err(shape_error(values.len(), headers.len()));
        }
        if let Some(bad) = values.iter().find(|row| row.len() != headers.len()) {
            return Err(shape_error(values.len(), bad.len()));
        }
        Ok(Self {
            row_ids,
            headers,
            values,
        })
    }

    /// Build a matrix with the same labels as `self` and new values.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::ShapeMismatch`] if the shape differs.
    pub fn with_values(&self, values: Vec<Vec<f64>>) -> Result<Self, InvalidInput> {
        Self::new(self.row_ids.clone(), self.headers.clone(), values)
    }

    /// Row labels.
    #[must_use]
    pub fn row_ids(&self) -> &[AlternativeId] {
        &self.row_ids
    }

    /// Column labels.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// One row.
    #[must_use]
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        self.values.get(i).map(Vec::as_slice)
    }

    /// One cell.
    #[must_use]
    pub fn value(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get(i).and_then(|row| row.get(j)).copied()
    }

    /// Values of column `j`, top to bottom.
    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(move |row| row.get(j).copied())
    }

    /// Number of alternatives.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.values.len()
    }

    /// Number of criteria.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.headers.len()
    }

    /// Position of a row by alternative id.
    #[must_use]
    pub fn row_index(&self, id: &AlternativeId) -> Option<usize> {
        self.row_ids.iter().position(|r| r == id)
    }

    /// Position of a column by criterion name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Row `i` as a criterion name → value map.
    #[must_use]
    pub fn row_map(&self, i: usize) -> Option<BTreeMap<String, f64>> {
        self.row(i).map(|row| {
            self.headers
                .iter()
                .cloned()
                .zip(row.iter().copied())
                .collect()
        })
    }

    /// Copy into the serializable snapshot form.
    #[must_use]
    pub fn snapshot(&self) -> MatrixSnapshot {
        MatrixSnapshot {
            matrix: self.values.clone(),
            headers: self.headers.clone(),
            row_ids: self.row_ids.clone(),
        }
    }
}

impl TryFrom<MatrixSnapshot> for DecisionMatrix {
    type Error = InvalidInput;

    fn try_from(s: MatrixSnapshot) -> Result<Self, Self::Error> {
        Self::new(s.row_ids, s.headers, s.matrix)
    }
}

impl From<DecisionMatrix> for MatrixSnapshot {
    fn from(m: DecisionMatrix) -> Self {
        Self {
            matrix: m.values,
            headers: m.headers,
            row_ids: m.row_ids,
        }
    }
}

/// How raw values were rescaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMethod {
    /// Per-column min–max scaling, cost columns inverted.
    MinMax,
}

impl NormalizationMethod {
    /// Identifier used in explanation payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MinMax => "min-max",
        }
    }

    /// Formula for benefit criteria.
    #[must_use]
    pub const fn benefit_formula(self) -> &'static str {
        match self {
            Self::MinMax => "x' = (x - min) / (max - min)",
        }
    }

    /// Formula for cost criteria, where smaller raw values score higher.
    #[must_use]
    pub const fn cost_formula(self) -> &'static str {
        match self {
            Self::MinMax => "x' = (max - x) / (max - min)",
        }
    }
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// R: every value in [0, 1], 1 meaning most favorable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMatrix {
    #[serde(flatten)]
    matrix: DecisionMatrix,
    method: NormalizationMethod,
}

impl NormalizedMatrix {
    pub(crate) const fn from_parts(matrix: DecisionMatrix, method: NormalizationMethod) -> Self {
        Self { matrix, method }
    }

    /// The normalization formula used.
    #[must_use]
    pub const fn method(&self) -> NormalizationMethod {
        self.method
    }

    /// Borrow the underlying matrix.
    #[must_use]
    pub const fn as_matrix(&self) -> &DecisionMatrix {
        &self.matrix
    }
}

impl Deref for NormalizedMatrix {
    type Target = DecisionMatrix;

    fn deref(&self) -> &Self::Target {
        &self.matrix
    }
}

/// V: `R[i][j] * w[j]`, together with the weights that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedMatrix {
    #[serde(flatten)]
    matrix: DecisionMatrix,
    weights: Vec<f64>,
}

impl WeightedMatrix {
    pub(crate) const fn from_parts(matrix: DecisionMatrix, weights: Vec<f64>) -> Self {
        Self { matrix, weights }
    }

    /// Weights applied per column.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Row sum of V for alternative `i` (the composite score).
    #[must_use]
    pub fn row_total(&self, i: usize) -> Option<f64> {
        self.matrix.row(i).map(|row| row.iter().sum())
    }

    /// Borrow the underlying matrix.
    #[must_use]
    pub const fn as_matrix(&self) -> &DecisionMatrix {
        &self.matrix
    }
}

impl Deref for WeightedMatrix {
    type Target = DecisionMatrix;

    fn deref(&self) -> &Self::Target {
        &self.matrix
    }
}
