//! Scoring criteria.

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;

/// Monthly rent, lower is better.
pub const PRICE: &str = "price";
/// Floor area in m², higher is better.
pub const AREA: &str = "area";
/// Distance to campus in km, lower is better.
pub const DISTANCE: &str = "distance";
/// Average review rating (0-5), higher is better.
pub const RATING: &str = "rating";
/// Number of listed amenities, higher is better.
pub const AMENITIES_COUNT: &str = "amenitiesCount";
/// Security score (0-10), higher is better.
pub const SECURITY_SCORE: &str = "securityScore";

/// Recognized criterion names in canonical column order.
pub const STANDARD_CRITERIA: [&str; 6] = [
    PRICE,
    AREA,
    DISTANCE,
    RATING,
    AMENITIES_COUNT,
    SECURITY_SCORE,
];

/// Whether a higher raw value is better or worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Higher raw value is better.
    Benefit,
    /// Lower raw value is better.
    Cost,
}

impl Direction {
    /// Get the direction name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Benefit => "benefit",
            Self::Cost => "cost",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Criterion name, also the attribute key.
    pub name: String,
    /// Benefit or cost.
    pub direction: Direction,
    /// Default relative importance, in (0, 1].
    pub weight: f64,
}

impl Criterion {
    /// Create a criterion with weight 1.0.
    #[must_use]
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            weight: 1.0,
        }
    }

    /// Create a benefit criterion.
    #[must_use]
    pub fn benefit(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Benefit)
    }

    /// Create a cost criterion.
    #[must_use]
    pub fn cost(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Cost)
    }

    /// Set the default weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Returns true for cost criteria.
    #[must_use]
    pub fn is_cost(&self) -> bool {
        self.direction == Direction::Cost
    }

    /// Look up one of the recognized room criteria by name.
    #[must_use]
    pub fn standard(name: &str) -> Option<Self> {
        match name {
            PRICE | DISTANCE => Some(Self::cost(name)),
            AREA | RATING | AMENITIES_COUNT | SECURITY_SCORE => Some(Self::benefit(name)),
            _ => None,
        }
    }
}

/// An ordered, non-empty set of uniquely named criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Criterion>", into = "Vec<Criterion>")]
pub struct CriteriaSet {
    criteria: Vec<Criterion>,
}

impl CriteriaSet {
    /// Create a criteria set.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::EmptyCriteria`] for an empty list,
    /// [`InvalidInput::DuplicateCriterion`] when a name appears twice, and
    /// [`InvalidInput::NonPositiveWeight`] or [`InvalidInput::WeightOutOfRange`]
    /// for a default weight outside (0, 1].
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, InvalidInput> {
        if criteria.is_empty() {
            return Err(InvalidInput::EmptyCriteria);
        }
        for (i, c) in criteria.iter().enumerate() {
            if criteria[..i].iter().any(|prev| prev.name == c.name) {
                return Err(InvalidInput::DuplicateCriterion {
                    name: c.name.clone(),
                });
            }
            if !c.weight.is_finite() || c.weight <= 0.0 {
                return Err(InvalidInput::NonPositiveWeight {
                    criterion: c.name.clone(),
                    weight: c.weight,
                });
            }
            if c.weight > 1.0 {
                return Err(InvalidInput::WeightOutOfRange {
                    criterion: c.name.clone(),
                    weight: c.weight,
                });
            }
        }
        Ok(Self { criteria })
    }

    /// The six recognized room criteria.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            criteria: STANDARD_CRITERIA
                .iter()
                .filter_map(|name| Criterion::standard(name))
                .collect(),
        }
    }

    /// Select recognized criteria by name, keeping the given order.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::UnknownCriterion`] for a name that is not one of
    /// [`STANDARD_CRITERIA`].
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, InvalidInput> {
        let criteria = names
            .iter()
            .map(|n| {
                let n = n.as_ref().trim();
                Criterion::standard(n).ok_or_else(|| InvalidInput::UnknownCriterion {
                    name: n.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(criteria)
    }

    /// Number of criteria.
    #[must_use]
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Criteria as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Iterate over criteria in column order.
    pub fn iter(&self) -> std::slice::Iter<'_, Criterion> {
        self.criteria.iter()
    }

    /// Criterion names in column order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.criteria.iter().map(|c| c.name.clone()).collect()
    }

    /// Find a criterion by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    /// The default weight of every criterion, in column order.
    ///
    /// Seeds the staged flow's weights for each new batch.
    #[must_use]
    pub fn default_weights(&self) -> Vec<f64> {
        self.criteria.iter().map(|c| c.weight).collect()
    }
}

impl Default for CriteriaSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<Criterion>> for CriteriaSet {
    type Error = InvalidInput;

    fn try_from(criteria: Vec<Criterion>) -> Result<Self, Self::Error> {
        Self::new(criteria)
    }
}

impl From<CriteriaSet> for Vec<Criterion> {
    fn from(set: CriteriaSet) -> Self {
        set.criteria
    }
}

impl<'a> IntoIterator for &'a CriteriaSet {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.criteria.iter()
    }
}
