//! Room listing records as delivered by the search API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::criteria::{
    CriteriaSet, AMENITIES_COUNT, AREA, DISTANCE, PRICE, RATING, SECURITY_SCORE,
};
use super::matrix::{Alternative, AlternativeId};
use crate::error::InvalidInput;

/// One room from a search result.
///
/// Attribute fields are kept as raw JSON so that a malformed value can be
/// reported against the room and field it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    /// Room id.
    pub id: AlternativeId,
    /// Monthly rent.
    #[serde(default)]
    pub price: Option<Value>,
    /// Floor area in m².
    #[serde(default)]
    pub area: Option<Value>,
    /// Distance in km.
    #[serde(default)]
    pub distance: Option<Value>,
    /// Review rating (0-5).
    #[serde(default)]
    pub rating: Option<Value>,
    /// Amenity count.
    #[serde(default)]
    pub amenities_count: Option<Value>,
    /// Security score (0-10).
    #[serde(default)]
    pub security_score: Option<Value>,
}

impl RoomListing {
    /// Create a listing with every attribute set.
    #[must_use]
    pub fn new(
        id: impl Into<AlternativeId>,
        price: f64,
        area: f64,
        distance: f64,
        rating: f64,
        amenities_count: u32,
        security_score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            price: Some(Value::from(price)),
            area: Some(Value::from(area)),
            distance: Some(Value::from(distance)),
            rating: Some(Value::from(rating)),
            amenities_count: Some(Value::from(amenities_count)),
            security_score: Some(Value::from(security_score)),
        }
    }

    /// Raw JSON value for a criterion name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        let field = match name {
            PRICE => &self.price,
            AREA => &self.area,
            DISTANCE => &self.distance,
            RATING => &self.rating,
            AMENITIES_COUNT => &self.amenities_count,
            SECURITY_SCORE => &self.security_score,
            _ => return None,
        };
        field.as_ref().filter(|v| !v.is_null())
    }

    /// Convert into an [`Alternative`] carrying the given criteria.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::MissingCriterion`] for an absent or null field and
    /// [`InvalidInput::NonNumeric`] for a value that is not a finite number.
    pub fn to_alternative(&self, criteria: &CriteriaSet) -> Result<Alternative, InvalidInput> {
        let mut alternative = Alternative::new(self.id.clone());
        for criterion in criteria {
            let value = self.attribute(&criterion.name).ok_or_else(|| {
                InvalidInput::MissingCriterion {
                    alternative: self.id.to_string(),
                    criterion: criterion.name.clone(),
                }
            })?;
            let number = value
                .as_f64()
                .filter(|n| n.is_finite())
                .ok_or_else(|| InvalidInput::NonNumeric {
                    alternative: self.id.to_string(),
                    criterion: criterion.name.clone(),
                    value: value.to_string(),
                })?;
            alternative = alternative.with_attribute(criterion.name.clone(), number);
        }
        Ok(alternative)
    }
}

/// Convert a whole search result, failing on the first bad listing.
///
/// # Errors
///
/// Returns [`InvalidInput::EmptyBatch`] for an empty list, otherwise the first
/// error from [`RoomListing::to_alternative`].
pub fn alternatives_from_listings(
    listings: &[RoomListing],
    criteria: &CriteriaSet,
) -> Result<Vec<Alternative>, InvalidInput> {
    if listings.is_empty() {
        return Err(InvalidInput::EmptyBatch);
    }
    listings
        .iter()
        .map(|l| l.to_alternative(criteria))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_camel_case() {
        let listing: RoomListing = serde_json::from_value(json!({
            "id": 17,
            "price": 1_500_000,
            "area": 22.5,
            "distance": 1.2,
            "rating": 4.5,
            "amenitiesCount": 6,
            "securityScore": 8
        }))
        .unwrap();

        let alt = listing.to_alternative(&CriteriaSet::standard()).unwrap();
        assert_eq!(alt.id, AlternativeId::Number(17));
        assert_eq!(alt.attribute(AMENITIES_COUNT), Some(6.0));
        assert_eq!(alt.attribute(PRICE), Some(1_500_000.0));
        assert_eq!(alt.raw_attributes.len(), 6);
    }

    #[test]
    fn test_missing_security_score() {
        let listing: RoomListing = serde_json::from_value(json!({
            "id": "r2",
            "price": 1000, "area": 20, "distance": 1, "rating": 4, "amenitiesCount": 3
        }))
        .unwrap();

        let err = listing.to_alternative(&CriteriaSet::standard()).unwrap_err();
        assert_eq!(
            err,
            InvalidInput::MissingCriterion {
                alternative: "r2".into(),
                criterion: SECURITY_SCORE.into()
            }
        );
    }

    #[test]
    fn test_null_counts_as_missing() {
        let listing: RoomListing = serde_json::from_value(json!({
            "id": 1, "price": null, "area": 20, "distance": 1, "rating": 4,
            "amenitiesCount": 3, "securityScore": 5
        }))
        .unwrap();
        let err = listing.to_alternative(&CriteriaSet::standard()).unwrap_err();
        assert!(matches!(err, InvalidInput::MissingCriterion { criterion, .. } if criterion == PRICE));
    }

    #[test]
    fn test_non_numeric_value() {
        let listing: RoomListing = serde_json::from_value(json!({
            "id": 3, "price": "cheap", "area": 20, "distance": 1, "rating": 4,
            "amenitiesCount": 3, "securityScore": 5
        }))
        .unwrap();
        let err = listing.to_alternative(&CriteriaSet::standard()).unwrap_err();
        assert_eq!(
            err,
            InvalidInput::NonNumeric {
                alternative: "3".into(),
                criterion: PRICE.into(),
                value: "\"cheap\"".into()
            }
        );
    }

    #[test]
    fn test_subset_ignores_other_fields() {
        let mut listing = RoomListing::new(1, 1000.0, 20.0, 1.0, 4.0, 3, 5.0);
        listing.security_score = None;
        let criteria = CriteriaSet::from_names(&[PRICE, AREA]).unwrap();
        let alt = listing.to_alternative(&criteria).unwrap();
        assert_eq!(alt.raw_attributes.len(), 2);
    }

    #[test]
    fn test_alternatives_from_empty_listings() {
        let err = alternatives_from_listings(&[], &CriteriaSet::standard()).unwrap_err();
        assert_eq!(err, InvalidInput::EmptyBatch);
    }
}
