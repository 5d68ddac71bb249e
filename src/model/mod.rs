//! Domain model.
//!
//! This module defines:
//! - [`Criterion`] and [`CriteriaSet`]: scoring dimensions with direction and weight
//! - [`Alternative`] and [`AlternativeId`]: candidate rooms with raw values
//! - [`DecisionMatrix`], [`NormalizedMatrix`], [`WeightedMatrix`]: labeled X/R/V tables
//! - [`RoomListing`]: the search API record a batch is built from

mod criteria;
mod listing;
mod matrix;

pub use criteria::{
    CriteriaSet, Criterion, Direction, AMENITIES_COUNT, AREA, DISTANCE, PRICE, RATING,
    SECURITY_SCORE, STANDARD_CRITERIA,
};
pub use listing::{alternatives_from_listings, RoomListing};
pub use matrix::{
    Alternative, AlternativeId, DecisionMatrix, MatrixSnapshot, NormalizationMethod,
    NormalizedMatrix, WeightedMatrix,
};
