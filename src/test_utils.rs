//! Test utilities and mock factories.
//!
//! This module provides shared testing infrastructure:
//! - Mock implementations for traits
//! - Test fixtures and factories
//! - Common test helpers
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, RemoteScoringError};
use crate::model::{Alternative, CriteriaSet, DecisionMatrix, RoomListing};
use crate::traits::{DecisionMatrixProvider, MockCacheStore, MockDecisionMatrixProvider, ScoringContext};

/// Criteria used by the three-room fixture: everything but amenities.
#[must_use]
pub fn five_criteria() -> CriteriaSet {
    CriteriaSet::from_names(&["price", "area", "distance", "rating", "securityScore"]).unwrap()
}

/// A room over [`five_criteria`].
#[must_use]
pub fn test_room(id: i64, price: f64, area: f64, distance: f64, rating: f64, security: f64) -> Alternative {
    Alternative::new(id)
        .with_attribute("price", price)
        .with_attribute("area", area)
        .with_attribute("distance", distance)
        .with_attribute("rating", rating)
        .with_attribute("securityScore", security)
}

/// Three rooms where room 1 ranks second with equal weights and first once
/// `securityScore` is weighted 5.
#[must_use]
pub fn three_rooms() -> Vec<Alternative> {
    vec![
        test_room(1, 1500.0, 25.0, 2.0, 4.0, 10.0),
        test_room(2, 1000.0, 30.0, 1.0, 5.0, 0.0),
        test_room(3, 2000.0, 20.0, 3.0, 3.0, 5.0),
    ]
}

/// Two complete search API listings over all six criteria.
#[must_use]
pub fn test_listings() -> Vec<RoomListing> {
    vec![
        RoomListing::new(1, 1000.0, 20.0, 1.0, 4.0, 3, 8.0),
        RoomListing::new("b-2", 1200.0, 22.0, 2.0, 4.5, 2, 7.0),
    ]
}

/// Mock provider that returns the raw matrix unchanged.
#[must_use]
pub fn mock_provider_echo() -> MockDecisionMatrixProvider {
    let mut mock = MockDecisionMatrixProvider::new();
    mock.expect_name().return_const("remote");
    mock.expect_compute_decision_matrix()
        .returning(|raw, _ctx| Ok(raw.clone()));
    mock
}

/// Mock provider that always fails with `error`.
#[must_use]
pub fn mock_provider_error(error: RemoteScoringError) -> MockDecisionMatrixProvider {
    let mut mock = MockDecisionMatrixProvider::new();
    mock.expect_name().return_const("remote");
    mock.expect_compute_decision_matrix()
        .returning(move |_raw, _ctx| Err(error.clone()));
    mock
}

/// Mock cache store whose every operation fails.
#[must_use]
pub fn mock_store_error(error: CacheError) -> MockCacheStore {
    let mut mock = MockCacheStore::new();
    let (save, load, remove, clear) = (error.clone(), error.clone(), error.clone(), error);
    mock.expect_save_entry()
        .returning(move |_, _, _| Err(save.clone()));
    mock.expect_load_entry()
        .returning(move |_, _| Err(load.clone()));
    mock.expect_remove_entry()
        .returning(move |_, _| Err(remove.clone()));
    mock.expect_clear_session()
        .returning(move |_| Err(clear.clone()));
    mock
}

/// Provider that answers only after `delay`.
#[derive(Debug, Clone, Copy)]
pub struct SlowProvider {
    /// Time before the answer.
    pub delay: Duration,
}

impl SlowProvider {
    /// A provider that outlasts any test.
    #[must_use]
    pub const fn hanging() -> Self {
        Self {
            delay: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl DecisionMatrixProvider for SlowProvider {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn compute_decision_matrix(
        &self,
        raw: &DecisionMatrix,
        _context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        tokio::time::sleep(self.delay).await;
        Ok(raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CacheKey;
    use crate::traits::CacheStore;

    #[test]
    fn test_fixtures_are_consistent() {
        let criteria = five_criteria();
        for room in three_rooms() {
            for name in criteria.names() {
                assert!(room.attribute(&name).is_some());
            }
        }
        assert_eq!(test_listings().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_provider_echo() {
        let raw = DecisionMatrix::new(vec![1.into()], vec!["price".into()], vec![vec![5.0]]).unwrap();
        let out = mock_provider_echo()
            .compute_decision_matrix(&raw, &ScoringContext::new("b"))
            .await
            .unwrap();
        assert_eq!(out, raw);
    }

    #[tokio::test]
    async fn test_mock_store_error() {
        let store = mock_store_error(CacheError::ConnectionFailed {
            message: "gone".into(),
        });
        assert!(store.load_entry("s", CacheKey::Result).await.is_err());
        assert!(store.clear_session("s").await.is_err());
    }
}
