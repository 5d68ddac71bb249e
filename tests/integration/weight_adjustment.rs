//! Weight adjustment workflow tests.
//!
//! Tests the flow: rank → adjust weights → confirm → rerank

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use room_dss::error::{FlowError, InvalidInput};
use room_dss::flow::{FlowStage, StagedFlow};
use room_dss::model::{Alternative, AlternativeId, CriteriaSet};
use room_dss::provider::ScorerChain;
use room_dss::storage::CacheKey;

fn criteria() -> CriteriaSet {
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

fn rooms() -> Vec<Alternative> {
    vec![
        room(1, 1500.0, 25.0, 2.0, 4.0, 10.0),
        room(2, 1000.0, 30.0, 1.0, 5.0, 0.0),
        room(3, 2000.0, 20.0, 3.0, 3.0, 5.0),
    ]
}

async fn completed_flow() -> StagedFlow {
    let mut flow = StagedFlow::new(criteria(), Arc::new(ScorerChain::local_only()));
    flow.begin_batch(&rooms(), None).await.unwrap();
    flow.advance_to_decision().await.unwrap();
    flow.normalize().await.unwrap();
    flow.confirm_weights().await.unwrap();
    flow.rank().await.unwrap();
    flow
}

#[tokio::test]
async fn test_security_weight_promotes_secure_room() {
    let mut flow = completed_flow().await;
    let secure = AlternativeId::Number(1);
    assert_eq!(flow.report().unwrap().result.rank_of(&secure), Some(2));

    flow.adjust_weights(vec![1.0, 1.0, 1.0, 1.0, 5.0]).await.unwrap();
    flow.confirm_weights().await.unwrap();
    let report = flow.rank().await.unwrap();

    assert_eq!(report.result.rank_of(&secure), Some(1));
}

#[tokio::test]
async fn test_scaling_weights_keeps_order() {
    let mut flow = completed_flow().await;
    flow.adjust_weights(vec![1.0, 2.0, 1.0, 1.0, 3.0]).await.unwrap();
    flow.confirm_weights().await.unwrap();
    let unit = flow.rank().await.unwrap();

    flow.adjust_weights(vec![10.0, 20.0, 10.0, 10.0, 30.0]).await.unwrap();
    flow.confirm_weights().await.unwrap();
    let scaled = flow.rank().await.unwrap();

    assert_eq!(unit.result.ordered_ids(), scaled.result.ordered_ids());
}

#[tokio::test]
async fn test_adjust_keeps_normalized_matrix() {
    let mut flow = completed_flow().await;
    let before = flow.snapshot(CacheKey::NormalizedMatrix).unwrap();

    flow.adjust_weights(vec![2.0; 5]).await.unwrap();

    assert_eq!(flow.stage(), FlowStage::Normalized);
    assert_eq!(flow.snapshot(CacheKey::NormalizedMatrix).unwrap(), before);
    assert!(flow.report().is_none());
}

#[tokio::test]
async fn test_invalid_adjustment_leaves_result_intact() {
    let mut flow = completed_flow().await;
    let before = flow.report().unwrap();

    let err = flow.adjust_weights(vec![1.0, -1.0, 1.0, 1.0, 1.0]).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::InvalidInput(InvalidInput::NonPositiveWeight { criterion, .. }) if criterion == "area"
    ));
    assert_eq!(flow.stage(), FlowStage::Complete);
    assert_eq!(flow.report(), Some(before));
}
