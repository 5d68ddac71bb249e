//! Stage-by-stage workflow tests.
//!
//! Tests the flow: begin → decision → normalize → weights → rank → go back

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;

use room_dss::flow::{FlowStage, StagedFlow};
use room_dss::model::{Alternative, CriteriaSet, Criterion};
use room_dss::provider::{DecisionSource, ScorerChain};
use room_dss::scoring::{score_batch, ExplanationBuilder};
use room_dss::storage::{CacheKey, MemoryCacheStore};
use room_dss::traits::CacheStore;

fn criteria() -> CriteriaSet {
    CriteriaSet::from_names(&["price", "area", "distance", "rating"]).unwrap()
}

fn rooms() -> Vec<Alternative> {
    [
        (1, 1600.0, 22.0, 1.5, 4.2),
        (2, 1100.0, 15.0, 3.0, 3.8),
        (3, 2100.0, 32.0, 0.5, 4.9),
    ]
    .into_iter()
    .map(|(id, price, area, distance, rating)| {
        Alternative::new(id)
            .with_attribute("price", price)
            .with_attribute("area", area)
            .with_attribute("distance", distance)
            .with_attribute("rating", rating)
    })
    .collect()
}

fn flow() -> StagedFlow {
    StagedFlow::new(criteria(), Arc::new(ScorerChain::local_only()))
}

#[tokio::test]
async fn test_each_stage_is_cached_as_it_completes() {
    let mut flow = flow();
    flow.begin_batch(&rooms(), None).await.unwrap();
    assert_eq!(flow.cache().keys(), vec![CacheKey::InitMatrix]);

    assert_eq!(flow.advance_to_decision().await.unwrap(), DecisionSource::Local);
    assert_eq!(flow.stage(), FlowStage::Decision);
    assert!(flow.snapshot(CacheKey::DecisionMatrix).is_some());

    let r = flow.normalize().await.unwrap();
    for row in r.rows() {
        for v in row {
            assert!((0.0..=1.0).contains(v));
        }
    }
    assert_eq!(flow.stage(), FlowStage::Normalized);

    flow.set_weights(vec![2.0, 1.0, 1.0, 1.0]).unwrap();
    let v = flow.confirm_weights().await.unwrap();
    assert_eq!(v.weights(), &[2.0, 1.0, 1.0, 1.0]);

    let report = flow.rank().await.unwrap();
    assert_eq!(flow.cache().keys(), CacheKey::ALL.to_vec());

    let expected = score_batch(&rooms(), &criteria(), &[2.0, 1.0, 1.0, 1.0]).unwrap();
    assert_eq!(report.result, expected.result);
}

#[tokio::test]
async fn test_normalized_stage_waits_for_confirmation() {
    let mut flow = flow();
    flow.begin_batch(&rooms(), None).await.unwrap();
    flow.advance_to_decision().await.unwrap();
    flow.normalize().await.unwrap();

    flow.set_weights(vec![1.0, 3.0, 1.0, 1.0]).unwrap();
    flow.set_weights(vec![1.0, 1.0, 3.0, 1.0]).unwrap();
    assert_eq!(flow.stage(), FlowStage::Normalized);
    assert!(flow.snapshot(CacheKey::WeightedMatrix).is_none());

    flow.confirm_weights().await.unwrap();
    let report = flow.rank().await.unwrap();
    assert_eq!(report.weights, vec![1.0, 1.0, 3.0, 1.0]);
}

#[tokio::test]
async fn test_back_navigation_returns_cached_snapshots() {
    let mut flow = flow();
    flow.begin_batch(&rooms(), None).await.unwrap();
    flow.advance_to_decision().await.unwrap();
    flow.normalize().await.unwrap();
    flow.confirm_weights().await.unwrap();
    flow.rank().await.unwrap();

    let raw = flow.snapshot(CacheKey::InitMatrix).unwrap();
    let back = flow.go_back(FlowStage::Init).unwrap();
    assert_eq!(back, raw);
    assert_eq!(flow.stage(), FlowStage::Init);

    // Later entries stay readable until the stage is recomputed.
    assert!(flow.snapshot(CacheKey::Result).is_some());

    flow.advance_to_decision().await.unwrap();
    assert!(flow.snapshot(CacheKey::NormalizedMatrix).is_none());
    assert!(flow.snapshot(CacheKey::Result).is_none());
}

#[tokio::test]
async fn test_all_identical_rooms_share_closeness_zero() {
    let criteria = CriteriaSet::new(vec![Criterion::cost("price"), Criterion::benefit("area")]).unwrap();
    let rooms: Vec<Alternative> = (1..=3)
        .map(|id| {
            Alternative::new(id)
                .with_attribute("price", 1000.0)
                .with_attribute("area", 20.0)
        })
        .collect();
    let mut flow = StagedFlow::new(criteria.clone(), Arc::new(ScorerChain::local_only()));
    flow.begin_batch(&rooms, None).await.unwrap();
    flow.advance_to_decision().await.unwrap();
    let r = flow.normalize().await.unwrap();
    assert!(r.rows().iter().flatten().all(|v| *v == 1.0));

    flow.confirm_weights().await.unwrap();
    let report = flow.rank().await.unwrap();
    assert_eq!(report.result.c_star, vec![0.0, 0.0, 0.0]);
    let ranks: Vec<usize> = report.result.ranking.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);

    let explanations = ExplanationBuilder::new(criteria).explain_all(&report).unwrap();
    assert_eq!(explanations.len(), 3);
}

#[tokio::test]
async fn test_store_mirrors_memory_cache() {
    let store = Arc::new(MemoryCacheStore::new());
    let mut flow = flow().with_store(Arc::clone(&store) as Arc<dyn CacheStore>, "session-42");
    flow.begin_batch(&rooms(), None).await.unwrap();
    flow.advance_to_decision().await.unwrap();
    flow.normalize().await.unwrap();

    let cached = serde_json::to_value(flow.snapshot(CacheKey::NormalizedMatrix).unwrap()).unwrap();
    let stored = store
        .load_entry("session-42", CacheKey::NormalizedMatrix)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, cached);
    assert_eq!(store.len().await, 3);
}
