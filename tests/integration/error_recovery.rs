//! Error recovery and edge case tests.
//!
//! Tests how the flow handles bad input, stale results, cancellation and a
//! failing cache store, and that it recovers for the next batch.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use room_dss::error::{FlowError, InvalidInput};
use room_dss::flow::{BatchRequest, FlowStage, StagedFlow};
use room_dss::model::{CriteriaSet, RoomListing};
use room_dss::provider::{RemoteScorer, RemoteScorerConfig, ScorerChain};
use room_dss::scoring::{ExplanationBuilder, ExplanationRequest};
use room_dss::storage::CacheKey;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn listings() -> Vec<RoomListing> {
    vec![
        RoomListing::new(1, 1000.0, 20.0, 1.0, 4.0, 3, 8.0),
        RoomListing::new(2, 1400.0, 26.0, 2.0, 4.4, 4, 6.5),
    ]
}

fn flow() -> StagedFlow {
    StagedFlow::new(CriteriaSet::standard(), Arc::new(ScorerChain::local_only()))
}

#[tokio::test]
async fn test_missing_security_score_is_reported() {
    let mut rooms = listings();
    rooms[1].security_score = None;

    let err = flow().begin_listings(&rooms, None).await.unwrap_err();
    assert_eq!(
        err,
        FlowError::InvalidInput(InvalidInput::MissingCriterion {
            alternative: "2".into(),
            criterion: "securityScore".into()
        })
    );
}

#[tokio::test]
async fn test_duplicate_room_ids_rejected() {
    let rooms = vec![listings()[0].clone(), listings()[0].clone()];
    let err = flow().begin_listings(&rooms, None).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::InvalidInput(InvalidInput::DuplicateAlternative { .. })
    ));
}

#[tokio::test]
async fn test_flow_recovers_after_bad_batch() {
    let mut flow = flow();
    let mut bad = listings();
    bad[0].price = Some(json!("n/a"));
    assert!(flow.begin_listings(&bad, None).await.is_err());
    assert!(flow.batch_id().is_none());

    let response = flow
        .run_batch(BatchRequest {
            rooms: listings(),
            weights: None,
            criteria: None,
            filter_context: None,
        })
        .await
        .unwrap();
    assert_eq!(response.ranking.len(), 2);
}

#[tokio::test]
async fn test_stale_remote_result_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"matrix": [[1.0, 1.0, 1.0, 1.0, 1.0, 1.0], [2.0, 2.0, 2.0, 2.0, 2.0, 2.0]]}))
                .set_delay(Duration::from_millis(50)),
        )
        .mount(&server)
        .await;
    let remote = RemoteScorer::new(RemoteScorerConfig::new(server.uri()).with_max_retries(0), None)
        .unwrap();
    let chain = ScorerChain::new(Arc::new(remote), Duration::from_secs(2));
    let mut flow = StagedFlow::new(CriteriaSet::standard(), Arc::new(chain));

    flow.begin_listings(&listings(), None).await.unwrap();
    let pending = flow.request_decision().unwrap();
    let first = pending.batch_id().to_string();

    flow.begin_listings(&listings(), None).await.unwrap();
    assert_eq!(
        pending.await.unwrap_err(),
        FlowError::Cancelled { batch_id: first }
    );

    // The new batch proceeds normally.
    flow.advance_to_decision().await.unwrap();
    assert_eq!(flow.stage(), FlowStage::Decision);
}

#[tokio::test]
async fn test_go_back_past_current_stage() {
    let mut flow = flow();
    flow.begin_listings(&listings(), None).await.unwrap();

    let err = flow.go_back(FlowStage::Weighted).unwrap_err();
    assert!(matches!(err, FlowError::InvalidTransition { .. }));
    assert!(flow.snapshot(CacheKey::WeightedMatrix).is_none());
}

#[test]
fn test_explanation_request_missing_rank() {
    let builder = ExplanationBuilder::new(CriteriaSet::from_names(&["price"]).unwrap());
    let request = ExplanationRequest::new(5)
        .with_raw_attributes([("price".to_string(), 900.0)].into())
        .with_normalized_attributes([("price".to_string(), 1.0)].into())
        .with_weights([("price".to_string(), 1.0)].into())
        .with_total_score(1.0);

    assert_eq!(
        builder.explain(request).unwrap_err(),
        InvalidInput::MissingField {
            field: "rank".into()
        }
    );
}
