//! Remote scoring tests.
//!
//! Tests the flow against a wiremock scorer: success, fallback on error,
//! fallback on timeout and the circuit breaker.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use room_dss::config::{Config, SecretString};
use room_dss::flow::StagedFlow;
use room_dss::metrics::MetricsCollector;
use room_dss::model::{Alternative, CriteriaSet};
use room_dss::provider::{
    CircuitBreakerConfig, CircuitState, DecisionSource, RemoteScorer, RemoteScorerConfig,
    ScorerChain,
};
use room_dss::storage::CacheKey;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn criteria() -> CriteriaSet {
    CriteriaSet::from_names(&["price", "area"]).unwrap()
}

fn rooms() -> Vec<Alternative> {
    vec![
        Alternative::new(1)
            .with_attribute("price", 1000.0)
            .with_attribute("area", 18.0),
        Alternative::new(2)
            .with_attribute("price", 1500.0)
            .with_attribute("area", 30.0),
    ]
}

fn remote_config(server: &MockServer) -> Config {
    Config {
        scorer_url: Some(server.uri()),
        scorer_api_key: Some(SecretString::new("scorer-token")),
        scorer_timeout_ms: 300,
        scorer_max_retries: 0,
        criteria: Some(vec!["price".into(), "area".into()]),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_remote_decision_matrix_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/decision-matrix"))
        .and(header("authorization", "Bearer scorer-token"))
        .and(body_partial_json(json!({
            "headers": ["price", "area"],
            "filterContext": {"maxPrice": 2000}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matrix": [[1500.0, 30.0], [1000.0, 20.0]],
            "rowIds": [2, 1]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut flow = StagedFlow::from_config(&remote_config(&server), Arc::new(MetricsCollector::new()))
        .await
        .unwrap();
    flow.begin_batch(&rooms(), Some(json!({"maxPrice": 2000})))
        .await
        .unwrap();

    assert_eq!(flow.advance_to_decision().await.unwrap(), DecisionSource::Remote);
    assert!(!flow.is_estimated());
    let x = flow.cache().decision().unwrap();
    assert_eq!(x.rows(), &[vec![1000.0, 20.0], vec![1500.0, 30.0]]);
}

#[tokio::test]
async fn test_server_error_falls_back_to_estimate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let metrics = Arc::new(MetricsCollector::new());
    let mut flow = StagedFlow::from_config(&remote_config(&server), Arc::clone(&metrics))
        .await
        .unwrap();
    flow.begin_batch(&rooms(), None).await.unwrap();
    let source = flow.advance_to_decision().await.unwrap();
    assert!(matches!(source, DecisionSource::LocalFallback { ref reason } if reason.contains("503")));

    flow.normalize().await.unwrap();
    flow.confirm_weights().await.unwrap();
    let report = flow.rank().await.unwrap();
    assert!(report.estimated);
    assert_eq!(report.decision, report.raw);
    assert_eq!(metrics.summary().fallback_count, 1);
}

#[tokio::test]
async fn test_slow_scorer_is_bounded_by_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"matrix": [[1.0, 1.0], [2.0, 2.0]]}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut flow = StagedFlow::from_config(&remote_config(&server), Arc::new(MetricsCollector::new()))
        .await
        .unwrap();
    flow.begin_batch(&rooms(), None).await.unwrap();

    let started = std::time::Instant::now();
    let source = flow.advance_to_decision().await.unwrap();
    assert!(source.is_estimated());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(flow.snapshot(CacheKey::DecisionMatrix).is_some());
}

#[tokio::test]
async fn test_circuit_opens_after_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let remote = RemoteScorer::new(RemoteScorerConfig::new(server.uri()).with_max_retries(0), None)
        .unwrap();
    let chain = Arc::new(
        ScorerChain::new(Arc::new(remote), Duration::from_secs(1)).with_circuit_breaker(
            CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
        ),
    );
    let mut flow = StagedFlow::new(criteria(), Arc::clone(&chain));

    for _ in 0..2 {
        flow.begin_batch(&rooms(), None).await.unwrap();
        assert!(flow.advance_to_decision().await.unwrap().is_estimated());
    }
    assert_eq!(chain.circuit_state(), CircuitState::Open);
}
