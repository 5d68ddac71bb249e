//! Availability-aware provider chain.
//!
//! Tries the remote scorer when one is configured and the circuit allows it,
//! bounded by a timeout, and falls back to [`LocalScorer`] on any failure. The
//! chain itself never fails: the worst case is a locally computed X marked as
//! an estimate.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::local::LocalScorer;
use super::remote::{RemoteScorer, RemoteScorerConfig, DEFAULT_RETRY_DELAY_MS};
use crate::config::Config;
use crate::error::RemoteScoringError;
use crate::metrics::{FallbackEvent, MetricsCollector, StageEvent, Timer};
use crate::model::DecisionMatrix;
use crate::traits::{DecisionMatrixProvider, ScoringContext};

/// Where a decision matrix came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DecisionSource {
    /// Computed by the remote scorer.
    Remote,
    /// No remote scorer configured; the local matrix is authoritative.
    Local,
    /// Remote scoring failed and the local matrix stands in for it.
    LocalFallback {
        /// Why the remote result was not used.
        reason: String,
    },
}

impl DecisionSource {
    /// Returns true if the matrix is a stand-in for a failed remote result.
    #[must_use]
    pub const fn is_estimated(&self) -> bool {
        matches!(self, Self::LocalFallback { .. })
    }
}

/// X for one batch, tagged with the batch it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    /// Batch id the matrix belongs to.
    pub batch_id: String,
    /// X.
    pub matrix: DecisionMatrix,
    /// Provenance.
    pub source: DecisionSource,
}

impl DecisionOutcome {
    /// Returns true if the matrix is a local estimate.
    #[must_use]
    pub const fn is_estimated(&self) -> bool {
        self.source.is_estimated()
    }
}

/// Remote-first decision-matrix provider with local fallback.
pub struct ScorerChain {
    remote: Option<Arc<dyn DecisionMatrixProvider>>,
    timeout: Duration,
    breaker: Mutex<CircuitBreaker>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl std::fmt::Debug for ScorerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerChain")
            .field("remote", &self.remote.as_ref().map(|r| r.name()))
            .field("timeout", &self.timeout)
            .field("circuit", &self.circuit_state())
            .finish_non_exhaustive()
    }
}

impl ScorerChain {
    /// A chain with no remote scorer.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            remote: None,
            timeout: Duration::ZERO,
            breaker: Mutex::new(CircuitBreaker::default()),
            metrics: None,
        }
    }

    /// A chain that tries `remote` for at most `timeout`.
    #[must_use]
    pub fn new(remote: Arc<dyn DecisionMatrixProvider>, timeout: Duration) -> Self {
        Self {
            remote: Some(remote),
            timeout,
            breaker: Mutex::new(CircuitBreaker::default()),
            metrics: None,
        }
    }

    /// Build the chain described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteScoringError`] if the HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, RemoteScoringError> {
        let Some(url) = &config.scorer_url else {
            return Ok(Self::local_only());
        };
        let remote = RemoteScorer::new(
            RemoteScorerConfig::new(url.clone())
                .with_timeout_ms(config.scorer_timeout_ms)
                .with_max_retries(config.scorer_max_retries)
                .with_retry_delay_ms(DEFAULT_RETRY_DELAY_MS),
            config.scorer_api_key.clone(),
        )?;
        Ok(Self::new(
            Arc::new(remote),
            Duration::from_millis(config.scorer_timeout_ms),
        ))
    }

    /// Replace the circuit breaker thresholds.
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = Mutex::new(CircuitBreaker::new(config));
        self
    }

    /// Record stage and fallback metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns true if a remote scorer is configured.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Current circuit state.
    #[must_use]
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker().state()
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compute X for a batch.
    pub async fn compute(&self, raw: &DecisionMatrix, context: &ScoringContext) -> DecisionOutcome {
        let timer = Timer::start();
        let outcome = match &self.remote {
            None => DecisionOutcome {
                batch_id: context.batch_id.clone(),
                matrix: LocalScorer::decision_matrix(raw),
                source: DecisionSource::Local,
            },
            Some(remote) => match self.try_remote(remote.as_ref(), raw, context).await {
                Ok(matrix) => DecisionOutcome {
                    batch_id: context.batch_id.clone(),
                    matrix,
                    source: DecisionSource::Remote,
                },
                Err(e) => {
                    tracing::warn!(
                        batch_id = %context.batch_id,
                        provider = remote.name(),
                        error = %e,
                        "Remote scoring unavailable, using local decision matrix"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_fallback(FallbackEvent::new(
                            remote.name(),
                            LocalScorer::NAME,
                            e.to_string(),
                        ));
                    }
                    DecisionOutcome {
                        batch_id: context.batch_id.clone(),
                        matrix: LocalScorer::decision_matrix(raw),
                        source: DecisionSource::LocalFallback {
                            reason: e.to_string(),
                        },
                    }
                }
            },
        };

        let elapsed_ms = timer.elapsed_ms();
        tracing::debug!(
            batch_id = %context.batch_id,
            source = ?outcome.source,
            elapsed_ms,
            "Decision matrix ready"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record(
                StageEvent::new("decision", elapsed_ms, !outcome.is_estimated())
                    .with_batch(context.batch_id.clone()),
            );
        }
        outcome
    }

    async fn try_remote(
        &self,
        remote: &dyn DecisionMatrixProvider,
        raw: &DecisionMatrix,
        context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        if !self.breaker().allow_request() {
            return Err(RemoteScoringError::CircuitOpen);
        }

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let result = match tokio::time::timeout(
            self.timeout,
            remote.compute_decision_matrix(raw, context),
        )
        .await
        {
            Ok(Ok(matrix)) => check_labels(raw, matrix),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RemoteScoringError::Timeout { timeout_ms }),
        };

        let mut breaker = self.breaker();
        match &result {
            Ok(_) => breaker.record_success(),
            Err(_) => breaker.record_failure(),
        }
        result
    }
}

fn check_labels(raw: &DecisionMatrix, x: DecisionMatrix) -> Result<DecisionMatrix, RemoteScoringError> {
    if x.n_rows() != raw.n_rows() || x.n_cols() != raw.n_cols() {
        return Err(RemoteScoringError::ShapeMismatch {
            expected_rows: raw.n_rows(),
            expected_cols: raw.n_cols(),
            rows: x.n_rows(),
            cols: x.n_cols(),
        });
    }
    if x.row_ids() != raw.row_ids() || x.headers() != raw.headers() {
        return Err(RemoteScoringError::UnexpectedResponse {
            message: "Decision matrix labels do not match the batch".to_string(),
        });
    }
    Ok(x)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::traits::MockDecisionMatrixProvider;
    use async_trait::async_trait;

    fn raw() -> DecisionMatrix {
        DecisionMatrix::new(
            vec![1.into(), 2.into()],
            vec!["price".into(), "area".into()],
            vec![vec![1000.0, 20.0], vec![2000.0, 30.0]],
        )
        .unwrap()
    }

    fn ctx() -> ScoringContext {
        ScoringContext::new("batch-1")
    }

    fn failing_mock(times: usize) -> MockDecisionMatrixProvider {
        let mut mock = MockDecisionMatrixProvider::new();
        mock.expect_name().return_const("remote");
        mock.expect_compute_decision_matrix()
            .times(times)
            .returning(|_, _| {
                Err(RemoteScoringError::Status {
                    status: 503,
                    body: String::new(),
                })
            });
        mock
    }

    struct SlowProvider;

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
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(raw.clone())
        }
    }

    #[tokio::test]
    async fn test_local_only() {
        let chain = ScorerChain::local_only();
        let outcome = chain.compute(&raw(), &ctx()).await;
        assert_eq!(outcome.source, DecisionSource::Local);
        assert!(!outcome.is_estimated());
        assert_eq!(outcome.matrix, raw());
        assert_eq!(outcome.batch_id, "batch-1");
        assert!(!chain.has_remote());
    }

    #[tokio::test]
    async fn test_remote_success() {
        let remote_x = raw().with_values(vec![vec![0.9, 1.0], vec![0.1, 2.0]]).unwrap();
        let expected = remote_x.clone();

        let mut mock = MockDecisionMatrixProvider::new();
        mock.expect_name().return_const("remote");
        mock.expect_compute_decision_matrix()
            .times(1)
            .returning(move |_, _| Ok(remote_x.clone()));

        let chain = ScorerChain::new(Arc::new(mock), Duration::from_secs(1));
        let outcome = chain.compute(&raw(), &ctx()).await;
        assert_eq!(outcome.source, DecisionSource::Remote);
        assert_eq!(outcome.matrix, expected);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back() {
        let metrics = Arc::new(MetricsCollector::new());
        let chain = ScorerChain::new(Arc::new(failing_mock(1)), Duration::from_secs(1))
            .with_metrics(Arc::clone(&metrics));

        let outcome = chain.compute(&raw(), &ctx()).await;
        assert!(outcome.is_estimated());
        assert_eq!(outcome.matrix, raw());
        match outcome.source {
            DecisionSource::LocalFallback { reason } => assert!(reason.contains("503")),
            other => panic!("unexpected source {other:?}"),
        }

        let summary = metrics.summary();
        assert_eq!(summary.fallback_count, 1);
        assert_eq!(summary.by_stage["decision"].failed, 1);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let chain = ScorerChain::new(Arc::new(SlowProvider), Duration::from_millis(50));
        let outcome = chain.compute(&raw(), &ctx()).await;
        assert_eq!(
            outcome.source,
            DecisionSource::LocalFallback {
                reason: RemoteScoringError::Timeout { timeout_ms: 50 }.to_string()
            }
        );
        assert_eq!(outcome.matrix, raw());
    }

    #[tokio::test]
    async fn test_mislabeled_remote_matrix_rejected() {
        let wrong = DecisionMatrix::new(
            vec![2.into(), 1.into()],
            vec!["price".into(), "area".into()],
            vec![vec![1.0, 1.0], vec![0.0, 0.0]],
        )
        .unwrap();
        let mut mock = MockDecisionMatrixProvider::new();
        mock.expect_name().return_const("remote");
        mock.expect_compute_decision_matrix()
            .returning(move |_, _| Ok(wrong.clone()));

        let chain = ScorerChain::new(Arc::new(mock), Duration::from_secs(1));
        let outcome = chain.compute(&raw(), &ctx()).await;
        assert!(outcome.is_estimated());
        assert_eq!(outcome.matrix, raw());
    }

    #[tokio::test]
    async fn test_circuit_opens_and_skips_remote() {
        // Two calls reach the remote, the third is short-circuited.
        let chain = ScorerChain::new(Arc::new(failing_mock(2)), Duration::from_secs(1))
            .with_circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 2,
                cooldown: Duration::from_secs(60),
            });

        chain.compute(&raw(), &ctx()).await;
        chain.compute(&raw(), &ctx()).await;
        assert_eq!(chain.circuit_state(), CircuitState::Open);

        let outcome = chain.compute(&raw(), &ctx()).await;
        assert_eq!(
            outcome.source,
            DecisionSource::LocalFallback {
                reason: RemoteScoringError::CircuitOpen.to_string()
            }
        );
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_value(DecisionSource::LocalFallback {
            reason: "timeout".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"kind": "local-fallback", "reason": "timeout"}));
        assert_eq!(
            serde_json::to_value(DecisionSource::Remote).unwrap(),
            serde_json::json!({"kind": "remote"})
        );
    }
}
