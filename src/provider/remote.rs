//! Remote decision-matrix scorer.
//!
//! This module provides:
//! - HTTP client for the scoring service's `/decision-matrix` endpoint
//! - Retry logic with exponential backoff
//! - Response validation against the batch shape

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SecretString;
use crate::error::RemoteScoringError;
use crate::metrics::Timer;
use crate::model::{AlternativeId, DecisionMatrix};
use crate::traits::{DecisionMatrixProvider, ScoringContext};

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Default retry delay in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// Maximum response body characters kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Remote scorer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteScorerConfig {
    /// Base URL of the scoring service.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds, doubled per retry.
    pub retry_delay_ms: u64,
}

impl RemoteScorerConfig {
    /// Create a configuration for a base URL with default limits.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    /// Set timeout in milliseconds.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set maximum retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set retry delay in milliseconds.
    #[must_use]
    pub const fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecisionMatrixRequest<'a> {
    batch_id: &'a str,
    headers: &'a [String],
    rows: Vec<RowPayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_context: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct RowPayload<'a> {
    id: &'a AlternativeId,
    values: &'a [f64],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionMatrixResponse {
    matrix: Vec<Vec<f64>>,
    #[serde(default)]
    row_ids: Option<Vec<AlternativeId>>,
}

/// HTTP-backed [`DecisionMatrixProvider`].
#[derive(Debug)]
pub struct RemoteScorer {
    client: Client,
    api_key: Option<SecretString>,
    config: RemoteScorerConfig,
}

impl RemoteScorer {
    /// Provider name.
    pub const NAME: &'static str = "remote";

    /// Create a new remote scorer.
    ///
    /// An empty API key is treated as no key.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteScoringError::Network`] if the HTTP client cannot be
    /// built.
    pub fn new(
        config: RemoteScorerConfig,
        api_key: Option<SecretString>,
    ) -> Result<Self, RemoteScoringError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RemoteScoringError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            config,
        })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Get the scorer configuration.
    #[must_use]
    pub const fn config(&self) -> &RemoteScorerConfig {
        &self.config
    }

    async fn execute_with_retry(
        &self,
        raw: &DecisionMatrix,
        context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        let mut last_error = None;
        let mut delay = self.config.retry_delay_ms;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, delay_ms = delay, "Retrying remote scorer request");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay *= 2;
            }

            match self.execute_once(raw, context).await {
                Ok(matrix) => return Ok(matrix),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt, "Retryable remote scorer error");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteScoringError::Network {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn execute_once(
        &self,
        raw: &DecisionMatrix,
        context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        let url = format!("{}/decision-matrix", self.config.base_url.trim_end_matches('/'));
        let body = DecisionMatrixRequest {
            batch_id: &context.batch_id,
            headers: raw.headers(),
            rows: raw
                .row_ids()
                .iter()
                .zip(raw.rows())
                .map(|(id, values)| RowPayload { id, values })
                .collect(),
            filter_context: context.filter_context.as_ref(),
        };
        let timer = Timer::start();

        tracing::debug!(
            url = %url,
            batch_id = %context.batch_id,
            rows = raw.n_rows(),
            timeout_ms = self.config.timeout_ms,
            "Starting remote scorer request"
        );

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose());
        }

        let response = request.send().await.map_err(|e| {
            let elapsed_ms = timer.elapsed_ms();
            if e.is_timeout() {
                tracing::warn!(url = %url, elapsed_ms, "Remote scorer request timed out");
                RemoteScoringError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                }
            } else {
                tracing::warn!(url = %url, elapsed_ms, error = %e, "Remote scorer request failed");
                RemoteScoringError::Network {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        tracing::debug!(
            url = %url,
            status = %status,
            elapsed_ms = timer.elapsed_ms(),
            "Remote scorer response received"
        );

        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(RemoteScoringError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DecisionMatrixResponse =
            response
                .json()
                .await
                .map_err(|e| RemoteScoringError::UnexpectedResponse {
                    message: format!("Failed to parse response: {e}"),
                })?;

        Self::validate_response(raw, parsed)
    }

    /// Check the returned matrix against the batch and put rows in batch
    /// order.
    fn validate_response(
        raw: &DecisionMatrix,
        response: DecisionMatrixResponse,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        let (n, m) = (raw.n_rows(), raw.n_cols());
        let shape_error = |rows: usize, cols: usize| RemoteScoringError::ShapeMismatch {
            expected_rows: n,
            expected_cols: m,
            rows,
            cols,
        };
        if response.matrix.len() != n {
            return Err(shape_error(
                response.matrix.len(),
                response.matrix.first().map_or(0, Vec::len),
            ));
        }
        if let Some(bad) = response.matrix.iter().find(|row| row.len() != m) {
            return Err(shape_error(n, bad.len()));
        }
        if response.matrix.iter().flatten().any(|v| !v.is_finite()) {
            return Err(RemoteScoringError::UnexpectedResponse {
                message: "Matrix contains non-finite values".to_string(),
            });
        }

        let values = match response.row_ids {
            None => response.matrix,
            Some(ids) => {
                if ids.len() != n {
                    return Err(shape_error(ids.len(), m));
                }
                let mut ordered = vec![Vec::new(); n];
                let mut seen = vec![false; n];
                for (id, row) in ids.iter().zip(response.matrix) {
                    let i = raw.row_index(id).ok_or_else(|| {
                        RemoteScoringError::UnexpectedResponse {
                            message: format!("Unknown row id {id}"),
                        }
                    })?;
                    if seen[i] {
                        return Err(RemoteScoringError::UnexpectedResponse {
                            message: format!("Duplicate row id {id}"),
                        });
                    }
                    seen[i] = true;
                    ordered[i] = row;
                }
                ordered
            }
        };

        raw.with_values(values)
            .map_err(|e| RemoteScoringError::UnexpectedResponse {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl DecisionMatrixProvider for RemoteScorer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn compute_decision_matrix(
        &self,
        raw: &DecisionMatrix,
        context: &ScoringContext,
    ) -> Result<DecisionMatrix, RemoteScoringError> {
        self.execute_with_retry(raw, context).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    clippy::unused_async
)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw() -> DecisionMatrix {
        DecisionMatrix::new(
            vec![1.into(), 2.into()],
            vec!["price".into(), "area".into()],
            vec![vec![1000.0, 20.0], vec![2000.0, 30.0]],
        )
        .unwrap()
    }

    fn scorer(server: &MockServer, max_retries: u32) -> RemoteScorer {
        let config = RemoteScorerConfig::new(server.uri())
            .with_max_retries(max_retries)
            .with_retry_delay_ms(10)
            .with_timeout_ms(2_000);
        RemoteScorer::new(config, Some(SecretString::new("test-key"))).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = RemoteScorerConfig::new("http://localhost:9000");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_delay_ms, DEFAULT_RETRY_DELAY_MS);
    }

    #[test]
    fn test_empty_api_key_is_dropped() {
        let scorer = RemoteScorer::new(
            RemoteScorerConfig::new("http://localhost"),
            Some(SecretString::new("")),
        )
        .unwrap();
        assert!(scorer.api_key.is_none());
        assert_eq!(scorer.base_url(), "http://localhost");
    }

    #[tokio::test]
    async fn test_success_sends_contract_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/decision-matrix"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "batchId": "b-1",
                "headers": ["price", "area"],
                "rows": [{"id": 1, "values": [1000.0, 20.0]}, {"id": 2, "values": [2000.0, 30.0]}],
                "filterContext": {"campus": "north"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"matrix": [[0.7, 20.0], [0.2, 30.0]]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = ScoringContext::new("b-1").with_filter_context(json!({"campus": "north"}));
        let x = scorer(&server, 0)
            .compute_decision_matrix(&raw(), &ctx)
            .await
            .unwrap();
        assert_eq!(x.rows(), &[vec![0.7, 20.0], vec![0.2, 30.0]]);
        assert_eq!(x.row_ids(), raw().row_ids());
    }

    #[tokio::test]
    async fn test_rows_reordered_by_row_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/decision-matrix"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matrix": [[2.0, 2.0], [1.0, 1.0]],
                "rowIds": [2, 1]
            })))
            .mount(&server)
            .await;

        let x = scorer(&server, 0)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap();
        assert_eq!(x.rows(), &[vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[tokio::test]
    async fn test_unknown_row_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matrix": [[2.0, 2.0], [1.0, 1.0]],
                "rowIds": [2, 9]
            })))
            .mount(&server)
            .await;

        let err = scorer(&server, 0)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteScoringError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_shape_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matrix": [[1.0, 2.0]]})))
            .mount(&server)
            .await;

        let err = scorer(&server, 0)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteScoringError::ShapeMismatch {
                expected_rows: 2,
                expected_cols: 2,
                rows: 1,
                cols: 2
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = scorer(&server, 0)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteScoringError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_retry_on_server_error() {
        let server = MockServer::start().await;
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = Arc::clone(&call_count);

        Mock::given(method("POST"))
            .and(path("/decision-matrix"))
            .respond_with(move |_req: &wiremock::Request| {
                let count = call_count_clone.fetch_add(1, Ordering::SeqCst);
                if count == 0 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                        .set_body_json(json!({"matrix": [[1.0, 1.0], [0.0, 0.0]]}))
                }
            })
            .mount(&server)
            .await;

        let result = scorer(&server, 1)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await;
        assert!(result.is_ok());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let err = scorer(&server, 2)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteScoringError::Status {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_no_retry_on_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = scorer(&server, 3)
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteScoringError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"matrix": [[1.0, 1.0], [0.0, 0.0]]})),
            )
            .mount(&server)
            .await;

        let config = RemoteScorerConfig::new(server.uri())
            .with_timeout_ms(100)
            .with_max_retries(0);
        let err = RemoteScorer::new(config, None)
            .unwrap()
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteScoringError::Timeout { timeout_ms: 100 });
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let config = RemoteScorerConfig::new("http://127.0.0.1:1").with_max_retries(0);
        let err = RemoteScorer::new(config, None)
            .unwrap()
            .compute_decision_matrix(&raw(), &ScoringContext::new("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteScoringError::Network { .. }));
    }
}
