//! Staged scoring flow.
//!
//! [`StagedFlow`] walks one batch of rooms through the scoring pipeline a
//! stage at a time so each intermediate matrix can be shown:
//!
//! ```text
//! begin_batch ─▶ Init ─(advance_to_decision)─▶ Decision ─(normalize)─▶ Normalized
//!                                                                         │
//!                   Complete ◀─(rank)─ Weighted ◀─(confirm_weights)───────┘
//! ```
//!
//! Only `Init → Decision` suspends: X comes from the [`ScorerChain`], which may
//! call the remote scorer. Every other stage is synchronous matrix work.
//!
//! Every completed stage is kept in a [`SessionCache`] and mirrored to an
//! optional [`CacheStore`]. Store failures are logged and never stop the flow.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use room_dss::flow::{FlowStage, StagedFlow};
//! use room_dss::model::{Alternative, CriteriaSet};
//! use room_dss::provider::ScorerChain;
//!
//! # tokio_test::block_on(async {
//! let criteria = CriteriaSet::from_names(&["price", "area"]).unwrap();
//! let mut flow = StagedFlow::new(criteria, Arc::new(ScorerChain::local_only()));
//!
//! let rooms = vec![
//!     Alternative::new(1).with_attribute("price", 1000.0).with_attribute("area", 18.0),
//!     Alternative::new(2).with_attribute("price", 1400.0).with_attribute("area", 30.0),
//! ];
//! flow.begin_batch(&rooms, None).await.unwrap();
//! flow.advance_to_decision().await.unwrap();
//! flow.normalize().await.unwrap();
//! flow.set_weights(vec![2.0, 1.0]).unwrap();
//! flow.confirm_weights().await.unwrap();
//! let report = flow.rank().await.unwrap();
//!
//! assert_eq!(flow.stage(), FlowStage::Complete);
//! assert_eq!(report.result.ranking[0].rank, 1);
//! # });
//! ```

mod batch;
mod cache;
mod pending;
mod state;

pub use batch::{BatchRequest, BatchResponse};
pub use cache::{CacheEntry, SessionCache};
pub use pending::PendingDecision;
pub use state::FlowStage;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{abortable, AbortHandle};
use futures_util::FutureExt;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, CacheError, FlowError, InvalidInput};
use crate::metrics::{MetricsCollector, StageEvent, Timer};
use crate::model::{
    alternatives_from_listings, Alternative, AlternativeId, CriteriaSet, DecisionMatrix,
    NormalizedMatrix, RoomListing, WeightedMatrix,
};
use crate::provider::{DecisionOutcome, DecisionSource, ScorerChain};
use crate::scoring::{self, IdealSolutionResult, ScoredBatch, WeightVector};
use crate::storage::{CacheKey, MemoryCacheStore, SqliteCacheStore};
use crate::traits::{CacheStore, ScoringContext};

/// Everything produced for one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowReport {
    /// Batch id.
    pub batch_id: String,
    /// True if X is a local stand-in for a failed remote computation.
    pub estimated: bool,
    /// Where X came from.
    pub source: DecisionSource,
    /// Raw attribute matrix as received.
    pub raw: DecisionMatrix,
    /// Decision matrix.
    #[serde(rename = "X")]
    pub decision: DecisionMatrix,
    /// Normalized matrix.
    #[serde(rename = "R")]
    pub normalized: NormalizedMatrix,
    /// Weighted matrix.
    #[serde(rename = "V")]
    pub weighted: WeightedMatrix,
    /// Weights applied to R.
    pub weights: Vec<f64>,
    /// Ideals, distances, closeness and ranking.
    #[serde(flatten)]
    pub result: IdealSolutionResult,
}

impl ScoredBatch for FlowReport {
    fn raw_matrix(&self) -> &DecisionMatrix {
        &self.raw
    }

    fn normalized_matrix(&self) -> &NormalizedMatrix {
        &self.normalized
    }

    fn weighted_matrix(&self) -> &WeightedMatrix {
        &self.weighted
    }

    fn ideal_solution(&self) -> &IdealSolutionResult {
        &self.result
    }
}

#[derive(Debug, Clone)]
struct BatchState {
    id: String,
    filter_context: Option<serde_json::Value>,
    source: Option<DecisionSource>,
}

/// Stage-by-stage orchestrator for one session.
pub struct StagedFlow {
    criteria: CriteriaSet,
    chain: Arc<ScorerChain>,
    store: Option<Arc<dyn CacheStore>>,
    session_id: String,
    metrics: Option<Arc<MetricsCollector>>,
    min_stage_display: Duration,
    stage: FlowStage,
    batch: Option<BatchState>,
    cache: SessionCache,
    weights: Vec<f64>,
    pending: Option<AbortHandle>,
}

impl std::fmt::Debug for StagedFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFlow")
            .field("session_id", &self.session_id)
            .field("stage", &self.stage)
            .field("batch_id", &self.batch_id())
            .field("weights", &self.weights)
            .field("cached", &self.cache.keys())
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl StagedFlow {
    /// Create a flow with no persistent store.
    #[must_use]
    pub fn new(criteria: CriteriaSet, chain: Arc<ScorerChain>) -> Self {
        let weights = criteria.default_weights();
        Self {
            criteria,
            chain,
            store: None,
            session_id: Uuid::new_v4().to_string(),
            metrics: None,
            min_stage_display: Duration::ZERO,
            stage: FlowStage::Init,
            batch: None,
            cache: SessionCache::new(),
            weights,
            pending: None,
        }
    }

    /// Build the flow described by the configuration.
    ///
    /// Uses a [`SqliteCacheStore`] when `SESSION_CACHE_PATH` is set and a
    /// [`MemoryCacheStore`] otherwise. Entries are stored under the
    /// configured session id, so each run's first batch replaces the previous
    /// run's entries.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the criteria are unknown, the HTTP client
    /// cannot be built or the cache database cannot be opened.
    pub async fn from_config(
        config: &Config,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, AppError> {
        let criteria = config.criteria_set()?;
        let chain = ScorerChain::from_config(config)?.with_metrics(Arc::clone(&metrics));
        let store: Arc<dyn CacheStore> = match &config.session_cache_path {
            Some(path) => Arc::new(SqliteCacheStore::new(path).await?),
            None => Arc::new(MemoryCacheStore::new()),
        };

        Ok(Self::new(criteria, Arc::new(chain))
            .with_store(store, config.session_id.clone())
            .with_metrics(metrics)
            .with_min_stage_display(Duration::from_millis(config.min_stage_display_ms)))
    }

    /// Mirror cache entries to `store` under `session_id`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>, session_id: impl Into<String>) -> Self {
        self.store = Some(store);
        self.session_id = session_id.into();
        self
    }

    /// Record stage latencies.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Keep the asynchronous stage pending for at least `duration`.
    ///
    /// Cosmetic only: the transition still waits for the decision matrix.
    #[must_use]
    pub fn with_min_stage_display(mut self, duration: Duration) -> Self {
        self.min_stage_display = duration;
        self
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> FlowStage {
        self.stage
    }

    /// Current batch id.
    #[must_use]
    pub fn batch_id(&self) -> Option<&str> {
        self.batch.as_ref().map(|b| b.id.as_str())
    }

    /// Session id used for the persistent store.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Active criteria.
    #[must_use]
    pub const fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    /// Weights that `confirm_weights` will apply.
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Where the current X came from, once known.
    #[must_use]
    pub fn decision_source(&self) -> Option<&DecisionSource> {
        self.batch.as_ref().and_then(|b| b.source.as_ref())
    }

    /// Returns true if the current X is a local estimate.
    #[must_use]
    pub fn is_estimated(&self) -> bool {
        self.decision_source().is_some_and(DecisionSource::is_estimated)
    }

    /// Returns true if a decision request is in flight.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_aborted())
    }

    /// In-memory cache of the current batch.
    #[must_use]
    pub const fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Snapshot of a cached stage.
    #[must_use]
    pub fn snapshot(&self, key: CacheKey) -> Option<CacheEntry> {
        self.cache.snapshot(key)
    }

    /// Start a new batch.
    ///
    /// Validates the alternatives, stores the raw matrix as `init-matrix` and
    /// assigns a fresh batch id. The previous batch's cache is cleared and its
    /// pending request aborted. Weights reset to the criteria defaults.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidInput`] if the batch cannot be scored. The
    /// previous batch is left untouched in that case.
    pub async fn begin_batch(
        &mut self,
        alternatives: &[Alternative],
        filter_context: Option<serde_json::Value>,
    ) -> Result<String, FlowError> {
        let raw = scoring::build_decision_matrix(alternatives, &self.criteria)?;

        self.abort_pending();
        self.cache.clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear_session(&self.session_id).await {
                self.log_store_error("clear", None, &e);
            }
        }

        let batch_id = Uuid::new_v4().to_string();
        self.cache.put_init(raw);
        self.weights = self.criteria.default_weights();
        self.stage = FlowStage::Init;
        self.batch = Some(BatchState {
            id: batch_id.clone(),
            filter_context,
            source: None,
        });
        self.persist(CacheKey::InitMatrix).await;

        tracing::info!(
            batch_id = %batch_id,
            alternatives = alternatives.len(),
            criteria = self.criteria.len(),
            "Batch started"
        );
        Ok(batch_id)
    }

    /// Start a new batch from search API listings.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidInput`] for a listing with a missing or
    /// non-numeric attribute.
    pub async fn begin_listings(
        &mut self,
        listings: &[RoomListing],
        filter_context: Option<serde_json::Value>,
    ) -> Result<String, FlowError> {
        let alternatives = alternatives_from_listings(listings, &self.criteria)?;
        self.begin_batch(&alternatives, filter_context).await
    }

    /// Request X for the current batch.
    ///
    /// The returned future is tagged with the batch id and is aborted if a new
    /// batch starts or the flow is torn down before it resolves.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::NoBatch`] before `begin_batch` and
    /// [`FlowError::InvalidTransition`] outside `Init`.
    pub fn request_decision(&mut self) -> Result<PendingDecision, FlowError> {
        let batch = self.require_stage(FlowStage::Init, "request the decision matrix")?;
        let batch_id = batch.id.clone();
        let mut context = ScoringContext::new(batch_id.clone());
        context.filter_context.clone_from(&batch.filter_context);
        let raw = self
            .cache
            .init()
            .cloned()
            .ok_or_else(|| not_cached(FlowStage::Init))?;

        self.abort_pending();
        let chain = Arc::clone(&self.chain);
        let min_display = self.min_stage_display;
        let (task, handle) = abortable(async move {
            let timer = Timer::start();
            let outcome = chain.compute(&raw, &context).await;
            let remaining = min_display.saturating_sub(Duration::from_millis(timer.elapsed_ms()));
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
            outcome
        });
        self.pending = Some(handle.clone());

        tracing::debug!(batch_id = %batch_id, "Decision matrix requested");
        Ok(PendingDecision::new(batch_id, handle, task.boxed()))
    }

    /// Install X for the current batch and move to `Decision`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::StaleBatch`] if the outcome belongs to another
    /// batch, [`FlowError::InvalidTransition`] outside `Init` and
    /// [`FlowError::InvalidInput`] if X lacks a row or column of the batch.
    pub async fn apply_decision(
        &mut self,
        outcome: DecisionOutcome,
    ) -> Result<DecisionSource, FlowError> {
        let current = self.batch.as_ref().ok_or(FlowError::NoBatch)?;
        if current.id != outcome.batch_id {
            tracing::warn!(
                batch_id = %outcome.batch_id,
                current = %current.id,
                "Discarding decision matrix for stale batch"
            );
            return Err(FlowError::StaleBatch {
                batch_id: outcome.batch_id,
            });
        }
        self.require_stage(FlowStage::Init, "apply the decision matrix")?;
        let raw = self
            .cache
            .init()
            .ok_or_else(|| not_cached(FlowStage::Init))?;
        let matrix = align_to(raw, &outcome.matrix)?;

        self.pending = None;
        self.cache.put_decision(matrix);
        if let Some(batch) = self.batch.as_mut() {
            batch.source = Some(outcome.source.clone());
        }
        self.stage = FlowStage::Decision;
        self.discard_after(FlowStage::Decision).await;
        self.persist(CacheKey::DecisionMatrix).await;

        tracing::info!(
            batch_id = %outcome.batch_id,
            source = ?outcome.source,
            estimated = outcome.is_estimated(),
            "Decision matrix applied"
        );
        Ok(outcome.source)
    }

    /// Request X and apply it once it arrives.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`request_decision`](Self::request_decision) and
    /// [`apply_decision`](Self::apply_decision).
    pub async fn advance_to_decision(&mut self) -> Result<DecisionSource, FlowError> {
        let pending = self.request_decision()?;
        let outcome = pending.await?;
        self.apply_decision(outcome).await
    }

    /// Normalize X into R and move to `Normalized`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] outside `Decision` and
    /// [`FlowError::InvalidInput`] if X does not match the criteria.
    pub async fn normalize(&mut self) -> Result<&NormalizedMatrix, FlowError> {
        self.require_stage(FlowStage::Decision, "normalize")?;
        let timer = Timer::start();
        let x = self
            .cache
            .decision()
            .ok_or_else(|| not_cached(FlowStage::Decision))?;
        let result = scoring::normalize(x, &self.criteria);
        let normalized = self.record_stage("normalize", &timer, result)?;

        self.cache.put_normalized(normalized);
        self.stage = FlowStage::Normalized;
        self.discard_after(FlowStage::Normalized).await;
        self.persist(CacheKey::NormalizedMatrix).await;

        self.cache
            .normalized()
            .ok_or_else(|| not_cached(FlowStage::Normalized))
    }

    /// Replace the weights used by the next `confirm_weights`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidInput`] for a wrong count or a non-positive
    /// weight and [`FlowError::InvalidTransition`] once V exists (use
    /// [`adjust_weights`](Self::adjust_weights) there).
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<(), FlowError> {
        if self.batch.is_none() {
            return Err(FlowError::NoBatch);
        }
        if self.stage > FlowStage::Normalized {
            return Err(self.invalid_transition("set weights"));
        }
        WeightVector::new(weights.clone()).validate(&self.criteria.names())?;
        self.weights = weights;
        Ok(())
    }

    /// Apply the current weights to R and move to `Weighted`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] outside `Normalized`.
    pub async fn confirm_weights(&mut self) -> Result<&WeightedMatrix, FlowError> {
        self.require_stage(FlowStage::Normalized, "confirm weights")?;
        let timer = Timer::start();
        let r = self
            .cache
            .normalized()
            .ok_or_else(|| not_cached(FlowStage::Normalized))?;
        let result = scoring::apply_weights(r, &self.weights);
        let weighted = self.record_stage("weight", &timer, result)?;

        self.cache.put_weighted(weighted);
        self.stage = FlowStage::Weighted;
        self.discard_after(FlowStage::Weighted).await;
        self.persist(CacheKey::WeightedMatrix).await;

        self.cache
            .weighted()
            .ok_or_else(|| not_cached(FlowStage::Weighted))
    }

    /// Rank V and move to `Complete`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] outside `Weighted`.
    pub async fn rank(&mut self) -> Result<FlowReport, FlowError> {
        self.require_stage(FlowStage::Weighted, "rank")?;
        let timer = Timer::start();
        let v = self
            .cache
            .weighted()
            .ok_or_else(|| not_cached(FlowStage::Weighted))?;
        let result = scoring::rank(v);
        let result = self.record_stage("rank", &timer, result)?;

        let best = result.ranking.first().map(|r| r.alternative_id.to_string());
        self.cache.put_result(result);
        self.stage = FlowStage::Complete;
        self.persist(CacheKey::Result).await;

        tracing::info!(
            batch_id = self.batch_id().unwrap_or_default(),
            best = best.as_deref().unwrap_or_default(),
            estimated = self.is_estimated(),
            "Batch ranked"
        );
        self.report().ok_or_else(|| not_cached(FlowStage::Complete))
    }

    /// Report of the current batch, once `Complete`.
    #[must_use]
    pub fn report(&self) -> Option<FlowReport> {
        if self.stage != FlowStage::Complete {
            return None;
        }
        let batch = self.batch.as_ref()?;
        let weighted = self.cache.weighted()?.clone();
        Some(FlowReport {
            batch_id: batch.id.clone(),
            estimated: self.is_estimated(),
            source: batch.source.clone().unwrap_or(DecisionSource::Local),
            raw: self.cache.init()?.clone(),
            decision: self.cache.decision()?.clone(),
            normalized: self.cache.normalized()?.clone(),
            weights: weighted.weights().to_vec(),
            weighted,
            result: self.cache.result()?.clone(),
        })
    }

    /// Return to an earlier, cached stage without recomputing it.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] for a later stage and
    /// [`FlowError::NotCached`] if the stage has no artifact.
    pub fn go_back(&mut self, target: FlowStage) -> Result<CacheEntry, FlowError> {
        if self.batch.is_none() {
            return Err(FlowError::NoBatch);
        }
        if target > self.stage {
            return Err(self.invalid_transition(&format!("go back to {target}")));
        }
        let entry = self
            .cache
            .snapshot(target.cache_key())
            .ok_or_else(|| not_cached(target))?;
        if target == FlowStage::Init {
            self.abort_pending();
        }
        tracing::debug!(from = %self.stage, to = %target, "Stepping back");
        self.stage = target;
        Ok(entry)
    }

    /// Replace the weights of a weighted or ranked batch.
    ///
    /// Rewinds to `Normalized` and drops V and the result; call
    /// `confirm_weights` and `rank` again to rescore.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTransition`] before `Weighted` and
    /// [`FlowError::InvalidInput`] for invalid weights.
    pub async fn adjust_weights(&mut self, weights: Vec<f64>) -> Result<(), FlowError> {
        if self.batch.is_none() {
            return Err(FlowError::NoBatch);
        }
        if self.stage < FlowStage::Weighted {
            return Err(self.invalid_transition("adjust weights"));
        }
        WeightVector::new(weights.clone()).validate(&self.criteria.names())?;

        self.weights = weights;
        self.stage = FlowStage::Normalized;
        self.discard_after(FlowStage::Normalized).await;
        tracing::debug!(weights = ?self.weights, "Weights adjusted");
        Ok(())
    }

    /// Abandon pending asynchronous work.
    ///
    /// Completed stages stay cached. Called on drop.
    pub fn teardown(&mut self) {
        if self.has_pending() {
            tracing::debug!(batch_id = self.batch_id().unwrap_or_default(), "Tearing down flow");
        }
        self.abort_pending();
    }

    fn abort_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    fn require_stage(&self, expected: FlowStage, action: &str) -> Result<&BatchState, FlowError> {
        let batch = self.batch.as_ref().ok_or(FlowError::NoBatch)?;
        if self.stage != expected {
            return Err(self.invalid_transition(action));
        }
        Ok(batch)
    }

    fn invalid_transition(&self, action: &str) -> FlowError {
        FlowError::InvalidTransition {
            stage: self.stage.to_string(),
            action: action.to_string(),
        }
    }

    fn record_stage<T>(
        &self,
        stage: &str,
        timer: &Timer,
        result: Result<T, InvalidInput>,
    ) -> Result<T, InvalidInput> {
        let elapsed_ms = timer.elapsed_ms();
        if let Err(e) = &result {
            tracing::warn!(stage, error = %e, "Scoring stage rejected input");
        }
        if let Some(metrics) = &self.metrics {
            let mut event = StageEvent::new(stage, elapsed_ms, result.is_ok());
            if let Some(id) = self.batch_id() {
                event = event.with_batch(id);
            }
            metrics.record(event);
        }
        result
    }

    /// Drop every entry past `stage`, in memory and in the store.
    async fn discard_after(&mut self, stage: FlowStage) {
        for later in FlowStage::ALL.into_iter().filter(|s| *s > stage) {
            let key = later.cache_key();
            if !self.cache.contains(key) {
                continue;
            }
            self.cache.remove(key);
            if let Some(store) = &self.store {
                if let Err(e) = store.remove_entry(&self.session_id, key).await {
                    self.log_store_error("remove", Some(key), &e);
                }
            }
        }
    }

    async fn persist(&self, key: CacheKey) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(entry) = self.cache.snapshot(key) else {
            return;
        };
        let saved = match serde_json::to_value(&entry) {
            Ok(payload) => store.save_entry(&self.session_id, key, &payload).await,
            Err(e) => Err(CacheError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
        };
        if let Err(e) = saved {
            self.log_store_error("save", Some(key), &e);
        }
    }

    fn log_store_error(&self, operation: &str, key: Option<CacheKey>, error: &CacheError) {
        tracing::warn!(
            session_id = %self.session_id,
            operation,
            key = key.map(|k| k.as_str()),
            error = %error,
            "Session cache store failed, continuing"
        );
    }
}

impl Drop for StagedFlow {
    fn drop(&mut self) {
        self.abort_pending();
    }
}

fn not_cached(stage: FlowStage) -> FlowError {
    FlowError::NotCached {
        stage: stage.to_string(),
    }
}

/// Reorder X to the batch's row and column labels.
fn align_to(raw: &DecisionMatrix, x: &DecisionMatrix) -> Result<DecisionMatrix, InvalidInput> {
    if x.row_ids() == raw.row_ids() && x.headers() == raw.headers() {
        return Ok(x.clone());
    }
    let missing = |id: &AlternativeId, criterion: &str| InvalidInput::MissingCriterion {
        alternative: id.to_string(),
        criterion: criterion.to_string(),
    };
    let values = raw
        .row_ids()
        .iter()
        .map(|id| {
            let row = x.row_index(id);
            raw.headers()
                .iter()
                .map(|h| {
                    row.zip(x.column_index(h))
                        .and_then(|(i, j)| x.value(i, j))
                        .ok_or_else(|| missing(id, h))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    raw.with_values(values)
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
    use crate::error::RemoteScoringError;
    use crate::model::Criterion;
    use crate::test_utils::{
        five_criteria, mock_provider_echo, mock_provider_error, mock_store_error, test_listings, three_rooms,
        SlowProvider,
    };
    use crate::traits::MockDecisionMatrixProvider;
    use pretty_assertions::assert_eq;

    fn local_flow() -> StagedFlow {
        StagedFlow::new(five_criteria(), Arc::new(ScorerChain::local_only()))
    }

    async fn run_to_complete(flow: &mut StagedFlow) -> FlowReport {
        flow.advance_to_decision().await.unwrap();
        flow.normalize().await.unwrap();
        flow.confirm_weights().await.unwrap();
        flow.rank().await.unwrap()
    }

    #[tokio::test]
    async fn test_full_flow_matches_pipeline() {
        let mut flow = local_flow();
        let batch_id = flow.begin_batch(&three_rooms(), None).await.unwrap();
        assert_eq!(flow.stage(), FlowStage::Init);

        let report = run_to_complete(&mut flow).await;
        let expected = scoring::score_batch(&three_rooms(), &five_criteria(), &[1.0; 5]).unwrap();

        assert_eq!(flow.stage(), FlowStage::Complete);
        assert_eq!(report.batch_id, batch_id);
        assert_eq!(report.source, DecisionSource::Local);
        assert!(!report.estimated);
        assert_eq!(report.weights, vec![1.0; 5]);
        assert_eq!(report.result, expected.result);
        assert_eq!(report.normalized, expected.normalized);
        assert_eq!(flow.report(), Some(report));
    }

    #[tokio::test]
    async fn test_report_serializes_stage_names() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        let report = run_to_complete(&mut flow).await;

        let json = serde_json::to_value(&report).unwrap();
        for field in ["X", "R", "V", "aStar", "aSub", "sStar", "sSub", "cStar", "weights", "rowIds", "ranking"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["estimated"], false);
    }

    #[tokio::test]
    async fn test_no_batch() {
        let mut flow = local_flow();
        assert_eq!(flow.advance_to_decision().await.unwrap_err(), FlowError::NoBatch);
        assert_eq!(flow.set_weights(vec![1.0; 5]).unwrap_err(), FlowError::NoBatch);
        assert!(flow.report().is_none());
    }

    #[tokio::test]
    async fn test_rank_while_normalized_is_invalid() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        flow.advance_to_decision().await.unwrap();
        flow.normalize().await.unwrap();

        let err = flow.rank().await.unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidTransition {
                stage: "normalized".into(),
                action: "rank".into()
            }
        );
        assert_eq!(flow.stage(), FlowStage::Normalized);
    }

    #[tokio::test]
    async fn test_normalize_before_decision_is_invalid() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        assert!(matches!(
            flow.normalize().await.unwrap_err(),
            FlowError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_batch_keeps_previous() {
        let mut flow = local_flow();
        let first = flow.begin_batch(&three_rooms(), None).await.unwrap();

        let mut rooms = three_rooms();
        rooms.push(Alternative::new(4).with_attribute("price", 900.0));
        let err = flow.begin_batch(&rooms, None).await.unwrap_err();

        assert!(matches!(
            err,
            FlowError::InvalidInput(InvalidInput::MissingCriterion { .. })
        ));
        assert_eq!(flow.batch_id(), Some(first.as_str()));
        assert!(flow.snapshot(CacheKey::InitMatrix).is_some());
    }

    #[tokio::test]
    async fn test_stale_outcome_rejected() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        let outcome = flow.request_decision().unwrap().await.unwrap();

        let second = flow.begin_batch(&three_rooms(), None).await.unwrap();
        let stale_id = outcome.batch_id.clone();
        assert_ne!(stale_id, second);

        let err = flow.apply_decision(outcome).await.unwrap_err();
        assert_eq!(err, FlowError::StaleBatch { batch_id: stale_id });
        assert_eq!(flow.stage(), FlowStage::Init);
        assert!(flow.snapshot(CacheKey::DecisionMatrix).is_none());
    }

    #[tokio::test]
    async fn test_new_batch_cancels_pending_request() {
        let chain = ScorerChain::new(Arc::new(SlowProvider::hanging()), Duration::from_secs(60));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain));
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        let pending = flow.request_decision().unwrap();
        let first = pending.batch_id().to_string();
        assert!(flow.has_pending());

        flow.begin_batch(&three_rooms(), None).await.unwrap();
        assert!(!flow.has_pending());
        assert_eq!(
            pending.await.unwrap_err(),
            FlowError::Cancelled { batch_id: first }
        );
    }

    #[tokio::test]
    async fn test_teardown_cancels_pending_request() {
        let chain = ScorerChain::new(Arc::new(SlowProvider::hanging()), Duration::from_secs(60));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain));
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        let pending = flow.request_decision().unwrap();
        flow.teardown();

        assert!(matches!(pending.await, Err(FlowError::Cancelled { .. })));
        assert_eq!(flow.stage(), FlowStage::Init);
        assert!(flow.snapshot(CacheKey::InitMatrix).is_some());
    }

    #[tokio::test]
    async fn test_dropping_flow_cancels_pending_request() {
        let chain = ScorerChain::new(Arc::new(SlowProvider::hanging()), Duration::from_secs(60));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain));
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        let pending = flow.request_decision().unwrap();
        drop(flow);

        assert!(pending.is_aborted());
    }

    #[tokio::test]
    async fn test_remote_failure_marks_estimated() {
        let mock = mock_provider_error(RemoteScoringError::Network {
            message: "connection refused".into(),
        });
        let chain = ScorerChain::new(Arc::new(mock), Duration::from_secs(1));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain));
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        let source = flow.advance_to_decision().await.unwrap();
        assert!(source.is_estimated());
        assert!(flow.is_estimated());

        flow.normalize().await.unwrap();
        flow.confirm_weights().await.unwrap();
        let report = flow.rank().await.unwrap();
        assert!(report.estimated);
        assert_eq!(report.decision, report.raw);
    }

    #[tokio::test]
    async fn test_remote_matrix_is_used() {
        let mut mock = MockDecisionMatrixProvider::new();
        mock.expect_name().return_const("remote");
        mock.expect_compute_decision_matrix().returning(|raw, _| {
            let doubled = raw
                .rows()
                .iter()
                .map(|row| row.iter().map(|v| v * 2.0).collect())
                .collect();
            raw.with_values(doubled).map_err(|e| RemoteScoringError::UnexpectedResponse {
                message: e.to_string(),
            })
        });
        let chain = ScorerChain::new(Arc::new(mock), Duration::from_secs(1));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain));
        flow.begin_batch(&three_rooms(), Some(serde_json::json!({"maxPrice": 2500})))
            .await
            .unwrap();

        assert_eq!(flow.advance_to_decision().await.unwrap(), DecisionSource::Remote);
        let x = flow.cache().decision().unwrap();
        assert_eq!(x.value(0, 0), Some(3000.0));
        assert!(!flow.is_estimated());
    }

    #[tokio::test]
    async fn test_remote_echo_is_not_estimated() {
        let chain = ScorerChain::new(Arc::new(mock_provider_echo()), Duration::from_secs(1));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain));
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        assert_eq!(flow.advance_to_decision().await.unwrap(), DecisionSource::Remote);
        flow.normalize().await.unwrap();
        flow.confirm_weights().await.unwrap();
        let report = flow.rank().await.unwrap();
        assert!(!report.estimated);
        assert_eq!(report.source, DecisionSource::Remote);
    }

    #[tokio::test]
    async fn test_apply_decision_reorders_rows() {
        let mut flow = local_flow();
        let batch_id = flow.begin_batch(&three_rooms(), None).await.unwrap();
        let raw = flow.cache().init().unwrap().clone();

        let reversed = DecisionMatrix::new(
            raw.row_ids().iter().rev().cloned().collect(),
            raw.headers().to_vec(),
            raw.rows().iter().rev().cloned().collect(),
        )
        .unwrap();
        flow.apply_decision(DecisionOutcome {
            batch_id,
            matrix: reversed,
            source: DecisionSource::Remote,
        })
        .await
        .unwrap();

        assert_eq!(flow.cache().decision(), Some(&raw));
    }

    #[tokio::test]
    async fn test_apply_decision_missing_row() {
        let mut flow = local_flow();
        let batch_id = flow.begin_batch(&three_rooms(), None).await.unwrap();
        let raw = flow.cache().init().unwrap().clone();
        let partial = DecisionMatrix::new(
            raw.row_ids()[..2].to_vec(),
            raw.headers().to_vec(),
            raw.rows()[..2].to_vec(),
        )
        .unwrap();

        let err = flow
            .apply_decision(DecisionOutcome {
                batch_id,
                matrix: partial,
                source: DecisionSource::Remote,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidInput(InvalidInput::MissingCriterion {
                alternative: "3".into(),
                criterion: "price".into()
            })
        );
        assert_eq!(flow.stage(), FlowStage::Init);
    }

    #[tokio::test]
    async fn test_set_weights_validation() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        let err = flow.set_weights(vec![1.0; 3]).unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidInput(InvalidInput::WeightCountMismatch {
                expected: 5,
                actual: 3
            })
        );
        assert!(matches!(
            flow.set_weights(vec![1.0, 1.0, 0.0, 1.0, 1.0]).unwrap_err(),
            FlowError::InvalidInput(InvalidInput::NonPositiveWeight { .. })
        ));
        assert_eq!(flow.weights(), &[1.0; 5]);
    }

    #[tokio::test]
    async fn test_weights_seeded_from_criteria_defaults() {
        let criteria = CriteriaSet::new(vec![
            Criterion::cost("price").with_weight(0.5),
            Criterion::benefit("area").with_weight(0.25),
        ])
        .unwrap();
        let mut flow = StagedFlow::new(criteria, Arc::new(ScorerChain::local_only()));
        assert_eq!(flow.weights(), &[0.5, 0.25]);

        let rooms = vec![
            Alternative::new(1).with_attribute("price", 900.0).with_attribute("area", 15.0),
            Alternative::new(2).with_attribute("price", 1300.0).with_attribute("area", 28.0),
        ];
        flow.begin_batch(&rooms, None).await.unwrap();
        flow.set_weights(vec![1.0, 1.0]).unwrap();

        flow.begin_batch(&rooms, None).await.unwrap();
        assert_eq!(flow.weights(), &[0.5, 0.25]);
        let report = run_to_complete(&mut flow).await;
        assert_eq!(report.weights, vec![0.5, 0.25]);
    }

    #[tokio::test]
    async fn test_set_weights_after_weighting_is_invalid() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        run_to_complete(&mut flow).await;

        assert!(matches!(
            flow.set_weights(vec![2.0; 5]).unwrap_err(),
            FlowError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_adjust_weights_reranks() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        let before = run_to_complete(&mut flow).await;
        let secure = AlternativeId::Number(1);
        assert_eq!(before.result.rank_of(&secure), Some(2));

        flow.adjust_weights(vec![1.0, 1.0, 1.0, 1.0, 5.0]).await.unwrap();
        assert_eq!(flow.stage(), FlowStage::Normalized);
        assert!(flow.snapshot(CacheKey::WeightedMatrix).is_none());
        assert!(flow.snapshot(CacheKey::Result).is_none());
        assert!(flow.snapshot(CacheKey::NormalizedMatrix).is_some());

        flow.confirm_weights().await.unwrap();
        let after = flow.rank().await.unwrap();
        assert_eq!(after.result.rank_of(&secure), Some(1));
        assert_eq!(after.weights, vec![1.0, 1.0, 1.0, 1.0, 5.0]);
        assert_eq!(after.batch_id, before.batch_id);
    }

    #[tokio::test]
    async fn test_adjust_weights_before_weighting_is_invalid() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        flow.advance_to_decision().await.unwrap();
        flow.normalize().await.unwrap();

        assert!(matches!(
            flow.adjust_weights(vec![2.0; 5]).await.unwrap_err(),
            FlowError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn test_go_back_uses_cache() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        flow.advance_to_decision().await.unwrap();
        let r = flow.normalize().await.unwrap().snapshot();
        run_rest(&mut flow).await;

        let entry = flow.go_back(FlowStage::Normalized).unwrap();
        assert_eq!(entry.as_matrix(), Some(&r));
        assert_eq!(flow.stage(), FlowStage::Normalized);
        assert!(flow.report().is_none());

        let err = flow.go_back(FlowStage::Complete).unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition { .. }));

        flow.go_back(FlowStage::Init).unwrap();
        assert_eq!(flow.stage(), FlowStage::Init);
    }

    async fn run_rest(flow: &mut StagedFlow) {
        flow.confirm_weights().await.unwrap();
        flow.rank().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconfirm_after_go_back_replaces_result() {
        let mut flow = local_flow();
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        run_to_complete(&mut flow).await;

        flow.go_back(FlowStage::Normalized).unwrap();
        flow.set_weights(vec![1.0, 1.0, 1.0, 1.0, 5.0]).unwrap();
        flow.confirm_weights().await.unwrap();
        assert!(flow.snapshot(CacheKey::Result).is_none());

        let report = flow.rank().await.unwrap();
        assert_eq!(report.result.rank_of(&AlternativeId::Number(1)), Some(1));
    }

    #[tokio::test]
    async fn test_begin_listings() {
        let criteria = CriteriaSet::standard();
        let mut flow = StagedFlow::new(criteria, Arc::new(ScorerChain::local_only()));
        flow.begin_listings(&test_listings(), None).await.unwrap();
        let report = run_to_complete(&mut flow).await;
        assert_eq!(report.result.ranking.len(), 2);
        assert_eq!(report.weights.len(), 6);
    }

    #[tokio::test]
    async fn test_persists_every_stage() {
        let store = Arc::new(MemoryCacheStore::new());
        let mut flow = local_flow().with_store(Arc::clone(&store) as Arc<dyn CacheStore>, "s-1");
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        assert_eq!(store.len().await, 1);

        run_to_complete(&mut flow).await;
        assert_eq!(store.len().await, 5);
        let result = store.load_entry("s-1", CacheKey::Result).await.unwrap().unwrap();
        assert_eq!(result["ranking"].as_array().unwrap().len(), 3);
        let normalized = store
            .load_entry("s-1", CacheKey::NormalizedMatrix)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(normalized["headers"][0], "price");

        flow.adjust_weights(vec![2.0; 5]).await.unwrap();
        assert_eq!(store.len().await, 3);

        flow.begin_batch(&three_rooms(), None).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_failures_do_not_block() {
        let store = mock_store_error(CacheError::QueryFailed {
            query: "UPSERT session_cache".into(),
            message: "disk full".into(),
        });

        let mut flow = local_flow().with_store(Arc::new(store), "s-1");
        flow.begin_batch(&three_rooms(), None).await.unwrap();
        let report = run_to_complete(&mut flow).await;
        assert_eq!(report.result.ranking.len(), 3);
    }

    #[tokio::test]
    async fn test_records_stage_metrics() {
        let metrics = Arc::new(MetricsCollector::new());
        let chain = ScorerChain::local_only().with_metrics(Arc::clone(&metrics));
        let mut flow = StagedFlow::new(five_criteria(), Arc::new(chain))
            .with_metrics(Arc::clone(&metrics));
        let batch_id = flow.begin_batch(&three_rooms(), None).await.unwrap();
        run_to_complete(&mut flow).await;

        for stage in ["decision", "normalize", "weight", "rank"] {
            let events = metrics.events_for_stage(stage);
            assert_eq!(events.len(), 1, "stage {stage}");
            assert_eq!(events[0].batch_id.as_deref(), Some(batch_id.as_str()));
            assert!(events[0].success);
        }
    }

    #[tokio::test]
    async fn test_min_stage_display_delays_decision() {
        let mut flow = local_flow().with_min_stage_display(Duration::from_millis(40));
        flow.begin_batch(&three_rooms(), None).await.unwrap();

        let timer = Timer::start();
        flow.advance_to_decision().await.unwrap();
        assert!(timer.elapsed_ms() >= 40);
        assert_eq!(flow.stage(), FlowStage::Decision);
    }

    #[tokio::test]
    async fn test_from_config_defaults_to_local_and_memory() {
        let config = Config {
            criteria: Some(vec!["price".into(), "area".into()]),
            ..Config::default()
        };
        let mut flow = StagedFlow::from_config(&config, Arc::new(MetricsCollector::new()))
            .await
            .unwrap();
        assert_eq!(flow.criteria().len(), 2);

        let rooms = vec![
            Alternative::new(1).with_attribute("price", 900.0).with_attribute("area", 15.0),
            Alternative::new(2).with_attribute("price", 1300.0).with_attribute("area", 28.0),
        ];
        flow.begin_batch(&rooms, None).await.unwrap();
        assert_eq!(flow.advance_to_decision().await.unwrap(), DecisionSource::Local);
    }
}
