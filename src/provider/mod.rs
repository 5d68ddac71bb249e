//! Decision-matrix providers.
//!
//! This module provides:
//! - [`LocalScorer`]: deterministic X from raw attributes
//! - [`RemoteScorer`]: HTTP scoring service client
//! - [`ScorerChain`]: remote-first selection with timeout, circuit breaker and
//!   local fallback
//!
//! # Architecture
//!
//! ```text
//! StagedFlow ──▶ ScorerChain ──▶ RemoteScorer ──▶ POST /decision-matrix
//!                     │  (timeout / error / circuit open)
//!                     └────────▶ LocalScorer
//! ```

mod chain;
mod circuit_breaker;
mod local;
mod remote;

pub use chain::{DecisionOutcome, DecisionSource, ScorerChain};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, DEFAULT_COOLDOWN,
    DEFAULT_FAILURE_THRESHOLD,
};
pub use local::LocalScorer;
pub use remote::{
    RemoteScorer, RemoteScorerConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_TIMEOUT_MS,
};
