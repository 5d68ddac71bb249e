//! Circuit breaker for the remote scorer.
//!
//! After a run of consecutive remote failures the chain stops calling the
//! remote scorer and goes straight to the local fallback until a cooldown has
//! elapsed. The first call after the cooldown is a trial call: success closes
//! the circuit, failure opens it again. Other calls are refused while the
//! trial call is outstanding; one that never reports back is replaced after
//! another cooldown.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// Default cooldown before probing the remote scorer again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Remote calls proceed.
    Closed,
    /// Remote calls are skipped.
    Open,
    /// One trial call is allowed through.
    HalfOpen,
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening.
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Failure counter with open/half-open/closed states.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
    trips: u64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_started: None,
            trips: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Number of times the circuit has opened.
    #[must_use]
    pub const fn trips(&self) -> u64 {
        self.trips
    }

    /// Current run of consecutive failures.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns true if a remote call may be attempted now.
    ///
    /// An open circuit whose cooldown has elapsed moves to half-open and
    /// allows exactly one trial call until its result is recorded.
    pub fn allow_request(&mut self) -> bool {
        let cooldown = self.config.cooldown;
        let cooled = |since: Option<Instant>| since.is_some_and(|t| t.elapsed() >= cooldown);
        let grant = match self.state {
            CircuitState::Closed => return true,
            CircuitState::Open => cooled(self.opened_at),
            CircuitState::HalfOpen => cooled(self.trial_started),
        };
        if grant {
            self.state = CircuitState::HalfOpen;
            self.trial_started = Some(Instant::now());
        }
        grant
    }

    /// Record a successful remote call.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.trial_started = None;
    }

    /// Record a failed remote call.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let should_open = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if should_open {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            self.trial_started = None;
            self.trips += 1;
            tracing::warn!(
                consecutive_failures = self.consecutive_failures,
                cooldown_ms = u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX),
                "Remote scorer circuit opened"
            );
        }
    }

    /// Time left before the next trial call, if open.
    #[must_use]
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        self.opened_at
            .map(|t| self.config.cooldown.saturating_sub(t.elapsed()))
    }

    /// Close the circuit and forget failures.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_started = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
