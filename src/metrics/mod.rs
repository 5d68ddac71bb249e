//! Metrics collection.
//!
//! This module provides:
//! - Latency and success tracking per pipeline stage
//! - Remote → local fallback tracking
//! - Summary statistics over everything recorded
//!
//! # Example
//!
//! ```
//! use room_dss::metrics::{MetricsCollector, StageEvent};
//!
//! let metrics = MetricsCollector::new();
//! metrics.record(StageEvent::new("decision", 150, true));
//! metrics.record(StageEvent::new("decision", 200, true));
//! metrics.record(StageEvent::new("rank", 3, false));
//!
//! let summary = metrics.summary();
//! assert_eq!(summary.total_events, 3);
//! // 2 out of 3 succeeded = ~66.7%
//! assert!((summary.overall_success_rate - 0.666).abs() < 0.01);
//! assert!(summary.by_stage.contains_key("decision"));
//! ```

// Allow intentional numeric casts for metrics calculations
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

/// Maximum number of stage events kept.
const MAX_EVENTS: usize = 10_000;

/// Maximum number of fallback events kept.
const MAX_FALLBACKS: usize = 1_000;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One completed (or failed) stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage name (`decision`, `normalize`, `weight`, `rank`).
    pub stage: String,
    /// Batch the stage ran for, if any.
    pub batch_id: Option<String>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Timestamp of the event (Unix epoch seconds).
    pub timestamp: u64,
}

impl StageEvent {
    /// Create a new stage event.
    #[must_use]
    pub fn new(stage: impl Into<String>, latency_ms: u64, success: bool) -> Self {
        Self {
            stage: stage.into(),
            batch_id: None,
            latency_ms,
            success,
            timestamp: now_secs(),
        }
    }

    /// Attach the batch id.
    #[must_use]
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }
}

/// A decision matrix that came from a fallback provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackEvent {
    /// Provider that failed.
    pub from: String,
    /// Provider that produced the matrix.
    pub to: String,
    /// Reason for fallback.
    pub reason: String,
    /// Timestamp.
    pub timestamp: u64,
}

impl FallbackEvent {
    /// Create a new fallback event.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
            timestamp: now_secs(),
        }
    }
}

/// Summary statistics for a stage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StageSummary {
    /// Executions recorded.
    pub count: u64,
    /// Successful executions.
    pub successful: u64,
    /// Failed executions.
    pub failed: u64,
    /// Average latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Minimum latency in milliseconds.
    pub min_latency_ms: u64,
    /// Maximum latency in milliseconds.
    pub max_latency_ms: u64,
    /// Success rate (0.0-1.0).
    pub success_rate: f64,
}

/// Overall metrics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Total stage events.
    pub total_events: u64,
    /// Overall success rate.
    pub overall_success_rate: f64,
    /// Per-stage summaries.
    pub by_stage: HashMap<String, StageSummary>,
    /// Number of fallbacks recorded.
    pub fallback_count: u64,
    /// Recent fallbacks.
    pub recent_fallbacks: Vec<FallbackEvent>,
}

/// Thread-safe in-process metrics store.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    events: RwLock<Vec<StageEvent>>,
    fallbacks: RwLock<Vec<FallbackEvent>>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage event.
    ///
    /// Only the most recent `MAX_EVENTS` are kept.
    pub fn record(&self, event: StageEvent) {
        match self.events.write() {
            Ok(mut events) => {
                if events.len() >= MAX_EVENTS {
                    events.remove(0);
                }
                events.push(event);
            }
            Err(poison_error) => {
                tracing::error!(
                    stage = %event.stage,
                    error = %poison_error,
                    "Failed to record stage event: RwLock poisoned"
                );
            }
        }
    }

    /// Record a fallback event.
    ///
    /// Only the most recent `MAX_FALLBACKS` are kept.
    pub fn record_fallback(&self, fallback: FallbackEvent) {
        match self.fallbacks.write() {
            Ok(mut fallbacks) => {
                if fallbacks.len() >= MAX_FALLBACKS {
                    fallbacks.remove(0);
                }
                fallbacks.push(fallback);
            }
            Err(poison_error) => {
                tracing::error!(
                    from = %fallback.from,
                    to = %fallback.to,
                    error = %poison_error,
                    "Failed to record fallback event: RwLock poisoned"
                );
            }
        }
    }

    /// Get summary statistics.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let events = match self.events.read() {
            Ok(e) => e.clone(),
            Err(poison_error) => {
                tracing::warn!(
                    error = %poison_error,
                    "Reading events from poisoned lock, using recovered data"
                );
                poison_error.into_inner().clone()
            }
        };
        let fallbacks = self.fallbacks();

        let mut by_stage: HashMap<String, Vec<&StageEvent>> = HashMap::new();
        for event in &events {
            by_stage.entry(event.stage.clone()).or_default().push(event);
        }

        let stage_summaries = by_stage
            .into_iter()
            .map(|(stage, stage_events)| {
                let count = stage_events.len() as u64;
                let successful = stage_events.iter().filter(|e| e.success).count() as u64;
                let latencies: Vec<u64> = stage_events.iter().map(|e| e.latency_ms).collect();
                let avg_latency = if latencies.is_empty() {
                    0.0
                } else {
                    latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
                };
                (
                    stage,
                    StageSummary {
                        count,
                        successful,
                        failed: count - successful,
                        avg_latency_ms: avg_latency,
                        min_latency_ms: latencies.iter().copied().min().unwrap_or(0),
                        max_latency_ms: latencies.iter().copied().max().unwrap_or(0),
                        success_rate: if count > 0 {
                            successful as f64 / count as f64
                        } else {
                            0.0
                        },
                    },
                )
            })
            .collect();

        let total_events = events.len() as u64;
        let total_successful = events.iter().filter(|e| e.success).count() as u64;
        let overall_success_rate = if total_events > 0 {
            total_successful as f64 / total_events as f64
        } else {
            1.0
        };

        MetricsSummary {
            total_events,
            overall_success_rate,
            by_stage: stage_summaries,
            fallback_count: fallbacks.len() as u64,
            recent_fallbacks: fallbacks,
        }
    }

    /// Get events for a specific stage.
    #[must_use]
    pub fn events_for_stage(&self, stage: &str) -> Vec<StageEvent> {
        self.events
            .read()
            .map(|events| events.iter().filter(|e| e.stage == stage).cloned().collect())
            .unwrap_or_default()
    }

    /// Get recent fallbacks.
    #[must_use]
    pub fn fallbacks(&self) -> Vec<FallbackEvent> {
        self.fallbacks.read().map(|f| f.clone()).unwrap_or_default()
    }

    /// Clear all metrics (useful for testing).
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
        if let Ok(mut fallbacks) = self.fallbacks.write() {
            fallbacks.clear();
        }
    }
}

/// Timer for measuring stage latency.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
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

    #[test]
    fn test_stage_event_new() {
        let event = StageEvent::new("normalized", 4, true).with_batch("b-1");
        assert_eq!(event.stage, "normalized");
        assert_eq!(event.latency_ms, 4);
        assert_eq!(event.batch_id.as_deref(), Some("b-1"));
        assert!(event.success);
        assert!(event.timestamp > 0);
    }

    #[test]
    fn test_fallback_event_new() {
        let fallback = FallbackEvent::new("remote", "local", "timed out");
        assert_eq!(fallback.from, "remote");
        assert_eq!(fallback.to, "local");
        assert_eq!(fallback.reason, "timed out");
        assert!(fallback.timestamp > 0);
    }

    #[test]
    fn test_summary_per_stage() {
        let collector = MetricsCollector::new();
        collector.record(StageEvent::new("decision", 100, true));
        collector.record(StageEvent::new("decision", 300, false));
        collector.record(StageEvent::new("rank", 2, true));

        let summary = collector.summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.by_stage.len(), 2);

        let decision = &summary.by_stage["decision"];
        assert_eq!(decision.count, 2);
        assert_eq!(decision.failed, 1);
        assert_eq!(decision.avg_latency_ms, 200.0);
        assert_eq!(decision.min_latency_ms, 100);
        assert_eq!(decision.max_latency_ms, 300);
        assert_eq!(decision.success_rate, 0.5);
    }

    #[test]
    fn test_empty_summary() {
        let summary = MetricsCollector::new().summary();
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.overall_success_rate, 1.0);
        assert!(summary.by_stage.is_empty());
        assert_eq!(summary.fallback_count, 0);
    }

    #[test]
    fn test_fallbacks_recorded() {
        let collector = MetricsCollector::new();
        collector.record_fallback(FallbackEvent::new("remote", "local", "503"));
        let summary = collector.summary();
        assert_eq!(summary.fallback_count, 1);
        assert_eq!(summary.recent_fallbacks[0].reason, "503");
    }

    #[test]
    fn test_fallbacks_are_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..(MAX_FALLBACKS + 5) {
            collector.record_fallback(FallbackEvent::new("remote", "local", i.to_string()));
        }
        let fallbacks = collector.fallbacks();
        assert_eq!(fallbacks.len(), MAX_FALLBACKS);
        assert_eq!(fallbacks[0].reason, "5");
    }

    #[test]
    fn test_stage_events_are_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..(MAX_EVENTS + 3) {
            collector.record(StageEvent::new("rank", i as u64, true));
        }
        let events = collector.events_for_stage("rank");
        assert_eq!(events.len(), MAX_EVENTS);
        assert_eq!(events[0].latency_ms, 3);
        assert_eq!(collector.summary().total_events, MAX_EVENTS as u64);
    }

    #[test]
    fn test_events_for_stage_and_clear() {
        let collector = MetricsCollector::new();
        collector.record(StageEvent::new("rank", 1, true));
        collector.record(StageEvent::new("weighted", 1, true));
        assert_eq!(collector.events_for_stage("rank").len(), 1);

        collector.clear();
        assert!(collector.events_for_stage("rank").is_empty());
        assert!(collector.fallbacks().is_empty());
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.elapsed_ms() >= 5);
    }
}
