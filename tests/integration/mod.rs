//! Integration tests for the staged scoring flow.
//!
//! These tests verify end-to-end workflows including:
//! - Stage-by-stage progression and back-navigation
//! - Weight adjustment and reranking
//! - Remote scoring with local fallback
//! - Error recovery paths

mod error_recovery;
mod remote_scoring;
mod staged_workflow;
mod weight_adjustment;
