//! One-shot batch scoring over the staged flow.
//!
//! This is the request/response shape the binary speaks on stdin/stdout.

use serde::{Deserialize, Serialize};

use super::StagedFlow;
use crate::error::FlowError;
use crate::model::RoomListing;
use crate::scoring::{DssExplanation, ExplanationBuilder, RankedAlternative};

/// A batch of rooms to score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Rooms as returned by the search API.
    pub rooms: Vec<RoomListing>,
    /// One positive weight per active criterion; the criteria defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    /// Active criterion names; the configured set when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Vec<String>>,
    /// Search filters, forwarded to the remote scorer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_context: Option<serde_json::Value>,
}

/// Ranking and explanations for a scored batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// Batch id.
    pub batch_id: String,
    /// True if the ranking rests on a locally estimated decision matrix.
    pub estimated: bool,
    /// Best first.
    pub ranking: Vec<RankedAlternative>,
    /// One explanation per room, in input order.
    pub explanations: Vec<DssExplanation>,
}

impl StagedFlow {
    /// Run every stage for one request.
    ///
    /// `request.criteria` is not consulted here: the flow was built for a
    /// fixed criteria set.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] if the rooms or weights are invalid.
    pub async fn run_batch(&mut self, request: BatchRequest) -> Result<BatchResponse, FlowError> {
        let batch_id = self
            .begin_listings(&request.rooms, request.filter_context)
            .await?;
        if let Some(weights) = request.weights {
            self.set_weights(weights)?;
        }
        self.advance_to_decision().await?;
        self.normalize().await?;
        self.confirm_weights().await?;
        let report = self.rank().await?;

        let explanations = ExplanationBuilder::new(self.criteria().clone()).explain_all(&report)?;
        Ok(BatchResponse {
            batch_id,
            estimated: report.estimated,
            ranking: report.result.ranking,
            explanations,
        })
    }
}
