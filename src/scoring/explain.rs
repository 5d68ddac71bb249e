//! Explanation builder.
//!
//! Turns one alternative's raw values, normalized values, weights, composite
//! score and rank into the payload the explanation view renders: the formula
//! used, an itemized breakdown and a list of plain-language reasons. Only
//! formatting happens here; the numbers come from earlier stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;
use crate::model::{
    AlternativeId, CriteriaSet, Criterion, DecisionMatrix, Direction, NormalizationMethod,
    NormalizedMatrix, WeightedMatrix, AMENITIES_COUNT, AREA, DISTANCE, PRICE, RATING,
    SECURITY_SCORE,
};
use crate::scoring::IdealSolutionResult;

/// Normalized value below which a criterion is called out as a trade-off.
pub const TRADEOFF_THRESHOLD: f64 = 0.25;

/// Inputs for one explanation.
///
/// Every field is optional so that an incomplete payload can be rejected with
/// the name of the missing field instead of being defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationRequest {
    /// Alternative being explained.
    pub alternative_id: Option<AlternativeId>,
    /// Criterion → raw value.
    pub raw_attributes: Option<BTreeMap<String, f64>>,
    /// Criterion → normalized value.
    pub normalized_attributes: Option<BTreeMap<String, f64>>,
    /// Criterion → weight.
    pub weights: Option<BTreeMap<String, f64>>,
    /// Row sum of V.
    pub total_score: Option<f64>,
    /// 1-based rank.
    pub rank: Option<usize>,
}

impl ExplanationRequest {
    /// Start a request for an alternative.
    #[must_use]
    pub fn new(alternative_id: impl Into<AlternativeId>) -> Self {
        Self {
            alternative_id: Some(alternative_id.into()),
            ..Self::default()
        }
    }

    /// Set raw attributes.
    #[must_use]
    pub fn with_raw_attributes(mut self, raw: BTreeMap<String, f64>) -> Self {
        self.raw_attributes = Some(raw);
        self
    }

    /// Set normalized attributes.
    #[must_use]
    pub fn with_normalized_attributes(mut self, normalized: BTreeMap<String, f64>) -> Self {
        self.normalized_attributes = Some(normalized);
        self
    }

    /// Set weights.
    #[must_use]
    pub fn with_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Set the composite score.
    #[must_use]
    pub fn with_total_score(mut self, total_score: f64) -> Self {
        self.total_score = Some(total_score);
        self
    }

    /// Set the rank.
    #[must_use]
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Collect the inputs for row `i` from the stage matrices.
    ///
    /// Returns `None` if `i` is out of range.
    #[must_use]
    pub fn from_stages(
        raw: &DecisionMatrix,
        normalized: &NormalizedMatrix,
        weighted: &WeightedMatrix,
        result: &IdealSolutionResult,
        i: usize,
    ) -> Option<Self> {
        let id = raw.row_ids().get(i)?.clone();
        let weights = weighted
            .headers()
            .iter()
            .cloned()
            .zip(weighted.weights().iter().copied())
            .collect();
        Some(Self {
            rank: result.rank_of(&id),
            alternative_id: Some(id),
            raw_attributes: raw.row_map(i),
            normalized_attributes: normalized.row_map(i),
            weights: Some(weights),
            total_score: weighted.row_total(i),
        })
    }
}

/// One line of the itemized score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionContribution {
    /// Criterion name.
    pub criterion: String,
    /// Benefit or cost.
    pub direction: Direction,
    /// Raw value.
    pub raw: f64,
    /// Normalized value.
    pub normalized: f64,
    /// Weight.
    pub weight: f64,
    /// `normalized * weight`.
    pub contribution: f64,
}

/// Explanation payload for one alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DssExplanation {
    /// Alternative id.
    pub alternative_id: AlternativeId,
    /// Criterion → raw value.
    pub raw_attributes: BTreeMap<String, f64>,
    /// Criterion → normalized value.
    pub normalized_attributes: BTreeMap<String, f64>,
    /// Criterion → weight.
    pub weights: BTreeMap<String, f64>,
    /// Composite weighted-sum score.
    pub total_score: f64,
    /// 1-based rank by closeness.
    pub rank: usize,
    /// Normalization formula identifier.
    pub normalization_method: NormalizationMethod,
    /// Human-readable formula.
    pub formula: String,
    /// Reasons, most important first.
    pub explanation: Vec<String>,
    /// Per-criterion breakdown, largest contribution first.
    pub breakdown: Vec<CriterionContribution>,
}

/// Access to the stage artifacts of a completed batch.
pub trait ScoredBatch {
    /// Raw attribute matrix.
    fn raw_matrix(&self) -> &DecisionMatrix;
    /// R.
    fn normalized_matrix(&self) -> &NormalizedMatrix;
    /// V.
    fn weighted_matrix(&self) -> &WeightedMatrix;
    /// Ideal solutions and ranking.
    fn ideal_solution(&self) -> &IdealSolutionResult;
}

/// Builds [`DssExplanation`] payloads for a fixed criteria set.
#[derive(Debug, Clone)]
pub struct ExplanationBuilder {
    criteria: CriteriaSet,
    method: NormalizationMethod,
}

impl ExplanationBuilder {
    /// Create a builder for the given criteria.
    #[must_use]
    pub const fn new(criteria: CriteriaSet) -> Self {
        Self {
            criteria,
            method: NormalizationMethod::MinMax,
        }
    }

    /// Explain one alternative.
    ///
    /// Every criterion whose contribution is above the alternative's average
    /// contribution gets a reason line, and so does the top contributor unless
    /// it contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput::MissingField`] if any input is absent and
    /// [`InvalidInput::MissingCriterion`] if a map lacks a criterion.
    pub fn explain(&self, request: ExplanationRequest) -> Result<DssExplanation, InvalidInput> {
        let alternative_id = require(request.alternative_id, "alternativeId")?;
        let raw_attributes = require(request.raw_attributes, "rawAttributes")?;
        let normalized_attributes = require(request.normalized_attributes, "normalizedAttributes")?;
        let weights = require(request.weights, "weights")?;
        let total_score = require(request.total_score, "totalScore")?;
        let rank = require(request.rank, "rank")?;

        let lookup = |map: &BTreeMap<String, f64>, criterion: &Criterion| {
            map.get(&criterion.name)
                .copied()
                .ok_or_else(|| InvalidInput::MissingCriterion {
                    alternative: alternative_id.to_string(),
                    criterion: criterion.name.clone(),
                })
        };

        let mut breakdown = self
            .criteria
            .iter()
            .map(|criterion| {
                let normalized = lookup(&normalized_attributes, criterion)?;
                let weight = lookup(&weights, criterion)?;
                Ok(CriterionContribution {
                    criterion: criterion.name.clone(),
                    direction: criterion.direction,
                    raw: lookup(&raw_attributes, criterion)?,
                    normalized,
                    weight,
                    contribution: normalized * weight,
                })
            })
            .collect::<Result<Vec<_>, InvalidInput>>()?;
        breakdown.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));

        let explanation = self.reasons(&breakdown, total_score, rank);

        Ok(DssExplanation {
            alternative_id,
            raw_attributes,
            normalized_attributes,
            weights,
            total_score,
            rank,
            normalization_method: self.method,
            formula: self.formula(),
            explanation,
            breakdown,
        })
    }

    /// Explain every alternative of a completed report, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`] if the report's matrices disagree with the
    /// builder's criteria.
    pub fn explain_all(&self, report: &impl ScoredBatch) -> Result<Vec<DssExplanation>, InvalidInput> {
        self.explain_batch(
            report.raw_matrix(),
            report.normalized_matrix(),
            report.weighted_matrix(),
            report.ideal_solution(),
        )
    }

    /// Explain every row of a completed batch, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidInput`] if the stage matrices disagree with the
    /// builder's criteria.
    pub fn explain_batch(
        &self,
        raw: &DecisionMatrix,
        normalized: &NormalizedMatrix,
        weighted: &WeightedMatrix,
        result: &IdealSolutionResult,
    ) -> Result<Vec<DssExplanation>, InvalidInput> {
        (0..raw.n_rows())
            .map(|i| {
                let request = ExplanationRequest::from_stages(raw, normalized, weighted, result, i)
                    .unwrap_or_default();
                self.explain(request)
            })
            .collect()
    }

    fn formula(&self) -> String {
        let costs: Vec<&str> = self
            .criteria
            .iter()
            .filter(|c| c.is_cost())
            .map(|c| c.name.as_str())
            .collect();
        if costs.is_empty() {
            self.method.benefit_formula().to_string()
        } else {
            format!(
                "{}; cost criteria ({}) are inverted: {}",
                self.method.benefit_formula(),
                costs.join(", "),
                self.method.cost_formula()
            )
        }
    }

    fn reasons(&self, breakdown: &[CriterionContribution], total: f64, rank: usize) -> Vec<String> {
        let mut lines = vec![format!(
            "Ranked #{rank} with a composite score of {total:.3}"
        )];
        if breakdown.is_empty() {
            return lines;
        }

        #[allow(clippy::cast_precision_loss)]
        let average = breakdown.iter().map(|c| c.contribution).sum::<f64>() / breakdown.len() as f64;
        for (pos, item) in breakdown.iter().enumerate() {
            if (pos == 0 && item.contribution > 0.0) || item.contribution > average {
                lines.push(strength_line(item));
            }
        }

        if let Some(weakest) = breakdown
            .iter()
            .filter(|c| c.normalized < TRADEOFF_THRESHOLD)
            .min_by(|a, b| a.normalized.total_cmp(&b.normalized))
        {
            if self.criteria.len() > 1 {
                lines.push(tradeoff_line(weakest));
            }
        }
        lines
    }
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, InvalidInput> {
    value.ok_or_else(|| InvalidInput::MissingField {
        field: field.to_string(),
    })
}

fn qualifier(normalized: f64) -> &'static str {
    if normalized >= 0.999 {
        "the best in this search"
    } else if normalized >= 0.66 {
        "better than most alternatives"
    } else if normalized >= 0.5 {
        "above the average of this search"
    } else if normalized > 0.001 {
        "below the average of this search"
    } else {
        "the weakest in this search"
    }
}

fn strength_line(item: &CriterionContribution) -> String {
    let q = qualifier(item.normalized);
    let head = match item.criterion.as_str() {
        PRICE => format!("Rent of {} is {q}", item.raw),
        DISTANCE => format!("At {} km away, the distance is {q}", item.raw),
        AREA => format!("{} m² of floor space is {q}", item.raw),
        RATING => format!("A rating of {}/5 is {q}", item.raw),
        AMENITIES_COUNT => format!("{} listed amenities is {q}", item.raw),
        SECURITY_SCORE => format!("A security score of {}/10 is {q}", item.raw),
        other => format!("{other} = {} is {q}", item.raw),
    };
    format!(
        "{head} ({}: {:.2} x weight {:.2} = {:.3})",
        item.criterion, item.normalized, item.weight, item.contribution
    )
}

fn tradeoff_line(item: &CriterionContribution) -> String {
    let side = match item.direction {
        Direction::Cost => "higher",
        Direction::Benefit => "lower",
    };
    format!(
        "Trade-off: {} of {} is {side} than most alternatives ({}: {:.2})",
        item.criterion, item.raw, item.criterion, item.normalized
    )
}
