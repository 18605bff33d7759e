//! Consensus Aggregator: fuses surviving backend responses into one result.
//!
//! Fusion rules:
//! 1. Base weights of the surviving backends are renormalized to sum to 1.0
//! 2. Each metric is the weighted mean over the backends that reported it, rounded
//! 3. The overall score is the weighted mean of every overall score, rounded
//! 4. Findings are grouped by lower-cased category and voted on
//! 5. Confidence falls with the spread of the raw overall scores
//! 6. Suggestions are de-duplicated in first-seen order and capped
//!
//! The output depends only on the input responses and their order. Arrival
//! order of backend calls never reaches this module.

mod findings;
mod scores;

pub use findings::{majority_severity, merge_findings};
pub use scores::{fuse_metrics, fuse_overall};

use std::collections::HashSet;
use thiserror::Error;

use crate::types::{BackendResponse, ConsensusMethod, ConsensusResult};
use crate::weights::BackendWeights;

/// Confidence assigned when a single backend contributed.
pub const SINGLE_BACKEND_CONFIDENCE: f64 = 0.70;

/// Lowest confidence a multi-backend result can carry.
pub const CONFIDENCE_FLOOR: f64 = 0.70;

/// Highest confidence any result can carry.
pub const CONFIDENCE_CEILING: f64 = 1.00;

/// Standard deviation of overall scores that would cost a full 1.0 of confidence.
pub const CONFIDENCE_SPREAD_DIVISOR: f64 = 40.0;

/// Maximum number of fused suggestions.
pub const MAX_SUGGESTIONS: usize = 5;

/// Errors from aggregation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("No backend responses to aggregate")]
    NoResponses,
}

/// Fuses backend responses using a fixed weight table.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    weights: BackendWeights,
}

impl Aggregator {
    pub fn new(weights: BackendWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &BackendWeights {
        &self.weights
    }

    /// Weighted fusion across the ensemble survivors.
    pub fn fuse_ensemble(
        &self,
        responses: &[BackendResponse],
    ) -> Result<ConsensusResult, AggregationError> {
        if responses.is_empty() {
            return Err(AggregationError::NoResponses);
        }
        Ok(self.fuse(responses, ConsensusMethod::Weighted))
    }

    /// Result built from the primary backend alone.
    ///
    /// Its weight renormalizes to 1.0, so every fused value is the backend's
    /// own (rounded) value and every finding has agreement 1.0.
    pub fn fuse_single(&self, response: &BackendResponse) -> ConsensusResult {
        self.fuse(std::slice::from_ref(response), ConsensusMethod::SingleFallback)
    }

    /// Fusion of saved responses outside a live run.
    ///
    /// One response is treated like the fallback path, several like the
    /// ensemble path.
    pub fn fuse_offline(
        &self,
        responses: &[BackendResponse],
    ) -> Result<ConsensusResult, AggregationError> {
        match responses {
            [single] => Ok(self.fuse_single(single)),
            many => self.fuse_ensemble(many),
        }
    }

    fn fuse(&self, responses: &[BackendResponse], method: ConsensusMethod) -> ConsensusResult {
        let contributing_backends: Vec<String> =
            responses.iter().map(|r| r.backend_id.clone()).collect();
        let weights = self.weights.renormalize(&contributing_backends);

        let overall_scores: Vec<f64> = responses.iter().map(|r| r.overall_score).collect();

        let result = ConsensusResult {
            fused_metric_scores: fuse_metrics(responses, &weights),
            merged_findings: merge_findings(responses),
            overall_score: fuse_overall(responses, &weights),
            confidence: estimate_confidence(&overall_scores),
            contributing_backends,
            method,
            suggestions: merge_suggestions(responses, MAX_SUGGESTIONS),
        };

        tracing::debug!(
            method = %result.method,
            backends = result.contributing_backends.len(),
            overall = result.overall_score,
            confidence = result.confidence,
            findings = result.merged_findings.len(),
            "Fused consensus"
        );

        result
    }
}

/// Confidence from the population standard deviation of overall scores.
///
/// `clamp(1 − σ/40, 0.70, 1.00)` rounded to two decimals; a single score
/// yields [`SINGLE_BACKEND_CONFIDENCE`].
pub fn estimate_confidence(overall_scores: &[f64]) -> f64 {
    if overall_scores.len() < 2 {
        return SINGLE_BACKEND_CONFIDENCE;
    }

    let std_dev = population_std_dev(overall_scores);
    let raw = (1.0 - std_dev / CONFIDENCE_SPREAD_DIVISOR).clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING);
    (raw * 100.0).round() / 100.0
}

pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Union of all suggestions, exact-match de-duplicated, first-seen order.
pub fn merge_suggestions(responses: &[BackendResponse], cap: usize) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    responses
        .iter()
        .flat_map(|r| r.free_text_suggestions.iter())
        .filter(|s| seen.insert(s.as_str()))
        .take(cap)
        .cloned()
        .collect()
}
