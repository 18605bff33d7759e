//! Weighted numeric fusion.

use std::collections::BTreeMap;

use crate::types::BackendResponse;

/// Fuse every metric reported by any response.
///
/// `weights[i]` belongs to `responses[i]` and the slice sums to 1.0. A backend
/// that did not report a metric is left out of that metric entirely: the
/// weights of the backends that did report it are rescaled to sum to 1.0, so
/// a missing score never acts as a zero.
pub fn fuse_metrics(responses: &[BackendResponse], weights: &[f64]) -> BTreeMap<String, f64> {
    let mut reporters: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();

    for (response, weight) in responses.iter().zip(weights) {
        for (metric, score) in &response.metric_scores {
            reporters
                .entry(metric.as_str())
                .or_default()
                .push((*weight, *score));
        }
    }

    reporters
        .into_iter()
        .map(|(metric, pairs)| (metric.to_string(), weighted_mean(&pairs).round()))
        .collect()
}

/// Fuse the overall score. Every response carries one (absent means 0).
pub fn fuse_overall(responses: &[BackendResponse], weights: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = responses
        .iter()
        .zip(weights)
        .map(|(response, weight)| (*weight, response.overall_score))
        .collect();

    weighted_mean(&pairs).round()
}

/// `Σ wᵢ·xᵢ / Σ wᵢ`, falling back to the plain mean when all weights are 0.
fn weighted_mean(pairs: &[(f64, f64)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }

    let total_weight: f64 = pairs.iter().map(|(w, _)| w).sum();
    if total_weight <= 0.0 {
        return pairs.iter().map(|(_, x)| x).sum::<f64>() / pairs.len() as f64;
    }

    pairs.iter().map(|(w, x)| w * x).sum::<f64>() / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: &str, overall: f64) -> BackendResponse {
        BackendResponse::new(id, overall)
    }

    #[test]
    fn test_weighted_metric_fusion() {
        let responses = vec![
            response("a", 0.0).with_metric("pores", 80.0),
            response("b", 0.0).with_metric("pores", 60.0),
        ];
        let fused = fuse_metrics(&responses, &[0.75, 0.25]);
        assert_eq!(fused["pores"], 75.0);
    }

    #[test]
    fn test_missing_metric_is_not_zero() {
        let responses = vec![
            response("a", 0.0).with_metric("pores", 80.0).with_metric("texture", 70.0),
            response("b", 0.0).with_metric("pores", 60.0),
        ];
        let fused = fuse_metrics(&responses, &[0.5, 0.5]);
        assert_eq!(fused["texture"], 70.0);
        assert_eq!(fused["pores"], 70.0);
    }

    #[test]
    fn test_fused_values_are_rounded() {
        let responses = vec![
            response("a", 81.0).with_metric("spots", 71.0),
            response("b", 80.0).with_metric("spots", 70.0),
        ];
        let weights = [0.45 / 0.85, 0.40 / 0.85];
        let fused = fuse_metrics(&responses, &weights);
        // 71 * 0.529 + 70 * 0.471 = 70.53
        assert_eq!(fused["spots"], 71.0);
        assert_eq!(fuse_overall(&responses, &weights), 81.0);
    }

    #[test]
    fn test_zero_weights_fall_back_to_mean() {
        let responses = vec![response("a", 90.0), response("b", 70.0)];
        assert_eq!(fuse_overall(&responses, &[0.0, 0.0]), 80.0);
    }
}
