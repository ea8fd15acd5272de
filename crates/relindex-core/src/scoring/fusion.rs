//! Fusion (§4.3.6): combines the cost/benefit heuristic with the predictive
//! utility score into a single refined decision.

use super::ScorerOutput;

#[derive(Debug, Clone)]
/// `FusedDecision`.
pub struct FusedDecision {
    /// `refined_decision`.
    pub refined_decision: bool,
    /// `refined_confidence`.
    pub refined_confidence: f64,
    /// `combined_score`.
    pub combined_score: f64,
    /// `reason`.
    pub reason: String,
}

/// `combined = heuristic_weight·heuristic_score + ml_weight·ml_utility`, with
/// weights summing to 1 (`ml_weight` defaults to 0.3 per configuration).
#[must_use]
pub fn refine(heuristic: &ScorerOutput, ml: &ScorerOutput, ml_weight: f64) -> FusedDecision {
    let ml_weight = ml_weight.clamp(0.0, 1.0);
    let heuristic_weight = 1.0 - ml_weight;

    let combined_score = heuristic_weight * heuristic.utility + ml_weight * ml.utility;
    let refined_decision = combined_score > 0.5;
    let refined_confidence = heuristic_weight * heuristic.confidence + ml_weight * ml.confidence;

    let reason = match (heuristic.recommend, ml.recommend) {
        (true, true) => format!("heuristic_ml_agree_positive_{}", ml.algorithm_name),
        (false, false) => format!("heuristic_ml_agree_negative_{}", ml.algorithm_name),
        (false, true) if refined_decision => format!("ml_override_positive_{}", ml.algorithm_name),
        (true, false) if !refined_decision => format!("ml_override_negative_{}", ml.algorithm_name),
        _ => format!("heuristic_ml_disagree_no_override_{}", ml.algorithm_name),
    };

    FusedDecision { refined_decision, refined_confidence, combined_score, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(recommend: bool, utility: f64, confidence: f64) -> ScorerOutput {
        ScorerOutput { algorithm_name: "test_ml", recommend, utility, confidence, reason: String::new() }
    }

    #[test]
    fn agreement_on_positive_is_tagged_and_decided_true() {
        let fused = refine(&output(true, 0.8, 0.9), &output(true, 0.9, 0.8), 0.3);
        assert!(fused.refined_decision);
        assert_eq!(fused.reason, "heuristic_ml_agree_positive_test_ml");
    }

    #[test]
    fn ml_can_override_a_negative_heuristic() {
        let fused = refine(&output(false, 0.3, 0.5), &output(true, 0.95, 0.9), 0.3);
        // combined = 0.7*0.3 + 0.3*0.95 = 0.495 -- not quite over; bump ml weight
        let fused_strong = refine(&output(false, 0.3, 0.5), &output(true, 0.95, 0.9), 0.6);
        assert!(fused_strong.refined_decision);
        assert_eq!(fused_strong.reason, "ml_override_positive_test_ml");
        let _ = fused;
    }

    #[test]
    fn weights_combine_to_default_thirty_percent_ml() {
        let fused = refine(&output(true, 1.0, 1.0), &output(true, 0.0, 0.0), 0.3);
        assert!((fused.combined_score - 0.7).abs() < 1e-9);
    }
}
