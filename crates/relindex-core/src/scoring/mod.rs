//! Scoring ensemble (§4.3): five independent scorers plus fusion.
//!
//! Each scorer produces a utility in `[0,1]` with a confidence in `[0,1]`.
//! `cost_benefit` always runs; the rest degrade gracefully when their inputs
//! (a query plan, a sample of rows, historical mutations) aren't available.

pub mod cert;
pub mod cortex;
pub mod cost_benefit;
pub mod fusion;
pub mod predictive;
pub mod qpg;

use serde::Serialize;

/// Output common to every scorer, used for the `AlgorithmUsage` audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct ScorerOutput {
    /// `algorithm_name`.
    pub algorithm_name: &'static str,
    /// `recommend`.
    pub recommend: bool,
    /// `utility`.
    pub utility: f64,
    /// `confidence`.
    pub confidence: f64,
    /// `reason`.
    pub reason: String,
}

/// One row of the algorithm-usage audit trail (§4.3 "Algorithm tracking").
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmUsage {
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: Option<String>,
    /// `algorithm_name`.
    pub algorithm_name: &'static str,
    /// `recommendation`.
    pub recommendation: bool,
    /// `used_in_decision`.
    pub used_in_decision: bool,
}

impl AlgorithmUsage {
    #[must_use]
    /// `new`.
    pub fn new(table: impl Into<String>, field: Option<String>, output: &ScorerOutput) -> Self {
        Self {
            table: table.into(),
            field,
            algorithm_name: output.algorithm_name,
            recommendation: output.recommend,
            used_in_decision: false,
        }
    }
}

/// Optional inputs the validator scorers need live data for. Each is `None`
/// when the caller couldn't gather it (no plan available, no sample rows,
/// nothing to check cardinality against), in which case that scorer is
/// skipped rather than run on placeholder data.
#[derive(Debug, Clone)]
pub struct EnsembleInputs<'a> {
    /// `cost_benefit`.
    pub cost_benefit: cost_benefit::CostBenefitInput,
    /// `historical`.
    pub historical: &'a [predictive::HistoricalSample],
    /// `pattern`.
    pub pattern: predictive::PatternInput,
    /// `ml_weight`.
    pub ml_weight: f64,
    /// `cert`.
    pub cert: Option<CertInputs>,
    /// `qpg_plan`.
    pub qpg_plan: Option<&'a qpg::PlanNode>,
    /// `cortex`.
    pub cortex: Option<cortex::CorrelationResult>,
}

/// Ground-truth cardinality facts for CERT, fetched by the caller via
/// [`crate::scoring::cert::validate_from_db`] or an equivalent catalog query.
#[derive(Debug, Clone, Copy)]
pub struct CertInputs {
    /// `estimated_selectivity`.
    pub estimated_selectivity: f64,
    /// `total_rows`.
    pub total_rows: u64,
    /// `distinct_count`.
    pub distinct_count: u64,
    /// `max_error_pct`.
    pub max_error_pct: f64,
}

/// Result of orchestrating the full scoring ensemble for one candidate.
#[derive(Debug, Clone)]
pub struct EnsembleDecision {
    /// `fused`.
    pub fused: fusion::FusedDecision,
    /// `usage`.
    pub usage: Vec<AlgorithmUsage>,
}

/// Fold the five scorers (§4.3, §9 "registry fold with fixed weights") into a
/// single recommendation.
///
/// `cost_benefit` and `predictive` always run and feed the linear fusion
/// (§4.3.6) directly, so both are marked `used_in_decision`. CERT, QPG, and
/// Cortex run only when their inputs are present; each is a validator that
/// can veto or dampen the fused decision rather than a third fusion input,
/// matching §4.3's description of them as plan/cardinality/correlation
/// checks layered on top of the heuristic/ML blend. A validator is marked
/// `used_in_decision` only when it actually changed the outcome it fed into.
#[must_use]
pub fn run_ensemble(table: &str, field: Option<String>, inputs: &EnsembleInputs<'_>) -> EnsembleDecision {
    let heuristic = cost_benefit::score(&inputs.cost_benefit);
    let ml = predictive::predict(inputs.historical, &inputs.pattern);
    let mut fused = fusion::refine(&heuristic, &ml, inputs.ml_weight);

    let mut heuristic_usage = AlgorithmUsage::new(table, field.clone(), &heuristic);
    heuristic_usage.used_in_decision = true;
    let mut ml_usage = AlgorithmUsage::new(table, field.clone(), &ml);
    ml_usage.used_in_decision = true;
    let mut usage = vec![heuristic_usage, ml_usage];

    if let Some(cert_inputs) = &inputs.cert {
        let cert_result = cert::validate(
            cert_inputs.estimated_selectivity,
            cert_inputs.total_rows,
            cert_inputs.distinct_count,
            cert_inputs.max_error_pct,
        );
        let cert_output = cert::to_scorer_output(&cert_result);
        let mut cert_usage = AlgorithmUsage::new(table, field.clone(), &cert_output);
        if !cert_output.recommend {
            fused.refined_decision = false;
            fused.refined_confidence *= cert_output.confidence;
            cert_usage.used_in_decision = true;
        }
        usage.push(cert_usage);
    }

    if let Some(plan) = inputs.qpg_plan {
        let qpg_output = qpg::to_scorer_output(plan);
        let mut qpg_usage = AlgorithmUsage::new(table, field.clone(), &qpg_output);
        if !qpg_output.recommend {
            fused.refined_decision = false;
            qpg_usage.used_in_decision = true;
        }
        usage.push(qpg_usage);
    }

    if let Some(correlation) = &inputs.cortex {
        let cortex_output = cortex::to_scorer_output(correlation);
        let mut cortex_usage = AlgorithmUsage::new(table, field.clone(), &cortex_output);
        if cortex_output.recommend && !fused.refined_decision {
            // A strong composite-index correlation can rescue a candidate
            // the heuristic/ML blend narrowly rejected.
            fused.refined_decision = fused.combined_score + cortex_output.utility * 0.1 > 0.5;
            cortex_usage.used_in_decision = fused.refined_decision;
        }
        usage.push(cortex_usage);
    }

    EnsembleDecision { fused, usage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexType;

    fn strong_heuristic() -> cost_benefit::CostBenefitInput {
        cost_benefit::CostBenefitInput {
            index_type: IndexType::Standard,
            row_count: 100_000,
            queries_over_horizon: 10_000,
            extra_cost_per_query_without_index_ms: 50.0,
            improvement_pct: 40.0,
            min_improvement_pct: 10.0,
            build_cost_per_1000_rows: 1.0,
        }
    }

    fn neutral_pattern() -> predictive::PatternInput {
        predictive::PatternInput {
            cost_benefit_ratio: 5.0,
            queries_over_horizon: 10_000,
            selectivity: 0.05,
            table_row_count: 100_000,
            write_overhead_pct: 2.0,
        }
    }

    #[test]
    fn cost_benefit_and_predictive_are_always_used_in_decision() {
        let inputs = EnsembleInputs {
            cost_benefit: strong_heuristic(),
            historical: &[],
            pattern: neutral_pattern(),
            ml_weight: 0.3,
            cert: None,
            qpg_plan: None,
            cortex: None,
        };
        let decision = run_ensemble("orders", Some("customer_id".to_string()), &inputs);
        assert_eq!(decision.usage.len(), 2);
        assert!(decision.usage.iter().all(|u| u.used_in_decision));
        assert!(decision.fused.refined_decision);
    }

    #[test]
    fn stale_cert_statistics_veto_an_otherwise_positive_decision() {
        let inputs = EnsembleInputs {
            cost_benefit: strong_heuristic(),
            historical: &[],
            pattern: neutral_pattern(),
            ml_weight: 0.3,
            cert: Some(CertInputs { estimated_selectivity: 0.01, total_rows: 1000, distinct_count: 990, max_error_pct: 10.0 }),
            qpg_plan: None,
            cortex: None,
        };
        let decision = run_ensemble("orders", Some("customer_id".to_string()), &inputs);
        assert!(!decision.fused.refined_decision);
        let cert_usage = decision.usage.iter().find(|u| u.algorithm_name == "cert").unwrap();
        assert!(cert_usage.used_in_decision);
    }

    #[test]
    fn healthy_cert_is_logged_but_not_marked_as_deciding() {
        let inputs = EnsembleInputs {
            cost_benefit: strong_heuristic(),
            historical: &[],
            pattern: neutral_pattern(),
            ml_weight: 0.3,
            cert: Some(CertInputs { estimated_selectivity: 0.05, total_rows: 1000, distinct_count: 50, max_error_pct: 10.0 }),
            qpg_plan: None,
            cortex: None,
        };
        let decision = run_ensemble("orders", Some("customer_id".to_string()), &inputs);
        let cert_usage = decision.usage.iter().find(|u| u.algorithm_name == "cert").unwrap();
        assert!(!cert_usage.used_in_decision);
    }

    #[test]
    fn qpg_high_severity_finding_vetoes_the_decision() {
        let bad_plan = qpg::PlanNode {
            node_type: "Seq Scan".to_string(),
            total_cost: 50_000.0,
            plan_rows: 10,
            actual_rows: None,
            actual_time_ms: Some(2_000.0),
            has_filter: true,
            has_join_filter: false,
            plans: vec![],
        };
        let inputs = EnsembleInputs {
            cost_benefit: strong_heuristic(),
            historical: &[],
            pattern: neutral_pattern(),
            ml_weight: 0.3,
            cert: None,
            qpg_plan: Some(&bad_plan),
            cortex: None,
        };
        let decision = run_ensemble("orders", Some("customer_id".to_string()), &inputs);
        assert!(!decision.fused.refined_decision);
        let qpg_usage = decision.usage.iter().find(|u| u.algorithm_name == "qpg").unwrap();
        assert!(qpg_usage.used_in_decision);
    }
}
