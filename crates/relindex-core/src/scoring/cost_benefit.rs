//! Cost/benefit heuristic (§4.3.1), the baseline scorer, always available.

use super::ScorerOutput;
use crate::types::IndexType;

/// Inputs needed to price a candidate index without touching the database.
#[derive(Debug, Clone)]
pub struct CostBenefitInput {
    /// `index_type`.
    pub index_type: IndexType,
    /// `row_count`.
    pub row_count: u64,
    /// `queries_over_horizon`.
    pub queries_over_horizon: u64,
    /// `extra_cost_per_query_without_index_ms`.
    pub extra_cost_per_query_without_index_ms: f64,
    /// `improvement_pct`.
    pub improvement_pct: f64,
    /// `min_improvement_pct`.
    pub min_improvement_pct: f64,
    /// `build_cost_per_1000_rows`.
    pub build_cost_per_1000_rows: f64,
}

/// `build_cost ≈ k₁ · rows`; `benefit = queries · extra_cost_per_query`.
/// Recommends creation when `benefit/build_cost > 1` and the projected
/// improvement clears the configured floor.
#[must_use]
pub fn score(input: &CostBenefitInput) -> ScorerOutput {
    let build_cost =
        input.index_type.build_cost_factor() * (input.row_count as f64 / 1000.0) * input.build_cost_per_1000_rows;
    let benefit = input.queries_over_horizon as f64 * input.extra_cost_per_query_without_index_ms;

    let ratio = if build_cost > 0.0 { benefit / build_cost } else { f64::INFINITY };
    let recommend = ratio > 1.0 && input.improvement_pct >= input.min_improvement_pct;

    // Utility saturates smoothly so a 2x ratio isn't treated the same as a 20x one.
    let utility = (ratio / (ratio + 1.0)).clamp(0.0, 1.0);
    let confidence = if input.queries_over_horizon == 0 { 0.0 } else { 1.0 };

    ScorerOutput {
        algorithm_name: "cost_benefit",
        recommend,
        utility,
        confidence,
        reason: format!(
            "ratio={ratio:.2} improvement_pct={:.1} (min {:.1})",
            input.improvement_pct, input.min_improvement_pct
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CostBenefitInput {
        CostBenefitInput {
            index_type: IndexType::Standard,
            row_count: 1_000_000,
            queries_over_horizon: 50_000,
            extra_cost_per_query_without_index_ms: 5.0,
            improvement_pct: 40.0,
            min_improvement_pct: 20.0,
            build_cost_per_1000_rows: 10.0,
        }
    }

    #[test]
    fn recommends_when_benefit_dominates_cost() {
        let result = score(&base());
        assert!(result.recommend);
        assert!(result.utility > 0.5);
    }

    #[test]
    fn withholds_recommendation_below_improvement_floor() {
        let mut input = base();
        input.improvement_pct = 5.0;
        let result = score(&input);
        assert!(!result.recommend);
    }

    #[test]
    fn zero_query_volume_yields_zero_confidence() {
        let mut input = base();
        input.queries_over_horizon = 0;
        let result = score(&input);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn partial_index_is_cheaper_to_build_than_multi_column() {
        let mut partial = base();
        partial.index_type = IndexType::Partial;
        let mut multi = base();
        multi.index_type = IndexType::MultiColumn;
        assert!(score(&partial).utility >= score(&multi).utility);
    }
}
