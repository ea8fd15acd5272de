//! Predictive indexing, utility predictor (§4.3.5).
//!
//! Two methods, tried in order: historical improvement data from the
//! mutation log, falling back to a weighted blend of pattern-based
//! sub-scores. A trained ML regressor is an explicit Non-goal here; when
//! it exists upstream, its output feeds [`super::fusion`] directly instead.

use super::ScorerOutput;

const MIN_HISTORICAL_SAMPLES: usize = 10;

/// Past `(table, field)` index-creation outcomes pulled from the mutation log.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalSample {
    /// `improvement_pct`.
    pub improvement_pct: f64,
}

/// Inputs for the pattern-based fallback (§4.3.5 method 3).
#[derive(Debug, Clone, Copy)]
pub struct PatternInput {
    /// `cost_benefit_ratio`.
    pub cost_benefit_ratio: f64,
    /// `queries_over_horizon`.
    pub queries_over_horizon: u64,
    /// `selectivity`.
    pub selectivity: f64,
    /// `table_row_count`.
    pub table_row_count: u64,
    /// `write_overhead_pct`.
    pub write_overhead_pct: f64,
}

/// Average past improvement for the same `(table, field)`; confidence grows
/// with sample count. Returns `None` below the minimum sample threshold so
/// the caller falls through to the pattern-based method.
#[must_use]
pub fn predict_from_historical(samples: &[HistoricalSample]) -> Option<ScorerOutput> {
    if samples.len() < MIN_HISTORICAL_SAMPLES {
        return None;
    }
    let avg_improvement = samples.iter().map(|s| s.improvement_pct).sum::<f64>() / samples.len() as f64;
    let utility = (avg_improvement / 50.0).clamp(0.0, 1.0);
    let confidence = (samples.len() as f64 / 50.0).clamp(0.0, 1.0);
    Some(ScorerOutput {
        algorithm_name: "predictive_historical",
        recommend: utility > 0.5,
        utility,
        confidence,
        reason: format!("avg_improvement_pct={avg_improvement:.1} over {} samples", samples.len()),
    })
}

fn selectivity_score(selectivity: f64) -> f64 {
    // Non-monotone: a very low selectivity candidate (near-unique) benefits
    // less from indexing than a moderately selective one, which benefits more
    // than a low-selectivity (near-constant) column.
    if selectivity < 0.01 {
        0.2
    } else if selectivity < 0.1 {
        0.9
    } else if selectivity < 0.5 {
        0.8
    } else {
        0.6
    }
}

fn table_size_score(row_count: u64) -> f64 {
    if row_count < 1_000 {
        0.3
    } else if row_count < 10_000 {
        0.6
    } else {
        1.0
    }
}

/// Weighted blend of five sub-scores (§4.3.5 method 3).
#[must_use]
pub fn predict_from_patterns(input: &PatternInput) -> ScorerOutput {
    let cost_benefit_score = (input.cost_benefit_ratio / 2.0).clamp(0.0, 1.0);
    let query_volume_score = (input.queries_over_horizon as f64 / 5_000.0).clamp(0.0, 1.0);
    let selectivity_score = selectivity_score(input.selectivity);
    let table_size_score = table_size_score(input.table_row_count);
    let overhead_score = (1.0 - input.write_overhead_pct / 50.0).max(0.3);

    let utility = 0.35 * cost_benefit_score
        + 0.25 * query_volume_score
        + 0.20 * selectivity_score
        + 0.10 * table_size_score
        + 0.10 * overhead_score;
    let confidence = (selectivity_score + query_volume_score) / 2.0;

    ScorerOutput {
        algorithm_name: "predictive_pattern",
        recommend: utility > 0.5,
        utility: utility.clamp(0.0, 1.0),
        confidence: confidence.clamp(0.0, 1.0),
        reason: format!(
            "cost_benefit={cost_benefit_score:.2} volume={query_volume_score:.2} selectivity={selectivity_score:.2} \
             table_size={table_size_score:.2} overhead={overhead_score:.2}"
        ),
    }
}

/// Try historical data first, falling back to the pattern-based blend.
#[must_use]
pub fn predict(historical: &[HistoricalSample], pattern: &PatternInput) -> ScorerOutput {
    predict_from_historical(historical).unwrap_or_else(|| predict_from_patterns(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_patterns_below_sample_floor() {
        let samples = vec![HistoricalSample { improvement_pct: 40.0 }; 3];
        let pattern = PatternInput {
            cost_benefit_ratio: 1.0,
            queries_over_horizon: 100,
            selectivity: 0.05,
            table_row_count: 500,
            write_overhead_pct: 5.0,
        };
        let result = predict(&samples, &pattern);
        assert_eq!(result.algorithm_name, "predictive_pattern");
    }

    #[test]
    fn uses_historical_once_sample_floor_is_met() {
        let samples = vec![HistoricalSample { improvement_pct: 45.0 }; 12];
        let pattern = PatternInput {
            cost_benefit_ratio: 1.0,
            queries_over_horizon: 100,
            selectivity: 0.05,
            table_row_count: 500,
            write_overhead_pct: 5.0,
        };
        let result = predict(&samples, &pattern);
        assert_eq!(result.algorithm_name, "predictive_historical");
        assert!(result.recommend);
    }

    #[test]
    fn selectivity_subscore_peaks_in_middle_band_not_extremes() {
        assert!(selectivity_score(0.05) > selectivity_score(0.005));
        assert!(selectivity_score(0.05) > selectivity_score(0.9));
    }

    #[test]
    fn larger_tables_score_higher_for_table_size() {
        assert!(table_size_score(1_000_000) > table_size_score(500));
    }
}
