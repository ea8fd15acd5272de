//! Cortex, correlation detector (§4.3.4).
//!
//! Looks for column pairs that tend to co-occur with the same values, which
//! makes a composite index over both more valuable than two single-column
//! indexes.

use super::ScorerOutput;
use std::collections::HashSet;

#[derive(Debug, Clone)]
/// `CorrelationResult`.
pub struct CorrelationResult {
    /// `column_a`.
    pub column_a: String,
    /// `column_b`.
    pub column_b: String,
    /// `score`.
    pub score: f64,
    /// `is_correlated`.
    pub is_correlated: bool,
}

/// Co-occurrence score over sampled `(value_a, value_b)` pairs:
/// `1 - unique_pairs/total_samples`, clamped to `[0,1]`.
#[must_use]
pub fn calculate_correlation(column_a: &str, column_b: &str, samples: &[(String, String)], threshold: f64) -> CorrelationResult {
    if samples.is_empty() {
        return CorrelationResult { column_a: column_a.to_string(), column_b: column_b.to_string(), score: 0.0, is_correlated: false };
    }
    let unique_pairs: HashSet<&(String, String)> = samples.iter().collect();
    let score = (1.0 - unique_pairs.len() as f64 / samples.len() as f64).clamp(0.0, 1.0);
    CorrelationResult {
        column_a: column_a.to_string(),
        column_b: column_b.to_string(),
        score,
        is_correlated: score >= threshold,
    }
}

/// Evaluate all pairs among `candidate_columns` and return those correlated.
#[must_use]
pub fn find_correlated_columns(
    candidate_columns: &[String],
    sample_by_pair: impl Fn(&str, &str) -> Vec<(String, String)>,
    threshold: f64,
) -> Vec<CorrelationResult> {
    let mut results = Vec::new();
    for i in 0..candidate_columns.len() {
        for j in (i + 1)..candidate_columns.len() {
            let a = &candidate_columns[i];
            let b = &candidate_columns[j];
            let samples = sample_by_pair(a, b);
            let result = calculate_correlation(a, b, &samples, threshold);
            if result.is_correlated {
                results.push(result);
            }
        }
    }
    results
}

/// Suggested composite-index name and priority for a correlated pair.
#[derive(Debug, Clone)]
pub struct CompositeIndexSuggestion {
    /// `table`.
    pub table: String,
    /// `index_name`.
    pub index_name: String,
    /// `columns`.
    pub columns: (String, String),
    /// `priority`.
    pub priority: &'static str,
}

#[must_use]
/// `suggest_correlated_indexes`.
pub fn suggest_correlated_indexes(table: &str, correlations: &[CorrelationResult]) -> Vec<CompositeIndexSuggestion> {
    correlations
        .iter()
        .map(|c| CompositeIndexSuggestion {
            table: table.to_string(),
            index_name: format!("idx_{table}_{}_{}_cortex", c.column_a, c.column_b),
            columns: (c.column_a.clone(), c.column_b.clone()),
            priority: if c.score > 0.8 { "high" } else { "medium" },
        })
        .collect()
}

#[must_use]
/// `to_scorer_output`.
pub fn to_scorer_output(result: &CorrelationResult) -> ScorerOutput {
    ScorerOutput {
        algorithm_name: "cortex",
        recommend: result.is_correlated,
        utility: result.score,
        confidence: result.score,
        reason: format!("co-occurrence score={:.2} for ({}, {})", result.score, result.column_a, result.column_b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    #[test]
    fn fully_overlapping_pairs_score_high() {
        let samples = vec![pair("US", "USD"), pair("US", "USD"), pair("US", "USD")];
        let result = calculate_correlation("country", "currency", &samples, 0.7);
        assert!(result.is_correlated);
        assert!((result.score - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn fully_distinct_pairs_score_zero() {
        let samples = vec![pair("a", "1"), pair("b", "2"), pair("c", "3")];
        let result = calculate_correlation("x", "y", &samples, 0.7);
        assert!(!result.is_correlated);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn empty_samples_score_zero_and_uncorrelated() {
        let result = calculate_correlation("x", "y", &[], 0.7);
        assert_eq!(result.score, 0.0);
        assert!(!result.is_correlated);
    }

    #[test]
    fn suggestion_priority_reflects_score() {
        let high = CorrelationResult { column_a: "a".into(), column_b: "b".into(), score: 0.9, is_correlated: true };
        let medium = CorrelationResult { column_a: "c".into(), column_b: "d".into(), score: 0.75, is_correlated: true };
        let suggestions = suggest_correlated_indexes("contacts", &[high, medium]);
        assert_eq!(suggestions[0].priority, "high");
        assert_eq!(suggestions[1].priority, "medium");
        assert_eq!(suggestions[0].index_name, "idx_contacts_a_b_cortex");
    }
}
