//! CERT, Cardinality Estimation Validator (§4.3.2).
//!
//! Checks a planner's selectivity estimate against ground truth from
//! `COUNT(*)`/`COUNT(DISTINCT field)`, flagging stale statistics before they
//! drive a bad indexing decision.

use super::ScorerOutput;
use relindex_error::Result;

#[derive(Debug, Clone, Copy)]
/// `CertResult`.
pub struct CertResult {
    /// `is_valid`.
    pub is_valid: bool,
    /// `statistics_stale`.
    pub statistics_stale: bool,
    /// `actual_selectivity`.
    pub actual_selectivity: f64,
    /// `error_pct`.
    pub error_pct: f64,
    /// `confidence`.
    pub confidence: f64,
}

/// Validate an estimated selectivity against `(total_rows, distinct_count)`
/// sampled directly from the table. An empty table can't be validated: it
/// returns `is_valid=false`, `confidence=0.0`.
#[must_use]
pub fn validate(estimated_selectivity: f64, total_rows: u64, distinct_count: u64, max_error_pct: f64) -> CertResult {
    if total_rows == 0 {
        return CertResult {
            is_valid: false,
            statistics_stale: false,
            actual_selectivity: 0.0,
            error_pct: 100.0,
            confidence: 0.0,
        };
    }

    let actual_selectivity = distinct_count as f64 / total_rows as f64;
    let error_pct = if estimated_selectivity > 0.0 {
        (actual_selectivity - estimated_selectivity).abs() / estimated_selectivity * 100.0
    } else {
        100.0
    };

    let is_valid = error_pct <= max_error_pct;
    let statistics_stale = error_pct > 2.0 * max_error_pct;

    // Piecewise-linear: 1.0 at zero error, 0.8 at the threshold, 0.0 at 2x threshold.
    let confidence = if error_pct <= max_error_pct {
        1.0 - 0.2 * (error_pct / max_error_pct.max(f64::EPSILON))
    } else if error_pct <= 2.0 * max_error_pct {
        0.8 * (1.0 - (error_pct - max_error_pct) / max_error_pct.max(f64::EPSILON))
    } else {
        0.0
    }
    .clamp(0.0, 1.0);

    CertResult { is_valid, statistics_stale, actual_selectivity, error_pct, confidence }
}

/// Query ground-truth cardinality for a column and validate against an estimate.
pub async fn validate_from_db(
    pool: &crate::db::DbPool,
    table: &str,
    field: &str,
    estimated_selectivity: f64,
    max_error_pct: f64,
) -> Result<CertResult> {
    let client = pool.get().await?;
    let sql = format!("SELECT COUNT(*), COUNT(DISTINCT \"{field}\") FROM \"{table}\"");
    let row = client.query_one(&sql, &[]).await.map_err(|e| crate::db::classify_pg_error(&e))?;
    let total_rows: i64 = row.get(0);
    let distinct_count: i64 = row.get(1);
    Ok(validate(estimated_selectivity, total_rows.max(0) as u64, distinct_count.max(0) as u64, max_error_pct))
}

#[must_use]
/// `to_scorer_output`.
pub fn to_scorer_output(result: &CertResult) -> ScorerOutput {
    ScorerOutput {
        algorithm_name: "cert",
        recommend: result.is_valid && !result.statistics_stale,
        utility: result.confidence,
        confidence: result.confidence,
        reason: if result.statistics_stale {
            format!("statistics_stale: error_pct={:.1}", result.error_pct)
        } else if !result.is_valid {
            format!("selectivity_estimate_invalid: error_pct={:.1}", result.error_pct)
        } else {
            "selectivity_estimate_confirmed".to_string()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_is_invalid_with_zero_confidence() {
        let result = validate(0.1, 0, 0, 10.0);
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn accurate_estimate_is_valid_with_high_confidence() {
        let result = validate(0.5, 1000, 500, 10.0);
        assert!(result.is_valid);
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn stale_statistics_flagged_above_double_threshold() {
        // error_pct = |0.49-0.01|/0.01*100 = 4900
        let result = validate(0.01, 1000, 500, 10.0);
        assert!((result.error_pct - 4900.0).abs() < 1.0);
        assert!(result.statistics_stale);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn confidence_is_zero_at_exactly_double_threshold() {
        let result = validate(0.1, 1000, 120, 10.0); // actual=0.12, error=20%=2x10
        assert!((result.error_pct - 20.0).abs() < 1e-6);
        assert!((result.confidence - 0.0).abs() < 1e-9);
    }
}
