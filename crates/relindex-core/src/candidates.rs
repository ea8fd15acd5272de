//! Candidate generator (§4.2).
//!
//! Aggregates a telemetry window into `(table, field, query_type)` candidates,
//! excludes fields that already have an equivalent index, and orders the
//! remainder so the scoring ensemble always sees the hottest candidates first.

use crate::types::{Candidate, QueryStat, QueryType};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A minimal existing-index fact, enough to decide whether a candidate is
/// already covered. `expression` distinguishes a plain column index from an
/// expression index over the same column (§4.3.1 index types are distinct).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExistingIndex {
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: String,
}

/// Aggregate raw telemetry samples into scored candidates.
///
/// Percentiles are computed per `(table, field, query_type)` group using
/// nearest-rank on the sorted duration list; a group with a single sample
/// has `avg == p95 == p99`. Groups whose `count` does not exceed
/// `min_query_threshold` are dropped before sorting (§4.2: only candidates
/// "whose frequency exceeds `min_query_threshold`" are proposed).
#[must_use]
pub fn generate_candidates(
    samples: &[QueryStat],
    existing: &[ExistingIndex],
    min_query_threshold: u64,
) -> Vec<Candidate> {
    let covered: std::collections::HashSet<&ExistingIndex> = existing.iter().collect();

    let mut groups: HashMap<(String, Option<String>, QueryType), Vec<f64>> = HashMap::new();
    let mut tenants: HashMap<(String, Option<String>, QueryType), std::collections::HashSet<i64>> =
        HashMap::new();

    for s in samples {
        let key = (s.table.clone(), s.field.clone(), s.query_type);
        groups.entry(key.clone()).or_default().push(s.duration_ms);
        if let Some(tenant_id) = s.tenant_id {
            tenants.entry(key).or_default().insert(tenant_id);
        }
    }

    let mut candidates: Vec<Candidate> = groups
        .into_iter()
        .filter_map(|((table, field, query_type), mut durations)| {
            if let Some(f) = &field {
                if covered.contains(&ExistingIndex { table: table.clone(), field: f.clone() }) {
                    return None;
                }
            }
            let count = durations.len() as u64;
            if count <= min_query_threshold {
                return None;
            }
            durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let avg_ms = durations.iter().sum::<f64>() / durations.len() as f64;
            let p95_ms = percentile(&durations, 0.95);
            let p99_ms = percentile(&durations, 0.99);
            let tenant_count = tenants
                .get(&(table.clone(), field.clone(), query_type))
                .map_or(0, std::collections::HashSet::len) as u64;

            Some(Candidate { table, field, query_type, count, avg_ms, p95_ms, p99_ms, tenant_count })
        })
        .collect();

    // Tie-break order: count desc, p95_ms desc, table asc, field asc.
    candidates.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.p95_ms.partial_cmp(&a.p95_ms).unwrap_or(Ordering::Equal))
            .then_with(|| a.table.cmp(&b.table))
            .then_with(|| a.field.cmp(&b.field))
    });

    candidates
}

/// Nearest-rank percentile over an already-sorted ascending slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stat(table: &str, field: &str, ms: f64) -> QueryStat {
        QueryStat {
            tenant_id: Some(1),
            table: table.to_string(),
            field: Some(field.to_string()),
            query_type: QueryType::Read,
            duration_ms: ms,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn aggregates_count_and_percentiles_per_group() {
        let samples = vec![
            stat("contacts", "email", 10.0),
            stat("contacts", "email", 20.0),
            stat("contacts", "email", 30.0),
        ];
        let result = generate_candidates(&samples, &[], 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].count, 3);
        assert!((result[0].avg_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn excludes_candidates_already_indexed() {
        let samples = vec![stat("contacts", "email", 10.0)];
        let existing = vec![ExistingIndex { table: "contacts".to_string(), field: "email".to_string() }];
        let result = generate_candidates(&samples, &existing, 0);
        assert!(result.is_empty());
    }

    #[test]
    fn drops_groups_at_or_below_min_query_threshold() {
        let samples = vec![
            stat("contacts", "email", 10.0),
            stat("contacts", "email", 20.0),
            stat("contacts", "email", 30.0),
        ];
        assert!(generate_candidates(&samples, &[], 3).is_empty());
        assert_eq!(generate_candidates(&samples, &[], 2).len(), 1);
    }

    #[test]
    fn orders_by_count_desc_then_p95_desc_then_table_then_field() {
        let mut samples = Vec::new();
        for _ in 0..5 {
            samples.push(stat("orders", "status", 5.0));
        }
        for _ in 0..5 {
            samples.push(stat("orders", "customer_id", 50.0));
        }
        samples.push(stat("accounts", "region", 1.0));

        let result = generate_candidates(&samples, &[], 0);
        assert_eq!(result[0].field.as_deref(), Some("customer_id"));
        assert_eq!(result[1].field.as_deref(), Some("status"));
        assert_eq!(result[2].table, "accounts");
    }
}
