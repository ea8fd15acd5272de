//! End-to-end decision composition (§§4.2-4.6).
//!
//! Threads one telemetry window through candidate generation, the scoring
//! ensemble, the constraint optimizer, and the safety gate to produce the
//! set of DDL changes worth running. None of this needs a live database
//! connection: the caller supplies whatever catalog facts it already has
//! (row counts, current index counts, storage totals), which is why the
//! whole chain is a plain synchronous fold rather than an async pipeline.
//! Actually executing the resulting `DdlChange`s through
//! [`crate::executor::MutationExecutor`] is the caller's job, since that
//! part genuinely does need the pool.

use crate::candidates::{self, ExistingIndex};
use crate::config::RelindexConfig;
use crate::executor::DdlChange;
use crate::optimizer::{self, OptimizationDecision, ResourceContext};
use crate::safety::rate_limiter::RateLimiterRegistry;
use crate::safety::storage_budget::StorageUsage;
use crate::safety::{self, GateContext, GateDecision};
use crate::scoring::cost_benefit::CostBenefitInput;
use crate::scoring::predictive::PatternInput;
use crate::scoring::{self, EnsembleDecision, EnsembleInputs};
use crate::types::{Candidate, IndexType, QueryStat};
use chrono::{DateTime, Utc};

/// Catalog facts cheap enough to gather with metadata queries, as opposed to
/// the `EXPLAIN`/sampling data the individual validator scorers would need.
pub struct CatalogFacts<'a> {
    /// `now`.
    pub now: DateTime<Utc>,
    /// `row_count`.
    pub row_count: &'a dyn Fn(&str) -> u64,
    /// `current_table_index_count`.
    pub current_table_index_count: &'a dyn Fn(&str) -> u32,
    /// `current_tenant_index_count`.
    pub current_tenant_index_count: u32,
    /// `current_total_storage_mb`.
    pub current_total_storage_mb: f64,
    /// `tenant_used_storage_mb`.
    pub tenant_used_storage_mb: f64,
    /// `recent_cpu_pct`.
    pub recent_cpu_pct: f64,
    /// `tenant_id`.
    pub tenant_id: Option<i64>,
}

/// One candidate's full trip through the pipeline, including the reason it
/// stopped if it didn't make it all the way to a runnable `DdlChange`.
pub struct AdvisorOutcome {
    /// `candidate`.
    pub candidate: Candidate,
    /// `ensemble`.
    pub ensemble: EnsembleDecision,
    /// `optimization`.
    pub optimization: OptimizationDecision,
    /// `gate`.
    pub gate: Option<GateDecision>,
    /// `change`.
    pub change: Option<DdlChange>,
}

/// Run one advisor tick's decision logic over a telemetry window.
///
/// Candidates that the scoring ensemble or the constraint optimizer reject
/// still appear in the result (with `gate: None`, `change: None`) so a
/// caller can log why; only candidates that clear every stage carry a
/// `DdlChange` ready for [`crate::executor::MutationExecutor::create_index`].
#[must_use]
pub fn advise_once(
    window_samples: &[QueryStat],
    existing_indexes: &[ExistingIndex],
    catalog: &CatalogFacts<'_>,
    rate_limiters: &RateLimiterRegistry,
    cfg: &RelindexConfig,
) -> Vec<AdvisorOutcome> {
    let candidates = candidates::generate_candidates(
        window_samples,
        existing_indexes,
        cfg.auto_indexer.min_query_threshold,
    );

    candidates
        .into_iter()
        .map(|candidate| score_and_gate_one(candidate, catalog, rate_limiters, cfg))
        .collect()
}

fn score_and_gate_one(
    candidate: Candidate,
    catalog: &CatalogFacts<'_>,
    rate_limiters: &RateLimiterRegistry,
    cfg: &RelindexConfig,
) -> AdvisorOutcome {
    let row_count = (catalog.row_count)(&candidate.table);
    let table_index_count = (catalog.current_table_index_count)(&candidate.table);

    let cost_benefit = CostBenefitInput {
        index_type: IndexType::Standard,
        row_count,
        queries_over_horizon: candidate.count,
        extra_cost_per_query_without_index_ms: candidate.p95_ms,
        improvement_pct: cfg.auto_indexer.min_improvement_pct.max(10.0),
        min_improvement_pct: cfg.auto_indexer.min_improvement_pct,
        build_cost_per_1000_rows: cfg.auto_indexer.build_cost_per_1000_rows,
    };
    let pattern = PatternInput {
        cost_benefit_ratio: (candidate.p95_ms / cfg.auto_indexer.build_cost_per_1000_rows.max(1.0)).min(10.0),
        queries_over_horizon: candidate.count,
        selectivity: cfg.auto_indexer.min_selectivity_for_index,
        table_row_count: row_count,
        write_overhead_pct: cfg.constraint_optimization.max_write_overhead_pct / 2.0,
    };

    let ensemble = scoring::run_ensemble(
        &candidate.table,
        candidate.field.clone(),
        &EnsembleInputs {
            cost_benefit,
            historical: &[],
            pattern,
            ml_weight: 0.3,
            cert: None,
            qpg_plan: None,
            cortex: None,
        },
    );

    let resource_ctx = ResourceContext {
        current_total_storage_mb: catalog.current_total_storage_mb,
        tenant_used_storage_mb: catalog.tenant_used_storage_mb,
        estimated_index_size_mb: (row_count as f64 / 100_000.0).max(0.1),
        estimated_query_time_ms: candidate.p95_ms,
        improvement_pct: cfg.auto_indexer.min_improvement_pct.max(10.0),
        estimated_write_overhead_pct: cfg.constraint_optimization.max_write_overhead_pct / 2.0,
        read_ratio: 0.9,
        current_table_index_count: table_index_count,
        current_tenant_index_count: catalog.current_tenant_index_count,
    };
    let optimization = optimizer::optimize(&cfg.constraint_optimization, &resource_ctx);

    if !ensemble.fused.refined_decision || !optimization.should_create {
        return AdvisorOutcome { candidate, ensemble, optimization, gate: None, change: None };
    }

    let Some(field) = candidate.field.clone() else {
        return AdvisorOutcome { candidate, ensemble, optimization, gate: None, change: None };
    };

    let gate_ctx = GateContext {
        now: catalog.now,
        table: &candidate.table,
        tenant_id: catalog.tenant_id,
        estimated_size_mb: resource_ctx.estimated_index_size_mb,
        current_table_index_count: table_index_count,
        rate_limit_key: &candidate.table,
        rate_limit_cost: 1,
        recent_cpu_pct: catalog.recent_cpu_pct,
    };
    let storage_usage = StorageUsage {
        total_used_mb: catalog.current_total_storage_mb,
        tenant_used_mb: catalog.tenant_used_storage_mb,
    };
    let gate = safety::evaluate(
        &cfg.maintenance_window,
        rate_limiters,
        &cfg.rate_limiter,
        cfg.cpu_throttle.cpu_threshold,
        &cfg.constraint_optimization,
        &storage_usage,
        &cfg.write_performance,
        &gate_ctx,
    );

    let change = gate.allowed.then(|| DdlChange::create_index(&candidate.table, &[field], IndexType::Standard, None));
    let gate = Some(gate);

    AdvisorOutcome { candidate, ensemble, optimization, gate, change }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryType;
    use chrono::TimeZone;

    fn sample(table: &str, field: &str, ms: f64) -> QueryStat {
        QueryStat {
            tenant_id: Some(1),
            table: table.to_string(),
            field: Some(field.to_string()),
            query_type: QueryType::Read,
            duration_ms: ms,
            created_at: Utc::now(),
        }
    }

    fn hot_window(count: usize) -> Vec<QueryStat> {
        (0..count).map(|_| sample("orders", "customer_id", 80.0)).collect()
    }

    fn row_count(_table: &str) -> u64 {
        500_000
    }

    fn table_index_count(_table: &str) -> u32 {
        2
    }

    fn facts(now: DateTime<Utc>) -> CatalogFacts<'static> {
        CatalogFacts {
            now,
            row_count: &row_count,
            current_table_index_count: &table_index_count,
            current_tenant_index_count: 2,
            current_total_storage_mb: 1_000.0,
            tenant_used_storage_mb: 100.0,
            recent_cpu_pct: 10.0,
            tenant_id: Some(1),
        }
    }

    #[test]
    fn below_min_query_threshold_produces_no_candidates() {
        let mut cfg = RelindexConfig::default();
        cfg.auto_indexer.min_query_threshold = 1_000;
        let now = Utc::now();
        let rate_limiters = RateLimiterRegistry::new();
        let outcomes = advise_once(&hot_window(5), &[], &facts(now), &rate_limiters, &cfg);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn a_hot_candidate_in_the_maintenance_window_produces_a_runnable_change() {
        let mut cfg = RelindexConfig::default();
        cfg.auto_indexer.min_query_threshold = 10;
        cfg.maintenance_window.enabled = false;
        let now = Utc::now();
        let rate_limiters = RateLimiterRegistry::new();
        let outcomes = advise_once(&hot_window(200), &[], &facts(now), &rate_limiters, &cfg);
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.ensemble.fused.refined_decision);
        assert!(outcome.optimization.should_create);
        assert!(outcome.gate.as_ref().is_some_and(|g| g.allowed));
        assert!(outcome.change.is_some());
    }

    #[test]
    fn outside_the_maintenance_window_the_gate_blocks_even_a_good_candidate() {
        let mut cfg = RelindexConfig::default();
        cfg.auto_indexer.min_query_threshold = 10;
        cfg.maintenance_window.enabled = true;
        cfg.maintenance_window.start_hour = 2;
        cfg.maintenance_window.end_hour = 3;
        // Pin to a time certainly outside a 1-hour window starting at 02:00.
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let rate_limiters = RateLimiterRegistry::new();
        let outcomes = advise_once(&hot_window(200), &[], &facts(now), &rate_limiters, &cfg);
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].gate.as_ref().unwrap().allowed);
        assert!(outcomes[0].change.is_none());
    }
}
