//! Constraint optimizer (§4.4).
//!
//! Takes scored candidates plus the current resource picture and produces a
//! feasible, ranked subset to actually build. Each constraint is evaluated
//! independently so a caller can see exactly why a candidate was rejected.

use crate::config::ConstraintOptimizationConfig;
use serde::Serialize;

/// The read-ratio floor below which write overhead is allowed to block a
/// candidate. The original implementation's workload check reduces to this
/// single threshold (`ratio < 0.5 or ratio < 0.7` is redundant with `< 0.7`);
/// we follow the executable behavior rather than the looser prose.
const WORKLOAD_MIN_READ_RATIO: f64 = 0.7;

/// Present resource state needed to evaluate constraints for one candidate.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    /// `current_total_storage_mb`.
    pub current_total_storage_mb: f64,
    /// `tenant_used_storage_mb`.
    pub tenant_used_storage_mb: f64,
    /// `estimated_index_size_mb`.
    pub estimated_index_size_mb: f64,
    /// `estimated_query_time_ms`.
    pub estimated_query_time_ms: f64,
    /// `improvement_pct`.
    pub improvement_pct: f64,
    /// `estimated_write_overhead_pct`.
    pub estimated_write_overhead_pct: f64,
    /// `read_ratio`.
    pub read_ratio: f64,
    /// `current_table_index_count`.
    pub current_table_index_count: u32,
    /// `current_tenant_index_count`.
    pub current_tenant_index_count: u32,
}

#[derive(Debug, Clone, Serialize)]
/// `ConstraintResult`.
pub struct ConstraintResult {
    /// `name`.
    pub name: &'static str,
    /// `satisfied`.
    pub satisfied: bool,
    /// `reason`.
    pub reason: String,
    /// `score`.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
/// `OptimizationDecision`.
pub struct OptimizationDecision {
    /// `should_create`.
    pub should_create: bool,
    /// `overall_score`.
    pub overall_score: f64,
    /// `confidence`.
    pub confidence: f64,
    /// `constraints`.
    pub constraints: Vec<ConstraintResult>,
    /// `reason`.
    pub reason: String,
}

fn storage_constraint(cfg: &ConstraintOptimizationConfig, ctx: &ResourceContext) -> ConstraintResult {
    let projected = ctx.current_total_storage_mb + ctx.estimated_index_size_mb;
    let satisfied = projected <= cfg.max_storage_total_mb;
    let usage_pct = (ctx.current_total_storage_mb / cfg.max_storage_total_mb.max(f64::EPSILON)).min(1.0);
    ConstraintResult {
        name: "storage",
        satisfied,
        reason: if satisfied {
            "within total storage budget".to_string()
        } else {
            format!("projected {projected:.1}MB exceeds total budget {:.1}MB", cfg.max_storage_total_mb)
        },
        score: (1.0 - usage_pct).clamp(0.0, 1.0),
    }
}

fn storage_per_tenant_constraint(cfg: &ConstraintOptimizationConfig, ctx: &ResourceContext) -> ConstraintResult {
    let projected = ctx.tenant_used_storage_mb + ctx.estimated_index_size_mb;
    let satisfied = projected <= cfg.max_storage_per_tenant_mb;
    let usage_pct = (ctx.tenant_used_storage_mb / cfg.max_storage_per_tenant_mb.max(f64::EPSILON)).min(1.0);
    let warn_pct = cfg.storage_warn_threshold_pct / 100.0;
    let score = if usage_pct >= warn_pct { (1.0 - usage_pct).clamp(0.0, 1.0) } else { 1.0 - usage_pct * 0.5 };
    ConstraintResult {
        name: "storage_per_tenant",
        satisfied,
        reason: if satisfied {
            "within per-tenant storage budget".to_string()
        } else {
            format!("projected {projected:.1}MB exceeds per-tenant budget {:.1}MB", cfg.max_storage_per_tenant_mb)
        },
        score: score.clamp(0.0, 1.0),
    }
}

fn performance_constraint(cfg: &ConstraintOptimizationConfig, ctx: &ResourceContext) -> ConstraintResult {
    let time_ok = ctx.estimated_query_time_ms <= cfg.max_query_time_ms;
    let improvement_ok = ctx.improvement_pct >= cfg.min_improvement_pct;
    let satisfied = time_ok && improvement_ok;
    let improvement_score = (ctx.improvement_pct / 100.0).clamp(0.0, 1.0);
    let time_score = (1.0 - ctx.estimated_query_time_ms / cfg.max_query_time_ms.max(f64::EPSILON)).clamp(0.0, 1.0);
    ConstraintResult {
        name: "performance",
        satisfied,
        reason: if satisfied {
            "meets query-time and improvement thresholds".to_string()
        } else {
            format!(
                "est_query_time={:.1}ms (max {:.1}), improvement={:.1}% (min {:.1})",
                ctx.estimated_query_time_ms, cfg.max_query_time_ms, ctx.improvement_pct, cfg.min_improvement_pct
            )
        },
        score: (improvement_score + time_score) / 2.0,
    }
}

fn workload_constraint(cfg: &ConstraintOptimizationConfig, ctx: &ResourceContext) -> ConstraintResult {
    let overhead_exceeded = ctx.estimated_write_overhead_pct > cfg.max_write_overhead_pct;
    let read_ratio_low = ctx.read_ratio < WORKLOAD_MIN_READ_RATIO;
    let satisfied = !(overhead_exceeded && read_ratio_low);
    let overhead_score = (1.0 - ctx.estimated_write_overhead_pct / cfg.max_write_overhead_pct.max(f64::EPSILON))
        .clamp(0.0, 1.0);
    let read_ratio_score = ctx.read_ratio.clamp(0.0, 1.0);
    ConstraintResult {
        name: "workload",
        satisfied,
        reason: if satisfied {
            "write overhead acceptable for this workload's read ratio".to_string()
        } else {
            format!(
                "write overhead {:.1}% exceeds {:.1}% on a write-heavy workload (read_ratio={:.2})",
                ctx.estimated_write_overhead_pct, cfg.max_write_overhead_pct, ctx.read_ratio
            )
        },
        score: (read_ratio_score + overhead_score) / 2.0,
    }
}

fn tenant_caps_constraint(cfg: &ConstraintOptimizationConfig, ctx: &ResourceContext) -> ConstraintResult {
    let table_ok = ctx.current_table_index_count < cfg.max_indexes_per_table;
    let tenant_ok = ctx.current_tenant_index_count < cfg.max_indexes_per_tenant;
    let satisfied = table_ok && tenant_ok;
    let table_fraction =
        1.0 - (ctx.current_table_index_count as f64 / cfg.max_indexes_per_table.max(1) as f64).min(1.0);
    let tenant_fraction =
        1.0 - (ctx.current_tenant_index_count as f64 / cfg.max_indexes_per_tenant.max(1) as f64).min(1.0);
    ConstraintResult {
        name: "tenant_caps",
        satisfied,
        reason: if satisfied {
            "below per-table and per-tenant index caps".to_string()
        } else {
            format!(
                "table has {}/{} indexes, tenant has {}/{}",
                ctx.current_table_index_count, cfg.max_indexes_per_table, ctx.current_tenant_index_count, cfg.max_indexes_per_tenant
            )
        },
        score: (table_fraction + tenant_fraction) / 2.0,
    }
}

/// Evaluate all constraints for one candidate and decide whether to create it.
#[must_use]
pub fn optimize(cfg: &ConstraintOptimizationConfig, ctx: &ResourceContext) -> OptimizationDecision {
    let constraints = vec![
        storage_constraint(cfg, ctx),
        storage_per_tenant_constraint(cfg, ctx),
        performance_constraint(cfg, ctx),
        workload_constraint(cfg, ctx),
        tenant_caps_constraint(cfg, ctx),
    ];

    // Storage and per-tenant storage share the 0.2 "storage" weight; the rest
    // follow the documented 0.4 performance / 0.2 workload / 0.2 tenant split.
    let overall_score = 0.1 * constraints[0].score
        + 0.1 * constraints[1].score
        + 0.4 * constraints[2].score
        + 0.2 * constraints[3].score
        + 0.2 * constraints[4].score;

    let all_satisfied = constraints.iter().all(|c| c.satisfied);
    let should_create = all_satisfied && overall_score >= cfg.min_score_threshold;

    let reason = if should_create {
        "all constraints satisfied above threshold".to_string()
    } else if !all_satisfied {
        let failed: Vec<&str> = constraints.iter().filter(|c| !c.satisfied).map(|c| c.name).collect();
        format!("constraints failed: {}", failed.join(", "))
    } else {
        format!("overall_score {overall_score:.2} below threshold {:.2}", cfg.min_score_threshold)
    };

    OptimizationDecision { should_create, overall_score, confidence: overall_score, constraints, reason }
}

/// Degraded-but-not-fatal fallback used when the optimizer is disabled by a
/// runtime switch (§4.4 "Failure semantics").
#[must_use]
pub fn disabled_fallback() -> OptimizationDecision {
    OptimizationDecision {
        should_create: true,
        overall_score: 0.5,
        confidence: 0.5,
        constraints: Vec::new(),
        reason: "constraint_optimizer_disabled".to_string(),
    }
}

/// Rank a batch of already-decided candidates by `overall_score` descending,
/// keeping only those selected for creation.
#[must_use]
pub fn select_and_rank<T: Clone>(decisions: Vec<(T, OptimizationDecision)>) -> Vec<(T, OptimizationDecision)> {
    let mut selected: Vec<_> = decisions.into_iter().filter(|(_, d)| d.should_create).collect();
    selected.sort_by(|a, b| b.1.overall_score.partial_cmp(&a.1.overall_score).unwrap_or(std::cmp::Ordering::Equal));
    selected
}
