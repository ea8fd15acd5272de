//! Safety gate (§4.5): every check that must pass before DDL runs.
//!
//! Each submodule is independently testable; the gate itself just runs them
//! in order and stops at the first rejection so the caller gets one reason.

pub mod cpu_throttle;
pub mod maintenance_window;
pub mod rate_limiter;
pub mod storage_budget;
pub mod write_performance;

use crate::config::{MaintenanceWindowConfig, RateLimiterConfig, WritePerformanceConfig};
use rate_limiter::RateLimiterRegistry;
use storage_budget::{StorageBudgetConfig, StorageUsage};

/// Outcome of a single safety check, always logged to the audit trail.
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// `allowed`.
    pub allowed: bool,
    /// `reason`.
    pub reason: String,
}

impl GateDecision {
    #[must_use]
    /// `allow`.
    pub fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into() }
    }

    #[must_use]
    /// `deny`.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: reason.into() }
    }
}

/// Everything the gate needs to evaluate one proposed DDL.
pub struct GateContext<'a> {
    /// `now`.
    pub now: chrono::DateTime<chrono::Utc>,
    /// `table`.
    pub table: &'a str,
    /// `tenant_id`.
    pub tenant_id: Option<i64>,
    /// `estimated_size_mb`.
    pub estimated_size_mb: f64,
    /// `current_table_index_count`.
    pub current_table_index_count: u32,
    /// `rate_limit_key`.
    pub rate_limit_key: &'a str,
    /// `rate_limit_cost`.
    pub rate_limit_cost: u32,
    /// `recent_cpu_pct`.
    pub recent_cpu_pct: f64,
}

/// Runs the full ordered chain of checks: maintenance window, rate limiter,
/// CPU throttle, storage budget, write-performance ceiling. Stops at the
/// first denial.
pub fn evaluate(
    maintenance_cfg: &MaintenanceWindowConfig,
    rate_limiters: &RateLimiterRegistry,
    rate_cfg: &RateLimiterConfig,
    cpu_threshold_pct: f64,
    storage_cfg: &StorageBudgetConfig,
    usage: &StorageUsage,
    write_cfg: &WritePerformanceConfig,
    ctx: &GateContext<'_>,
) -> GateDecision {
    let window = maintenance_window::evaluate(maintenance_cfg, ctx.now);
    if !window.in_window {
        return GateDecision::deny(format!(
            "outside maintenance window, seconds_until_window={}",
            window.seconds_until_window
        ));
    }

    let limiter = rate_limiters.index_creation(rate_cfg);
    let allowance = limiter.is_allowed(ctx.rate_limit_key, ctx.rate_limit_cost, ctx.now);
    if !allowance.allowed {
        return GateDecision::deny(format!(
            "index creation rate limit exceeded, retry_after_s={:.1}",
            allowance.retry_after_s
        ));
    }

    if let Some(reason) = cpu_throttle::check(ctx.recent_cpu_pct, cpu_threshold_pct) {
        return GateDecision::deny(reason);
    }

    let budget = storage_budget::check(storage_cfg, usage, ctx.tenant_id, ctx.estimated_size_mb);
    if !budget.allowed {
        return GateDecision::deny(budget.reason);
    }

    let write_check = write_performance::check(write_cfg, ctx.current_table_index_count);
    if !write_check.allowed {
        return GateDecision::deny(write_check.reason);
    }

    GateDecision::allow("all safety checks passed")
}
