//! Storage budget check (§4.5). Rejects a proposed index when it would push
//! per-tenant or global storage past the configured cap; warns past the
//! warn threshold without blocking.

pub use crate::config::ConstraintOptimizationConfig as StorageBudgetConfig;

#[derive(Debug, Clone)]
/// `StorageUsage`.
pub struct StorageUsage {
    /// `total_used_mb`.
    pub total_used_mb: f64,
    /// `tenant_used_mb`.
    pub tenant_used_mb: f64,
}

#[derive(Debug, Clone)]
/// `BudgetDecision`.
pub struct BudgetDecision {
    /// `allowed`.
    pub allowed: bool,
    /// `reason`.
    pub reason: String,
    /// `warning`.
    pub warning: Option<String>,
}

#[must_use]
/// `check`.
pub fn check(cfg: &StorageBudgetConfig, usage: &StorageUsage, tenant_id: Option<i64>, est_size_mb: f64) -> BudgetDecision {
    let projected_total = usage.total_used_mb + est_size_mb;
    if projected_total > cfg.max_storage_total_mb {
        return BudgetDecision {
            allowed: false,
            reason: format!(
                "global storage budget exceeded: projected {projected_total:.1}MB > {:.1}MB",
                cfg.max_storage_total_mb
            ),
            warning: None,
        };
    }

    if tenant_id.is_some() {
        let projected_tenant = usage.tenant_used_mb + est_size_mb;
        if projected_tenant > cfg.max_storage_per_tenant_mb {
            return BudgetDecision {
                allowed: false,
                reason: format!(
                    "per-tenant storage budget exceeded: projected {projected_tenant:.1}MB > {:.1}MB",
                    cfg.max_storage_per_tenant_mb
                ),
                warning: None,
            };
        }
    }

    let total_pct = projected_total / cfg.max_storage_total_mb.max(f64::EPSILON) * 100.0;
    let warning = (total_pct > cfg.storage_warn_threshold_pct)
        .then(|| format!("storage usage at {total_pct:.1}% of global budget"));

    BudgetDecision { allowed: true, reason: "within storage budget".to_string(), warning }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> StorageBudgetConfig {
        StorageBudgetConfig::default()
    }

    #[test]
    fn blocks_when_global_cap_exceeded() {
        let usage = StorageUsage { total_used_mb: 9_999.0, tenant_used_mb: 0.0 };
        let decision = check(&cfg(), &usage, None, 100.0);
        assert!(!decision.allowed);
    }

    #[test]
    fn blocks_when_per_tenant_cap_exceeded() {
        let usage = StorageUsage { total_used_mb: 0.0, tenant_used_mb: 999.0 };
        let decision = check(&cfg(), &usage, Some(7), 10.0);
        assert!(!decision.allowed);
    }

    #[test]
    fn warns_but_allows_past_warn_threshold() {
        let usage = StorageUsage { total_used_mb: 7_900.0, tenant_used_mb: 0.0 };
        let decision = check(&cfg(), &usage, None, 100.0);
        assert!(decision.allowed);
        assert!(decision.warning.is_some());
    }
}
