//! Hierarchical configuration for the index advisor.
//!
//! Configuration loads from a TOML file with environment-variable overrides
//! via `${VAR}` expansion, mirroring the option groups enumerated in §6.
//! Any key missing from the file falls back to the documented default below.

use relindex_error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global kill switches and per-feature bypasses (§6 `bypass.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassConfig {
    /// `bypass.system.enabled`, global kill switch.
    pub system_enabled: bool,
    /// `bypass.features.auto_indexing.enabled`.
    pub auto_indexing: bool,
    /// `bypass.features.stats_collection.enabled`.
    pub stats_collection: bool,
    /// `bypass.features.expression_checks.enabled`.
    pub expression_checks: bool,
    /// `bypass.features.mutation_logging.enabled`.
    pub mutation_logging: bool,
    /// `bypass.startup.skip_initialization`.
    pub skip_initialization: bool,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            system_enabled: false,
            auto_indexing: false,
            stats_collection: false,
            expression_checks: false,
            mutation_logging: false,
            skip_initialization: false,
        }
    }
}

/// `features.query_interceptor.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// `max_query_cost`.
    pub max_query_cost: f64,
    /// `max_seq_scan_cost`.
    pub max_seq_scan_cost: f64,
    /// `max_planning_time_ms`.
    pub max_planning_time_ms: f64,
    /// `enable_blocking`.
    pub enable_blocking: bool,
    /// `enable_rate_limiting`.
    pub enable_rate_limiting: bool,
    /// `enable_plan_cache`.
    pub enable_plan_cache: bool,
    /// `plan_cache_ttl_secs`.
    pub plan_cache_ttl_secs: u64,
    /// `plan_cache_max_size`.
    pub plan_cache_max_size: usize,
    /// `safety_score_unsafe_threshold`.
    pub safety_score_unsafe_threshold: f64,
    /// `safety_score_warning_threshold`.
    pub safety_score_warning_threshold: f64,
    /// `safety_score_high_cost_penalty`.
    pub safety_score_high_cost_penalty: f64,
    /// `safety_score_seq_scan_penalty`.
    pub safety_score_seq_scan_penalty: f64,
    /// `safety_score_nested_loop_penalty`.
    pub safety_score_nested_loop_penalty: f64,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            max_query_cost: 10_000.0,
            max_seq_scan_cost: 1_000.0,
            max_planning_time_ms: 500.0,
            enable_blocking: true,
            enable_rate_limiting: true,
            enable_plan_cache: true,
            plan_cache_ttl_secs: 300,
            plan_cache_max_size: 10_000,
            safety_score_unsafe_threshold: 0.3,
            safety_score_warning_threshold: 0.7,
            safety_score_high_cost_penalty: 0.5,
            safety_score_seq_scan_penalty: 0.7,
            safety_score_nested_loop_penalty: 0.8,
        }
    }
}

/// `features.auto_indexer.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoIndexerConfig {
    /// `build_cost_per_1000_rows`.
    pub build_cost_per_1000_rows: f64,
    /// `query_cost_per_10000_rows`.
    pub query_cost_per_10000_rows: f64,
    /// `min_selectivity_for_index`.
    pub min_selectivity_for_index: f64,
    /// `min_improvement_pct`.
    pub min_improvement_pct: f64,
    /// `sample_query_runs`.
    pub sample_query_runs: u32,
    /// `use_real_query_plans`.
    pub use_real_query_plans: bool,
    /// `small_table_row_count`.
    pub small_table_row_count: u64,
    /// `medium_table_row_count`.
    pub medium_table_row_count: u64,
    /// `small_table_min_queries_per_hour`.
    pub small_table_min_queries_per_hour: u64,
    /// `large_table_cost_reduction_factor`.
    pub large_table_cost_reduction_factor: f64,
    /// `max_wait_for_maintenance_window_secs`.
    pub max_wait_for_maintenance_window_secs: u64,
    /// `min_query_threshold`.
    pub min_query_threshold: u64,
    /// `cert_max_error_pct`.
    pub cert_max_error_pct: f64,
}

impl Default for AutoIndexerConfig {
    fn default() -> Self {
        Self {
            build_cost_per_1000_rows: 10.0,
            query_cost_per_10000_rows: 5.0,
            min_selectivity_for_index: 0.01,
            min_improvement_pct: 20.0,
            sample_query_runs: 5,
            use_real_query_plans: true,
            small_table_row_count: 1_000,
            medium_table_row_count: 100_000,
            small_table_min_queries_per_hour: 10,
            large_table_cost_reduction_factor: 0.1,
            max_wait_for_maintenance_window_secs: 3_600,
            min_query_threshold: 100,
            cert_max_error_pct: 10.0,
        }
    }
}

/// `features.cpu_throttle.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuThrottleConfig {
    /// `enabled`.
    pub enabled: bool,
    /// `cpu_threshold`.
    pub cpu_threshold: f64,
    /// `cpu_cooldown_secs`.
    pub cpu_cooldown_secs: u64,
    /// `max_cpu_during_creation`.
    pub max_cpu_during_creation: f64,
    /// `min_delay_between_indexes_secs`.
    pub min_delay_between_indexes_secs: u64,
    /// `cpu_monitoring_window_secs`.
    pub cpu_monitoring_window_secs: u64,
    /// `max_cooldown_wait_secs`.
    pub max_cooldown_wait_secs: u64,
}

impl Default for CpuThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cpu_threshold: 80.0,
            cpu_cooldown_secs: 60,
            max_cpu_during_creation: 90.0,
            min_delay_between_indexes_secs: 5,
            cpu_monitoring_window_secs: 60,
            max_cooldown_wait_secs: 300,
        }
    }
}

/// A single token-bucket rate limiter's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterBucketConfig {
    /// `max_requests`.
    pub max_requests: u64,
    /// `time_window_seconds`.
    pub time_window_seconds: f64,
}

/// `features.rate_limiter.{query,index_creation,connection}.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// `query`.
    pub query: RateLimiterBucketConfig,
    /// `index_creation`.
    pub index_creation: RateLimiterBucketConfig,
    /// `connection`.
    pub connection: RateLimiterBucketConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            query: RateLimiterBucketConfig { max_requests: 1_000, time_window_seconds: 60.0 },
            index_creation: RateLimiterBucketConfig { max_requests: 10, time_window_seconds: 3_600.0 },
            connection: RateLimiterBucketConfig { max_requests: 100, time_window_seconds: 60.0 },
        }
    }
}

/// `production_safeguards.maintenance_window.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceWindowConfig {
    /// `enabled`.
    pub enabled: bool,
    /// `start_hour`.
    pub start_hour: u32,
    /// `end_hour`.
    pub end_hour: u32,
    /// Days of week in `[0, 6]` (0 = Monday); empty means all days.
    pub days_of_week: Vec<u32>,
}

impl Default for MaintenanceWindowConfig {
    fn default() -> Self {
        Self { enabled: true, start_hour: 2, end_hour: 6, days_of_week: Vec::new() }
    }
}

/// `production_safeguards.write_performance.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WritePerformanceConfig {
    /// `enabled`.
    pub enabled: bool,
    /// `max_indexes_per_table`.
    pub max_indexes_per_table: u32,
    /// `warn_indexes_per_table`.
    pub warn_indexes_per_table: u32,
    /// `write_overhead_threshold_pct`.
    pub write_overhead_threshold_pct: f64,
}

impl Default for WritePerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_indexes_per_table: 10,
            warn_indexes_per_table: 7,
            write_overhead_threshold_pct: 10.0,
        }
    }
}

/// `features.constraint_optimization.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintOptimizationConfig {
    /// `max_storage_per_tenant_mb`.
    pub max_storage_per_tenant_mb: f64,
    /// `max_storage_total_mb`.
    pub max_storage_total_mb: f64,
    /// `storage_warn_threshold_pct`.
    pub storage_warn_threshold_pct: f64,
    /// `max_query_time_ms`.
    pub max_query_time_ms: f64,
    /// `min_improvement_pct`.
    pub min_improvement_pct: f64,
    /// `read_write_ratio`.
    pub read_write_ratio: f64,
    /// `max_write_overhead_pct`.
    pub max_write_overhead_pct: f64,
    /// `max_indexes_per_table`.
    pub max_indexes_per_table: u32,
    /// `max_indexes_per_tenant`.
    pub max_indexes_per_tenant: u32,
    /// `min_score_threshold`.
    pub min_score_threshold: f64,
}

impl Default for ConstraintOptimizationConfig {
    fn default() -> Self {
        Self {
            max_storage_per_tenant_mb: 1_000.0,
            max_storage_total_mb: 10_000.0,
            storage_warn_threshold_pct: 80.0,
            max_query_time_ms: 100.0,
            min_improvement_pct: 20.0,
            read_write_ratio: 0.8,
            max_write_overhead_pct: 10.0,
            max_indexes_per_table: 10,
            max_indexes_per_tenant: 50,
            min_score_threshold: 0.5,
        }
    }
}

/// `features.cortex.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    /// `enabled`.
    pub enabled: bool,
    /// `correlation_threshold`.
    pub correlation_threshold: f64,
    /// `min_correlation_samples`.
    pub min_correlation_samples: u32,
    /// `sample_size`.
    pub sample_size: u32,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self { enabled: true, correlation_threshold: 0.7, min_correlation_samples: 100, sample_size: 10_000 }
    }
}

/// `features.qpg.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QpgConfig {
    /// `enabled`.
    pub enabled: bool,
    /// `diverse_plan_generation`.
    pub diverse_plan_generation: bool,
    /// `bottleneck_analysis_depth`.
    pub bottleneck_analysis_depth: u32,
    /// `identify_logic_bugs`.
    pub identify_logic_bugs: bool,
}

impl Default for QpgConfig {
    fn default() -> Self {
        Self { enabled: true, diverse_plan_generation: true, bottleneck_analysis_depth: 3, identify_logic_bugs: true }
    }
}

/// `features.predictive_indexing.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveIndexingConfig {
    /// `enabled`.
    pub enabled: bool,
    /// `use_historical_data`.
    pub use_historical_data: bool,
    /// `min_historical_samples`.
    pub min_historical_samples: u32,
    /// Weight given to the ML/historical utility prediction during fusion (§4.3.6).
    pub weight: f64,
}

impl Default for PredictiveIndexingConfig {
    fn default() -> Self {
        Self { enabled: true, use_historical_data: true, min_historical_samples: 10, weight: 0.3 }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `url`.
    pub url: String,
    /// `max_connections`.
    pub max_connections: usize,
    /// `min_connections`.
    pub min_connections: usize,
    /// `connect_timeout_secs`.
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 10,
        }
    }
}

/// Top-level configuration for the relindex runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelindexConfig {
    /// `bypass`.
    pub bypass: BypassConfig,
    /// `database`.
    pub database: DatabaseConfig,
    /// `query_interceptor`.
    pub query_interceptor: InterceptorConfig,
    /// `auto_indexer`.
    pub auto_indexer: AutoIndexerConfig,
    /// `cpu_throttle`.
    pub cpu_throttle: CpuThrottleConfig,
    /// `rate_limiter`.
    pub rate_limiter: RateLimiterConfig,
    /// `maintenance_window`.
    pub maintenance_window: MaintenanceWindowConfig,
    /// `write_performance`.
    pub write_performance: WritePerformanceConfig,
    /// `constraint_optimization`.
    pub constraint_optimization: ConstraintOptimizationConfig,
    /// `cortex`.
    pub cortex: CortexConfig,
    /// `qpg`.
    pub qpg: QpgConfig,
    /// `predictive_indexing`.
    pub predictive_indexing: PredictiveIndexingConfig,
}

impl RelindexConfig {
    /// Load configuration from a TOML file, applying `${VAR}` environment expansion.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RuntimeError::config(format!("failed to read {}: {e}", path.as_ref().display())))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string, expanding `${VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        toml::from_str(&expanded).map_err(|e| RuntimeError::config(format!("invalid TOML: {e}")))
    }

    /// A configuration suitable for deterministic tests: every feature enabled,
    /// no bypass switches active, small thresholds for fast convergence.
    #[must_use]
    pub fn test() -> Self {
        Self::default()
    }

    /// Serialize back to TOML, e.g. for `preview_schema_change`-style diagnostics.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::config(format!("failed to serialize config: {e}")))
    }
}

/// Expand `${VAR}` references in `content` using the process environment.
///
/// Unset variables expand to an empty string rather than erroring; config
/// files are expected to declare sane fallbacks via TOML defaults, not rely on
/// the environment being fully populated.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                var_name.push(c2);
            }
            let value = std::env::var(&var_name).unwrap_or_default();
            result.push_str(&value);
        } else {
            result.push(c);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RelindexConfig::default();
        assert_eq!(cfg.auto_indexer.cert_max_error_pct, 10.0);
        assert_eq!(cfg.query_interceptor.safety_score_unsafe_threshold, 0.3);
        assert_eq!(cfg.rate_limiter.query.max_requests, 1_000);
        assert_eq!(cfg.constraint_optimization.min_score_threshold, 0.5);
    }

    #[test]
    fn expands_environment_variables() {
        std::env::set_var("RELINDEX_TEST_HOST", "db.internal");
        let toml = "[database]\nurl = \"postgres://${RELINDEX_TEST_HOST}/app\"\n";
        let cfg = RelindexConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.database.url, "postgres://db.internal/app");
        std::env::remove_var("RELINDEX_TEST_HOST");
    }

    #[test]
    fn unset_variable_expands_to_empty_string() {
        let toml = "[database]\nurl = \"${RELINDEX_DEFINITELY_UNSET_VAR}\"\n";
        let cfg = RelindexConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.database.url, "");
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = RelindexConfig::from_toml("not = [valid").unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }
}
