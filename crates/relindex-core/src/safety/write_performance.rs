//! Write-performance ceiling (§4.5). Caps the number of indexes maintained
//! per table so write amplification stays bounded.

use crate::config::WritePerformanceConfig;

#[derive(Debug, Clone)]
/// `WriteCheckResult`.
pub struct WriteCheckResult {
    /// `allowed`.
    pub allowed: bool,
    /// `reason`.
    pub reason: String,
    /// `warning`.
    pub warning: Option<String>,
}

#[must_use]
/// `check`.
pub fn check(cfg: &WritePerformanceConfig, current_table_index_count: u32) -> WriteCheckResult {
    if !cfg.enabled {
        return WriteCheckResult { allowed: true, reason: "write-performance check disabled".to_string(), warning: None };
    }

    if current_table_index_count >= cfg.max_indexes_per_table {
        return WriteCheckResult {
            allowed: false,
            reason: format!(
                "table already has {current_table_index_count} indexes, at or above the cap of {}",
                cfg.max_indexes_per_table
            ),
            warning: None,
        };
    }

    let warning = (current_table_index_count >= cfg.warn_indexes_per_table).then(|| {
        format!("table has {current_table_index_count} indexes, approaching the cap of {}", cfg.max_indexes_per_table)
    });

    WriteCheckResult { allowed: true, reason: "below index-per-table cap".to_string(), warning }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_at_or_above_cap() {
        let cfg = WritePerformanceConfig::default();
        let result = check(&cfg, cfg.max_indexes_per_table);
        assert!(!result.allowed);
    }

    #[test]
    fn warns_between_warn_and_max() {
        let cfg = WritePerformanceConfig::default();
        let result = check(&cfg, cfg.warn_indexes_per_table);
        assert!(result.allowed);
        assert!(result.warning.is_some());
    }

    #[test]
    fn disabled_check_always_allows() {
        let mut cfg = WritePerformanceConfig::default();
        cfg.enabled = false;
        let result = check(&cfg, 999);
        assert!(result.allowed);
    }
}
