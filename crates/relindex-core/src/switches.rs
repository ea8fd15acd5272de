//! Global runtime feature switches (§3).
//!
//! Hot-path reads are atomic loads; writes go through an explicit
//! enable/disable API. Precedence when several sources disagree on one
//! feature: runtime override > system-wide bypass > feature flag > default-on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// The named subsystems a caller can toggle independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// `AutoIndexing`.
    AutoIndexing,
    /// `StatsCollection`.
    StatsCollection,
    /// `ExpressionChecks`.
    ExpressionChecks,
    /// `MutationLogging`.
    MutationLogging,
    /// `SchemaEvolution`.
    SchemaEvolution,
    /// `Reporting`.
    Reporting,
    /// `HealthChecks`.
    HealthChecks,
    /// `Interceptor`.
    Interceptor,
    /// `Retry`.
    Retry,
}

impl Feature {
    const ALL: [Feature; 9] = [
        Feature::AutoIndexing,
        Feature::StatsCollection,
        Feature::ExpressionChecks,
        Feature::MutationLogging,
        Feature::SchemaEvolution,
        Feature::Reporting,
        Feature::HealthChecks,
        Feature::Interceptor,
        Feature::Retry,
    ];
}

/// Process-wide switch state. One instance is shared behind an `Arc`.
pub struct RuntimeSwitches {
    system_bypass: AtomicBool,
    feature_flags: RwLock<HashMap<Feature, bool>>,
    runtime_overrides: RwLock<HashMap<Feature, bool>>,
}

impl RuntimeSwitches {
    /// Initialize from config-derived feature flags; every feature defaults
    /// to enabled unless `feature_flags` says otherwise.
    #[must_use]
    pub fn new(feature_flags: HashMap<Feature, bool>) -> Self {
        Self {
            system_bypass: AtomicBool::new(false),
            feature_flags: RwLock::new(feature_flags),
            runtime_overrides: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    /// `all_enabled`.
    pub fn all_enabled() -> Self {
        Self::new(Feature::ALL.into_iter().map(|f| (f, true)).collect())
    }

    /// Enable or disable the global kill switch: when true, every subsystem
    /// reports disabled regardless of its own flag.
    pub fn set_system_bypass(&self, enabled: bool) {
        self.system_bypass.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    /// `system_bypass`.
    pub fn system_bypass(&self) -> bool {
        self.system_bypass.load(Ordering::Relaxed)
    }

    /// Set a per-feature runtime override; takes precedence over everything else.
    pub fn set_runtime_override(&self, feature: Feature, enabled: bool) {
        let mut guard = self.runtime_overrides.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(feature, enabled);
    }

    /// `clear_runtime_override`.
    pub fn clear_runtime_override(&self, feature: Feature) {
        let mut guard = self.runtime_overrides.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.remove(&feature);
    }

    /// `set_feature_flag`.
    pub fn set_feature_flag(&self, feature: Feature, enabled: bool) {
        let mut guard = self.feature_flags.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(feature, enabled);
    }

    /// Resolve a feature's effective state per the documented precedence:
    /// runtime override > system-wide bypass > feature flag > default-on.
    #[must_use]
    pub fn is_enabled(&self, feature: Feature) -> bool {
        if let Some(&override_value) =
            self.runtime_overrides.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(&feature)
        {
            return override_value;
        }
        if self.system_bypass() {
            return false;
        }
        self.feature_flags
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&feature)
            .copied()
            .unwrap_or(true)
    }
}

impl Default for RuntimeSwitches {
    fn default() -> Self {
        Self::all_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_enabled_when_unconfigured() {
        let switches = RuntimeSwitches::new(HashMap::new());
        assert!(switches.is_enabled(Feature::AutoIndexing));
    }

    #[test]
    fn feature_flag_can_disable() {
        let switches = RuntimeSwitches::all_enabled();
        switches.set_feature_flag(Feature::Reporting, false);
        assert!(!switches.is_enabled(Feature::Reporting));
    }

    #[test]
    fn system_bypass_overrides_feature_flag() {
        let switches = RuntimeSwitches::all_enabled();
        switches.set_system_bypass(true);
        assert!(!switches.is_enabled(Feature::AutoIndexing));
    }

    #[test]
    fn runtime_override_wins_over_system_bypass() {
        let switches = RuntimeSwitches::all_enabled();
        switches.set_system_bypass(true);
        switches.set_runtime_override(Feature::Interceptor, true);
        assert!(switches.is_enabled(Feature::Interceptor));
    }

    #[test]
    fn clearing_override_restores_fallback_precedence() {
        let switches = RuntimeSwitches::all_enabled();
        switches.set_runtime_override(Feature::Retry, false);
        switches.clear_runtime_override(Feature::Retry);
        assert!(switches.is_enabled(Feature::Retry));
    }
}
