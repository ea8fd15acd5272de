//! Maintenance window check (§4.5).
//!
//! `(start_hour, end_hour, days_of_week)` in wall-clock time, wrapping at
//! midnight when `start_hour > end_hour` (e.g. 22→6 spans the night).

pub use crate::config::MaintenanceWindowConfig;
use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, Copy)]
/// `WindowStatus`.
pub struct WindowStatus {
    /// `in_window`.
    pub in_window: bool,
    /// `seconds_until_window`.
    pub seconds_until_window: i64,
}

/// Evaluate whether `now` falls inside the configured window. A disabled
/// config always reports "in window" (no restriction).
#[must_use]
pub fn evaluate(cfg: &MaintenanceWindowConfig, now: DateTime<Utc>) -> WindowStatus {
    if !cfg.enabled {
        return WindowStatus { in_window: true, seconds_until_window: 0 };
    }

    let day = now.weekday().num_days_from_monday();
    let day_allowed = cfg.days_of_week.is_empty() || cfg.days_of_week.contains(&day);

    let hour = now.hour();
    let in_hours = if cfg.start_hour <= cfg.end_hour {
        hour >= cfg.start_hour && hour < cfg.end_hour
    } else {
        // Wraps past midnight, e.g. 22..6.
        hour >= cfg.start_hour || hour < cfg.end_hour
    };

    if day_allowed && in_hours {
        return WindowStatus { in_window: true, seconds_until_window: 0 };
    }

    WindowStatus { in_window: false, seconds_until_window: seconds_until_next_window(cfg, now) }
}

fn seconds_until_next_window(cfg: &MaintenanceWindowConfig, now: DateTime<Utc>) -> i64 {
    // Walk forward hour-by-hour (bounded to one week) until we land in-window.
    // Correctness over cleverness: the window is small relative to a week and
    // this only runs when a caller is about to be blocked anyway.
    let mut probe = now;
    for _ in 0..(24 * 8) {
        probe += chrono::Duration::hours(1);
        let day = probe.weekday().num_days_from_monday();
        let day_allowed = cfg.days_of_week.is_empty() || cfg.days_of_week.contains(&day);
        let hour = probe.hour();
        let in_hours = if cfg.start_hour <= cfg.end_hour {
            hour >= cfg.start_hour && hour < cfg.end_hour
        } else {
            hour >= cfg.start_hour || hour < cfg.end_hour
        };
        if day_allowed && in_hours {
            let window_start = probe.date_naive().and_hms_opt(cfg.start_hour.min(23), 0, 0).unwrap_or_default();
            let start_dt = DateTime::<Utc>::from_naive_utc_and_offset(window_start, Utc);
            let candidate = if start_dt <= probe && start_dt > now { start_dt } else { probe };
            return (candidate - now).num_seconds().max(0);
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn disabled_window_always_allows() {
        let cfg = MaintenanceWindowConfig { enabled: false, start_hour: 2, end_hour: 6, days_of_week: Vec::new() };
        assert!(evaluate(&cfg, at(12)).in_window);
    }

    #[test]
    fn blocks_outside_simple_window() {
        let cfg = MaintenanceWindowConfig { enabled: true, start_hour: 2, end_hour: 6, days_of_week: Vec::new() };
        let status = evaluate(&cfg, at(12));
        assert!(!status.in_window);
        // 12:00 -> next window opens at 02:00 the following day = 14 hours.
        assert_eq!(status.seconds_until_window, 14 * 3600);
    }

    #[test]
    fn allows_inside_simple_window() {
        let cfg = MaintenanceWindowConfig { enabled: true, start_hour: 2, end_hour: 6, days_of_week: Vec::new() };
        assert!(evaluate(&cfg, at(3)).in_window);
    }

    #[test]
    fn wraps_past_midnight() {
        let cfg = MaintenanceWindowConfig { enabled: true, start_hour: 22, end_hour: 6, days_of_week: Vec::new() };
        assert!(evaluate(&cfg, at(23)).in_window);
        assert!(evaluate(&cfg, at(2)).in_window);
        assert!(!evaluate(&cfg, at(12)).in_window);
    }
}
