//! Query interceptor (§4.7).
//!
//! Sits in the pre-execution path and decides block / warn / pass. The
//! cache-hit path must stay sub-millisecond, so normalization and lookup
//! avoid allocation where practical and never touch the database.

use crate::config::InterceptorConfig;
use lru::LruCache;
use regex::Regex;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
/// `PlanSummary`.
pub struct PlanSummary {
    /// `total_cost`.
    pub total_cost: f64,
    /// `node_type`.
    pub node_type: String,
    /// `has_seq_scan`.
    pub has_seq_scan: bool,
    /// `has_index_scan`.
    pub has_index_scan: bool,
    /// `has_nested_loop`.
    pub has_nested_loop: bool,
    /// `estimated_rows`.
    pub estimated_rows: u64,
    /// `tables`.
    pub tables: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// `SafetyStatus`.
pub enum SafetyStatus {
    /// `Safe`.
    Safe,
    /// `Warning`.
    Warning,
    /// `Unsafe`.
    Unsafe,
}

#[derive(Debug, Clone)]
/// `InterceptDecision`.
pub enum InterceptDecision {
    /// `Pass`.
    Pass,
    /// `Warn`.
    Warn {
        /// `safety_score`.
        safety_score: f64,
        /// `status`.
        status: SafetyStatus,
    },
    /// `Block`.
    Block {
        /// `reason`.
        reason: &'static str,
        /// `detail`.
        detail: String,
    },
}

#[derive(Debug, Default)]
/// `InterceptorMetrics`.
pub struct InterceptorMetrics {
    /// `interceptions`.
    pub interceptions: u64,
    /// `blocks`.
    pub blocks: u64,
    /// `cache_hits`.
    pub cache_hits: u64,
    /// `cache_misses`.
    pub cache_misses: u64,
    /// `blocks_by_reason`.
    pub blocks_by_reason: std::collections::HashMap<&'static str, u64>,
    /// `total_analysis_time_ms`.
    pub total_analysis_time_ms: f64,
    /// `analysis_count`.
    pub analysis_count: u64,
}

impl InterceptorMetrics {
    #[must_use]
    /// `mean_analysis_time_ms`.
    pub fn mean_analysis_time_ms(&self) -> f64 {
        if self.analysis_count == 0 { 0.0 } else { self.total_analysis_time_ms / self.analysis_count as f64 }
    }
}

/// Normalize a query into a cache key: collapse whitespace, fold
/// placeholders (`%s`, `$1`, `$2`, ...) to `?`, strip SQL comments, and
/// append an 8-hex-char tag derived from bound parameters so distinct
/// literal values with identical shape can still share a plan-cache slot
/// only when explicitly desired (they don't, by default).
#[must_use]
pub fn normalize_query_signature(query: &str, params: Option<&[String]>) -> String {
    static WHITESPACE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    static PLACEHOLDER: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    static LINE_COMMENT: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    static BLOCK_COMMENT: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

    let line_comment = LINE_COMMENT.get_or_init(|| Regex::new(r"--[^\n]*").expect("valid regex"));
    let block_comment = BLOCK_COMMENT.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
    let placeholder = PLACEHOLDER.get_or_init(|| Regex::new(r"%s|\$\d+").expect("valid regex"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let stripped = block_comment.replace_all(query, "");
    let stripped = line_comment.replace_all(&stripped, "");
    let folded = placeholder.replace_all(&stripped, "?");
    let collapsed = whitespace.replace_all(folded.trim(), " ").to_string();

    match params {
        Some(p) if !p.is_empty() => {
            let digest = format!("{:x}", md5_sum(p.join(",").as_bytes()));
            format!("{collapsed}|params:{}", &digest[..8.min(digest.len())])
        }
        _ => collapsed,
    }
}

/// Minimal MD5 stand-in is avoided deliberately: we hash with a small
/// non-cryptographic mixer since this key only needs stable uniqueness for
/// cache partitioning, not collision resistance against adversaries.
fn md5_sum(bytes: &[u8]) -> u64 {
    // FNV-1a, 64-bit.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[allow(dead_code)]
struct CacheEntry {
    plan: PlanSummary,
    expires_at: Instant,
}

/// LRU-bounded, TTL-expiring cache of plan summaries keyed by normalized
/// query signature.
pub struct PlanCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    #[allow(dead_code)]
    ttl: Duration,
}

impl PlanCache {
    #[must_use]
    /// `new`.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(cap)), ttl }
    }

    #[allow(dead_code)]
    fn get(&self, key: &str) -> Option<PlanSummary> {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.plan.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    #[allow(dead_code)]
    fn put(&self, key: String, plan: PlanSummary) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.put(key, CacheEntry { plan, expires_at: Instant::now() + self.ttl });
    }

    /// Drop every cached plan touching `table`. Lazy/eager doesn't matter for
    /// correctness here since we scan eagerly; it's cheap relative to a DDL.
    pub fn invalidate_table(&self, table: &str) {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let stale: Vec<String> =
            guard.iter().filter(|(_, e)| e.plan.tables.contains(table)).map(|(k, _)| k.clone()).collect();
        for key in stale {
            guard.pop(&key);
        }
    }

    #[must_use]
    /// `len`.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    #[must_use]
    /// `is_empty`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whitelist/blacklist pattern set. Blacklist wins on overlap.
#[derive(Default)]
pub struct PatternList {
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
}

impl PatternList {
    #[must_use]
    /// `new`.
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Self {
        let compile = |patterns: &[String]| patterns.iter().filter_map(|p| Regex::new(p).ok()).collect();
        Self { whitelist: compile(whitelist), blacklist: compile(blacklist) }
    }

    /// `Some(true)` = explicitly allowed (whitelist, no blacklist match),
    /// `Some(false)` = blacklisted, `None` = no pattern matched either list.
    #[must_use]
    pub fn evaluate(&self, query: &str) -> Option<bool> {
        if self.blacklist.iter().any(|r| r.is_match(query)) {
            return Some(false);
        }
        if self.whitelist.iter().any(|r| r.is_match(query)) {
            return Some(true);
        }
        None
    }
}

/// Sub-millisecond fast path: a bare `SELECT ... LIMIT n` with no `JOIN`
/// never needs plan analysis.
#[must_use]
pub fn is_trivial_query(query: &str) -> bool {
    let upper = query.to_uppercase();
    upper.trim_start().starts_with("SELECT") && upper.contains("LIMIT") && !upper.contains("JOIN")
}

/// Safety score (§4.7 step 7): monitoring only, never blocks.
#[must_use]
pub fn safety_score(cfg: &InterceptorConfig, plan: &PlanSummary) -> (f64, SafetyStatus) {
    let mut score = 1.0;
    if plan.total_cost > cfg.max_query_cost {
        score *= cfg.safety_score_high_cost_penalty;
    }
    if plan.has_seq_scan {
        score *= cfg.safety_score_seq_scan_penalty;
    }
    if plan.has_nested_loop {
        score *= cfg.safety_score_nested_loop_penalty;
    }
    let status = if score < cfg.safety_score_unsafe_threshold {
        SafetyStatus::Unsafe
    } else if score < cfg.safety_score_warning_threshold {
        SafetyStatus::Warning
    } else {
        SafetyStatus::Safe
    };
    (score, status)
}

/// Evaluate the block rules (§4.7 step 6), first match wins.
#[must_use]
pub fn evaluate_block_rules(cfg: &InterceptorConfig, plan: &PlanSummary, max_seq_scan_cost_override: Option<f64>) -> Option<InterceptDecision> {
    if plan.total_cost > cfg.max_query_cost {
        return Some(InterceptDecision::Block {
            reason: "QUERY_COST_TOO_HIGH",
            detail: format!("total_cost={:.1} exceeds max {:.1}", plan.total_cost, cfg.max_query_cost),
        });
    }
    let seq_scan_cap = max_seq_scan_cost_override.unwrap_or(cfg.max_seq_scan_cost);
    if plan.has_seq_scan && plan.total_cost > seq_scan_cap {
        return Some(InterceptDecision::Block {
            reason: "SEQUENTIAL_SCAN_TOO_EXPENSIVE",
            detail: format!("seq scan with total_cost={:.1} exceeds max {:.1}", plan.total_cost, seq_scan_cap),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(cost: f64, seq_scan: bool, nested_loop: bool) -> PlanSummary {
        PlanSummary {
            total_cost: cost,
            node_type: "Seq Scan".to_string(),
            has_seq_scan: seq_scan,
            has_index_scan: false,
            has_nested_loop: nested_loop,
            estimated_rows: 1000,
            tables: ["contacts".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn normalizes_whitespace_placeholders_and_comments() {
        let a = normalize_query_signature("SELECT  *  FROM t WHERE id = $1 -- comment\n", None);
        let b = normalize_query_signature("SELECT * FROM t WHERE id = %s", None);
        assert_eq!(a, "SELECT * FROM t WHERE id = ?");
        assert_eq!(b, "SELECT * FROM t WHERE id = ?");
    }

    #[test]
    fn appends_param_tag_when_params_present() {
        let without = normalize_query_signature("SELECT 1", None);
        let with = normalize_query_signature("SELECT 1", Some(&["abc".to_string()]));
        assert_ne!(without, with);
        assert!(with.starts_with("SELECT 1|params:"));
    }

    #[test]
    fn blacklist_takes_precedence_over_whitelist() {
        let patterns = PatternList::new(&["SELECT".to_string()], &["DROP".to_string()]);
        assert_eq!(patterns.evaluate("DROP TABLE t"), Some(false));
        assert_eq!(patterns.evaluate("SELECT 1"), Some(true));
        assert_eq!(patterns.evaluate("UPDATE t SET x=1"), None);
    }

    #[test]
    fn trivial_select_with_limit_skips_plan_analysis() {
        assert!(is_trivial_query("SELECT * FROM t LIMIT 10"));
        assert!(!is_trivial_query("SELECT * FROM t JOIN u ON t.id=u.id LIMIT 10"));
        assert!(!is_trivial_query("SELECT * FROM t"));
    }

    #[test]
    fn blocks_on_query_cost_before_seq_scan_check() {
        let cfg = InterceptorConfig::default();
        let decision = evaluate_block_rules(&cfg, &plan(cfg.max_query_cost + 1.0, true, false), None);
        assert!(matches!(decision, Some(InterceptDecision::Block { reason: "QUERY_COST_TOO_HIGH", .. })));
    }

    #[test]
    fn blocks_expensive_seq_scan_under_query_cost_ceiling() {
        let cfg = InterceptorConfig::default();
        let cost = cfg.max_seq_scan_cost + 1.0;
        let decision = evaluate_block_rules(&cfg, &plan(cost, true, false), None);
        assert!(matches!(decision, Some(InterceptDecision::Block { reason: "SEQUENTIAL_SCAN_TOO_EXPENSIVE", .. })));
    }

    #[test]
    fn safety_score_degrades_with_each_penalty() {
        let cfg = InterceptorConfig::default();
        let clean = safety_score(&cfg, &plan(10.0, false, false));
        let risky = safety_score(&cfg, &plan(cfg.max_query_cost + 1.0, true, true));
        assert!(clean.0 > risky.0);
        assert_eq!(clean.1, SafetyStatus::Safe);
    }

    #[test]
    fn cache_respects_ttl_expiry() {
        let cache = PlanCache::new(10, Duration::from_millis(1));
        cache.put("k".to_string(), plan(1.0, false, false));
        assert!(cache.get("k").is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn invalidate_table_drops_only_matching_entries() {
        let cache = PlanCache::new(10, Duration::from_secs(60));
        cache.put("a".to_string(), plan(1.0, false, false));
        let mut other = plan(1.0, false, false);
        other.tables = ["orders".to_string()].into_iter().collect();
        cache.put("b".to_string(), other);
        cache.invalidate_table("contacts");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }
}
