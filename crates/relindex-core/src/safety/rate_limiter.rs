//! Token-bucket rate limiting (§4.5), grounded on the three operation
//! classes the advisor gates: query execution, index creation, connections.

use crate::config::{RateLimiterBucketConfig, RateLimiterConfig};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
/// `Allowance`.
pub struct Allowance {
    /// `allowed`.
    pub allowed: bool,
    /// `retry_after_s`.
    pub retry_after_s: f64,
    /// `remaining`.
    pub remaining: f64,
}

/// A single keyed token bucket, e.g. "all index-creation requests" or
/// "all query-execution requests for tenant 7".
pub struct TokenBucketLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    #[must_use]
    /// `new`.
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }

    /// Check and consume `cost` tokens for `key`. Buckets refill fully at
    /// `reset_at`; tokens never exceed `max_requests`.
    pub fn is_allowed(&self, key: &str, cost: u32, now: DateTime<Utc>, cfg: &RateLimiterBucketConfig) -> Allowance {
        let mut guard = match self.buckets.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bucket = guard.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: cfg.max_requests as f64,
            reset_at: now + chrono::Duration::milliseconds((cfg.time_window_seconds * 1000.0) as i64),
        });

        if now >= bucket.reset_at {
            bucket.tokens = cfg.max_requests as f64;
            bucket.reset_at = now + chrono::Duration::milliseconds((cfg.time_window_seconds * 1000.0) as i64);
        }

        let cost = f64::from(cost);
        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            Allowance { allowed: true, retry_after_s: 0.0, remaining: bucket.tokens }
        } else {
            let retry_after_s = (bucket.reset_at - now).num_milliseconds().max(0) as f64 / 1000.0;
            Allowance { allowed: false, retry_after_s, remaining: bucket.tokens }
        }
    }

    /// Reset one key, or every key when `key` is `None`.
    pub fn reset(&self, key: Option<&str>) {
        let mut guard = match self.buckets.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match key {
            Some(k) => {
                guard.remove(k);
            }
            None => guard.clear(),
        }
    }

    #[must_use]
    /// `stats`.
    pub fn stats(&self, key: &str) -> Option<(f64, DateTime<Utc>)> {
        let guard = match self.buckets.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(key).map(|b| (b.tokens, b.reset_at))
    }
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// The three named limiters the safety gate consults, matching the
/// `query:{key}`, `index:{table}`, `connection:{identifier}` key families.
#[derive(Default)]
pub struct RateLimiterRegistry {
    query: TokenBucketLimiter,
    index_creation: TokenBucketLimiter,
    connection: TokenBucketLimiter,
}

impl RateLimiterRegistry {
    #[must_use]
    /// `new`.
    pub fn new() -> Self {
        Self::default()
    }

    /// `check_query`.
    pub fn check_query(&self, key: &str, cost: u32, now: DateTime<Utc>, cfg: &RateLimiterConfig) -> Allowance {
        self.query.is_allowed(&format!("query:{key}"), cost, now, &cfg.query)
    }

    /// Returns the index-creation bucket limiter bound to its config, for
    /// callers (e.g. the safety gate) that want to drive it directly.
    #[must_use]
    pub fn index_creation(&self, cfg: &RateLimiterConfig) -> IndexCreationView<'_> {
        IndexCreationView { limiter: &self.index_creation, bucket_cfg: cfg.index_creation.clone() }
    }

    /// `check_connection`.
    pub fn check_connection(&self, identifier: &str, cost: u32, now: DateTime<Utc>, cfg: &RateLimiterConfig) -> Allowance {
        self.connection.is_allowed(&format!("connection:{identifier}"), cost, now, &cfg.connection)
    }

    /// `reset_all`.
    pub fn reset_all(&self) {
        self.query.reset(None);
        self.index_creation.reset(None);
        self.connection.reset(None);
    }
}

/// Thin view binding the index-creation limiter to its bucket config so
/// callers don't have to pass the config table on every call.
pub struct IndexCreationView<'a> {
    limiter: &'a TokenBucketLimiter,
    bucket_cfg: RateLimiterBucketConfig,
}

impl IndexCreationView<'_> {
    /// `is_allowed`.
    pub fn is_allowed(&self, key: &str, cost: u32, now: DateTime<Utc>) -> Allowance {
        // The table-name key becomes "index:{table}" per the documented family.
        self.limiter.is_allowed(&format!("index:{key}"), cost, now, &self.bucket_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn allows_up_to_max_requests_then_blocks() {
        let limiter = TokenBucketLimiter::new();
        let cfg = RateLimiterBucketConfig { max_requests: 3, time_window_seconds: 60.0 };
        for _ in 0..3 {
            assert!(limiter.is_allowed("k", 1, at(0), &cfg).allowed);
        }
        let blocked = limiter.is_allowed("k", 1, at(0), &cfg);
        assert!(!blocked.allowed);
        assert!(blocked.retry_after_s > 0.0);
    }

    #[test]
    fn refills_fully_after_reset_time() {
        let limiter = TokenBucketLimiter::new();
        let cfg = RateLimiterBucketConfig { max_requests: 1, time_window_seconds: 60.0 };
        assert!(limiter.is_allowed("k", 1, at(0), &cfg).allowed);
        assert!(!limiter.is_allowed("k", 1, at(1), &cfg).allowed);
        assert!(limiter.is_allowed("k", 1, at(61), &cfg).allowed);
    }

    #[test]
    fn reset_clears_a_single_key() {
        let limiter = TokenBucketLimiter::new();
        let cfg = RateLimiterBucketConfig { max_requests: 1, time_window_seconds: 60.0 };
        limiter.is_allowed("k", 1, at(0), &cfg);
        limiter.reset(Some("k"));
        assert!(limiter.is_allowed("k", 1, at(0), &cfg).allowed);
    }

    #[test]
    fn thousand_requests_per_sixty_seconds_ceiling() {
        let limiter = TokenBucketLimiter::new();
        let cfg = RateLimiterBucketConfig { max_requests: 1000, time_window_seconds: 60.0 };
        for _ in 0..1000 {
            assert!(limiter.is_allowed("global", 1, at(0), &cfg).allowed);
        }
        assert!(!limiter.is_allowed("global", 1, at(0), &cfg).allowed);
    }
}
