//! Telemetry buffer & stats flusher (§4.1).
//!
//! Accepts `(tenant?, table, field?, type, duration_ms)` samples from the
//! query path with O(1) latency and persists them in batches. `record()`
//! never blocks on I/O: it either pushes onto an in-memory queue or, if the
//! buffer is disabled or over its bound, increments a drop counter.

use crate::types::QueryStat;
use relindex_error::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Upper bound on buffered-but-unflushed samples before the oldest are dropped.
const DEFAULT_MAX_BUFFERED: usize = 100_000;

/// In-memory ring buffer guarded by a single mutex; a background task flushes
/// on a timer and when the buffer crosses a size threshold.
pub struct TelemetryBuffer {
    inner: Mutex<Vec<QueryStat>>,
    max_buffered: usize,
    enabled: std::sync::atomic::AtomicBool,
    dropped: AtomicU64,
    recorded: AtomicU64,
}

impl TelemetryBuffer {
    #[must_use]
    /// `new`.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BUFFERED)
    }

    #[must_use]
    /// `with_capacity`.
    pub fn with_capacity(max_buffered: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            max_buffered,
            enabled: std::sync::atomic::AtomicBool::new(true),
            dropped: AtomicU64::new(0),
            recorded: AtomicU64::new(0),
        }
    }

    /// Enable or disable buffering. When disabled, `record()` drops every
    /// sample and counts the drop, rather than erroring.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Record a sample. Never blocks on I/O.
    pub fn record(&self, sample: QueryStat) {
        if !self.enabled.load(Ordering::Relaxed) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.len() >= self.max_buffered {
            // Backing store can't keep up: drop the oldest sample rather than
            // growing unbounded, and count it (§4.1 failure semantics).
            guard.remove(0);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(sample);
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically drain the buffer, returning every sample accumulated so far.
    /// Idempotent: a flush with nothing buffered returns an empty vec.
    #[must_use]
    pub fn drain(&self) -> Vec<QueryStat> {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut guard)
    }

    /// Clone out the samples accumulated so far without draining them, so a
    /// reader (e.g. the advisor tick) can look at the current window while
    /// the periodic flush still owns draining it to durable storage.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueryStat> {
        let guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clone()
    }

    #[must_use]
    /// `dropped_count`.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    /// `recorded_count`.
    pub fn recorded_count(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
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

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch-writes drained samples to persistent storage. On write failure, the
/// batch is logged and retried at the next tick rather than propagating; a
/// telemetry write failure must never take down the advisor loop (§4.1, §7).
pub async fn flush_to_db(pool: &crate::db::DbPool, samples: &[QueryStat]) -> Result<usize> {
    if samples.is_empty() {
        return Ok(0);
    }
    let client = pool.get().await?;
    let mut written = 0usize;
    for s in samples {
        let query_type = match s.query_type {
            crate::types::QueryType::Read => "READ",
            crate::types::QueryType::Write => "WRITE",
        };
        let result = client
            .execute(
                "INSERT INTO query_stats (tenant_id, table_name, field_name, query_type, duration_ms, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[&s.tenant_id, &s.table, &s.field, &query_type, &s.duration_ms, &s.created_at],
            )
            .await;
        match result {
            Ok(_) => written += 1,
            Err(e) => {
                tracing::warn!(error = %e, "telemetry flush failed for one sample; continuing batch");
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryType;
    use chrono::Utc;

    fn sample(table: &str) -> QueryStat {
        QueryStat {
            tenant_id: None,
            table: table.to_string(),
            field: Some("email".to_string()),
            query_type: QueryType::Read,
            duration_ms: 12.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn records_and_drains_atomically() {
        let buf = TelemetryBuffer::new();
        buf.record(sample("contacts"));
        buf.record(sample("contacts"));
        assert_eq!(buf.len(), 2);
        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn drops_and_counts_when_disabled() {
        let buf = TelemetryBuffer::new();
        buf.set_enabled(false);
        buf.record(sample("contacts"));
        assert_eq!(buf.dropped_count(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn snapshot_does_not_drain() {
        let buf = TelemetryBuffer::new();
        buf.record(sample("contacts"));
        let snapshot = buf.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn drops_oldest_when_over_capacity() {
        let buf = TelemetryBuffer::with_capacity(2);
        buf.record(sample("a"));
        buf.record(sample("b"));
        buf.record(sample("c"));
        assert_eq!(buf.dropped_count(), 1);
        let drained = buf.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].table, "b");
        assert_eq!(drained[1].table, "c");
    }

    #[test]
    fn every_recorded_or_dropped_sample_is_accounted_for() {
        let buf = TelemetryBuffer::with_capacity(5);
        for i in 0..20 {
            buf.record(sample(&format!("t{i}")));
        }
        let remaining = buf.len() as u64;
        assert_eq!(buf.recorded_count(), remaining + buf.dropped_count());
    }
}
