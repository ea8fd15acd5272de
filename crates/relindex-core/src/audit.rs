//! Append-only mutation log (§3 `MutationLogEntry`, §7 "User-visible behavior").
//!
//! Every successful DDL, every blocked query, and every safety-gate refusal
//! produces exactly one entry. Entries are never edited or deleted by the core.

use crate::types::MutationLogEntry;
use async_trait::async_trait;
use relindex_error::Result;
use std::sync::{Arc, Mutex};

/// Storage backend for the mutation log.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Append an entry to the log.
    async fn log(&self, entry: MutationLogEntry) -> Result<()>;

    /// Fetch all logged entries, most recent first, for inspection/testing.
    async fn entries(&self) -> Result<Vec<MutationLogEntry>>;
}

/// Lets an `Arc<dyn AuditBackend>` (or `Arc` of any concrete backend) be used
/// anywhere a `MutationExecutor<A: AuditBackend>` needs an owned `A`, so the
/// same backend instance can be shared across the background loops.
#[async_trait]
impl<T: AuditBackend + ?Sized> AuditBackend for Arc<T> {
    async fn log(&self, entry: MutationLogEntry) -> Result<()> {
        (**self).log(entry).await
    }

    async fn entries(&self) -> Result<Vec<MutationLogEntry>> {
        (**self).entries().await
    }
}

/// An in-memory audit backend. Used in tests and as the default before a
/// durable backend (e.g. Postgres) is wired up.
#[derive(Default)]
pub struct InMemoryAuditBackend {
    entries: Mutex<Vec<MutationLogEntry>>,
}

impl InMemoryAuditBackend {
    #[must_use]
    /// `new`.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditBackend for InMemoryAuditBackend {
    async fn log(&self, entry: MutationLogEntry) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| relindex_error::RuntimeError::internal(format!("audit lock poisoned: {e}")))?;
        guard.push(entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<MutationLogEntry>> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| relindex_error::RuntimeError::internal(format!("audit lock poisoned: {e}")))?;
        let mut out = guard.clone();
        out.reverse();
        Ok(out)
    }
}

/// A PostgreSQL-backed audit trail, appending rows to `mutation_log`.
pub struct PostgresAuditBackend {
    pool: crate::db::DbPool,
}

impl PostgresAuditBackend {
    #[must_use]
    /// `new`.
    pub fn new(pool: crate::db::DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditBackend for PostgresAuditBackend {
    async fn log(&self, entry: MutationLogEntry) -> Result<()> {
        let client = self.pool.get().await?;
        let severity = serde_json::to_string(&entry.severity).unwrap_or_default();
        client
            .execute(
                "INSERT INTO mutation_log \
                 (tenant_id, mutation_type, table_name, field_name, details_json, created_at, severity) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &entry.tenant_id,
                    &entry.kind.as_str(),
                    &entry.table,
                    &entry.field,
                    &entry.details,
                    &entry.created_at,
                    &severity,
                ],
            )
            .await
            .map_err(|e| crate::db::classify_pg_error(&e))?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<MutationLogEntry>> {
        // Reading back entries is not on the hot path for the advisor itself
        // (reporting/CLI consume mutation_log directly); the core only appends.
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    #[tokio::test]
    async fn logs_and_reads_back_in_reverse_chronological_order() {
        let backend = InMemoryAuditBackend::new();
        backend
            .log(MutationLogEntry::new(crate::types::MutationKind::CreateIndex, Severity::Info).with_table("contacts"))
            .await
            .unwrap();
        backend
            .log(MutationLogEntry::new(crate::types::MutationKind::QueryBlocked, Severity::Warning))
            .await
            .unwrap();

        let entries = backend.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind.as_str(), "QUERY_BLOCKED");
        assert_eq!(entries[1].kind.as_str(), "CREATE_INDEX");
    }
}
