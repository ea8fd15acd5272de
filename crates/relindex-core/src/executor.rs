//! Mutation executor (§4.6).
//!
//! Executes DDL with retry, versioning, audit, and cache invalidation. The
//! retry policy and at-most-once-concurrent-per-target guarantee are the two
//! load-bearing invariants here; everything else is plumbing around them.

use crate::audit::AuditBackend;
use crate::types::{IndexType, IndexVersion, MutationKind, MutationLogEntry, Severity};
use relindex_error::{Result, RuntimeError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

const RETRYABLE_SUBSTRINGS: [&str; 6] = ["timeout", "connection", "lock", "deadlock", "temporary", "resource"];

/// Exponential backoff with a cap, matching the documented retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// `max_retries`.
    pub max_retries: u32,
    /// `initial_delay`.
    pub initial_delay: Duration,
    /// `backoff_multiplier`.
    pub backoff_multiplier: f64,
    /// `max_delay`.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `delay = initial_delay · backoff_multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    #[must_use]
    /// `max_attempts`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Whether an error's message matches one of the documented retryable
/// substrings. Mirrors [`relindex_error::RuntimeError::is_retryable`] but
/// operates on a raw message so it also covers driver-level errors that
/// never got wrapped into a `RuntimeError`.
#[must_use]
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

#[derive(Debug, Clone)]
/// `AttemptRecord`.
pub struct AttemptRecord {
    /// `attempt`.
    pub attempt: u32,
    /// `error`.
    pub error: Option<String>,
    /// `delay_before`.
    pub delay_before: Duration,
}

#[derive(Debug, Clone)]
/// `ExecutionOutcome`.
pub struct ExecutionOutcome {
    /// `success`.
    pub success: bool,
    /// `retries`.
    pub retries: u32,
    /// `attempts`.
    pub attempts: Vec<AttemptRecord>,
    /// `error`.
    pub error: Option<String>,
    /// `non_retryable`.
    pub non_retryable: bool,
}

/// A DDL statement to run plus its pre-generated rollback.
#[derive(Debug, Clone)]
pub struct DdlChange {
    /// `table`.
    pub table: String,
    /// `fields`.
    pub fields: Vec<String>,
    /// `index_type`.
    pub index_type: IndexType,
    /// `index_name`.
    pub index_name: String,
    /// `create_sql`.
    pub create_sql: String,
    /// `rollback_sql`.
    pub rollback_sql: String,
}

impl DdlChange {
    /// Build a `CREATE INDEX ... IF NOT EXISTS` statement and its paired
    /// `DROP INDEX IF EXISTS` rollback, idempotent with respect to name.
    #[must_use]
    pub fn create_index(table: &str, fields: &[String], index_type: IndexType, name: Option<&str>) -> Self {
        let index_name = name.map_or_else(|| format!("idx_{table}_{}", fields.join("_")), ToString::to_string);
        let columns = fields.join(", ");
        let create_sql = format!("CREATE INDEX CONCURRENTLY IF NOT EXISTS \"{index_name}\" ON \"{table}\" ({columns})");
        let rollback_sql = format!("DROP INDEX IF EXISTS \"{index_name}\"");
        Self { table: table.to_string(), fields: fields.to_vec(), index_type, index_name, create_sql, rollback_sql }
    }
}

/// Enforces at-most-one concurrent DDL per `(table, field-set, index_type)`.
#[derive(Default)]
pub struct DdlKeyLock {
    locks: StdMutex<HashMap<String, std::sync::Arc<AsyncMutex<()>>>>,
}

impl DdlKeyLock {
    #[must_use]
    /// `new`.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(change: &DdlChange) -> String {
        let mut fields = change.fields.clone();
        fields.sort();
        format!("{}|{}|{:?}", change.table, fields.join(","), change.index_type)
    }

    async fn acquire(&self, change: &DdlChange) -> tokio::sync::OwnedMutexGuard<()> {
        let key = Self::key_for(change);
        let entry = {
            let mut guard = match self.locks.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            entry_or_insert(&mut guard, key)
        };
        entry.lock_owned().await
    }
}

fn entry_or_insert(
    map: &mut HashMap<String, std::sync::Arc<AsyncMutex<()>>>,
    key: String,
) -> std::sync::Arc<AsyncMutex<()>> {
    map.entry(key).or_insert_with(|| std::sync::Arc::new(AsyncMutex::new(()))).clone()
}

/// Executes DDL against the database, retrying retryable failures with
/// exponential backoff and serializing concurrent attempts on the same
/// `(table, field-set, index_type)` key.
pub struct MutationExecutor<A: AuditBackend> {
    pool: crate::db::DbPool,
    audit: A,
    locks: DdlKeyLock,
    retry_policy: RetryPolicy,
}

impl<A: AuditBackend> MutationExecutor<A> {
    /// `new`.
    pub fn new(pool: crate::db::DbPool, audit: A, retry_policy: RetryPolicy) -> Self {
        Self { pool, audit, locks: DdlKeyLock::new(), retry_policy }
    }

    /// Run `change.create_sql`, retrying on transient failure, logging a
    /// single audit entry either way.
    pub async fn create_index(&self, change: &DdlChange, details: serde_json::Value) -> Result<ExecutionOutcome> {
        let _guard = self.locks.acquire(change).await;

        let mut attempts = Vec::new();
        let mut last_error: Option<String> = None;

        for attempt in 0..self.retry_policy.max_attempts() {
            if attempt > 0 {
                let delay = self.retry_policy.delay_for_attempt(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let client = self.pool.get().await?;
            match client.execute(change.create_sql.as_str(), &[]).await {
                Ok(_) => {
                    attempts.push(AttemptRecord { attempt, error: None, delay_before: Duration::ZERO });
                    let outcome = ExecutionOutcome { success: true, retries: attempt, attempts, error: None, non_retryable: false };
                    self.log_success(change, &outcome, details).await?;
                    return Ok(outcome);
                }
                Err(e) => {
                    let message = e.to_string();
                    let retryable = is_retryable_message(&message);
                    attempts.push(AttemptRecord {
                        attempt,
                        error: Some(message.clone()),
                        delay_before: self.retry_policy.delay_for_attempt(attempt),
                    });
                    last_error = Some(message);
                    if !retryable {
                        let outcome = ExecutionOutcome {
                            success: false,
                            retries: attempt,
                            attempts,
                            error: last_error,
                            non_retryable: true,
                        };
                        self.log_failure(change, &outcome).await?;
                        return Ok(outcome);
                    }
                }
            }
        }

        let outcome = ExecutionOutcome {
            success: false,
            retries: self.retry_policy.max_retries,
            attempts,
            error: last_error,
            non_retryable: false,
        };
        self.log_failure(change, &outcome).await?;
        Ok(outcome)
    }

    async fn log_success(&self, change: &DdlChange, outcome: &ExecutionOutcome, mut details: serde_json::Value) -> Result<()> {
        if let Some(obj) = details.as_object_mut() {
            obj.insert("rollback_sql".to_string(), json!(change.rollback_sql));
            obj.insert("retries".to_string(), json!(outcome.retries));
        }
        let entry = MutationLogEntry::new(MutationKind::CreateIndex, Severity::Info)
            .with_table(change.table.clone())
            .with_details(details);
        self.audit.log(entry).await?;

        let version = IndexVersion {
            index_name: change.index_name.clone(),
            table: change.table.clone(),
            definition: change.create_sql.clone(),
            created_by: "relindex-executor".to_string(),
            metadata: json!({ "fields": change.fields, "index_type": format!("{:?}", change.index_type) }),
            created_at: chrono::Utc::now(),
        };
        self.persist_index_version(&version).await
    }

    async fn log_failure(&self, change: &DdlChange, outcome: &ExecutionOutcome) -> Result<()> {
        let entry = MutationLogEntry::new(MutationKind::IndexCreationFailed, Severity::Error)
            .with_table(change.table.clone())
            .with_details(json!({
                "error": outcome.error,
                "retries": outcome.retries,
                "non_retryable": outcome.non_retryable,
            }));
        self.audit.log(entry).await
    }

    async fn persist_index_version(&self, version: &IndexVersion) -> Result<()> {
        let client = self.pool.get().await.map_err(|e| {
            RuntimeError::internal(format!("failed to persist index version: {e}"))
        })?;
        client
            .execute(
                "INSERT INTO index_version (index_name, table_name, definition, created_by, metadata, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[&version.index_name, &version.table, &version.definition, &version.created_by, &version.metadata, &version.created_at],
            )
            .await
            .map_err(|e| crate::db::classify_pg_error(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_substrings_are_case_insensitive() {
        assert!(is_retryable_message("Connection reset by peer"));
        assert!(is_retryable_message("DEADLOCK DETECTED"));
        assert!(!is_retryable_message("syntax error near CREATE"));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500)); // capped
    }

    #[test]
    fn max_attempts_is_retries_plus_one() {
        let policy = RetryPolicy { max_retries: 3, ..RetryPolicy::default() };
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn create_index_is_idempotent_via_if_not_exists() {
        let change = DdlChange::create_index("contacts", &["email".to_string()], IndexType::Standard, None);
        assert!(change.create_sql.contains("IF NOT EXISTS"));
        assert!(change.rollback_sql.starts_with("DROP INDEX IF EXISTS"));
    }

    #[test]
    fn ddl_key_lock_keys_are_stable_regardless_of_field_order() {
        let a = DdlChange::create_index("t", &["a".to_string(), "b".to_string()], IndexType::Standard, None);
        let b = DdlChange::create_index("t", &["b".to_string(), "a".to_string()], IndexType::Standard, None);
        assert_eq!(DdlKeyLock::key_for(&a), DdlKeyLock::key_for(&b));
    }
}
