//! PostgreSQL connection pooling.
//!
//! All components acquire connections from a single bounded pool and release
//! them on every exit path, including error (§5 "Shared resources").

use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use relindex_error::{Result, RuntimeError};
use tokio_postgres::NoTls;

/// A bounded PostgreSQL connection pool.
#[derive(Clone)]
pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    /// Create a pool with the given bounds, testing connectivity before returning.
    pub async fn connect(connection_string: &str, max_size: usize) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(connection_string.to_string());
        cfg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(max_size.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| RuntimeError::ConnectionPool { message: format!("failed to create pool: {e}") })?;

        let client = pool
            .get()
            .await
            .map_err(|e| RuntimeError::ConnectionPool { message: format!("failed to acquire connection: {e}") })?;

        client
            .query("SELECT 1", &[])
            .await
            .map_err(|e| RuntimeError::database(format!("failed to connect to database: {e}")))?;

        Ok(Self { pool })
    }

    /// Acquire a client from the pool.
    pub async fn get(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| RuntimeError::ConnectionPool { message: format!("pool exhausted: {e}") })
    }

    /// Current pool metrics (in-use, available, max size) for observability.
    #[must_use]
    pub fn status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

/// Map a raw `tokio_postgres::Error` to a [`RuntimeError`], classifying it so
/// the mutation executor's retry policy (§4.6) can act on it.
#[must_use]
pub fn classify_pg_error(e: &tokio_postgres::Error) -> RuntimeError {
    let sql_state = e.code().map(|c| c.code().to_string());
    RuntimeError::Database { message: e.to_string(), sql_state }
}

/// Approximate row count from planner statistics rather than a full scan
/// (`pg_class.reltuples`) -- the candidate generator and cost/benefit
/// heuristic only need an order-of-magnitude figure.
pub async fn table_row_estimate(pool: &DbPool, table: &str) -> Result<u64> {
    let client = pool.get().await?;
    let row = client
        .query_one("SELECT GREATEST(reltuples, 0)::bigint FROM pg_class WHERE relname = $1", &[&table])
        .await
        .map_err(|e| classify_pg_error(&e))?;
    let estimate: i64 = row.get(0);
    Ok(estimate.max(0) as u64)
}

/// Columns already indexed on `table`, used both to exclude covered
/// candidates (§4.2) and to count the table's current index load for the
/// write-performance ceiling (§4.5).
pub async fn existing_indexed_columns(pool: &DbPool, table: &str) -> Result<Vec<String>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT DISTINCT a.attname \
             FROM pg_index i \
             JOIN pg_class t ON t.oid = i.indrelid \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(i.indkey) \
             WHERE t.relname = $1",
            &[&table],
        )
        .await
        .map_err(|e| classify_pg_error(&e))?;
    Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
}

/// Total index storage across the database in megabytes, feeding the
/// constraint optimizer's and safety gate's storage checks (§4.4, §4.5).
pub async fn total_index_storage_mb(pool: &DbPool) -> Result<f64> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT COALESCE(SUM(pg_relation_size(indexname::regclass)), 0) / (1024.0 * 1024.0) \
             FROM pg_indexes WHERE schemaname NOT IN ('pg_catalog', 'information_schema')",
            &[],
        )
        .await
        .map_err(|e| classify_pg_error(&e))?;
    Ok(row.get(0))
}
