//! Error types for the relindex runtime.
//!
//! All relindex crates funnel fallible operations through [`RuntimeError`].
//! Error kinds fall into four classes, mirrored by [`RuntimeError::class`]:
//!
//! ```text
//! RuntimeError
//! ├── Transient    - timeout, connection, lock, deadlock, temporary resource shortage
//! ├── Validation   - bad identifier, unknown field, constraint violation, blacklisted query
//! ├── Refusal      - safety-gate refusal: maintenance window, rate limit, CPU throttle
//! └── Fatal        - corrupted catalog state, unusable config, repeated scorer panics
//! ```
//!
//! Components return a structured reason alongside the error rather than a bare
//! message, so callers (and the audit log) can branch on machine-readable detail.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

/// Result type alias for relindex operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Coarse-grained error class used for retry policy and audit severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient infrastructure failure; safe to retry per backoff policy.
    Transient,
    /// Validation or policy violation; never retried, surfaced immediately.
    Validation,
    /// Safety-gate refusal; advisory, caller chooses wait-or-defer.
    Refusal,
    /// Fatal; subsystem should be disabled via runtime switch.
    Fatal,
}

/// Unified error type for the relindex runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A query was blocked by the interceptor before execution.
    #[error("query blocked: {reason}")]
    QueryBlocked {
        /// Machine-readable block reason (e.g. `QUERY_COST_TOO_HIGH`).
        reason: String,
        /// Structured details (cost, node type, table, etc.) as JSON.
        details: serde_json::Value,
    },

    /// A schema-evolution or candidate-generation preflight check failed.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable description of the violated rule.
        message: String,
        /// Accumulated list of individual validation failures, if any.
        errors: Vec<String>,
    },

    /// A storage budget (per-tenant or global) would be exceeded.
    #[error("storage budget exceeded ({budget_type}): {current:.1}MB + estimate > {limit:.1}MB")]
    StorageBudgetExceeded {
        /// Which budget was exceeded: `"per_tenant"` or `"total"`.
        budget_type: String,
        /// Current usage in megabytes.
        current: f64,
        /// Configured limit in megabytes.
        limit: f64,
    },

    /// A feature or subsystem is administratively disabled.
    #[error("operation disabled: {reason}")]
    OperationDisabled {
        /// Why the operation is disabled (flag name, bypass switch, etc.).
        reason: String,
    },

    /// Safety gate refused admission; caller may retry after `retry_after`.
    #[error("admission refused: {reason}")]
    AdmissionRefused {
        /// Machine-readable refusal reason.
        reason: String,
        /// Suggested wait before retrying, if bounded.
        retry_after: Option<Duration>,
        /// Structured details for audit logging.
        details: serde_json::Value,
    },

    /// Transient infrastructure failure (timeout, connection, lock, deadlock).
    #[error("transient failure: {message}")]
    Transient {
        /// Error message from the underlying operation.
        message: String,
    },

    /// Database operation error that does not match a known transient pattern.
    #[error("database error: {message}")]
    Database {
        /// Error message from the database driver.
        message: String,
        /// SQL state code if available.
        sql_state: Option<String>,
    },

    /// Connection pool exhausted or unavailable.
    #[error("connection pool error: {message}")]
    ConnectionPool {
        /// Error message.
        message: String,
    },

    /// Configuration is invalid or missing required keys.
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// Fatal internal error; the affected subsystem should be disabled.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional source error for debugging.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RuntimeError {
    /// Classify the error for retry/audit policy.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Transient { .. } | Self::ConnectionPool { .. } | Self::Database { .. } => {
                ErrorClass::Transient
            }
            Self::QueryBlocked { .. } | Self::Validation { .. } | Self::StorageBudgetExceeded { .. } => {
                ErrorClass::Validation
            }
            Self::OperationDisabled { .. } | Self::AdmissionRefused { .. } => ErrorClass::Refusal,
            Self::Configuration { .. } | Self::Internal { .. } => ErrorClass::Fatal,
        }
    }

    /// Whether this error should be retried by the mutation executor's backoff loop.
    ///
    /// An error is retryable if its class is transient, OR its message matches
    /// one of the known transient substrings (`timeout`, `connection`, `lock`,
    /// `deadlock`, `temporary`, `resource`), DDL failures surface as opaque
    /// database errors whose text is the only signal available.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if self.class() == ErrorClass::Transient {
            return true;
        }
        const TRANSIENT_SUBSTRINGS: [&str; 6] =
            ["timeout", "connection", "lock", "deadlock", "temporary", "resource"];
        let text = self.to_string().to_lowercase();
        TRANSIENT_SUBSTRINGS.iter().any(|s| text.contains(s))
    }

    /// Create a query-blocked error.
    #[must_use]
    pub fn query_blocked(reason: impl Into<String>, details: serde_json::Value) -> Self {
        Self::QueryBlocked { reason: reason.into(), details }
    }

    /// Create a validation error with no sub-errors.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), errors: Vec::new() }
    }

    /// Create a validation error carrying the full list of violated rules.
    #[must_use]
    pub fn validation_with(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self::Validation { message: message.into(), errors }
    }

    /// Create a storage-budget-exceeded error.
    #[must_use]
    pub fn storage_budget_exceeded(
        budget_type: impl Into<String>,
        current: f64,
        limit: f64,
    ) -> Self {
        Self::StorageBudgetExceeded { budget_type: budget_type.into(), current, limit }
    }

    /// Create an operation-disabled error.
    #[must_use]
    pub fn operation_disabled(reason: impl Into<String>) -> Self {
        Self::OperationDisabled { reason: reason.into() }
    }

    /// Create an admission-refused error.
    #[must_use]
    pub fn admission_refused(
        reason: impl Into<String>,
        retry_after: Option<Duration>,
        details: serde_json::Value,
    ) -> Self {
        Self::AdmissionRefused { reason: reason.into(), retry_after, details }
    }

    /// Create a database error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into(), sql_state: None }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error with no source.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal { message: format!("I/O error: {e}"), source: Some(Box::new(e)) }
    }
}

impl From<serde_json::Error> for RuntimeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal { message: format!("serialization error: {e}"), source: Some(Box::new(e)) }
    }
}

impl From<std::env::VarError> for RuntimeError {
    fn from(e: std::env::VarError) -> Self {
        Self::Configuration { message: format!("environment variable error: {e}") }
    }
}

/// Extension trait for adding context to a fallible operation.
pub trait ErrorContext<T> {
    /// Prepend a static context message to the error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Prepend a lazily computed context message to the error.
    fn with_context<F, M>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> M,
        M: Into<String>;
}

impl<T, E: Into<RuntimeError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            RuntimeError::Internal { message: format!("{}: {inner}", message.into()), source: None }
        })
    }

    fn with_context<F, M>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> M,
        M: Into<String>,
    {
        self.map_err(|e| {
            let inner = e.into();
            RuntimeError::Internal { message: format!("{}: {inner}", f().into()), source: None }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        let err = RuntimeError::database("connection refused");
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn classifies_validation_errors_as_non_retryable() {
        let err = RuntimeError::validation("bad identifier");
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn detects_transient_substrings_in_opaque_messages() {
        let err = RuntimeError::internal("operation failed: deadlock detected");
        assert!(err.is_retryable());
        let err = RuntimeError::internal("operation failed: syntax error");
        assert!(!err.is_retryable());
    }

    #[test]
    fn query_blocked_carries_reason_and_details() {
        let err = RuntimeError::query_blocked(
            "QUERY_COST_TOO_HIGH",
            serde_json::json!({"total_cost": 50000.0}),
        );
        assert!(err.to_string().contains("QUERY_COST_TOO_HIGH"));
    }

    #[test]
    fn context_prepends_message() {
        fn may_fail() -> std::result::Result<(), std::io::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
        }
        let err = may_fail().context("loading config").unwrap_err();
        assert!(err.to_string().contains("loading config"));
    }
}
