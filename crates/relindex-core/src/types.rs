//! Data model entities (§3).
//!
//! Relational storage is the authoritative copy; in-memory structures (caches,
//! buffers) exist purely for performance and are reconstructible from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The schema registry: `(table, field)` unique, describes every indexable column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenomeField {
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: String,
    /// `field_type`.
    pub field_type: String,
    /// `required`.
    pub required: bool,
    /// `indexable`.
    pub indexable: bool,
    /// `default_enabled`.
    pub default_enabled: bool,
    /// `feature_group`.
    pub feature_group: Option<String>,
}

/// Per-tenant activation of a field. Key: `(tenant, table, field)` unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpressionProfile {
    /// `tenant_id`.
    pub tenant_id: i64,
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: String,
    /// `enabled`.
    pub enabled: bool,
}

/// Telemetry sample class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    /// `Read`.
    Read,
    /// `Write`.
    Write,
}

/// A single telemetry sample, written append-only by the buffer flush.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryStat {
    /// `tenant_id`.
    pub tenant_id: Option<i64>,
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: Option<String>,
    /// `query_type`.
    pub query_type: QueryType,
    /// `duration_ms`.
    pub duration_ms: f64,
    /// `created_at`.
    pub created_at: DateTime<Utc>,
}

/// Mutation severity, used by the audit trail and by fatal-error escalation (§7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// `Info`.
    Info,
    /// `Warning`.
    Warning,
    /// `Error`.
    Error,
    /// `Critical`.
    Critical,
}

/// Audit taxonomy (§6). Every state-changing action maps to exactly one kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MutationKind {
    /// `CreateTable`.
    CreateTable,
    /// `DropTable`.
    DropTable,
    /// `AlterTable`.
    AlterTable,
    /// `AddColumn`.
    AddColumn,
    /// `DropColumn`.
    DropColumn,
    /// `AlterColumn`.
    AlterColumn,
    /// `RenameColumn`.
    RenameColumn,
    /// `CreateIndex`.
    CreateIndex,
    /// `DropIndex`.
    DropIndex,
    /// `Reindex`.
    Reindex,
    /// `EnableField`.
    EnableField,
    /// `DisableField`.
    DisableField,
    /// `InitializeTenant`.
    InitializeTenant,
    /// `SystemEnable`.
    SystemEnable,
    /// `SystemDisable`.
    SystemDisable,
    /// `SystemConfigChange`.
    SystemConfigChange,
    /// `RateLimitExceeded`.
    RateLimitExceeded,
    /// `QueryBlocked`.
    QueryBlocked,
    /// `SecurityViolation`.
    SecurityViolation,
    /// `AuthenticationFailure`.
    AuthenticationFailure,
    /// `AuthorizationDenied`.
    AuthorizationDenied,
    /// `CriticalError`.
    CriticalError,
    /// `IndexCreationFailed`.
    IndexCreationFailed,
    /// `ConnectionError`.
    ConnectionError,
    /// `BulkUpdate`.
    BulkUpdate,
    /// `DataMigration`.
    DataMigration,
}

impl MutationKind {
    /// Stable string form used in `mutation_log.mutation_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "CREATE_TABLE",
            Self::DropTable => "DROP_TABLE",
            Self::AlterTable => "ALTER_TABLE",
            Self::AddColumn => "ADD_COLUMN",
            Self::DropColumn => "DROP_COLUMN",
            Self::AlterColumn => "ALTER_COLUMN",
            Self::RenameColumn => "RENAME_COLUMN",
            Self::CreateIndex => "CREATE_INDEX",
            Self::DropIndex => "DROP_INDEX",
            Self::Reindex => "REINDEX",
            Self::EnableField => "ENABLE_FIELD",
            Self::DisableField => "DISABLE_FIELD",
            Self::InitializeTenant => "INITIALIZE_TENANT",
            Self::SystemEnable => "SYSTEM_ENABLE",
            Self::SystemDisable => "SYSTEM_DISABLE",
            Self::SystemConfigChange => "SYSTEM_CONFIG_CHANGE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::QueryBlocked => "QUERY_BLOCKED",
            Self::SecurityViolation => "SECURITY_VIOLATION",
            Self::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            Self::AuthorizationDenied => "AUTHORIZATION_DENIED",
            Self::CriticalError => "CRITICAL_ERROR",
            Self::IndexCreationFailed => "INDEX_CREATION_FAILED",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::BulkUpdate => "BULK_UPDATE",
            Self::DataMigration => "DATA_MIGRATION",
        }
    }
}

/// Append-only audit record of every state-changing action (§3, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationLogEntry {
    /// `tenant_id`.
    pub tenant_id: Option<i64>,
    /// `kind`.
    pub kind: MutationKind,
    /// `table`.
    pub table: Option<String>,
    /// `field`.
    pub field: Option<String>,
    /// `details`.
    pub details: JsonValue,
    /// `created_at`.
    pub created_at: DateTime<Utc>,
    /// `severity`.
    pub severity: Severity,
}

impl MutationLogEntry {
    #[must_use]
    /// `new`.
    pub fn new(kind: MutationKind, severity: Severity) -> Self {
        Self {
            tenant_id: None,
            kind,
            table: None,
            field: None,
            details: JsonValue::Object(serde_json::Map::new()),
            created_at: Utc::now(),
            severity,
        }
    }

    #[must_use]
    /// `with_table`.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    /// `with_field`.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    #[must_use]
    /// `with_tenant`.
    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    #[must_use]
    /// `with_details`.
    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }
}

/// Durable history of a managed index's DDL; owned by the mutation executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexVersion {
    /// `index_name`.
    pub index_name: String,
    /// `table`.
    pub table: String,
    /// `definition`.
    pub definition: String,
    /// `created_by`.
    pub created_by: String,
    /// `metadata`.
    pub metadata: JsonValue,
    /// `created_at`.
    pub created_at: DateTime<Utc>,
}

/// An A/B experiment definition. Traffic splits between two variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABExperiment {
    /// `name`.
    pub name: String,
    /// `variant_a`.
    pub variant_a: String,
    /// `variant_b`.
    pub variant_b: String,
    /// `traffic_split`.
    pub traffic_split: f64,
}

/// A single result row for an [`ABExperiment`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Variant {
    /// `A`.
    A,
    /// `B`.
    B,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// `ABResult`.
pub struct ABResult {
    /// `experiment`.
    pub experiment: String,
    /// `variant`.
    pub variant: Variant,
    /// `duration_ms`.
    pub duration_ms: f64,
    /// `created_at`.
    pub created_at: DateTime<Utc>,
}

/// An index type, used as a build-cost multiplier per §4.3.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexType {
    /// `Partial`.
    Partial,
    /// `Expression`.
    Expression,
    /// `Standard`.
    Standard,
    /// `MultiColumn`.
    MultiColumn,
}

impl IndexType {
    /// Build-cost factor `k₁` ordering: partial < expression < standard < multi-column.
    #[must_use]
    pub const fn build_cost_factor(self) -> f64 {
        match self {
            Self::Partial => 0.5,
            Self::Expression => 0.8,
            Self::Standard => 1.0,
            Self::MultiColumn => 1.4,
        }
    }
}

/// A `(table, field, query_type)` tuple proposed for indexing, with aggregated stats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: Option<String>,
    /// `query_type`.
    pub query_type: QueryType,
    /// `count`.
    pub count: u64,
    /// `avg_ms`.
    pub avg_ms: f64,
    /// `p95_ms`.
    pub p95_ms: f64,
    /// `p99_ms`.
    pub p99_ms: f64,
    /// `tenant_count`.
    pub tenant_count: u64,
}
