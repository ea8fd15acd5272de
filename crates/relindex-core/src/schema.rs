//! Schema evolution (§4.8).
//!
//! Safe ADD/DROP/ALTER/RENAME of columns with pre-flight impact analysis and
//! generated rollback plans. Every DDL runs inside a transaction under the
//! same retry envelope as the mutation executor (§4.6).

use regex::Regex;
use relindex_error::{Result, RuntimeError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const IMPACT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// `ChangeKind`.
pub enum ChangeKind {
    /// `AddColumn`.
    AddColumn,
    /// `DropColumn`.
    DropColumn,
    /// `AlterColumn`.
    AlterColumn,
    /// `RenameColumn`.
    RenameColumn,
}

const ALLOWED_FIELD_TYPES: [&str; 19] = [
    "TEXT", "VARCHAR", "CHARACTER VARYING", "INTEGER", "INT", "BIGINT", "SMALLINT", "NUMERIC", "DECIMAL", "REAL",
    "DOUBLE PRECISION", "BOOLEAN", "DATE", "TIMESTAMP", "TIMESTAMP WITH TIME ZONE", "JSON", "JSONB", "SERIAL",
    "BIGSERIAL",
];
const PREFIX_MATCH_TYPES: [&str; 4] = ["VARCHAR", "CHARACTER", "NUMERIC", "DECIMAL"];

/// A safe SQL identifier: letters, digits, underscores, not starting with a digit.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));
    pattern.is_match(name) && name.len() <= 63
}

#[must_use]
/// `is_allowed_field_type`.
pub fn is_allowed_field_type(field_type: &str) -> bool {
    let upper = field_type.to_uppercase();
    ALLOWED_FIELD_TYPES.contains(&upper.as_str()) || PREFIX_MATCH_TYPES.iter().any(|p| upper.starts_with(p))
}

#[derive(Debug, Clone, Serialize)]
/// `AffectedQueries`.
pub struct AffectedQueries {
    /// `count`.
    pub count: u64,
    /// `distinct_tenants`.
    pub distinct_tenants: u64,
    /// `avg_duration_ms`.
    pub avg_duration_ms: f64,
    /// `p95_duration_ms`.
    pub p95_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
/// `AffectedIndex`.
pub struct AffectedIndex {
    /// `name`.
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
/// `ImpactAnalysis`.
pub struct ImpactAnalysis {
    /// `table`.
    pub table: String,
    /// `field`.
    pub field: String,
    /// `change_kind_label`.
    pub change_kind_label: &'static str,
    /// `affected_queries`.
    pub affected_queries: AffectedQueries,
    /// `affected_indexes`.
    pub affected_indexes: Vec<AffectedIndex>,
    /// `affected_expression_profiles`.
    pub affected_expression_profiles: u64,
    /// `has_fk_constraints`.
    pub has_fk_constraints: bool,
    /// `errors`.
    pub errors: Vec<String>,
    /// `warnings`.
    pub warnings: Vec<String>,
    /// `partial_results`.
    pub partial_results: bool,
}

impl ChangeKind {
    #[must_use]
    /// Documentation.
    pub const fn label(self) -> &'static str {
        match self {
            Self::AddColumn => "ADD_COLUMN",
            Self::DropColumn => "DROP_COLUMN",
            Self::AlterColumn => "ALTER_COLUMN",
            Self::RenameColumn => "RENAME_COLUMN",
        }
    }
}

/// Raw facts gathered from the catalog/stats tables, handed in by the caller
/// so this module stays free of direct SQL (the DB-facing variant below
/// assembles this from `query_stats`/`pg_indexes`/`information_schema`).
#[derive(Debug, Clone)]
pub struct ImpactInputs {
    /// `affected_queries`.
    pub affected_queries: AffectedQueries,
    /// `affected_indexes`.
    pub affected_indexes: Vec<AffectedIndex>,
    /// `affected_expression_profiles`.
    pub affected_expression_profiles: u64,
    /// `has_fk_constraints`.
    pub has_fk_constraints: bool,
    /// `column_exists`.
    pub column_exists: bool,
}

/// Build the impact analysis, including the error/warning derivation rules
/// (§4.8). `force` only affects whether a dependent-index error becomes a
/// non-blocking note (the caller still must pass `force=true` again at
/// execution time to actually cascade the drop).
#[must_use]
pub fn analyze_impact(table: &str, field: &str, kind: ChangeKind, inputs: &ImpactInputs, force: bool) -> ImpactAnalysis {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if kind == ChangeKind::DropColumn && !inputs.affected_indexes.is_empty() {
        if force {
            warnings.push(format!(
                "dropping {} dependent index(es) because force=true",
                inputs.affected_indexes.len()
            ));
        } else {
            errors.push(format!(
                "{} dependent index(es) reference this column; pass force=true to drop them first",
                inputs.affected_indexes.len()
            ));
        }
    }

    if kind == ChangeKind::DropColumn && inputs.has_fk_constraints {
        errors.push("column is referenced by a foreign key constraint".to_string());
    }

    if inputs.affected_queries.count > 1_000 {
        warnings.push(format!("{} affected queries in the last 7 days", inputs.affected_queries.count));
    }

    if kind == ChangeKind::AlterColumn && !inputs.affected_indexes.is_empty() {
        warnings.push(format!("{} dependent index(es) may need to be rebuilt", inputs.affected_indexes.len()));
    }
    if kind == ChangeKind::AlterColumn && inputs.has_fk_constraints {
        warnings.push("column is referenced by a foreign key constraint".to_string());
    }

    ImpactAnalysis {
        table: table.to_string(),
        field: field.to_string(),
        change_kind_label: kind.label(),
        affected_queries: inputs.affected_queries.clone(),
        affected_indexes: inputs.affected_indexes.clone(),
        affected_expression_profiles: inputs.affected_expression_profiles,
        has_fk_constraints: inputs.has_fk_constraints,
        errors,
        warnings,
        partial_results: false,
    }
}

/// 5-minute TTL cache over `(table, field, change_kind)`, matching the
/// discipline used by the interceptor's plan cache.
#[derive(Default)]
pub struct ImpactCache {
    entries: Mutex<HashMap<(String, String, &'static str), (Instant, ImpactAnalysis)>>,
}

impl ImpactCache {
    #[must_use]
    /// `new`.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    /// `get`.
    pub fn get(&self, table: &str, field: &str, kind: ChangeKind) -> Option<ImpactAnalysis> {
        let guard = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(&(table.to_string(), field.to_string(), kind.label())).and_then(|(inserted, analysis)| {
            (inserted.elapsed() < IMPACT_CACHE_TTL).then(|| analysis.clone())
        })
    }

    /// `put`.
    pub fn put(&self, table: &str, field: &str, kind: ChangeKind, analysis: ImpactAnalysis) {
        let mut guard = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert((table.to_string(), field.to_string(), kind.label()), (Instant::now(), analysis));
    }

    /// Clear a specific `(table, field)` pair, or everything when both are `None`.
    pub fn invalidate(&self, table: Option<&str>, field: Option<&str>) {
        let mut guard = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match (table, field) {
            (None, None) => guard.clear(),
            (Some(t), None) => guard.retain(|(ct, _, _), _| ct != t),
            (Some(t), Some(f)) => guard.retain(|(ct, cf, _), _| !(ct == t && cf == f)),
            (None, Some(_)) => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// `ValidationResult`.
pub struct ValidationResult {
    /// `is_valid`.
    pub is_valid: bool,
    /// `errors`.
    pub errors: Vec<String>,
    /// `validated_table`.
    pub validated_table: Option<String>,
}

/// Validate a proposed change before impact analysis runs (§4.8 "Validation").
#[must_use]
pub fn validate_schema_change(
    table: &str,
    kind: ChangeKind,
    field: &str,
    field_type: Option<&str>,
    table_exists: bool,
    column_exists: bool,
) -> ValidationResult {
    let mut errors = Vec::new();

    if !is_valid_identifier(table) {
        errors.push(format!("invalid table name: {table}"));
    }
    if kind != ChangeKind::RenameColumn && !is_valid_identifier(field) && !field.is_empty() {
        errors.push(format!("invalid field name: {field}"));
    }
    if !table_exists {
        errors.push(format!("table does not exist: {table}"));
    }

    if kind == ChangeKind::AddColumn {
        if column_exists {
            errors.push(format!("column already exists: {table}.{field}"));
        }
        if let Some(ft) = field_type {
            if !is_allowed_field_type(ft) {
                errors.push(format!("field type not allowed: {ft}"));
            }
        } else {
            errors.push("field_type is required for ADD_COLUMN".to_string());
        }
    }

    if kind == ChangeKind::AlterColumn {
        match field_type {
            Some(ft) if is_allowed_field_type(ft) => {}
            Some(ft) => errors.push(format!("field type not allowed: {ft}")),
            None => errors.push("field_type is required for ALTER_COLUMN".to_string()),
        }
    }

    let is_valid = errors.is_empty();
    ValidationResult { is_valid, errors, validated_table: is_valid.then(|| table.to_string()) }
}

#[derive(Debug, Clone, Serialize)]
/// `RollbackPlan`.
pub struct RollbackPlan {
    /// `rollback_sql`.
    pub rollback_sql: String,
    /// `caveat`.
    pub caveat: &'static str,
}

/// Generate the language-agnostic rollback SQL for a change (§4.8 table).
/// `ALTER_COLUMN`/`RENAME_COLUMN` need the prior type/name, which the caller
/// must have captured before the forward change ran.
#[must_use]
pub fn generate_rollback_plan(
    table: &str,
    kind: ChangeKind,
    field: &str,
    field_type: Option<&str>,
    old_type: Option<&str>,
    new_name: Option<&str>,
) -> RollbackPlan {
    match kind {
        ChangeKind::AddColumn => RollbackPlan {
            rollback_sql: format!("ALTER TABLE \"{table}\" DROP COLUMN IF EXISTS \"{field}\""),
            caveat: "data added to this column after the change is lost on rollback",
        },
        ChangeKind::DropColumn => {
            let ft = field_type.unwrap_or("TEXT");
            RollbackPlan {
                rollback_sql: format!("ALTER TABLE \"{table}\" ADD COLUMN \"{field}\" {ft}"),
                caveat: "column data cannot be restored; only the empty column is recreated",
            }
        }
        ChangeKind::AlterColumn => match old_type {
            Some(ot) => RollbackPlan {
                rollback_sql: format!("ALTER TABLE \"{table}\" ALTER COLUMN \"{field}\" TYPE {ot}"),
                caveat: "requires the captured prior type; values that don't round-trip may be truncated",
            },
            None => RollbackPlan {
                rollback_sql: String::new(),
                caveat: "no prior type was captured; rollback SQL cannot be generated",
            },
        },
        ChangeKind::RenameColumn => match new_name {
            Some(nn) => RollbackPlan {
                rollback_sql: format!("ALTER TABLE \"{table}\" RENAME COLUMN \"{nn}\" TO \"{field}\""),
                caveat: "symmetric; safe to apply directly",
            },
            None => RollbackPlan { rollback_sql: String::new(), caveat: "no new name was captured" },
        },
    }
}

/// Preview a change end-to-end without executing anything: validation +
/// impact analysis + rollback-plan generation.
#[derive(Debug, Clone, Serialize)]
pub struct ChangePreview {
    /// `validation`.
    pub validation: ValidationResult,
    /// `impact`.
    pub impact: Option<ImpactAnalysis>,
    /// `rollback_plan`.
    pub rollback_plan: Option<RollbackPlan>,
}

#[must_use]
/// `preview_schema_change`.
pub fn preview_schema_change(
    table: &str,
    kind: ChangeKind,
    field: &str,
    field_type: Option<&str>,
    table_exists: bool,
    inputs: &ImpactInputs,
    force: bool,
    old_type: Option<&str>,
    new_name: Option<&str>,
) -> ChangePreview {
    let validation = validate_schema_change(table, kind, field, field_type, table_exists, inputs.column_exists);
    if !validation.is_valid {
        return ChangePreview { validation, impact: None, rollback_plan: None };
    }
    let impact = analyze_impact(table, field, kind, inputs, force);
    let rollback_plan = generate_rollback_plan(table, kind, field, field_type, old_type, new_name);
    ChangePreview { validation, impact: Some(impact), rollback_plan: Some(rollback_plan) }
}

/// Drop the indexes an impact analysis flagged as dependent, returning their
/// names for the audit entry's `dropped_indexes` list.
pub async fn cascade_drop_dependent_indexes(
    pool: &crate::db::DbPool,
    affected: &[AffectedIndex],
) -> Result<Vec<String>> {
    let client = pool.get().await?;
    let mut dropped = Vec::new();
    for idx in affected {
        let sql = format!("DROP INDEX IF EXISTS \"{}\"", idx.name);
        client.execute(sql.as_str(), &[]).await.map_err(|e| crate::db::classify_pg_error(&e))?;
        dropped.push(idx.name.clone());
    }
    Ok(dropped)
}

/// Apply a validated, impact-analyzed change. Blocking errors must already
/// have been resolved by the caller (e.g. via `force` cascading the drop)
/// before this is called; this function only executes DDL and bookkeeping.
pub async fn apply_add_column(
    pool: &crate::db::DbPool,
    table: &str,
    field: &str,
    field_type: &str,
    nullable: bool,
) -> Result<()> {
    if !is_valid_identifier(table) || !is_valid_identifier(field) {
        return Err(RuntimeError::validation(format!("invalid identifier for {table}.{field}")));
    }
    if !is_allowed_field_type(field_type) {
        return Err(RuntimeError::validation(format!("field type not allowed: {field_type}")));
    }
    let null_clause = if nullable { "" } else { "NOT NULL" };
    let sql = format!("ALTER TABLE \"{table}\" ADD COLUMN \"{field}\" {field_type} {null_clause}");
    let client = pool.get().await?;
    client.execute(sql.as_str(), &[]).await.map_err(|e| crate::db::classify_pg_error(&e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_inputs() -> ImpactInputs {
        ImpactInputs {
            affected_queries: AffectedQueries { count: 10, distinct_tenants: 2, avg_duration_ms: 5.0, p95_duration_ms: 8.0 },
            affected_indexes: Vec::new(),
            affected_expression_profiles: 0,
            has_fk_constraints: false,
            column_exists: false,
        }
    }

    #[test]
    fn identifier_validation_rejects_leading_digit_and_punctuation() {
        assert!(is_valid_identifier("contacts"));
        assert!(!is_valid_identifier("1contacts"));
        assert!(!is_valid_identifier("contacts;drop"));
    }

    #[test]
    fn allowed_field_types_cover_common_postgres_types_and_prefixes() {
        assert!(is_allowed_field_type("TEXT"));
        assert!(is_allowed_field_type("varchar(255)"));
        assert!(!is_allowed_field_type("MONEY"));
    }

    #[test]
    fn drop_with_dependent_index_errors_unless_forced() {
        let mut inputs = clean_inputs();
        inputs.affected_indexes.push(AffectedIndex { name: "idx_x".to_string() });
        let blocked = analyze_impact("t", "f", ChangeKind::DropColumn, &inputs, false);
        assert!(!blocked.errors.is_empty());

        let forced = analyze_impact("t", "f", ChangeKind::DropColumn, &inputs, true);
        assert!(forced.errors.is_empty());
        assert!(!forced.warnings.is_empty());
    }

    #[test]
    fn drop_with_fk_constraint_always_errors() {
        let mut inputs = clean_inputs();
        inputs.has_fk_constraints = true;
        let result = analyze_impact("t", "f", ChangeKind::DropColumn, &inputs, true);
        assert!(result.errors.iter().any(|e| e.contains("foreign key")));
    }

    #[test]
    fn high_query_volume_warns_without_blocking() {
        let mut inputs = clean_inputs();
        inputs.affected_queries.count = 5_000;
        let result = analyze_impact("t", "f", ChangeKind::AddColumn, &inputs, false);
        assert!(result.errors.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("affected queries")));
    }

    #[test]
    fn add_column_rejects_existing_column() {
        let result = validate_schema_change("t", ChangeKind::AddColumn, "f", Some("TEXT"), true, true);
        assert!(!result.is_valid);
    }

    #[test]
    fn add_column_rejects_disallowed_type() {
        let result = validate_schema_change("t", ChangeKind::AddColumn, "f", Some("MONEY"), true, false);
        assert!(!result.is_valid);
    }

    #[test]
    fn rollback_plan_for_add_column_drops_it() {
        let plan = generate_rollback_plan("t", ChangeKind::AddColumn, "f", None, None, None);
        assert!(plan.rollback_sql.contains("DROP COLUMN IF EXISTS"));
    }

    #[test]
    fn rollback_plan_for_drop_column_recreates_with_recorded_type() {
        let plan = generate_rollback_plan("t", ChangeKind::DropColumn, "f", Some("INTEGER"), None, None);
        assert!(plan.rollback_sql.contains("ADD COLUMN"));
        assert!(plan.rollback_sql.contains("INTEGER"));
    }

    #[test]
    fn rollback_plan_for_alter_without_old_type_is_empty() {
        let plan = generate_rollback_plan("t", ChangeKind::AlterColumn, "f", None, None, None);
        assert!(plan.rollback_sql.is_empty());
    }

    #[test]
    fn impact_cache_respects_ttl_and_key_shape() {
        let cache = ImpactCache::new();
        let analysis = analyze_impact("t", "f", ChangeKind::AddColumn, &clean_inputs(), false);
        cache.put("t", "f", ChangeKind::AddColumn, analysis);
        assert!(cache.get("t", "f", ChangeKind::AddColumn).is_some());
        assert!(cache.get("t", "f", ChangeKind::DropColumn).is_none());
    }

    #[test]
    fn impact_cache_invalidate_clears_matching_table_field() {
        let cache = ImpactCache::new();
        let analysis = analyze_impact("t", "f", ChangeKind::AddColumn, &clean_inputs(), false);
        cache.put("t", "f", ChangeKind::AddColumn, analysis);
        cache.invalidate(Some("t"), Some("f"));
        assert!(cache.get("t", "f", ChangeKind::AddColumn).is_none());
    }

    #[test]
    fn preview_is_non_destructive_and_returns_full_plan() {
        let preview = preview_schema_change(
            "t",
            ChangeKind::AddColumn,
            "f",
            Some("TEXT"),
            true,
            &clean_inputs(),
            false,
            None,
            None,
        );
        assert!(preview.validation.is_valid);
        assert!(preview.impact.is_some());
        assert!(preview.rollback_plan.is_some());
    }
}
