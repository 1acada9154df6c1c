// crates/db-agent-server/src/data_exec.rs
// ============================================================================
// Module: Dynamic Data Execution
// Description: Grant-gated CRUD generation over tenant tables.
// Purpose: Build per-operation SQL bound to schema-registry identifiers.
// Dependencies: db-agent-core, crate::schema_registry
// ============================================================================

//! ## Overview
//! `data:execute` is the dynamic counterpart of the template path: SQL is
//! generated per operation with every identifier resolved against the
//! tenant's apply-installed schema. Values are always bound positionally;
//! the generator never interpolates a caller value into SQL text.
//!
//! Security posture: unknown tables and columns fail closed before any SQL
//! is built; update and delete require a where clause.

// ============================================================================
// SECTION: Imports
// ============================================================================

use db_agent_core::Dialect;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteRequest;
use db_agent_core::Operation;
use db_agent_core::TenantId;
use db_agent_core::codes;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::schema_registry::SchemaError;
use crate::schema_registry::TableSpec;
use crate::schema_registry::TenantSchemaRegistry;
use crate::schema_registry::physical_table_name;

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Parsed `data:execute` payload.
#[derive(Debug, Clone)]
pub struct DataExecutePayload {
    /// Logical table name.
    pub table: String,
    /// Requested operation.
    pub operation: Operation,
    /// Columns to read (read only; empty means all declared columns).
    pub columns: Vec<String>,
    /// Column values for insert/update.
    pub values: Map<String, Value>,
    /// Equality filters for read/update/delete.
    pub filters: Map<String, Value>,
    /// Row limit for reads.
    pub limit: i64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Dynamic execution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataExecError {
    /// Payload shape violation.
    #[error("{0}")]
    Invalid(String),
    /// Table not declared for the tenant.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// Column not declared on the table.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

impl DataExecError {
    /// Returns the stable decision code for this failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => codes::INVALID_REQUEST,
            Self::UnknownTable(_) => codes::UNKNOWN_TABLE,
            Self::UnknownColumn(_) => codes::UNKNOWN_COLUMN,
        }
    }
}

impl From<SchemaError> for DataExecError {
    fn from(error: SchemaError) -> Self {
        match error {
            SchemaError::UnknownTable(name) => Self::UnknownTable(name),
            SchemaError::UnknownColumn(name) => Self::UnknownColumn(name),
            other => Self::Invalid(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Payload Parsing
// ============================================================================

/// Parses a `data:execute` payload object.
///
/// # Errors
///
/// Returns [`DataExecError::Invalid`] on shape violations.
pub fn parse_payload(payload: &Value) -> Result<DataExecutePayload, DataExecError> {
    let map = payload
        .as_object()
        .ok_or_else(|| DataExecError::Invalid("payload must be an object".to_string()))?;
    let table = map
        .get("table")
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DataExecError::Invalid("table is required".to_string()))?
        .to_string();
    let operation = match map.get("operation").and_then(Value::as_str) {
        Some("read") => Operation::Read,
        Some("insert") => Operation::Insert,
        Some("update") => Operation::Update,
        Some("delete") => Operation::Delete,
        Some(other) => {
            return Err(DataExecError::Invalid(format!("unsupported operation: {other}")));
        }
        None => return Err(DataExecError::Invalid("operation is required".to_string())),
    };
    let columns = match map.get("columns") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => {
            let mut names = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(name) = entry.as_str() else {
                    return Err(DataExecError::Invalid("columns must be strings".to_string()));
                };
                names.push(name.to_string());
            }
            names
        }
        Some(_) => return Err(DataExecError::Invalid("columns must be an array".to_string())),
    };
    let values = object_field(map, "values")?;
    let filters = object_field(map, "where")?;
    let limit = match map.get("limit") {
        None | Some(Value::Null) => 100,
        Some(value) => value
            .as_i64()
            .filter(|limit| (1..=500).contains(limit))
            .ok_or_else(|| DataExecError::Invalid("limit must be 1..=500".to_string()))?,
    };
    Ok(DataExecutePayload {
        table,
        operation,
        columns,
        values,
        filters,
        limit,
    })
}

/// Reads an optional object field.
fn object_field(
    map: &Map<String, Value>,
    field: &str,
) -> Result<Map<String, Value>, DataExecError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(value)) => Ok(value.clone()),
        Some(_) => Err(DataExecError::Invalid(format!("{field} must be an object"))),
    }
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Generates the adapter request for a parsed payload.
///
/// # Errors
///
/// Returns [`DataExecError`] when identifiers are undeclared or the
/// operation's required clauses are absent.
pub fn generate(
    registry: &TenantSchemaRegistry,
    tenant: &TenantId,
    dialect: Dialect,
    payload: &DataExecutePayload,
) -> Result<ExecuteRequest, DataExecError> {
    let table = registry.table(tenant, &payload.table)?;
    check_columns(&table, payload.values.keys())?;
    check_columns(&table, payload.filters.keys())?;
    check_columns(&table, payload.columns.iter())?;

    let physical = physical_table_name(tenant, &table.name);
    let mut params: Vec<Value> = Vec::new();
    match payload.operation {
        Operation::Read => {
            let columns = if payload.columns.is_empty() {
                table.columns.iter().map(|column| column.name.clone()).collect::<Vec<_>>()
            } else {
                payload.columns.clone()
            };
            let mut sql =
                format!("SELECT {} FROM {physical}", columns.join(", "));
            append_where(&mut sql, &mut params, &payload.filters, dialect);
            let limit_slot = placeholder(dialect, params.len() + 1);
            sql.push_str(&format!(" LIMIT {limit_slot}"));
            params.push(Value::from(payload.limit));
            Ok(ExecuteRequest {
                mode: ExecuteMode::Read,
                sql,
                params,
            })
        }
        Operation::Insert => {
            if payload.values.is_empty() {
                return Err(DataExecError::Invalid("insert requires values".to_string()));
            }
            let columns: Vec<&String> = payload.values.keys().collect();
            let slots: Vec<String> = (1..=columns.len())
                .map(|index| placeholder(dialect, index))
                .collect();
            let sql = format!(
                "INSERT INTO {physical} ({}) VALUES ({})",
                columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
                slots.join(", ")
            );
            params.extend(payload.values.values().cloned());
            Ok(ExecuteRequest {
                mode: ExecuteMode::Write,
                sql,
                params,
            })
        }
        Operation::Update => {
            if payload.values.is_empty() {
                return Err(DataExecError::Invalid("update requires values".to_string()));
            }
            if payload.filters.is_empty() {
                return Err(DataExecError::Invalid("update requires a where clause".to_string()));
            }
            let assignments: Vec<String> = payload
                .values
                .keys()
                .enumerate()
                .map(|(index, column)| {
                    format!("{column} = {}", placeholder(dialect, index + 1))
                })
                .collect();
            params.extend(payload.values.values().cloned());
            let mut sql = format!("UPDATE {physical} SET {}", assignments.join(", "));
            append_where(&mut sql, &mut params, &payload.filters, dialect);
            Ok(ExecuteRequest {
                mode: ExecuteMode::Write,
                sql,
                params,
            })
        }
        Operation::Delete => {
            if payload.filters.is_empty() {
                return Err(DataExecError::Invalid("delete requires a where clause".to_string()));
            }
            let mut sql = format!("DELETE FROM {physical}");
            append_where(&mut sql, &mut params, &payload.filters, dialect);
            Ok(ExecuteRequest {
                mode: ExecuteMode::Write,
                sql,
                params,
            })
        }
        Operation::Alter | Operation::All => {
            Err(DataExecError::Invalid("operation not supported by data execution".to_string()))
        }
    }
}

/// Verifies that every referenced column is declared on the table.
fn check_columns<'a, I>(table: &TableSpec, names: I) -> Result<(), DataExecError>
where
    I: IntoIterator<Item = &'a String>,
{
    for name in names {
        if !table.columns.iter().any(|column| &column.name == name) {
            return Err(DataExecError::UnknownColumn(name.clone()));
        }
    }
    Ok(())
}

/// Appends an equality where clause, extending the bind parameters.
fn append_where(
    sql: &mut String,
    params: &mut Vec<Value>,
    filters: &Map<String, Value>,
    dialect: Dialect,
) {
    if filters.is_empty() {
        return;
    }
    let clauses: Vec<String> = filters
        .keys()
        .enumerate()
        .map(|(index, column)| {
            format!("{column} = {}", placeholder(dialect, params.len() + index + 1))
        })
        .collect();
    params.extend(filters.values().cloned());
    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
}

/// Returns the positional placeholder for a dialect.
fn placeholder(dialect: Dialect, index: usize) -> String {
    match dialect {
        Dialect::Sqlite => format!("?{index}"),
        Dialect::Postgres => format!("${index}"),
    }
}
