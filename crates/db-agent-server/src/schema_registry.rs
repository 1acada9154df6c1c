// crates/db-agent-server/src/schema_registry.rs
// ============================================================================
// Module: Tenant Schema Registry
// Description: Apply-installed tenant table schemas and DDL generation.
// Purpose: Bind dynamic data execution to declared identifiers only.
// Dependencies: db-agent-core, serde
// ============================================================================

//! ## Overview
//! Dynamic data execution never sees a raw identifier: every table and
//! column must come from the tenant's apply-installed schema. The registry
//! validates identifier shapes at install time, derives the physical
//! per-tenant table names, and generates the `CREATE TABLE` DDL for both
//! dialects.
//!
//! Security posture: identifier validation here is the only thing standing
//! between caller input and SQL text; it is strict by construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::RwLock;

use db_agent_core::Dialect;
use db_agent_core::TenantId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Schema Model
// ============================================================================

/// Column type accepted by tenant schemas.
///
/// # Invariants
/// - Variants are stable for serialization and DDL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit integer.
    Integer,
    /// Double-precision float.
    Real,
    /// Boolean flag.
    Boolean,
    /// Timestamp stored as RFC 3339 text (sqlite) or timestamptz (postgres).
    Timestamp,
}

impl ColumnType {
    /// Returns the DDL type name for a dialect.
    #[must_use]
    pub const fn ddl_type(self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (Self::Text, _) => "TEXT",
            (Self::Integer, Dialect::Sqlite) => "INTEGER",
            (Self::Integer, Dialect::Postgres) => "BIGINT",
            (Self::Real, Dialect::Sqlite) => "REAL",
            (Self::Real, Dialect::Postgres) => "DOUBLE PRECISION",
            (Self::Boolean, Dialect::Sqlite) => "INTEGER",
            (Self::Boolean, Dialect::Postgres) => "BOOLEAN",
            (Self::Timestamp, Dialect::Sqlite) => "TEXT",
            (Self::Timestamp, Dialect::Postgres) => "TIMESTAMPTZ",
        }
    }
}

/// Declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column type.
    pub column_type: ColumnType,
}

/// Declared table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    /// Logical table name.
    pub name: String,
    /// Declared columns.
    pub columns: Vec<ColumnSpec>,
}

/// Tenant schema: the set of declared tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSchema {
    /// Declared tables.
    pub tables: Vec<TableSpec>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema installation and lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Identifier failed shape validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// Schema declared no tables or a table declared no columns.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// Table is not declared for the tenant.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// Column is not declared on the table.
    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// In-memory registry of apply-installed tenant schemas.
///
/// # Invariants
/// - Installs replace the tenant's whole schema; reads are concurrent.
#[derive(Debug, Default)]
pub struct TenantSchemaRegistry {
    /// Schemas keyed by tenant.
    schemas: RwLock<BTreeMap<TenantId, TenantSchema>>,
}

impl TenantSchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and installs (or rewrites) a tenant schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the schema or any identifier is
    /// malformed.
    pub fn install(&self, tenant: &TenantId, schema: TenantSchema) -> Result<(), SchemaError> {
        if schema.tables.is_empty() {
            return Err(SchemaError::InvalidSchema("schema declares no tables".to_string()));
        }
        for table in &schema.tables {
            validate_identifier(&table.name)?;
            if table.columns.is_empty() {
                return Err(SchemaError::InvalidSchema(format!(
                    "table {} declares no columns",
                    table.name
                )));
            }
            for column in &table.columns {
                validate_identifier(&column.name)?;
            }
        }
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| SchemaError::InvalidSchema("registry lock poisoned".to_string()))?;
        schemas.insert(tenant.clone(), schema);
        Ok(())
    }

    /// Returns the schema for a tenant when installed.
    #[must_use]
    pub fn get(&self, tenant: &TenantId) -> Option<TenantSchema> {
        self.schemas.read().ok().and_then(|schemas| schemas.get(tenant).cloned())
    }

    /// Resolves a table, failing on undeclared names.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTable`] when the table is absent.
    pub fn table(&self, tenant: &TenantId, name: &str) -> Result<TableSpec, SchemaError> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| SchemaError::InvalidSchema("registry lock poisoned".to_string()))?;
        schemas
            .get(tenant)
            .and_then(|schema| schema.tables.iter().find(|table| table.name == name))
            .cloned()
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }
}

// ============================================================================
// SECTION: Identifiers & DDL
// ============================================================================

/// Validates a logical identifier (`^[a-z][a-z0-9_]{0,62}$`).
///
/// # Errors
///
/// Returns [`SchemaError::InvalidIdentifier`] on any violation.
pub fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(SchemaError::InvalidIdentifier("empty".to_string()));
    };
    if name.len() > 63 {
        return Err(SchemaError::InvalidIdentifier(format!("too long: {name}")));
    }
    if !first.is_ascii_lowercase() {
        return Err(SchemaError::InvalidIdentifier(name.to_string()));
    }
    for ch in chars {
        if !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_') {
            return Err(SchemaError::InvalidIdentifier(name.to_string()));
        }
    }
    Ok(())
}

/// Derives the physical table name for a tenant-scoped logical table.
///
/// Tenant ids may contain `-`, which is not a bare SQL identifier
/// character; it maps onto `_`.
#[must_use]
pub fn physical_table_name(tenant: &TenantId, table: &str) -> String {
    let tenant_part = tenant.as_str().replace('-', "_");
    format!("t_{tenant_part}__{table}")
}

/// Generates the `CREATE TABLE IF NOT EXISTS` DDL for a declared table.
#[must_use]
pub fn create_table_ddl(tenant: &TenantId, table: &TableSpec, dialect: Dialect) -> String {
    let physical = physical_table_name(tenant, &table.name);
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|column| format!("{} {}", column.name, column.column_type.ddl_type(dialect)))
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {physical} ({})", columns.join(", "))
}
