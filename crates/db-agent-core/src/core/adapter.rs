// crates/db-agent-core/src/core/adapter.rs
// ============================================================================
// Module: Database Adapter Interface
// Description: Dialect-aware execution contract for storage backends.
// Purpose: Decouple the pipeline from concrete SQLite/PostgreSQL drivers.
// Dependencies: async-trait, serde, serde_json
// ============================================================================

//! ## Overview
//! The pipeline never talks to a database driver directly. Adapters expose a
//! uniform `execute` contract returning `{row_count, rows}` for both read
//! and write modes, and report their [`Dialect`] so templates can select the
//! matching SQL text. Implementations must be safe for concurrent `execute`
//! calls.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Dialect & Mode
// ============================================================================

/// SQL dialect spoken by an adapter.
///
/// # Invariants
/// - Variants are stable for serialization and template SQL selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Embedded SQLite file store.
    Sqlite,
    /// External PostgreSQL store.
    Postgres,
}

impl Dialect {
    /// Returns the stable wire label for the dialect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Execution mode for a statement.
///
/// # Invariants
/// - Variants are stable for serialization and capability mode checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMode {
    /// Row-returning statement.
    Read,
    /// Mutating statement.
    Write,
}

impl ExecuteMode {
    /// Returns the stable wire label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

// ============================================================================
// SECTION: Request & Outcome
// ============================================================================

/// Statement execution request handed to an adapter.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Read or write mode.
    pub mode: ExecuteMode,
    /// SQL text with positional placeholders.
    pub sql: String,
    /// Positional bind values as JSON scalars.
    pub params: Vec<Value>,
}

/// Statement execution outcome returned by an adapter.
///
/// # Invariants
/// - `rows` is empty for write statements without a returning clause.
/// - `row_count` is the affected-row count for writes and `rows.len()` for
///   reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOutcome {
    /// Affected or returned row count.
    pub row_count: u64,
    /// Returned rows as column-name keyed JSON maps.
    pub rows: Vec<serde_json::Map<String, Value>>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by database adapters.
///
/// # Invariants
/// - Messages avoid embedding bind values or other payload data.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    /// Backend connection or open failure.
    #[error("adapter unavailable: {0}")]
    Unavailable(String),
    /// Statement execution failure.
    #[error("execution failed: {0}")]
    Execution(String),
    /// Bind value could not be mapped onto a backend type.
    #[error("unsupported bind value: {0}")]
    UnsupportedBind(String),
}

// ============================================================================
// SECTION: Adapter Trait
// ============================================================================

/// Dialect-aware storage backend.
#[async_trait]
pub trait DbAdapter: Send + Sync {
    /// Returns the SQL dialect spoken by this adapter.
    fn dialect(&self) -> Dialect;

    /// Executes a single statement.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the statement fails or a bind value
    /// cannot be mapped.
    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteOutcome, AdapterError>;

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when shutdown fails.
    async fn close(&self) -> Result<(), AdapterError>;
}

/// Shared adapter handle.
pub type SharedAdapter = Arc<dyn DbAdapter>;
