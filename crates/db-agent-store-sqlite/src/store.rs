// crates/db-agent-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Adapter
// Description: Embedded SQLite backend with WAL, migrations, and seeds.
// Purpose: Serve the adapter contract from a single database file.
// Dependencies: db-agent-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The SQLite adapter serves both template queries and dynamic data
//! execution from one WAL-mode database file. Connection access is
//! serialized through a mutex; statements are short-lived, so holding the
//! lock across an `execute` call keeps the adapter safe for concurrent use.
//! Opening runs the schema migration and seeds the canonical read-model
//! tables when they are empty.
//!
//! Security posture: SQL text comes only from the template registry and the
//! identifier-checked dynamic generator; bind values never reach SQL text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use db_agent_core::AdapterError;
use db_agent_core::DbAdapter;
use db_agent_core::Dialect;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteOutcome;
use db_agent_core::ExecuteRequest;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::types::ValueRef;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version recorded in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Migration statements applied at open.
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS wallet_balances (
        wallet_address TEXT NOT NULL,
        chain_id INTEGER NOT NULL,
        asset_symbol TEXT NOT NULL,
        balance TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (wallet_address, chain_id, asset_symbol)
    )",
    "CREATE TABLE IF NOT EXISTS wallet_positions (
        wallet_address TEXT NOT NULL,
        chain_id INTEGER NOT NULL,
        protocol TEXT NOT NULL,
        position_kind TEXT NOT NULL,
        amount TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (wallet_address, chain_id, protocol, position_kind)
    )",
    "CREATE TABLE IF NOT EXISTS wallet_transactions (
        tx_hash TEXT PRIMARY KEY,
        wallet_address TEXT NOT NULL,
        chain_id INTEGER NOT NULL,
        direction TEXT NOT NULL,
        amount TEXT NOT NULL,
        asset_symbol TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS access_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        wallet_address TEXT NOT NULL,
        action TEXT NOT NULL,
        resource TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS policy_grants (
        grant_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        wallet_address TEXT NOT NULL,
        scope_type TEXT NOT NULL,
        scope_id TEXT NOT NULL,
        operation TEXT NOT NULL,
        effect TEXT NOT NULL,
        issued_by TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        signature_hash TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        task_id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        task_type TEXT NOT NULL,
        status TEXT NOT NULL,
        input TEXT NOT NULL,
        result TEXT,
        error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS idempotency_records (
        agent_id TEXT NOT NULL,
        idempotency_key TEXT NOT NULL,
        request_hash TEXT NOT NULL,
        task_id TEXT NOT NULL,
        terminal TEXT,
        expires_at INTEGER NOT NULL,
        PRIMARY KEY (agent_id, idempotency_key)
    )",
    "CREATE TABLE IF NOT EXISTS ai_drafts (
        draft_id TEXT PRIMARY KEY,
        draft_hash TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        signer_address TEXT NOT NULL,
        verification TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ai_approvals (
        approval_id TEXT PRIMARY KEY,
        draft_id TEXT NOT NULL,
        draft_hash TEXT NOT NULL,
        approved_by TEXT NOT NULL,
        approved_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS audit_decisions (
        request_id TEXT NOT NULL,
        tenant_id TEXT,
        requester TEXT NOT NULL,
        capability TEXT NOT NULL,
        query_template TEXT,
        decision TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

/// Canonical seed rows applied when the read-model tables are empty.
const SEEDS: &[&str] = &[
    "INSERT OR IGNORE INTO wallet_balances VALUES
        ('0x8ba1f109551bd432803012645ac136ddd64dba72', 1, 'ETH', '1.25', '2026-02-01T00:00:00Z'),
        ('0x8ba1f109551bd432803012645ac136ddd64dba72', 1, 'USDC', '1520.00', '2026-02-01T00:00:00Z'),
        ('0x00000000219ab540356cbb839cbe05303d7705fa', 1, 'ETH', '42.00', '2026-02-01T00:00:00Z')",
    "INSERT OR IGNORE INTO wallet_positions VALUES
        ('0x8ba1f109551bd432803012645ac136ddd64dba72', 1, 'aave-v3', 'supply', '1000.00', '2026-02-01T00:00:00Z'),
        ('0x8ba1f109551bd432803012645ac136ddd64dba72', 1, 'uniswap-v3', 'lp', '2.50', '2026-02-01T00:00:00Z')",
    "INSERT OR IGNORE INTO wallet_transactions VALUES
        ('0xa1b2c3d4', '0x8ba1f109551bd432803012645ac136ddd64dba72', 1, 'in', '0.75', 'ETH', '2026-01-15T12:00:00Z'),
        ('0xe5f6a7b8', '0x8ba1f109551bd432803012645ac136ddd64dba72', 1, 'out', '250.00', 'USDC', '2026-01-20T08:30:00Z')",
];

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the SQLite adapter.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
#[derive(Debug, Clone)]
pub struct SqliteAdapterConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteAdapterConfig {
    /// Builds a config for the given file path with default timeouts.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLite adapter errors.
///
/// # Invariants
/// - Error messages avoid embedding bind values.
#[derive(Debug, Error, Clone)]
pub enum SqliteAdapterError {
    /// Database open or migration failure.
    #[error("sqlite open failed: {0}")]
    Open(String),
    /// Statement execution failure.
    #[error("sqlite execution failed: {0}")]
    Execution(String),
}

impl From<SqliteAdapterError> for AdapterError {
    fn from(error: SqliteAdapterError) -> Self {
        match error {
            SqliteAdapterError::Open(message) => Self::Unavailable(message),
            SqliteAdapterError::Execution(message) => Self::Execution(message),
        }
    }
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// SQLite-backed adapter.
///
/// # Invariants
/// - Connection access is serialized through the mutex.
/// - The schema version matches [`SCHEMA_VERSION`] after open.
#[derive(Clone)]
pub struct SqliteAdapter {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteAdapter {
    /// Opens (or creates) the database file and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteAdapterError::Open`] on open, pragma, or migration
    /// failure.
    pub fn open(config: &SqliteAdapterConfig) -> Result<Self, SqliteAdapterError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        }
        let connection = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        Self::initialize(connection, config.busy_timeout_ms)
    }

    /// Opens an in-memory database for tests and local development.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteAdapterError::Open`] on migration failure.
    pub fn in_memory() -> Result<Self, SqliteAdapterError> {
        let connection = Connection::open_in_memory()
            .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        Self::initialize(connection, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Applies pragmas, migrations, and seeds to a fresh connection.
    fn initialize(
        connection: Connection,
        busy_timeout_ms: u64,
    ) -> Result<Self, SqliteAdapterError> {
        connection
            .busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))
            .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", "wal")
            .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        for statement in MIGRATIONS {
            connection
                .execute(statement, [])
                .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        }
        for statement in SEEDS {
            connection
                .execute(statement, [])
                .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        }
        connection
            .pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|err| SqliteAdapterError::Open(err.to_string()))?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a statement synchronously under the connection lock.
    fn run(&self, request: &ExecuteRequest) -> Result<ExecuteOutcome, SqliteAdapterError> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| SqliteAdapterError::Execution("connection lock poisoned".to_string()))?;
        let mut statement = connection
            .prepare(&request.sql)
            .map_err(|err| SqliteAdapterError::Execution(err.to_string()))?;
        let params: Vec<SqlValue> = request.params.iter().map(json_to_sql).collect();
        match request.mode {
            ExecuteMode::Read => {
                let column_names: Vec<String> =
                    statement.column_names().iter().map(ToString::to_string).collect();
                let mut rows = statement
                    .query(rusqlite::params_from_iter(params))
                    .map_err(|err| SqliteAdapterError::Execution(err.to_string()))?;
                let mut collected = Vec::new();
                loop {
                    let row = rows
                        .next()
                        .map_err(|err| SqliteAdapterError::Execution(err.to_string()))?;
                    let Some(row) = row else {
                        break;
                    };
                    let mut object = serde_json::Map::new();
                    for (index, name) in column_names.iter().enumerate() {
                        let value = row
                            .get_ref(index)
                            .map_err(|err| SqliteAdapterError::Execution(err.to_string()))?;
                        object.insert(name.clone(), sql_to_json(value));
                    }
                    collected.push(object);
                }
                Ok(ExecuteOutcome {
                    row_count: collected.len() as u64,
                    rows: collected,
                })
            }
            ExecuteMode::Write => {
                let changed = statement
                    .execute(rusqlite::params_from_iter(params))
                    .map_err(|err| SqliteAdapterError::Execution(err.to_string()))?;
                Ok(ExecuteOutcome {
                    row_count: changed as u64,
                    rows: Vec::new(),
                })
            }
        }
    }
}

#[async_trait]
impl DbAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteOutcome, AdapterError> {
        self.run(&request).map_err(AdapterError::from)
    }

    async fn close(&self) -> Result<(), AdapterError> {
        // The connection closes when the last handle drops.
        Ok(())
    }
}

// ============================================================================
// SECTION: Value Mapping
// ============================================================================

/// Maps a JSON bind value onto a SQLite value.
fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || SqlValue::Real(number.as_f64().unwrap_or(0.0)),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => {
            SqlValue::Text(value.to_string())
        }
    }
}

/// Maps a SQLite column value onto JSON.
fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Value::from(number),
        ValueRef::Text(text) => Value::from(String::from_utf8_lossy(text).to_string()),
        ValueRef::Blob(bytes) => Value::from(hex::encode(bytes)),
    }
}
