// crates/db-agent-store-postgres/src/store.rs
// ============================================================================
// Module: PostgreSQL Adapter
// Description: External PostgreSQL backend with a round-robin client pool.
// Purpose: Serve the adapter contract against a managed relational store.
// Dependencies: db-agent-core, tokio, tokio-postgres
// ============================================================================

//! ## Overview
//! The PostgreSQL adapter holds a capped pool of clients selected round
//! robin per statement. Each client's connection driver runs on its own
//! task; a client whose driver has exited surfaces an execution error on
//! next use. The adapter maps JSON bind values onto native parameter types
//! and column values back onto JSON by column type.
//!
//! Security posture: the connection URL may embed credentials and is never
//! echoed in errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use db_agent_core::AdapterError;
use db_agent_core::DbAdapter;
use db_agent_core::Dialect;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteOutcome;
use db_agent_core::ExecuteRequest;
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tokio_postgres::NoTls;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tokio_postgres::types::Type;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the PostgreSQL adapter.
///
/// # Invariants
/// - `max_pool_size` is greater than zero.
#[derive(Debug, Clone)]
pub struct PostgresAdapterConfig {
    /// Connection URL (`postgres://...`).
    pub url: String,
    /// Maximum pooled clients.
    pub max_pool_size: usize,
    /// Whether the caller requested TLS to the database.
    pub ssl: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// PostgreSQL adapter errors.
///
/// # Invariants
/// - Messages never include the connection URL or bind values.
#[derive(Debug, Error, Clone)]
pub enum PostgresAdapterError {
    /// Connection establishment failure.
    #[error("postgres connect failed: {0}")]
    Connect(String),
    /// Unsupported configuration.
    #[error("postgres configuration unsupported: {0}")]
    Unsupported(String),
    /// Statement execution failure.
    #[error("postgres execution failed: {0}")]
    Execution(String),
}

impl From<PostgresAdapterError> for AdapterError {
    fn from(error: PostgresAdapterError) -> Self {
        match error {
            PostgresAdapterError::Connect(message)
            | PostgresAdapterError::Unsupported(message) => Self::Unavailable(message),
            PostgresAdapterError::Execution(message) => Self::Execution(message),
        }
    }
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// PostgreSQL-backed adapter.
///
/// # Invariants
/// - The pool size is fixed at connect time and bounded by configuration.
pub struct PostgresAdapter {
    /// Pooled clients, each guarded by its own async mutex.
    clients: Arc<Vec<Mutex<Client>>>,
    /// Round-robin cursor for client selection.
    cursor: AtomicUsize,
}

impl PostgresAdapter {
    /// Connects the pool.
    ///
    /// TLS to the database is terminated by the deployment's proxy layer;
    /// direct TLS is rejected as unsupported rather than silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresAdapterError`] when the configuration is
    /// unsupported or any connection fails.
    pub async fn connect(config: &PostgresAdapterConfig) -> Result<Self, PostgresAdapterError> {
        if config.ssl {
            return Err(PostgresAdapterError::Unsupported(
                "direct database TLS is not supported; terminate TLS at the proxy".to_string(),
            ));
        }
        if config.max_pool_size == 0 {
            return Err(PostgresAdapterError::Unsupported(
                "max_pool_size must be greater than zero".to_string(),
            ));
        }
        let mut clients = Vec::with_capacity(config.max_pool_size);
        for _ in 0..config.max_pool_size {
            let (client, connection) = tokio_postgres::connect(&config.url, NoTls)
                .await
                .map_err(|err| PostgresAdapterError::Connect(err.to_string()))?;
            tokio::spawn(async move {
                // The driver exits when the client drops or the socket dies.
                let _ = connection.await;
            });
            clients.push(Mutex::new(client));
        }
        Ok(Self {
            clients: Arc::new(clients),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Selects the next pooled client round robin.
    fn next_client(&self) -> &Mutex<Client> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[index]
    }
}

#[async_trait]
impl DbAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteOutcome, AdapterError> {
        let params = bind_values(&request.params)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|param| param.as_ref() as &(dyn ToSql + Sync)).collect();
        let client = self.next_client().lock().await;
        match request.mode {
            ExecuteMode::Read => {
                let rows = client
                    .query(request.sql.as_str(), &param_refs)
                    .await
                    .map_err(|err| AdapterError::Execution(err.to_string()))?;
                let mut collected = Vec::with_capacity(rows.len());
                for row in &rows {
                    collected.push(row_to_json(row));
                }
                Ok(ExecuteOutcome {
                    row_count: collected.len() as u64,
                    rows: collected,
                })
            }
            ExecuteMode::Write => {
                let changed = client
                    .execute(request.sql.as_str(), &param_refs)
                    .await
                    .map_err(|err| AdapterError::Execution(err.to_string()))?;
                Ok(ExecuteOutcome {
                    row_count: changed,
                    rows: Vec::new(),
                })
            }
        }
    }

    async fn close(&self) -> Result<(), AdapterError> {
        // Clients disconnect when the pool drops.
        Ok(())
    }
}

// ============================================================================
// SECTION: Value Mapping
// ============================================================================

/// Boxed parameter value accepted by tokio-postgres.
type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Maps JSON bind values onto native parameter types.
fn bind_values(params: &[Value]) -> Result<Vec<BoxedParam>, AdapterError> {
    let mut bound: Vec<BoxedParam> = Vec::with_capacity(params.len());
    for value in params {
        match value {
            Value::Null => bound.push(Box::new(Option::<String>::None)),
            Value::Bool(flag) => bound.push(Box::new(*flag)),
            Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    bound.push(Box::new(integer));
                } else if let Some(float) = number.as_f64() {
                    bound.push(Box::new(float));
                } else {
                    return Err(AdapterError::UnsupportedBind(
                        "numeric value out of range".to_string(),
                    ));
                }
            }
            Value::String(text) => bound.push(Box::new(text.clone())),
            Value::Array(_) | Value::Object(_) => bound.push(Box::new(value.clone())),
        }
    }
    Ok(bound)
}

/// Maps one result row onto a column-keyed JSON object.
fn row_to_json(row: &Row) -> serde_json::Map<String, Value> {
    let mut object = serde_json::Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_to_json(row, index, column.type_()));
    }
    object
}

/// Maps one column value onto JSON by its declared type.
fn column_to_json(row: &Row, index: usize, column_type: &Type) -> Value {
    if *column_type == Type::BOOL {
        row.try_get::<_, Option<bool>>(index).ok().flatten().map_or(Value::Null, Value::from)
    } else if *column_type == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::from(i64::from(v)))
    } else if *column_type == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::from(i64::from(v)))
    } else if *column_type == Type::INT8 {
        row.try_get::<_, Option<i64>>(index).ok().flatten().map_or(Value::Null, Value::from)
    } else if *column_type == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::from(f64::from(v)))
    } else if *column_type == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index).ok().flatten().map_or(Value::Null, Value::from)
    } else if *column_type == Type::JSON || *column_type == Type::JSONB {
        row.try_get::<_, Option<Value>>(index).ok().flatten().unwrap_or(Value::Null)
    } else if *column_type == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<time::OffsetDateTime>>(index)
            .ok()
            .flatten()
            .and_then(|v| v.format(&Rfc3339).ok())
            .map_or(Value::Null, Value::from)
    } else if *column_type == Type::TIMESTAMP {
        row.try_get::<_, Option<time::PrimitiveDateTime>>(index)
            .ok()
            .flatten()
            .and_then(|v| v.assume_utc().format(&Rfc3339).ok())
            .map_or(Value::Null, Value::from)
    } else {
        row.try_get::<_, Option<String>>(index).ok().flatten().map_or(Value::Null, Value::from)
    }
}
