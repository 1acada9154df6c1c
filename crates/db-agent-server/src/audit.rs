// crates/db-agent-server/src/audit.rs
// ============================================================================
// Module: Audit Sinks
// Description: Best-effort decision audit sinks.
// Purpose: Append one decision row per request without affecting outcomes.
// Dependencies: db-agent-core, serde_json
// ============================================================================

//! ## Overview
//! Every request attempts exactly one audit append. The database sink
//! writes through the adapter into `audit_decisions`; the stderr sink emits
//! JSON lines for deployments without a writable store. Sink failure is
//! informational only and never changes the decision outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use db_agent_core::AuditRecord;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteRequest;
use db_agent_core::Dialect;
use db_agent_core::SharedAdapter;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit sink failures.
#[derive(Debug, Error)]
pub enum AuditSinkError {
    /// The append failed.
    #[error("audit write failed: {0}")]
    Write(String),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Best-effort audit sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one decision record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSinkError`] when the append fails; callers treat the
    /// failure as informational.
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditSinkError>;
}

/// Shared audit sink handle.
pub type SharedAuditSink = Arc<dyn AuditSink>;

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Adapter-backed audit sink writing into `audit_decisions`.
pub struct AdapterAuditSink {
    /// Backing adapter.
    adapter: SharedAdapter,
}

impl AdapterAuditSink {
    /// Builds a sink over the given adapter.
    #[must_use]
    pub const fn new(adapter: SharedAdapter) -> Self {
        Self {
            adapter,
        }
    }
}

#[async_trait]
impl AuditSink for AdapterAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditSinkError> {
        let decision = serde_json::to_string(&record.decision)
            .map_err(|err| AuditSinkError::Write(err.to_string()))?;
        let created_at = record
            .created_at
            .format()
            .map_err(|err| AuditSinkError::Write(err.to_string()))?;
        let sql = match self.adapter.dialect() {
            Dialect::Sqlite => {
                "INSERT INTO audit_decisions (request_id, tenant_id, requester, capability, \
                 query_template, decision, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            }
            Dialect::Postgres => {
                "INSERT INTO audit_decisions (request_id, tenant_id, requester, capability, \
                 query_template, decision, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)"
            }
        };
        self.adapter
            .execute(ExecuteRequest {
                mode: ExecuteMode::Write,
                sql: sql.to_string(),
                params: vec![
                    json!(record.request_id),
                    json!(record.tenant_id),
                    json!(record.requester),
                    json!(record.capability),
                    json!(record.query_template),
                    json!(decision),
                    json!(created_at),
                ],
            })
            .await
            .map_err(|err| AuditSinkError::Write(err.to_string()))?;
        Ok(())
    }
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

#[async_trait]
impl AuditSink for StderrAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditSinkError> {
        let payload = serde_json::to_string(record)
            .map_err(|err| AuditSinkError::Write(err.to_string()))?;
        writeln!(std::io::stderr(), "{payload}")
            .map_err(|err| AuditSinkError::Write(err.to_string()))
    }
}

/// No-op audit sink for disabled auditing.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn append(&self, _record: &AuditRecord) -> Result<(), AuditSinkError> {
        Ok(())
    }
}
