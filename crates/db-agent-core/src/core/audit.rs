// crates/db-agent-core/src/core/audit.rs
// ============================================================================
// Module: Audit Records
// Description: Append-only decision audit rows and their response status.
// Purpose: Give every request exactly one attempted audit record.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! One audit row is attempted for every request that reaches the pipeline.
//! Audit writes are best-effort: a failed write surfaces
//! `{logged: false, code: AUDIT_WRITE_FAILED}` in the response and never
//! alters the decision outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::Decision;
use crate::core::decision::codes;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Record
// ============================================================================

/// Append-only audit row for one request decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Tenant scope when present.
    pub tenant_id: Option<String>,
    /// Requesting identity (wallet address or agent id).
    pub requester: String,
    /// Capability or mutation action label.
    pub capability: String,
    /// Template name for query requests.
    pub query_template: Option<String>,
    /// Decision recorded for the request.
    pub decision: Decision,
    /// Row creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Audit write status surfaced in the response envelope.
///
/// # Invariants
/// - `logged` is always present; audit failure is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatus {
    /// Whether the audit row was written.
    pub logged: bool,
    /// Stable audit status code.
    pub code: String,
}

impl AuditStatus {
    /// Status for a successful write.
    #[must_use]
    pub fn logged() -> Self {
        Self {
            logged: true,
            code: codes::AUDIT_LOGGED.to_string(),
        }
    }

    /// Status for a failed write.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            logged: false,
            code: codes::AUDIT_WRITE_FAILED.to_string(),
        }
    }

    /// Status when auditing is disabled by configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            logged: false,
            code: codes::AUDIT_DISABLED.to_string(),
        }
    }
}
