// crates/db-agent-core/src/core/decision.rs
// ============================================================================
// Module: Decision Model
// Description: Canonical allow/deny decisions and stable decision codes.
// Purpose: Give every request exactly one deterministic decision record.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every request through the pipeline produces exactly one [`Decision`]:
//! the outcome, the stage that produced it, a stable code, and a redacted
//! message. Decision codes are part of the wire contract and must never be
//! renamed once released.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Outcome & Stage
// ============================================================================

/// Decision outcome for a request.
///
/// # Invariants
/// - Variants are stable for serialization and receipt hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Request allowed and executed.
    Allow,
    /// Request denied at some stage.
    Deny,
}

/// Pipeline stage that produced a decision.
///
/// # Invariants
/// - Variants are stable for serialization and receipt hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Request body shape validation.
    Validation,
    /// Signature and replay-guard checks.
    Authentication,
    /// Capability and grant policy evaluation.
    Policy,
    /// Template or dynamic query execution.
    Execution,
    /// Service-level failures (timeouts, adapter init, internal errors).
    Service,
}

impl Stage {
    /// Returns the stable wire label for the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Policy => "policy",
            Self::Execution => "execution",
            Self::Service => "service",
        }
    }
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Canonical decision record for a single request.
///
/// # Invariants
/// - `code` is drawn from [`codes`]; messages are redacted and stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Allow or deny outcome.
    pub outcome: Outcome,
    /// Stage that produced the decision.
    pub stage: Stage,
    /// Stable decision code.
    pub code: String,
    /// Redacted human-readable message.
    pub message: String,
}

impl Decision {
    /// Builds an allow decision.
    #[must_use]
    pub fn allow(stage: Stage, code: &str, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Allow,
            stage,
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Builds a deny decision.
    #[must_use]
    pub fn deny(stage: Stage, code: &str, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Deny,
            stage,
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Returns true when the outcome is allow.
    #[must_use]
    pub const fn is_allow(&self) -> bool {
        matches!(self.outcome, Outcome::Allow)
    }
}

// ============================================================================
// SECTION: Decision Codes
// ============================================================================

/// Stable decision and response codes surfaced on the wire.
pub mod codes {
    // ------------------------------------------------------------------
    // Success
    // ------------------------------------------------------------------
    /// Request passed every stage.
    pub const ALLOWED: &str = "ALLOWED";
    /// Schema submission accepted for forwarding; nothing mutated.
    pub const SUBMISSION_FORWARDED: &str = "SUBMISSION_FORWARDED";
    /// A2A task accepted for background execution.
    pub const A2A_TASK_ACCEPTED: &str = "A2A_TASK_ACCEPTED";
    /// A2A idempotent replay of a previously accepted task.
    pub const A2A_TASK_REPLAY: &str = "A2A_TASK_REPLAY";

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    /// Request body failed shape or required-field validation.
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------
    /// Auth block or required headers absent.
    pub const MISSING_AUTH: &str = "MISSING_AUTH";
    /// Recovered signer does not match the claimed identity.
    pub const SIGNER_MISMATCH: &str = "SIGNER_MISMATCH";
    /// Signature bytes could not be decoded.
    pub const SIGNATURE_DECODE_FAILED: &str = "SIGNATURE_DECODE_FAILED";
    /// Signed timestamp is older than the nonce TTL window.
    pub const STALE_TIMESTAMP: &str = "STALE_TIMESTAMP";
    /// Signed timestamp is further in the future than the allowed skew.
    pub const FUTURE_TIMESTAMP: &str = "FUTURE_TIMESTAMP";
    /// Nonce already observed within the TTL window.
    pub const NONCE_REPLAY: &str = "NONCE_REPLAY";
    /// A2A nonce already observed within the TTL window.
    pub const A2A_NONCE_REPLAY: &str = "A2A_NONCE_REPLAY";
    /// A2A auth headers absent or incomplete.
    pub const A2A_MISSING_AUTH: &str = "A2A_MISSING_AUTH";
    /// No signing scheme configured for the calling agent.
    pub const A2A_SIGNER_NOT_CONFIGURED: &str = "A2A_SIGNER_NOT_CONFIGURED";
    /// A2A signature did not verify.
    pub const A2A_SIGNATURE_MISMATCH: &str = "A2A_SIGNATURE_MISMATCH";
    /// Calling agent is not in the allowlist.
    pub const A2A_AGENT_NOT_ALLOWED: &str = "A2A_AGENT_NOT_ALLOWED";

    // ------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------
    /// Capability is not a key in the active rule set.
    pub const UNKNOWN_CAPABILITY: &str = "UNKNOWN_CAPABILITY";
    /// Requester is not in the capability's allowlist.
    pub const REQUESTER_NOT_ALLOWED: &str = "REQUESTER_NOT_ALLOWED";
    /// Template is not in the capability's template set.
    pub const TEMPLATE_NOT_ALLOWED: &str = "TEMPLATE_NOT_ALLOWED";
    /// Capability mode suffix conflicts with the template mode.
    pub const CAPABILITY_MODE_MISMATCH: &str = "CAPABILITY_MODE_MISMATCH";
    /// A matching grant carries an explicit deny effect.
    pub const POLICY_DENIED_EXPLICIT_DENY: &str = "POLICY_DENIED_EXPLICIT_DENY";
    /// No grant matched the requested scope and operation.
    pub const POLICY_NO_MATCHING_GRANT: &str = "POLICY_NO_MATCHING_GRANT";
    /// AI-assisted apply lacks a matching approval record.
    pub const AI_APPROVAL_REQUIRED: &str = "AI_APPROVAL_REQUIRED";
    /// Revoke asserted a signature hash that does not match the grant.
    pub const GRANT_SIGNATURE_HASH_MISMATCH: &str = "GRANT_SIGNATURE_HASH_MISMATCH";
    /// A2A task type is not allowed for the calling agent.
    pub const A2A_TASK_NOT_ALLOWED: &str = "A2A_TASK_NOT_ALLOWED";

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------
    /// Template name is not registered.
    pub const UNKNOWN_QUERY_TEMPLATE: &str = "UNKNOWN_QUERY_TEMPLATE";
    /// Required parameter absent with no default.
    pub const MISSING_PARAM: &str = "MISSING_PARAM";
    /// Parameter present with the wrong JSON type.
    pub const INVALID_PARAM_TYPE: &str = "INVALID_PARAM_TYPE";
    /// Integer parameter outside its configured range.
    pub const INVALID_PARAM_RANGE: &str = "INVALID_PARAM_RANGE";
    /// String parameter outside its configured length bounds.
    pub const INVALID_PARAM_LENGTH: &str = "INVALID_PARAM_LENGTH";
    /// Parameter failed format parsing (address or ISO date).
    pub const INVALID_PARAM_FORMAT: &str = "INVALID_PARAM_FORMAT";
    /// Enum parameter value outside the allowed set.
    pub const INVALID_PARAM_VALUE: &str = "INVALID_PARAM_VALUE";
    /// Parameter name not declared by the template.
    pub const UNKNOWN_PARAM: &str = "UNKNOWN_PARAM";
    /// Template has no SQL for the adapter dialect.
    pub const UNSUPPORTED_DIALECT: &str = "UNSUPPORTED_DIALECT";
    /// Adapter execution failed.
    pub const DB_EXECUTION_FAILED: &str = "DB_EXECUTION_FAILED";
    /// Dynamic table name absent from the tenant schema registry.
    pub const UNKNOWN_TABLE: &str = "UNKNOWN_TABLE";
    /// Dynamic column name absent from the tenant schema registry.
    pub const UNKNOWN_COLUMN: &str = "UNKNOWN_COLUMN";

    // ------------------------------------------------------------------
    // Service
    // ------------------------------------------------------------------
    /// Database adapter unavailable or initialization failed.
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    /// Request exceeded its deadline.
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    /// Unexpected internal failure.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    /// Background task exceeded its execution deadline.
    pub const TASK_EXECUTION_TIMEOUT: &str = "TASK_EXECUTION_TIMEOUT";
    /// Attempted transition out of a terminal task state.
    pub const TASK_ALREADY_TERMINAL: &str = "TASK_ALREADY_TERMINAL";

    // ------------------------------------------------------------------
    // Idempotency
    // ------------------------------------------------------------------
    /// Idempotency key reused with a different canonical body hash.
    pub const IDEMPOTENCY_KEY_REUSED_WITH_DIFFERENT_PAYLOAD: &str =
        "IDEMPOTENCY_KEY_REUSED_WITH_DIFFERENT_PAYLOAD";

    // ------------------------------------------------------------------
    // Audit
    // ------------------------------------------------------------------
    /// Audit row written successfully.
    pub const AUDIT_LOGGED: &str = "AUDIT_LOGGED";
    /// Audit row write failed; informational only.
    pub const AUDIT_WRITE_FAILED: &str = "AUDIT_WRITE_FAILED";
    /// Audit sink disabled by configuration.
    pub const AUDIT_DISABLED: &str = "AUDIT_DISABLED";
}
