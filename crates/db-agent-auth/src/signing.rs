// crates/db-agent-auth/src/signing.rs
// ============================================================================
// Module: Signing Messages
// Description: Canonical signing envelopes for every auth channel.
// Purpose: Build the exact byte strings wallets and agents sign.
// Dependencies: db-agent-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Each auth channel signs a context line followed by the canonical JSON of
//! its envelope. The envelope fields are fixed per channel and the JSON is
//! RFC 8785 canonical, so the signed bytes are reproducible on both sides.
//!
//! Security posture: envelopes echo caller-supplied strings verbatim;
//! any normalization before signing would break verification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use db_agent_core::HashError;
use db_agent_core::canonical_json_bytes;
use db_agent_core::hash_canonical_json_hex;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Contexts
// ============================================================================

/// Context line for wallet-signed query requests.
pub const AUTH_CONTEXT: &str = "PRIVATE_DB_AGENT_AUTH_V1";
/// Context line for wallet-signed policy mutations.
pub const POLICY_MUTATION_CONTEXT: &str = "PRIVATE_DB_AGENT_POLICY_MUTATION_V1";
/// Context line for agent-to-agent requests.
pub const A2A_CONTEXT: &str = "PRIVATE_DB_AGENT_A2A_V1";

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// Signing envelope for `/v1/query` requests.
///
/// # Invariants
/// - Field values are the caller's wire strings, unnormalized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySigningEnvelope {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Tenant scope when present.
    pub tenant_id: Option<String>,
    /// Claimed requester wallet address.
    pub requester: String,
    /// Requested capability.
    pub capability: String,
    /// Requested template name.
    pub query_template: String,
    /// Caller-supplied parameters.
    pub query_params: Value,
    /// Caller-chosen nonce.
    pub nonce: String,
    /// Caller-signed timestamp string.
    pub signed_at: String,
}

/// Signing envelope for policy mutation requests.
///
/// # Invariants
/// - `payload` is the action-specific canonical sub-object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMutationEnvelope {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Tenant scope.
    pub tenant_id: String,
    /// Claimed acting wallet address.
    pub actor_wallet: String,
    /// Mutation action label.
    pub action: String,
    /// Action-specific payload.
    pub payload: Value,
    /// Caller-chosen nonce.
    pub nonce: String,
    /// Caller-signed timestamp string.
    pub signed_at: String,
}

/// Signing envelope for agent-to-agent requests.
///
/// # Invariants
/// - `method` is uppercased; absent optional headers serialize as `null`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aSigningEnvelope {
    /// Calling agent identifier.
    pub agent_id: String,
    /// Uppercased HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Caller-signed timestamp string.
    pub timestamp: String,
    /// Caller-chosen nonce.
    pub nonce: String,
    /// Correlation identifier or null.
    pub correlation_id: Option<String>,
    /// Idempotency key or null.
    pub idempotency_key: Option<String>,
    /// Canonical hash of the request body.
    pub payload_hash: String,
}

// ============================================================================
// SECTION: Message Construction
// ============================================================================

/// Builds the signing message for an envelope under a context line.
///
/// # Errors
///
/// Returns [`HashError`] when the envelope cannot be canonicalized.
pub fn signing_message<T: Serialize>(context: &str, envelope: &T) -> Result<String, HashError> {
    let canonical = canonical_json_bytes(envelope)?;
    let body = String::from_utf8(canonical)
        .map_err(|err| HashError::Canonicalization(err.to_string()))?;
    Ok(format!("{context}\n{body}"))
}

/// Hashes a request body the way the A2A envelope expects.
///
/// Absent bodies hash as the empty object.
///
/// # Errors
///
/// Returns [`HashError`] when the body cannot be canonicalized.
pub fn a2a_payload_hash(body: Option<&Value>) -> Result<String, HashError> {
    match body {
        Some(value) => hash_canonical_json_hex(value),
        None => hash_canonical_json_hex(&Value::Object(serde_json::Map::new())),
    }
}
