// crates/db-agent-core/src/core/receipt.rs
// ============================================================================
// Module: Decision Receipts
// Description: Deterministic triple-hash receipts over request decisions.
// Purpose: Give every request a tamper-evident, replayable receipt.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A receipt binds three facets — the request, the decision, and the
//! verification context — through canonical-JSON SHA-256 hashes. Identical
//! inputs under the same configured clock and runtime claims produce
//! byte-identical receipts. When receipts are disabled by configuration the
//! service yields `None` and callers surface an explicit `null`, never an
//! empty object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::adapter::Dialect;
use crate::core::claims::RuntimeClaims;
use crate::core::decision::Decision;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_bytes;
use crate::core::hashing::hash_canonical_json_hex;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;

// ============================================================================
// SECTION: Facets
// ============================================================================

/// Request facet captured in every receipt.
///
/// # Invariants
/// - `auth_nonce` and `auth_signed_at` echo the caller's values verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFacet {
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
    /// Caller-supplied parameters or mutation payload.
    pub query_params: Value,
    /// Auth nonce echoed verbatim.
    pub auth_nonce: String,
    /// Auth signed-at echoed verbatim.
    pub auth_signed_at: String,
}

/// Runtime block of the verification facet.
///
/// # Invariants
/// - `claims_hash` is the canonical hash of the claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRuntime {
    /// Runtime claim snapshot.
    #[serde(flatten)]
    pub claims: RuntimeClaims,
    /// Canonical hash over the claim set.
    pub claims_hash: String,
}

/// Verification facet captured in every receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationFacet {
    /// Service name issuing the receipt.
    pub service: String,
    /// Runtime claims block.
    pub runtime: VerificationRuntime,
    /// Dialect of the backing database adapter.
    pub database_dialect: Dialect,
}

// ============================================================================
// SECTION: Receipt
// ============================================================================

/// Tamper-evident decision receipt.
///
/// # Invariants
/// - `receipt_id` is derived from the three facet hashes and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Receipt identifier (`rcpt_` + 16 hex chars).
    pub receipt_id: String,
    /// Canonical hash of the request facet.
    pub request_hash: String,
    /// Canonical hash of the decision facet.
    pub decision_hash: String,
    /// Canonical hash of the verification facet.
    pub verification_hash: String,
    /// Verification facet embedded for offline recomputation.
    pub verification: VerificationFacet,
}

// ============================================================================
// SECTION: Receipt Service
// ============================================================================

/// Builds deterministic receipts for the pipeline.
///
/// # Invariants
/// - The verification facet is fixed at construction; receipts vary only
///   with the request and decision facets.
#[derive(Debug, Clone)]
pub struct ReceiptService {
    /// Whether receipts are enabled.
    enabled: bool,
    /// Precomputed verification facet.
    verification: VerificationFacet,
}

impl ReceiptService {
    /// Builds a receipt service from the runtime context.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the claim set cannot be canonicalized.
    pub fn new(
        enabled: bool,
        service: impl Into<String>,
        claims: RuntimeClaims,
        dialect: Dialect,
    ) -> Result<Self, HashError> {
        let claims_hash = claims.claims_hash()?;
        Ok(Self {
            enabled,
            verification: VerificationFacet {
                service: service.into(),
                runtime: VerificationRuntime {
                    claims,
                    claims_hash,
                },
                database_dialect: dialect,
            },
        })
    }

    /// Returns the precomputed verification facet.
    #[must_use]
    pub const fn verification(&self) -> &VerificationFacet {
        &self.verification
    }

    /// Builds a receipt for the given facets.
    ///
    /// Returns `None` when receipts are disabled.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when a facet cannot be canonicalized.
    pub fn build(
        &self,
        request: &RequestFacet,
        decision: &Decision,
    ) -> Result<Option<Receipt>, HashError> {
        if !self.enabled {
            return Ok(None);
        }
        let request_hash = hash_canonical_json_hex(request)?;
        let decision_hash = hash_canonical_json_hex(decision)?;
        let verification_hash = hash_canonical_json_hex(&self.verification)?;
        let receipt_id = derive_receipt_id(&request_hash, &decision_hash, &verification_hash);
        Ok(Some(Receipt {
            receipt_id,
            request_hash,
            decision_hash,
            verification_hash,
            verification: self.verification.clone(),
        }))
    }
}

/// Derives the receipt identifier from the three facet hashes.
#[must_use]
pub fn derive_receipt_id(
    request_hash: &str,
    decision_hash: &str,
    verification_hash: &str,
) -> String {
    let mut concatenated =
        String::with_capacity(request_hash.len() + decision_hash.len() + verification_hash.len());
    concatenated.push_str(request_hash);
    concatenated.push_str(decision_hash);
    concatenated.push_str(verification_hash);
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, concatenated.as_bytes());
    let short = &digest.value[..16];
    format!("rcpt_{short}")
}
