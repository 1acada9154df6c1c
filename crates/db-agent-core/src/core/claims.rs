// crates/db-agent-core/src/core/claims.rs
// ============================================================================
// Module: Runtime Attestation Claims
// Description: Read-only confidential-runtime claims embedded in receipts.
// Purpose: Surface attestation context without minting or verifying proofs.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The agent runs inside a confidential runtime whose attestation claims are
//! provided by the environment. The core never mints or verifies
//! attestations; it embeds whatever claims the runtime exposes into the
//! verification facet of every receipt, together with a canonical hash of
//! the claim set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json_hex;

// ============================================================================
// SECTION: Verification Status
// ============================================================================

/// Attestation verification status reported by the runtime.
///
/// # Invariants
/// - Variants are stable for serialization and receipt hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Claims were verified by the runtime provider.
    Verified,
    /// Claims are present but unverified.
    Unverified,
}

// ============================================================================
// SECTION: Runtime Claims
// ============================================================================

/// Claim set surfaced by the confidential runtime.
///
/// # Invariants
/// - All fields are read-only snapshots; absent claims serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeClaims {
    /// Trust model label (for example `eigen-compute`).
    pub trust_model: String,
    /// Application identifier registered with the runtime.
    pub app_id: Option<String>,
    /// Digest of the container image measured at launch.
    pub image_digest: Option<String>,
    /// Hash of the raw attestation report.
    pub attestation_report_hash: Option<String>,
    /// Transaction hash of the onchain deployment record.
    pub onchain_deployment_tx_hash: Option<String>,
    /// Verification status reported by the runtime.
    pub verification_status: VerificationStatus,
    /// Whether the claim set is considered verified.
    pub verified: bool,
}

impl RuntimeClaims {
    /// Builds an unverified, claim-free snapshot for local development.
    #[must_use]
    pub fn unverified(trust_model: impl Into<String>) -> Self {
        Self {
            trust_model: trust_model.into(),
            app_id: None,
            image_digest: None,
            attestation_report_hash: None,
            onchain_deployment_tx_hash: None,
            verification_status: VerificationStatus::Unverified,
            verified: false,
        }
    }

    /// Computes the canonical hash over the claim set.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn claims_hash(&self) -> Result<String, HashError> {
        hash_canonical_json_hex(self)
    }
}
