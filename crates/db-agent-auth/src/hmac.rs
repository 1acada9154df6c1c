// crates/db-agent-auth/src/hmac.rs
// ============================================================================
// Module: HMAC Shared-Secret Scheme
// Description: HMAC-SHA256 signing and constant-time verification.
// Purpose: Authenticate peer agents holding a shared secret.
// Dependencies: hex, hmac, sha2, subtle
// ============================================================================

//! ## Overview
//! Peer agents without an EVM signer authenticate with
//! `hex(hmac_sha256(shared_secret, signing_message))`. Verification decodes
//! the presented hex and compares against the expected MAC in constant
//! time.
//!
//! Security posture: the comparison must not early-return on mismatch; all
//! failures collapse into a single mismatch signal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// HMAC-SHA256 instantiation used for agent signatures.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// HMAC verification failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MacError {
    /// Presented signature did not match the expected MAC.
    #[error("hmac signature mismatch")]
    Mismatch,
}

// ============================================================================
// SECTION: Signing & Verification
// ============================================================================

/// Computes the hex-encoded HMAC-SHA256 of a message.
///
/// HMAC accepts keys of any length, so construction cannot fail; the
/// fallback returns an empty MAC that can never verify.
#[must_use]
pub fn sign_hmac(shared_secret: &str, message: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(shared_secret.as_bytes()) else {
        return String::new();
    };
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded HMAC-SHA256 signature in constant time.
///
/// # Errors
///
/// Returns [`MacError::Mismatch`] on any decode or comparison failure.
pub fn verify_hmac(shared_secret: &str, message: &str, presented: &str) -> Result<(), MacError> {
    let expected = sign_hmac(shared_secret, message);
    let expected_bytes = hex::decode(&expected).map_err(|_| MacError::Mismatch)?;
    let presented_bytes = hex::decode(presented.trim()).map_err(|_| MacError::Mismatch)?;
    if presented_bytes.len() != expected_bytes.len() {
        return Err(MacError::Mismatch);
    }
    if expected_bytes.ct_eq(&presented_bytes).into() {
        Ok(())
    } else {
        Err(MacError::Mismatch)
    }
}
