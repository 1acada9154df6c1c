// crates/db-agent-auth/src/evm.rs
// ============================================================================
// Module: EVM Personal-Sign Verification
// Description: EIP-191 message hashing and secp256k1 signer recovery.
// Purpose: Verify wallet signatures and derive the signing address.
// Dependencies: db-agent-core, hex, k256, sha3
// ============================================================================

//! ## Overview
//! Wallet requests are signed with `personal_sign`: the message is prefixed
//! per EIP-191 (`\x19Ethereum Signed Message:\n` + byte length), hashed with
//! Keccak-256, and signed with ECDSA over secp256k1. Verification recovers
//! the public key from the 65-byte `r || s || v` signature and derives the
//! signer address from its Keccak-256 digest.
//!
//! Security posture: signatures are untrusted input; decode failures and
//! recovery failures are distinct, stable error codes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use db_agent_core::WalletAddress;
use k256::ecdsa::RecoveryId;
use k256::ecdsa::Signature;
use k256::ecdsa::SigningKey;
use k256::ecdsa::VerifyingKey;
use sha3::Digest;
use sha3::Keccak256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// EVM signature verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// Signature hex or component decoding failed.
    #[error("signature decode failed: {0}")]
    Decode(String),
    /// Public key recovery failed.
    #[error("signer recovery failed")]
    Recovery,
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Computes the EIP-191 `personal_sign` digest of a message.
#[must_use]
pub fn personal_sign_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Derives the EVM address of a verifying key.
#[must_use]
pub fn address_of(key: &VerifyingKey) -> WalletAddress {
    let encoded = key.to_encoded_point(false);
    let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
    let mut address = [0_u8; 20];
    address.copy_from_slice(&digest[12..]);
    WalletAddress::from_bytes(&address)
}

// ============================================================================
// SECTION: Recovery
// ============================================================================

/// Recovers the signer address of a `personal_sign` signature.
///
/// Accepts `0x`-prefixed or bare hex; the trailing recovery byte may be
/// `0/1` or the legacy `27/28` form.
///
/// # Errors
///
/// Returns [`EvmError::Decode`] on malformed signatures and
/// [`EvmError::Recovery`] when no public key can be recovered.
pub fn recover_personal_sign(message: &str, signature_hex: &str) -> Result<WalletAddress, EvmError> {
    let trimmed = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(trimmed).map_err(|err| EvmError::Decode(err.to_string()))?;
    if bytes.len() != 65 {
        return Err(EvmError::Decode(format!("expected 65 bytes, found {}", bytes.len())));
    }
    let signature =
        Signature::from_slice(&bytes[..64]).map_err(|err| EvmError::Decode(err.to_string()))?;
    let v = bytes[64];
    let recovery_byte = if v >= 27 { v - 27 } else { v };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or_else(|| {
            EvmError::Decode(format!("invalid recovery byte: {v}"))
        })?;
    let digest = personal_sign_digest(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| EvmError::Recovery)?;
    Ok(address_of(&key))
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Produces a `personal_sign` signature with a local key.
///
/// Used by operational tooling and tests; the server itself never signs.
///
/// # Errors
///
/// Returns [`EvmError::Recovery`] when the key cannot sign the digest.
pub fn sign_personal(key: &SigningKey, message: &str) -> Result<String, EvmError> {
    let digest = personal_sign_digest(message);
    let (signature, recovery_id) =
        key.sign_prehash_recoverable(&digest).map_err(|_| EvmError::Recovery)?;
    let mut bytes = signature.to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Derives the address controlled by a signing key.
#[must_use]
pub fn signer_address(key: &SigningKey) -> WalletAddress {
    address_of(key.verifying_key())
}
