// crates/db-agent-auth/src/lib.rs
// ============================================================================
// Module: Agent Auth Library
// Description: Public API surface for request authentication.
// Purpose: Expose signing envelopes, schemes, and the authenticator.
// Dependencies: crate::{authenticator, evm, hmac, signing}
// ============================================================================

//! ## Overview
//! Authentication for the agent's three channels: wallet-signed queries,
//! wallet-signed policy mutations, and HMAC- or EVM-signed peer-agent
//! requests. All verification runs over canonical signing messages and
//! feeds the shared replay guard.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Request authenticator and signer registry.
pub mod authenticator;
/// EVM `personal_sign` verification.
pub mod evm;
/// HMAC shared-secret scheme.
pub mod hmac;
/// Canonical signing envelopes.
pub mod signing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use authenticator::A2aHeaders;
pub use authenticator::AgentAuthContext;
pub use authenticator::AgentSignerRegistry;
pub use authenticator::AgentSignerScheme;
pub use authenticator::AuthError;
pub use authenticator::Authenticator;
pub use authenticator::SCHEME_EVM;
pub use authenticator::SCHEME_HMAC;
pub use authenticator::SCHEME_UNSIGNED;
pub use authenticator::WalletAuthContext;
pub use evm::EvmError;
pub use evm::personal_sign_digest;
pub use evm::recover_personal_sign;
pub use evm::sign_personal;
pub use evm::signer_address;
pub use self::hmac::MacError;
pub use self::hmac::sign_hmac;
pub use self::hmac::verify_hmac;
pub use signing::A2A_CONTEXT;
pub use signing::A2aSigningEnvelope;
pub use signing::AUTH_CONTEXT;
pub use signing::POLICY_MUTATION_CONTEXT;
pub use signing::PolicyMutationEnvelope;
pub use signing::QuerySigningEnvelope;
pub use signing::a2a_payload_hash;
pub use signing::signing_message;
