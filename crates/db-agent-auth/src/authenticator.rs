// crates/db-agent-auth/src/authenticator.rs
// ============================================================================
// Module: Request Authenticator
// Description: Scheme dispatch, signature verification, and replay checks.
// Purpose: Authenticate wallet and peer-agent requests fail-closed.
// Dependencies: db-agent-core, crate::{evm, hmac, signing}
// ============================================================================

//! ## Overview
//! The authenticator verifies each channel's signature over its canonical
//! signing message and then drives the replay guard. Wallet channels use
//! EVM `personal_sign`; peer agents use either an HMAC shared secret or a
//! registered EVM signer. Allow-unsigned mode skips signature verification
//! only — timestamp and nonce checks always run.
//!
//! Security posture: every decision here is fail-closed and surfaces a
//! stable decision code; messages never echo signatures or secrets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use db_agent_core::AgentId;
use db_agent_core::NonceScope;
use db_agent_core::ReplayError;
use db_agent_core::ReplayGuard;
use db_agent_core::SharedClock;
use db_agent_core::Timestamp;
use db_agent_core::WalletAddress;
use db_agent_core::codes;
use serde_json::Value;
use thiserror::Error;

use crate::evm::EvmError;
use crate::evm::recover_personal_sign;
use crate::hmac::verify_hmac;
use crate::signing::A2A_CONTEXT;
use crate::signing::A2aSigningEnvelope;
use crate::signing::AUTH_CONTEXT;
use crate::signing::POLICY_MUTATION_CONTEXT;
use crate::signing::PolicyMutationEnvelope;
use crate::signing::QuerySigningEnvelope;
use crate::signing::a2a_payload_hash;
use crate::signing::signing_message;

// ============================================================================
// SECTION: Scheme Labels
// ============================================================================

/// Wire label for the EVM `personal_sign` scheme.
pub const SCHEME_EVM: &str = "evm-personal-sign";
/// Wire label for the HMAC shared-secret scheme.
pub const SCHEME_HMAC: &str = "hmac-sha256";
/// Wire label used when signature verification is disabled.
pub const SCHEME_UNSIGNED: &str = "unsigned";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication failures with stable decision codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Auth block absent or malformed.
    #[error("missing or malformed auth: {0}")]
    MissingAuth(String),
    /// Recovered signer does not match the claimed wallet.
    #[error("recovered signer does not match requester")]
    SignerMismatch,
    /// Signature could not be decoded or recovered.
    #[error("signature decode failed: {0}")]
    SignatureDecode(String),
    /// Replay guard rejection (stale, future, or replayed nonce).
    #[error("replay guard rejected the request")]
    Replay(ReplayError),
    /// A2A headers absent or incomplete.
    #[error("missing a2a auth header: {0}")]
    A2aMissingAuth(String),
    /// Calling agent has no configured signing scheme.
    #[error("no signer configured for agent")]
    A2aSignerNotConfigured,
    /// A2A signature did not verify.
    #[error("a2a signature mismatch")]
    A2aSignatureMismatch,
    /// Calling agent is not allowlisted.
    #[error("agent is not allowed")]
    A2aAgentNotAllowed,
}

impl AuthError {
    /// Returns the stable decision code for this failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingAuth(_) => codes::MISSING_AUTH,
            Self::SignerMismatch => codes::SIGNER_MISMATCH,
            Self::SignatureDecode(_) => codes::SIGNATURE_DECODE_FAILED,
            Self::Replay(inner) => inner.code(),
            Self::A2aMissingAuth(_) => codes::A2A_MISSING_AUTH,
            Self::A2aSignerNotConfigured => codes::A2A_SIGNER_NOT_CONFIGURED,
            Self::A2aSignatureMismatch => codes::A2A_SIGNATURE_MISMATCH,
            Self::A2aAgentNotAllowed => codes::A2A_AGENT_NOT_ALLOWED,
        }
    }
}

// ============================================================================
// SECTION: Agent Signer Registry
// ============================================================================

/// Signing scheme registered for a peer agent.
#[derive(Debug, Clone)]
pub enum AgentSignerScheme {
    /// HMAC-SHA256 shared secret.
    HmacSha256 {
        /// Shared secret material.
        shared_secret: String,
    },
    /// Registered EVM signer address.
    EvmPersonalSign {
        /// Expected signer address.
        signer: WalletAddress,
    },
}

/// Registry of peer-agent signing schemes and the optional agent allowlist.
///
/// # Invariants
/// - When `allowlist` is set, agents outside it are rejected before any
///   signer lookup.
#[derive(Debug, Clone, Default)]
pub struct AgentSignerRegistry {
    /// Agent id to signing scheme.
    signers: BTreeMap<String, AgentSignerScheme>,
    /// Optional allowlist of agent ids.
    allowlist: Option<BTreeSet<String>>,
}

impl AgentSignerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a signing scheme for an agent.
    pub fn register(&mut self, agent_id: impl Into<String>, scheme: AgentSignerScheme) {
        self.signers.insert(agent_id.into(), scheme);
    }

    /// Restricts intake to the given agent ids.
    pub fn restrict_to<I, S>(&mut self, agents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = Some(agents.into_iter().map(Into::into).collect());
    }

    /// Returns the scheme for an agent when registered.
    #[must_use]
    pub fn scheme(&self, agent_id: &str) -> Option<&AgentSignerScheme> {
        self.signers.get(agent_id)
    }

    /// Returns true when the agent passes the allowlist.
    #[must_use]
    pub fn is_allowed(&self, agent_id: &str) -> bool {
        self.allowlist.as_ref().is_none_or(|allowed| allowed.contains(agent_id))
    }
}

// ============================================================================
// SECTION: Auth Contexts
// ============================================================================

/// Authenticated wallet caller context.
#[derive(Debug, Clone)]
pub struct WalletAuthContext {
    /// Verified requester wallet.
    pub requester: WalletAddress,
    /// Signature scheme label.
    pub scheme: &'static str,
    /// Caller-chosen nonce.
    pub nonce: String,
    /// Parsed signed-at instant.
    pub signed_at: Timestamp,
}

/// Authenticated peer-agent context.
#[derive(Debug, Clone)]
pub struct AgentAuthContext {
    /// Verified calling agent.
    pub agent_id: AgentId,
    /// Signature scheme label.
    pub scheme: &'static str,
    /// Caller-chosen nonce.
    pub nonce: String,
    /// Parsed signed-at instant.
    pub signed_at: Timestamp,
    /// Idempotency key header when present.
    pub idempotency_key: Option<String>,
    /// Correlation id header when present.
    pub correlation_id: Option<String>,
}

/// A2A auth headers extracted from the request.
#[derive(Debug, Clone, Default)]
pub struct A2aHeaders {
    /// `x-agent-id` header.
    pub agent_id: Option<String>,
    /// `x-agent-timestamp` header.
    pub timestamp: Option<String>,
    /// `x-agent-nonce` header.
    pub nonce: Option<String>,
    /// `x-agent-signature` header.
    pub signature: Option<String>,
    /// `x-idempotency-key` header.
    pub idempotency_key: Option<String>,
    /// `x-correlation-id` header.
    pub correlation_id: Option<String>,
}

// ============================================================================
// SECTION: Authenticator
// ============================================================================

/// Scheme-dispatching authenticator shared by every channel.
///
/// # Invariants
/// - Timestamp and nonce checks run even in allow-unsigned mode.
pub struct Authenticator {
    /// Whether signature verification is enforced.
    auth_enabled: bool,
    /// Replay guard shared across channels.
    replay: Arc<ReplayGuard>,
    /// Injectable clock.
    clock: SharedClock,
    /// Peer-agent signer registry.
    agents: AgentSignerRegistry,
}

impl Authenticator {
    /// Builds an authenticator.
    #[must_use]
    pub fn new(
        auth_enabled: bool,
        replay: Arc<ReplayGuard>,
        clock: SharedClock,
        agents: AgentSignerRegistry,
    ) -> Self {
        Self {
            auth_enabled,
            replay,
            clock,
            agents,
        }
    }

    /// Returns the shared replay guard.
    #[must_use]
    pub fn replay_guard(&self) -> Arc<ReplayGuard> {
        Arc::clone(&self.replay)
    }

    /// Verifies a wallet-signed query request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on any signature, timestamp, or nonce failure.
    pub fn verify_query(
        &self,
        claimed: &WalletAddress,
        envelope: &QuerySigningEnvelope,
        signature: Option<&str>,
    ) -> Result<WalletAuthContext, AuthError> {
        let message = signing_message(AUTH_CONTEXT, envelope)
            .map_err(|err| AuthError::MissingAuth(err.to_string()))?;
        let scheme = self.verify_wallet_signature(claimed, &message, signature)?;
        let signed_at = parse_signed_at(&envelope.signed_at)?;
        self.observe(NonceScope::UserQuery, &envelope.nonce, &signed_at)?;
        Ok(WalletAuthContext {
            requester: claimed.clone(),
            scheme,
            nonce: envelope.nonce.clone(),
            signed_at,
        })
    }

    /// Verifies a wallet-signed policy mutation.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on any signature, timestamp, or nonce failure.
    pub fn verify_policy_mutation(
        &self,
        claimed: &WalletAddress,
        envelope: &PolicyMutationEnvelope,
        signature: Option<&str>,
    ) -> Result<WalletAuthContext, AuthError> {
        let message = signing_message(POLICY_MUTATION_CONTEXT, envelope)
            .map_err(|err| AuthError::MissingAuth(err.to_string()))?;
        let scheme = self.verify_wallet_signature(claimed, &message, signature)?;
        let signed_at = parse_signed_at(&envelope.signed_at)?;
        self.observe(NonceScope::PolicyMutation, &envelope.nonce, &signed_at)?;
        Ok(WalletAuthContext {
            requester: claimed.clone(),
            scheme,
            nonce: envelope.nonce.clone(),
            signed_at,
        })
    }

    /// Verifies an agent-to-agent request from its auth headers.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] on missing headers, unknown agents, signature
    /// mismatches, or replay-guard rejections.
    pub fn verify_a2a(
        &self,
        headers: &A2aHeaders,
        method: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<AgentAuthContext, AuthError> {
        let agent_id = require_header(headers.agent_id.as_deref(), "x-agent-id")?;
        let timestamp = require_header(headers.timestamp.as_deref(), "x-agent-timestamp")?;
        let nonce = require_header(headers.nonce.as_deref(), "x-agent-nonce")?;
        if !self.agents.is_allowed(agent_id) {
            return Err(AuthError::A2aAgentNotAllowed);
        }
        let payload_hash =
            a2a_payload_hash(body).map_err(|err| AuthError::A2aMissingAuth(err.to_string()))?;
        let envelope = A2aSigningEnvelope {
            agent_id: agent_id.to_string(),
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
            correlation_id: headers.correlation_id.clone(),
            idempotency_key: headers.idempotency_key.clone(),
            payload_hash,
        };
        let message = signing_message(A2A_CONTEXT, &envelope)
            .map_err(|err| AuthError::A2aMissingAuth(err.to_string()))?;
        let scheme = if self.auth_enabled {
            let signature = require_header(headers.signature.as_deref(), "x-agent-signature")?;
            match self.agents.scheme(agent_id) {
                None => return Err(AuthError::A2aSignerNotConfigured),
                Some(AgentSignerScheme::HmacSha256 {
                    shared_secret,
                }) => {
                    verify_hmac(shared_secret, &message, signature)
                        .map_err(|_| AuthError::A2aSignatureMismatch)?;
                    SCHEME_HMAC
                }
                Some(AgentSignerScheme::EvmPersonalSign {
                    signer,
                }) => {
                    let recovered = recover_personal_sign(&message, signature)
                        .map_err(|_| AuthError::A2aSignatureMismatch)?;
                    if recovered != *signer {
                        return Err(AuthError::A2aSignatureMismatch);
                    }
                    SCHEME_EVM
                }
            }
        } else {
            SCHEME_UNSIGNED
        };
        let signed_at = Timestamp::parse(timestamp)
            .map_err(|err| AuthError::A2aMissingAuth(err.to_string()))?;
        self.observe(NonceScope::A2a, nonce, &signed_at)?;
        Ok(AgentAuthContext {
            agent_id: AgentId::from(agent_id),
            scheme,
            nonce: nonce.to_string(),
            signed_at,
            idempotency_key: headers.idempotency_key.clone(),
            correlation_id: headers.correlation_id.clone(),
        })
    }

    /// Verifies a wallet signature over the signing message.
    fn verify_wallet_signature(
        &self,
        claimed: &WalletAddress,
        message: &str,
        signature: Option<&str>,
    ) -> Result<&'static str, AuthError> {
        if !self.auth_enabled {
            return Ok(SCHEME_UNSIGNED);
        }
        let Some(signature) = signature else {
            return Err(AuthError::MissingAuth("signature is required".to_string()));
        };
        let recovered = recover_personal_sign(message, signature).map_err(|err| match err {
            EvmError::Decode(detail) => AuthError::SignatureDecode(detail),
            EvmError::Recovery => AuthError::SignatureDecode("recovery failed".to_string()),
        })?;
        if recovered != *claimed {
            return Err(AuthError::SignerMismatch);
        }
        Ok(SCHEME_EVM)
    }

    /// Runs the replay guard for a channel.
    fn observe(
        &self,
        scope: NonceScope,
        nonce: &str,
        signed_at: &Timestamp,
    ) -> Result<(), AuthError> {
        let now = self.clock.now();
        self.replay.observe(scope, nonce, signed_at, &now).map_err(AuthError::Replay)
    }
}

/// Parses the signed-at field of a wallet envelope.
fn parse_signed_at(raw: &str) -> Result<Timestamp, AuthError> {
    Timestamp::parse(raw)
        .map_err(|_| AuthError::MissingAuth("signedAt is not a valid timestamp".to_string()))
}

/// Requires a header value, naming the header on failure.
fn require_header<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AuthError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AuthError::A2aMissingAuth(name.to_string())),
    }
}
