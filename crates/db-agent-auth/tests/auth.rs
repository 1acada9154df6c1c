// crates/db-agent-auth/tests/auth.rs
// ============================================================================
// Module: Authenticator Tests
// Description: Signature schemes, signer dispatch, and replay integration.
// ============================================================================
//! ## Overview
//! Exercises both signature schemes end to end: `personal_sign` recovery
//! against the signing envelopes, HMAC verification, allow-unsigned mode,
//! and the replay guard wiring for each channel.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use db_agent_auth::A2aHeaders;
use db_agent_auth::AgentSignerRegistry;
use db_agent_auth::AgentSignerScheme;
use db_agent_auth::AuthError;
use db_agent_auth::Authenticator;
use db_agent_auth::QuerySigningEnvelope;
use db_agent_auth::SCHEME_EVM;
use db_agent_auth::SCHEME_HMAC;
use db_agent_auth::SCHEME_UNSIGNED;
use db_agent_auth::a2a_payload_hash;
use db_agent_auth::recover_personal_sign;
use db_agent_auth::sign_hmac;
use db_agent_auth::sign_personal;
use db_agent_auth::signer_address;
use db_agent_auth::signing_message;
use db_agent_auth::verify_hmac;
use db_agent_auth::A2A_CONTEXT;
use db_agent_auth::A2aSigningEnvelope;
use db_agent_auth::AUTH_CONTEXT;
use db_agent_core::FixedClock;
use db_agent_core::NonceScope;
use db_agent_core::ReplayConfig;
use db_agent_core::ReplayError;
use db_agent_core::ReplayGuard;
use db_agent_core::WalletAddress;
use k256::ecdsa::SigningKey;
use serde_json::json;

const NOW: &str = "2026-02-17T10:00:30Z";
const SIGNED_AT: &str = "2026-02-17T10:00:00Z";

fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[0x42; 32]).expect("test key")
}

fn other_key() -> SigningKey {
    SigningKey::from_slice(&[0x43; 32]).expect("test key")
}

fn envelope(requester: &WalletAddress, nonce: &str) -> QuerySigningEnvelope {
    QuerySigningEnvelope {
        request_id: "req-1".to_string(),
        tenant_id: Some("acme".to_string()),
        requester: requester.as_str().to_string(),
        capability: "balances:read".to_string(),
        query_template: "wallet_balances".to_string(),
        query_params: json!({"walletAddress": requester.as_str()}),
        nonce: nonce.to_string(),
        signed_at: SIGNED_AT.to_string(),
    }
}

fn authenticator(auth_enabled: bool, agents: AgentSignerRegistry) -> Authenticator {
    Authenticator::new(
        auth_enabled,
        Arc::new(ReplayGuard::new(ReplayConfig::default())),
        Arc::new(FixedClock::parse(NOW).expect("clock")),
        agents,
    )
}

// ============================================================================
// SECTION: Scheme Primitives
// ============================================================================

#[test]
fn personal_sign_round_trips_to_the_signer_address() {
    let key = signing_key();
    let message = "PRIVATE_DB_AGENT_AUTH_V1\n{\"k\":\"v\"}";
    let signature = sign_personal(&key, message).expect("sign");
    let recovered = recover_personal_sign(message, &signature).expect("recover");
    assert_eq!(recovered, signer_address(&key));
}

#[test]
fn personal_sign_rejects_malformed_signatures() {
    assert!(recover_personal_sign("m", "0x1234").is_err());
    assert!(recover_personal_sign("m", "not-hex").is_err());
}

#[test]
fn hmac_round_trips_and_rejects_mismatch() {
    let signature = sign_hmac("secret", "message");
    assert!(verify_hmac("secret", "message", &signature).is_ok());
    assert!(verify_hmac("secret", "other-message", &signature).is_err());
    assert!(verify_hmac("other-secret", "message", &signature).is_err());
    assert!(verify_hmac("secret", "message", "zz-not-hex").is_err());
}

#[test]
fn signing_message_prefixes_context_over_canonical_json() {
    let message = signing_message(AUTH_CONTEXT, &json!({"b": 1, "a": 2})).expect("message");
    assert_eq!(message, "PRIVATE_DB_AGENT_AUTH_V1\n{\"a\":2,\"b\":1}");
}

// ============================================================================
// SECTION: Wallet Query Auth
// ============================================================================

#[test]
fn valid_wallet_signature_authenticates() {
    let key = signing_key();
    let requester = signer_address(&key);
    let envelope = envelope(&requester, "nonce-1");
    let message = signing_message(AUTH_CONTEXT, &envelope).expect("message");
    let signature = sign_personal(&key, &message).expect("sign");

    let auth = authenticator(true, AgentSignerRegistry::new());
    let context =
        auth.verify_query(&requester, &envelope, Some(&signature)).expect("authenticated");
    assert_eq!(context.scheme, SCHEME_EVM);
    assert_eq!(context.requester, requester);
}

#[test]
fn wrong_key_yields_signer_mismatch() {
    let key = signing_key();
    let requester = signer_address(&key);
    let envelope = envelope(&requester, "nonce-1");
    let message = signing_message(AUTH_CONTEXT, &envelope).expect("message");
    let signature = sign_personal(&other_key(), &message).expect("sign");

    let auth = authenticator(true, AgentSignerRegistry::new());
    let err = auth.verify_query(&requester, &envelope, Some(&signature)).expect_err("mismatch");
    assert_eq!(err, AuthError::SignerMismatch);
    assert_eq!(err.code(), "SIGNER_MISMATCH");
}

#[test]
fn garbage_signature_yields_decode_failure() {
    let key = signing_key();
    let requester = signer_address(&key);
    let envelope = envelope(&requester, "nonce-1");

    let auth = authenticator(true, AgentSignerRegistry::new());
    let err = auth.verify_query(&requester, &envelope, Some("0x1234")).expect_err("decode");
    assert_eq!(err.code(), "SIGNATURE_DECODE_FAILED");
}

#[test]
fn missing_signature_is_missing_auth() {
    let key = signing_key();
    let requester = signer_address(&key);
    let envelope = envelope(&requester, "nonce-1");

    let auth = authenticator(true, AgentSignerRegistry::new());
    let err = auth.verify_query(&requester, &envelope, None).expect_err("missing");
    assert_eq!(err.code(), "MISSING_AUTH");
}

#[test]
fn nonce_replay_is_rejected_on_the_second_call() {
    let key = signing_key();
    let requester = signer_address(&key);
    let envelope = envelope(&requester, "nonce-1");
    let message = signing_message(AUTH_CONTEXT, &envelope).expect("message");
    let signature = sign_personal(&key, &message).expect("sign");

    let auth = authenticator(true, AgentSignerRegistry::new());
    auth.verify_query(&requester, &envelope, Some(&signature)).expect("first");
    let err = auth.verify_query(&requester, &envelope, Some(&signature)).expect_err("replay");
    assert_eq!(err, AuthError::Replay(ReplayError::Replay(NonceScope::UserQuery)));
    assert_eq!(err.code(), "NONCE_REPLAY");
}

#[test]
fn allow_unsigned_mode_still_enforces_the_replay_guard() {
    let key = signing_key();
    let requester = signer_address(&key);
    let envelope = envelope(&requester, "nonce-1");

    let auth = authenticator(false, AgentSignerRegistry::new());
    let context = auth.verify_query(&requester, &envelope, None).expect("unsigned");
    assert_eq!(context.scheme, SCHEME_UNSIGNED);

    let err = auth.verify_query(&requester, &envelope, None).expect_err("replay");
    assert_eq!(err.code(), "NONCE_REPLAY");

    let mut stale = self::envelope(&requester, "nonce-2");
    stale.signed_at = "2026-02-17T09:00:00Z".to_string();
    let err = auth.verify_query(&requester, &stale, None).expect_err("stale");
    assert_eq!(err.code(), "STALE_TIMESTAMP");
}

// ============================================================================
// SECTION: A2A Auth
// ============================================================================

fn a2a_headers(agent_id: &str, nonce: &str, signature: Option<String>) -> A2aHeaders {
    A2aHeaders {
        agent_id: Some(agent_id.to_string()),
        timestamp: Some(SIGNED_AT.to_string()),
        nonce: Some(nonce.to_string()),
        signature,
        idempotency_key: Some("idem-1".to_string()),
        correlation_id: None,
    }
}

fn a2a_message(agent_id: &str, nonce: &str, body: &serde_json::Value) -> String {
    let envelope = A2aSigningEnvelope {
        agent_id: agent_id.to_string(),
        method: "POST".to_string(),
        path: "/v1/a2a/tasks".to_string(),
        timestamp: SIGNED_AT.to_string(),
        nonce: nonce.to_string(),
        correlation_id: None,
        idempotency_key: Some("idem-1".to_string()),
        payload_hash: a2a_payload_hash(Some(body)).expect("payload hash"),
    };
    signing_message(A2A_CONTEXT, &envelope).expect("message")
}

#[test]
fn hmac_agent_authenticates() {
    let mut registry = AgentSignerRegistry::new();
    registry.register(
        "agent-a",
        AgentSignerScheme::HmacSha256 {
            shared_secret: "topsecret".to_string(),
        },
    );
    let auth = authenticator(true, registry);
    let body = json!({"taskType": "query.execute", "input": {}});
    let signature = sign_hmac("topsecret", &a2a_message("agent-a", "nonce-1", &body));

    let context = auth
        .verify_a2a(
            &a2a_headers("agent-a", "nonce-1", Some(signature)),
            "post",
            "/v1/a2a/tasks",
            Some(&body),
        )
        .expect("authenticated");
    assert_eq!(context.scheme, SCHEME_HMAC);
    assert_eq!(context.idempotency_key.as_deref(), Some("idem-1"));
}

#[test]
fn evm_agent_authenticates_against_the_registered_signer() {
    let key = signing_key();
    let mut registry = AgentSignerRegistry::new();
    registry.register(
        "agent-a",
        AgentSignerScheme::EvmPersonalSign {
            signer: signer_address(&key),
        },
    );
    let auth = authenticator(true, registry);
    let body = json!({"taskType": "query.execute", "input": {}});
    let signature =
        sign_personal(&key, &a2a_message("agent-a", "nonce-1", &body)).expect("sign");

    let context = auth
        .verify_a2a(
            &a2a_headers("agent-a", "nonce-1", Some(signature)),
            "POST",
            "/v1/a2a/tasks",
            Some(&body),
        )
        .expect("authenticated");
    assert_eq!(context.scheme, SCHEME_EVM);
}

#[test]
fn tampered_body_fails_hmac_verification() {
    let mut registry = AgentSignerRegistry::new();
    registry.register(
        "agent-a",
        AgentSignerScheme::HmacSha256 {
            shared_secret: "topsecret".to_string(),
        },
    );
    let auth = authenticator(true, registry);
    let body = json!({"taskType": "query.execute", "input": {}});
    let signature = sign_hmac("topsecret", &a2a_message("agent-a", "nonce-1", &body));

    let tampered = json!({"taskType": "query.execute", "input": {"x": 1}});
    let err = auth
        .verify_a2a(
            &a2a_headers("agent-a", "nonce-1", Some(signature)),
            "POST",
            "/v1/a2a/tasks",
            Some(&tampered),
        )
        .expect_err("mismatch");
    assert_eq!(err.code(), "A2A_SIGNATURE_MISMATCH");
}

#[test]
fn unknown_agent_has_no_signer_configured() {
    let auth = authenticator(true, AgentSignerRegistry::new());
    let err = auth
        .verify_a2a(
            &a2a_headers("agent-x", "nonce-1", Some("00".to_string())),
            "POST",
            "/v1/a2a/tasks",
            None,
        )
        .expect_err("not configured");
    assert_eq!(err, AuthError::A2aSignerNotConfigured);
    assert_eq!(err.code(), "A2A_SIGNER_NOT_CONFIGURED");
}

#[test]
fn allowlist_rejects_unlisted_agents() {
    let mut registry = AgentSignerRegistry::new();
    registry.register(
        "agent-a",
        AgentSignerScheme::HmacSha256 {
            shared_secret: "topsecret".to_string(),
        },
    );
    registry.restrict_to(["agent-b"]);
    let auth = authenticator(true, registry);
    let err = auth
        .verify_a2a(
            &a2a_headers("agent-a", "nonce-1", Some("00".to_string())),
            "POST",
            "/v1/a2a/tasks",
            None,
        )
        .expect_err("not allowed");
    assert_eq!(err.code(), "A2A_AGENT_NOT_ALLOWED");
}

#[test]
fn missing_headers_are_reported() {
    let auth = authenticator(true, AgentSignerRegistry::new());
    let mut headers = a2a_headers("agent-a", "nonce-1", Some("00".to_string()));
    headers.nonce = None;
    let err = auth
        .verify_a2a(&headers, "POST", "/v1/a2a/tasks", None)
        .expect_err("missing header");
    assert_eq!(err.code(), "A2A_MISSING_AUTH");
}

#[test]
fn a2a_nonce_replay_uses_the_a2a_code() {
    let mut registry = AgentSignerRegistry::new();
    registry.register(
        "agent-a",
        AgentSignerScheme::HmacSha256 {
            shared_secret: "topsecret".to_string(),
        },
    );
    let auth = authenticator(true, registry);
    let body = json!({"taskType": "query.execute", "input": {}});
    let signature = sign_hmac("topsecret", &a2a_message("agent-a", "nonce-1", &body));
    let headers = a2a_headers("agent-a", "nonce-1", Some(signature));

    auth.verify_a2a(&headers, "POST", "/v1/a2a/tasks", Some(&body)).expect("first");
    let err =
        auth.verify_a2a(&headers, "POST", "/v1/a2a/tasks", Some(&body)).expect_err("replay");
    assert_eq!(err.code(), "A2A_NONCE_REPLAY");
}
