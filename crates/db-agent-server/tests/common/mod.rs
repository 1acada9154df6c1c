// crates/db-agent-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Harness
// Description: Isolated application construction and signing helpers.
// ============================================================================
//! ## Overview
//! Builds applications over an in-memory SQLite adapter with a fixed clock,
//! and produces correctly signed wallet and agent requests for the
//! pipeline tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use db_agent_auth::A2aHeaders;
use db_agent_auth::A2aSigningEnvelope;
use db_agent_auth::PolicyMutationEnvelope;
use db_agent_auth::QuerySigningEnvelope;
use db_agent_auth::a2a_payload_hash;
use db_agent_auth::sign_hmac;
use db_agent_auth::sign_personal;
use db_agent_auth::signer_address;
use db_agent_auth::signing_message;
use db_agent_auth::A2A_CONTEXT;
use db_agent_auth::AUTH_CONTEXT;
use db_agent_auth::POLICY_MUTATION_CONTEXT;
use db_agent_config::AgentConfig;
use db_agent_core::DbAdapter;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteRequest;
use db_agent_core::FixedClock;
use db_agent_core::WalletAddress;
use db_agent_server::Application;
use db_agent_store_sqlite::SqliteAdapter;
use k256::ecdsa::SigningKey;
use serde_json::Value;
use serde_json::json;

/// Server clock pinned for every test.
pub const NOW: &str = "2026-02-17T10:00:30Z";
/// Signed-at used by default in signed requests.
pub const SIGNED_AT: &str = "2026-02-17T10:00:00Z";
/// Shared secret registered for the test peer agent.
pub const AGENT_SECRET: &str = "agent-shared-secret";
/// Identifier of the test peer agent.
pub const AGENT_ID: &str = "peer-agent-1";

/// Deterministic wallet key used across tests.
#[must_use]
pub fn wallet_key() -> SigningKey {
    SigningKey::from_slice(&[0x42; 32]).expect("wallet key")
}

/// A second wallet key for mismatch tests.
#[must_use]
pub fn other_key() -> SigningKey {
    SigningKey::from_slice(&[0x43; 32]).expect("other key")
}

/// Address controlled by [`wallet_key`].
#[must_use]
pub fn wallet() -> WalletAddress {
    signer_address(&wallet_key())
}

/// Builds an isolated application over in-memory SQLite.
///
/// The test wallet receives seeded balance rows so allowed reads return
/// data.
pub async fn build_app(extra_vars: &[(&str, &str)]) -> Arc<Application> {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    vars.insert("A2A_AGENT_ID".to_string(), AGENT_ID.to_string());
    vars.insert("A2A_SHARED_SECRET".to_string(), AGENT_SECRET.to_string());
    for (key, value) in extra_vars {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    let config = AgentConfig::from_map(&vars).expect("config");
    let adapter = Arc::new(SqliteAdapter::in_memory().expect("adapter"));
    adapter
        .execute(ExecuteRequest {
            mode: ExecuteMode::Write,
            sql: "INSERT OR IGNORE INTO wallet_balances VALUES (?1, 1, 'ETH', '9.00', \
                  '2026-02-01T00:00:00Z')"
                .to_string(),
            params: vec![json!(wallet().as_str())],
        })
        .await
        .expect("seed test wallet");
    let clock = Arc::new(FixedClock::parse(NOW).expect("clock"));
    Application::with_parts(config, adapter, clock).await.expect("application")
}

/// Builds a signed `/v1/query` body.
#[must_use]
pub fn signed_query(
    key: &SigningKey,
    request_id: &str,
    tenant_id: Option<&str>,
    capability: &str,
    template: &str,
    params: Value,
    nonce: &str,
    signed_at: &str,
) -> Value {
    let requester = signer_address(key);
    let envelope = QuerySigningEnvelope {
        request_id: request_id.to_string(),
        tenant_id: tenant_id.map(ToString::to_string),
        requester: requester.as_str().to_string(),
        capability: capability.to_string(),
        query_template: template.to_string(),
        query_params: params.clone(),
        nonce: nonce.to_string(),
        signed_at: signed_at.to_string(),
    };
    let message = signing_message(AUTH_CONTEXT, &envelope).expect("message");
    let signature = sign_personal(key, &message).expect("signature");
    let mut body = json!({
        "requestId": request_id,
        "requester": requester.as_str(),
        "capability": capability,
        "queryTemplate": template,
        "queryParams": params,
        "auth": {"nonce": nonce, "signedAt": signed_at, "signature": signature},
    });
    if let Some(tenant_id) = tenant_id
        && let Some(map) = body.as_object_mut()
    {
        map.insert("tenantId".to_string(), json!(tenant_id));
    }
    body
}

/// Builds a signed policy-mutation body for the given action.
#[must_use]
pub fn signed_mutation(
    key: &SigningKey,
    request_id: &str,
    tenant_id: &str,
    action: &str,
    payload: Value,
    nonce: &str,
) -> Value {
    let actor = signer_address(key);
    let envelope = PolicyMutationEnvelope {
        request_id: request_id.to_string(),
        tenant_id: tenant_id.to_string(),
        actor_wallet: actor.as_str().to_string(),
        action: action.to_string(),
        payload: payload.clone(),
        nonce: nonce.to_string(),
        signed_at: SIGNED_AT.to_string(),
    };
    let message = signing_message(POLICY_MUTATION_CONTEXT, &envelope).expect("message");
    let signature = sign_personal(key, &message).expect("signature");
    json!({
        "requestId": request_id,
        "tenantId": tenant_id,
        "actorWallet": actor.as_str(),
        "payload": payload,
        "auth": {"nonce": nonce, "signedAt": SIGNED_AT, "signature": signature},
    })
}

/// Builds signed A2A headers for a task submission body.
#[must_use]
pub fn signed_a2a_headers(
    method: &str,
    path: &str,
    body: Option<&Value>,
    nonce: &str,
    idempotency_key: Option<&str>,
) -> A2aHeaders {
    let envelope = A2aSigningEnvelope {
        agent_id: AGENT_ID.to_string(),
        method: method.to_ascii_uppercase(),
        path: path.to_string(),
        timestamp: SIGNED_AT.to_string(),
        nonce: nonce.to_string(),
        correlation_id: None,
        idempotency_key: idempotency_key.map(ToString::to_string),
        payload_hash: a2a_payload_hash(body).expect("payload hash"),
    };
    let message = signing_message(A2A_CONTEXT, &envelope).expect("message");
    let signature = sign_hmac(AGENT_SECRET, &message);
    A2aHeaders {
        agent_id: Some(AGENT_ID.to_string()),
        timestamp: Some(SIGNED_AT.to_string()),
        nonce: Some(nonce.to_string()),
        signature: Some(signature),
        idempotency_key: idempotency_key.map(ToString::to_string),
        correlation_id: None,
    }
}

/// Extracts a string field from a response body by dotted path.
#[must_use]
pub fn field<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}
