// crates/db-agent-server/tests/control_plane.rs
// ============================================================================
// Module: Control Plane Tests
// Description: Grant mutations, schema apply, AI approvals, data execution.
// ============================================================================
//! ## Overview
//! Exercises the signed mutation pipeline end to end: the bootstrap rule,
//! grant issuance and revocation, schema apply with AI-approval gating, and
//! grant-gated dynamic data execution.

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

mod common;

use std::sync::Arc;

use common::build_app;
use common::field;
use common::other_key;
use common::signed_mutation;
use common::wallet;
use db_agent_auth::signer_address;
use db_agent_server::Application;
use db_agent_server::control_plane::run_mutation;
use serde_json::Value;
use serde_json::json;

const TENANT: &str = "acme";

/// Bootstrap payload: tenant-admin grant for the acting wallet.
fn admin_grant_payload() -> Value {
    json!({
        "walletAddress": wallet().as_str(),
        "scopeType": "database",
        "scopeId": "*",
        "operation": "all",
        "effect": "allow",
    })
}

/// Issues the bootstrap admin grant for the tenant.
async fn bootstrap(app: &Arc<Application>, nonce: &str) {
    let body = signed_mutation(
        &common::wallet_key(),
        "req-bootstrap",
        TENANT,
        "grant:create",
        admin_grant_payload(),
        nonce,
    );
    let response = run_mutation(app, "grant:create", &body).await;
    assert_eq!(response.status, 201, "bootstrap failed: {}", response.body);
}

// ============================================================================
// SECTION: Grant Lifecycle
// ============================================================================

#[tokio::test]
async fn first_admin_grant_bootstraps_the_tenant() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-1").await;
    let tenant = db_agent_core::TenantId::parse(TENANT).expect("tenant");
    assert!(app.grants.is_tenant_admin(&tenant, &wallet()));
}

#[tokio::test]
async fn non_admin_bootstrap_payload_is_denied() {
    let app = build_app(&[]).await;
    // First grant must be the database:*:all:allow admin grant.
    let payload = json!({
        "walletAddress": wallet().as_str(),
        "scopeType": "table",
        "scopeId": "payments",
        "operation": "read",
        "effect": "allow",
    });
    let body = signed_mutation(
        &common::wallet_key(),
        "req-1",
        TENANT,
        "grant:create",
        payload,
        "cp-nonce-2",
    );
    let response = run_mutation(&app, "grant:create", &body).await;
    assert_eq!(response.status, 403, "body: {}", response.body);
    assert_eq!(
        field(&response.body, "decision.code"),
        Some(&json!("POLICY_NO_MATCHING_GRANT"))
    );
}

#[tokio::test]
async fn non_admin_wallet_cannot_issue_grants() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-3").await;
    let intruder = other_key();
    let payload = json!({
        "walletAddress": signer_address(&intruder).as_str(),
        "scopeType": "database",
        "scopeId": "*",
        "operation": "all",
        "effect": "allow",
    });
    let body =
        signed_mutation(&intruder, "req-2", TENANT, "grant:create", payload, "cp-nonce-4");
    let response = run_mutation(&app, "grant:create", &body).await;
    assert_eq!(response.status, 403, "body: {}", response.body);
}

#[tokio::test]
async fn revoke_enforces_the_expected_signature_hash() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-5").await;

    // Issue a table grant to revoke.
    let payload = json!({
        "walletAddress": wallet().as_str(),
        "scopeType": "table",
        "scopeId": "payments",
        "operation": "read",
        "effect": "allow",
    });
    let body = signed_mutation(
        &common::wallet_key(),
        "req-3",
        TENANT,
        "grant:create",
        payload,
        "cp-nonce-6",
    );
    let created = run_mutation(&app, "grant:create", &body).await;
    assert_eq!(created.status, 201, "body: {}", created.body);
    let grant_id = field(&created.body, "grant.grantId")
        .and_then(Value::as_str)
        .expect("grantId")
        .to_string();
    let signature_hash = field(&created.body, "grant.signatureHash")
        .and_then(Value::as_str)
        .expect("signatureHash")
        .to_string();

    // A wrong asserted hash conflicts.
    let body = signed_mutation(
        &common::wallet_key(),
        "req-4",
        TENANT,
        "grant:revoke",
        json!({"grantId": grant_id.clone(), "expectedSignatureHash": "not-the-hash"}),
        "cp-nonce-7",
    );
    let mismatch = run_mutation(&app, "grant:revoke", &body).await;
    assert_eq!(mismatch.status, 409, "body: {}", mismatch.body);
    assert_eq!(
        field(&mismatch.body, "decision.code"),
        Some(&json!("GRANT_SIGNATURE_HASH_MISMATCH"))
    );

    // The correct hash revokes.
    let body = signed_mutation(
        &common::wallet_key(),
        "req-5",
        TENANT,
        "grant:revoke",
        json!({"grantId": grant_id, "expectedSignatureHash": signature_hash}),
        "cp-nonce-8",
    );
    let revoked = run_mutation(&app, "grant:revoke", &body).await;
    assert_eq!(revoked.status, 200, "body: {}", revoked.body);
}

// ============================================================================
// SECTION: Schema Apply & AI Approval
// ============================================================================

/// Schema payload declaring one orders table.
fn orders_schema() -> Value {
    json!({
        "schema": {
            "tables": [{
                "name": "orders",
                "columns": [
                    {"name": "order_id", "columnType": "text"},
                    {"name": "amount", "columnType": "integer"},
                    {"name": "status", "columnType": "text"},
                ],
            }],
        },
    })
}

#[tokio::test]
async fn schema_submit_forwards_without_mutating() {
    let app = build_app(&[]).await;
    let body = signed_mutation(
        &common::wallet_key(),
        "req-6",
        TENANT,
        "schema:submit",
        orders_schema(),
        "cp-nonce-9",
    );
    let response = run_mutation(&app, "schema:submit", &body).await;
    assert_eq!(response.status, 202, "body: {}", response.body);
    assert_eq!(field(&response.body, "code"), Some(&json!("SUBMISSION_FORWARDED")));
    // Nothing was installed.
    let tenant = db_agent_core::TenantId::parse(TENANT).expect("tenant");
    assert!(app.schemas.get(&tenant).is_none());
}

#[tokio::test]
async fn schema_apply_installs_tables_and_enables_data_execution() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-10").await;

    let body = signed_mutation(
        &common::wallet_key(),
        "req-7",
        TENANT,
        "schema:apply",
        orders_schema(),
        "cp-nonce-11",
    );
    let applied = run_mutation(&app, "schema:apply", &body).await;
    assert_eq!(applied.status, 201, "body: {}", applied.body);

    // Insert through the dynamic path (the admin grant covers any table).
    let body = signed_mutation(
        &common::wallet_key(),
        "req-8",
        TENANT,
        "data:execute",
        json!({
            "table": "orders",
            "operation": "insert",
            "values": {"order_id": "o-1", "amount": 250, "status": "open"},
        }),
        "cp-nonce-12",
    );
    let inserted = run_mutation(&app, "data:execute", &body).await;
    assert_eq!(inserted.status, 200, "body: {}", inserted.body);
    assert_eq!(field(&inserted.body, "execution.rowCount"), Some(&json!(1)));

    // Read it back.
    let body = signed_mutation(
        &common::wallet_key(),
        "req-9",
        TENANT,
        "data:execute",
        json!({
            "table": "orders",
            "operation": "read",
            "where": {"order_id": "o-1"},
        }),
        "cp-nonce-13",
    );
    let read = run_mutation(&app, "data:execute", &body).await;
    assert_eq!(read.status, 200, "body: {}", read.body);
    let rows = field(&read.body, "execution.rows").and_then(Value::as_array).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("amount"), Some(&json!(250)));
}

#[tokio::test]
async fn ai_assisted_apply_requires_a_matching_approval() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-14").await;

    // Store a draft to reference.
    let body = signed_mutation(
        &common::wallet_key(),
        "req-10",
        TENANT,
        "ai:draft:create",
        json!({"draft": orders_schema()}),
        "cp-nonce-15",
    );
    let draft = run_mutation(&app, "ai:draft:create", &body).await;
    assert_eq!(draft.status, 201, "body: {}", draft.body);
    let draft_id =
        field(&draft.body, "draft.draftId").and_then(Value::as_str).expect("draftId").to_string();
    let draft_hash = field(&draft.body, "draft.draftHash")
        .and_then(Value::as_str)
        .expect("draftHash")
        .to_string();

    // Apply referencing the draft without an approval.
    let mut payload = orders_schema();
    if let Some(map) = payload.as_object_mut() {
        map.insert(
            "aiAssist".to_string(),
            json!({"draftId": draft_id.clone(), "draftHash": draft_hash.clone()}),
        );
    }
    let body = signed_mutation(
        &common::wallet_key(),
        "req-11",
        TENANT,
        "schema:apply",
        payload.clone(),
        "cp-nonce-16",
    );
    let denied = run_mutation(&app, "schema:apply", &body).await;
    assert_eq!(denied.status, 403, "body: {}", denied.body);
    assert_eq!(field(&denied.body, "decision.code"), Some(&json!("AI_APPROVAL_REQUIRED")));

    // Approve the draft.
    let body = signed_mutation(
        &common::wallet_key(),
        "req-12",
        TENANT,
        "ai:draft:approve",
        json!({"draftId": draft_id.clone(), "draftHash": draft_hash.clone()}),
        "cp-nonce-17",
    );
    let approved = run_mutation(&app, "ai:draft:approve", &body).await;
    assert_eq!(approved.status, 201, "body: {}", approved.body);
    let approval_id = field(&approved.body, "approval.approvalId")
        .and_then(Value::as_str)
        .expect("approvalId")
        .to_string();

    // Re-apply with the full approval binding.
    if let Some(map) = payload.as_object_mut() {
        map.insert(
            "aiAssist".to_string(),
            json!({
                "draftId": draft_id,
                "draftHash": draft_hash,
                "approvalId": approval_id,
                "approvedBy": wallet().as_str(),
            }),
        );
    }
    let body = signed_mutation(
        &common::wallet_key(),
        "req-13",
        TENANT,
        "schema:apply",
        payload,
        "cp-nonce-18",
    );
    let applied = run_mutation(&app, "schema:apply", &body).await;
    assert_eq!(applied.status, 201, "body: {}", applied.body);
}

// ============================================================================
// SECTION: Data Execution Denials
// ============================================================================

#[tokio::test]
async fn explicit_deny_overrides_the_admin_allow() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-19").await;
    let apply = signed_mutation(
        &common::wallet_key(),
        "req-14",
        TENANT,
        "schema:apply",
        orders_schema(),
        "cp-nonce-20",
    );
    assert_eq!(run_mutation(&app, "schema:apply", &apply).await.status, 201);

    // Deny deletes on orders for the admin wallet itself.
    let deny = signed_mutation(
        &common::wallet_key(),
        "req-15",
        TENANT,
        "grant:create",
        json!({
            "walletAddress": wallet().as_str(),
            "scopeType": "table",
            "scopeId": "orders",
            "operation": "delete",
            "effect": "deny",
        }),
        "cp-nonce-21",
    );
    assert_eq!(run_mutation(&app, "grant:create", &deny).await.status, 201);

    let body = signed_mutation(
        &common::wallet_key(),
        "req-16",
        TENANT,
        "data:execute",
        json!({"table": "orders", "operation": "delete", "where": {"order_id": "o-1"}}),
        "cp-nonce-22",
    );
    let response = run_mutation(&app, "data:execute", &body).await;
    assert_eq!(response.status, 403, "body: {}", response.body);
    assert_eq!(
        field(&response.body, "decision.code"),
        Some(&json!("POLICY_DENIED_EXPLICIT_DENY"))
    );
}

#[tokio::test]
async fn undeclared_identifiers_fail_closed() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-23").await;
    let apply = signed_mutation(
        &common::wallet_key(),
        "req-17",
        TENANT,
        "schema:apply",
        orders_schema(),
        "cp-nonce-24",
    );
    assert_eq!(run_mutation(&app, "schema:apply", &apply).await.status, 201);

    let body = signed_mutation(
        &common::wallet_key(),
        "req-18",
        TENANT,
        "data:execute",
        json!({"table": "invoices", "operation": "read"}),
        "cp-nonce-25",
    );
    let response = run_mutation(&app, "data:execute", &body).await;
    assert_eq!(response.status, 400, "body: {}", response.body);
    assert_eq!(field(&response.body, "decision.code"), Some(&json!("UNKNOWN_TABLE")));

    let body = signed_mutation(
        &common::wallet_key(),
        "req-19",
        TENANT,
        "data:execute",
        json!({"table": "orders", "operation": "read", "where": {"nope": 1}}),
        "cp-nonce-26",
    );
    let response = run_mutation(&app, "data:execute", &body).await;
    assert_eq!(response.status, 400, "body: {}", response.body);
    assert_eq!(field(&response.body, "decision.code"), Some(&json!("UNKNOWN_COLUMN")));
}

#[tokio::test]
async fn wallet_without_grants_cannot_execute_data() {
    let app = build_app(&[]).await;
    bootstrap(&app, "cp-nonce-27").await;
    let apply = signed_mutation(
        &common::wallet_key(),
        "req-20",
        TENANT,
        "schema:apply",
        orders_schema(),
        "cp-nonce-28",
    );
    assert_eq!(run_mutation(&app, "schema:apply", &apply).await.status, 201);

    let intruder = other_key();
    let body = signed_mutation(
        &intruder,
        "req-21",
        TENANT,
        "data:execute",
        json!({"table": "orders", "operation": "read"}),
        "cp-nonce-29",
    );
    let response = run_mutation(&app, "data:execute", &body).await;
    assert_eq!(response.status, 403, "body: {}", response.body);
    assert_eq!(
        field(&response.body, "decision.code"),
        Some(&json!("POLICY_NO_MATCHING_GRANT"))
    );
}
