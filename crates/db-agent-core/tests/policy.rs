// crates/db-agent-core/tests/policy.rs
// ============================================================================
// Module: Policy Engine Tests
// Description: Capability rule and grant evaluation behavior.
// ============================================================================
//! ## Overview
//! Covers capability evaluation codes, the allowed-template echo, grant
//! matching, deny-overrides-allow, and the tenant-admin wildcard.

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

use db_agent_core::Capability;
use db_agent_core::CapabilityDecision;
use db_agent_core::CapabilityRule;
use db_agent_core::CapabilityRules;
use db_agent_core::Effect;
use db_agent_core::ExecuteMode;
use db_agent_core::Grant;
use db_agent_core::GrantDecision;
use db_agent_core::GrantError;
use db_agent_core::GrantId;
use db_agent_core::GrantScope;
use db_agent_core::GrantStore;
use db_agent_core::Operation;
use db_agent_core::TenantId;
use db_agent_core::Timestamp;
use db_agent_core::WalletAddress;
use std::collections::BTreeMap;

const WALLET: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";
const OTHER_WALLET: &str = "0x00000000219ab540356cbb839cbe05303d7705fa";

fn wallet(raw: &str) -> WalletAddress {
    WalletAddress::parse(raw).expect("wallet")
}

fn tenant(raw: &str) -> TenantId {
    TenantId::parse(raw).expect("tenant")
}

fn grant(
    tenant_id: &TenantId,
    wallet_address: &WalletAddress,
    scope: GrantScope,
    operation: Operation,
    effect: Effect,
) -> Grant {
    Grant {
        grant_id: GrantId::generate(),
        tenant_id: tenant_id.clone(),
        wallet_address: wallet_address.clone(),
        scope,
        operation,
        effect,
        issued_by: wallet(WALLET),
        issued_at: Timestamp::parse("2026-02-17T10:00:00Z").expect("timestamp"),
        signature_hash: "deadbeef".to_string(),
    }
}

// ============================================================================
// SECTION: Capability Evaluation
// ============================================================================

#[test]
fn unknown_capability_denies() {
    let rules = CapabilityRules::canonical_defaults();
    let decision = rules.evaluate(WALLET, &Capability::from("nope:read"), "wallet_balances");
    assert_eq!(decision, CapabilityDecision::UnknownCapability);
    assert_eq!(decision.code(), "UNKNOWN_CAPABILITY");
}

#[test]
fn template_outside_rule_set_reports_allowed_templates() {
    let rules = CapabilityRules::canonical_defaults();
    let decision = rules.evaluate(WALLET, &Capability::from("balances:read"), "access_log_insert");
    match decision {
        CapabilityDecision::TemplateNotAllowed {
            allowed_templates,
        } => {
            assert_eq!(allowed_templates, vec!["wallet_balances".to_string()]);
        }
        other => panic!("expected TemplateNotAllowed, got {other:?}"),
    }
}

#[test]
fn requester_allowlist_is_case_insensitive() {
    let mut map = BTreeMap::new();
    map.insert(
        "balances:read".to_string(),
        CapabilityRule {
            templates: vec!["wallet_balances".to_string()],
            requesters: Some(vec![WALLET.to_string()]),
        },
    );
    let rules = CapabilityRules::new(map);
    let upper = WALLET.to_ascii_uppercase().replace("0X", "0x");
    assert_eq!(
        rules.evaluate(&upper, &Capability::from("balances:read"), "wallet_balances"),
        CapabilityDecision::Allowed
    );
    assert_eq!(
        rules.evaluate(OTHER_WALLET, &Capability::from("balances:read"), "wallet_balances"),
        CapabilityDecision::RequesterNotAllowed
    );
}

#[test]
fn capability_mode_suffix_selects_template_mode() {
    assert_eq!(Capability::from("balances:read").mode_suffix(), Some(ExecuteMode::Read));
    assert_eq!(Capability::from("audit:write").mode_suffix(), Some(ExecuteMode::Write));
    assert_eq!(Capability::from("odd:suffix").mode_suffix(), None);
}

// ============================================================================
// SECTION: Grant Evaluation
// ============================================================================

#[test]
fn deny_strictly_overrides_allow() {
    let store = GrantStore::new();
    let tenant_id = tenant("acme");
    let wallet_address = wallet(WALLET);
    store
        .insert(grant(
            &tenant_id,
            &wallet_address,
            GrantScope::database(),
            Operation::All,
            Effect::Allow,
        ))
        .expect("insert allow");
    store
        .insert(grant(
            &tenant_id,
            &wallet_address,
            GrantScope::table("payments"),
            Operation::Delete,
            Effect::Deny,
        ))
        .expect("insert deny");

    let decision = store.evaluate(
        &tenant_id,
        &wallet_address,
        &GrantScope::table("payments"),
        Operation::Delete,
    );
    assert_eq!(decision, GrantDecision::ExplicitDeny);
    assert_eq!(decision.code(), "POLICY_DENIED_EXPLICIT_DENY");

    // The broad allow still covers other operations on the same table.
    let read = store.evaluate(
        &tenant_id,
        &wallet_address,
        &GrantScope::table("payments"),
        Operation::Read,
    );
    assert_eq!(read, GrantDecision::Allowed);
}

#[test]
fn database_wildcard_covers_any_table() {
    let store = GrantStore::new();
    let tenant_id = tenant("acme");
    let wallet_address = wallet(WALLET);
    store
        .insert(grant(
            &tenant_id,
            &wallet_address,
            GrantScope::database(),
            Operation::Read,
            Effect::Allow,
        ))
        .expect("insert");

    assert_eq!(
        store.evaluate(
            &tenant_id,
            &wallet_address,
            &GrantScope::table("anything"),
            Operation::Read
        ),
        GrantDecision::Allowed
    );
    assert_eq!(
        store.evaluate(
            &tenant_id,
            &wallet_address,
            &GrantScope::table("anything"),
            Operation::Insert
        ),
        GrantDecision::NoMatchingGrant
    );
}

#[test]
fn all_operation_matches_every_operation() {
    let store = GrantStore::new();
    let tenant_id = tenant("acme");
    let wallet_address = wallet(WALLET);
    store
        .insert(grant(
            &tenant_id,
            &wallet_address,
            GrantScope::database(),
            Operation::All,
            Effect::Allow,
        ))
        .expect("insert");
    for operation in
        [Operation::Read, Operation::Insert, Operation::Update, Operation::Delete, Operation::Alter]
    {
        assert_eq!(
            store.evaluate(&tenant_id, &wallet_address, &GrantScope::table("t"), operation),
            GrantDecision::Allowed,
            "operation {operation:?} should be covered by all"
        );
    }
    assert!(store.is_tenant_admin(&tenant_id, &wallet_address));
}

#[test]
fn missing_grants_deny_with_no_matching_grant() {
    let store = GrantStore::new();
    let tenant_id = tenant("acme");
    let decision = store.evaluate(
        &tenant_id,
        &wallet(WALLET),
        &GrantScope::table("payments"),
        Operation::Read,
    );
    assert_eq!(decision, GrantDecision::NoMatchingGrant);
    assert_eq!(decision.code(), "POLICY_NO_MATCHING_GRANT");
    assert!(store.is_bootstrap(&tenant_id));
}

#[test]
fn wildcard_scope_requires_database_scope_type() {
    let scope = GrantScope {
        scope_type: db_agent_core::ScopeType::Table,
        scope_id: "*".to_string(),
    };
    assert!(matches!(scope.validate(), Err(GrantError::InvalidScope(_))));
}

#[test]
fn revoke_checks_expected_signature_hash() {
    let store = GrantStore::new();
    let tenant_id = tenant("acme");
    let wallet_address = wallet(WALLET);
    let issued = grant(
        &tenant_id,
        &wallet_address,
        GrantScope::database(),
        Operation::All,
        Effect::Allow,
    );
    let grant_id = issued.grant_id;
    store.insert(issued).expect("insert");

    let mismatch = store.revoke(&tenant_id, grant_id, Some("not-the-hash"));
    assert!(matches!(mismatch, Err(GrantError::SignatureHashMismatch)));

    let revoked = store.revoke(&tenant_id, grant_id, Some("deadbeef")).expect("revoke");
    assert_eq!(revoked.grant_id, grant_id);
    assert!(store.is_bootstrap(&tenant_id));
}

#[test]
fn duplicate_uniqueness_key_replaces_prior_grant() {
    let store = GrantStore::new();
    let tenant_id = tenant("acme");
    let wallet_address = wallet(WALLET);
    store
        .insert(grant(
            &tenant_id,
            &wallet_address,
            GrantScope::table("payments"),
            Operation::Read,
            Effect::Allow,
        ))
        .expect("first");
    store
        .insert(grant(
            &tenant_id,
            &wallet_address,
            GrantScope::table("payments"),
            Operation::Read,
            Effect::Allow,
        ))
        .expect("second");
    assert_eq!(store.list(&tenant_id, None).len(), 1);
}
