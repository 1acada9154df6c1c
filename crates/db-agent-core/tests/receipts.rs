// crates/db-agent-core/tests/receipts.rs
// ============================================================================
// Module: Receipt Service Tests
// Description: Receipt determinism and hash recomputation.
// ============================================================================
//! ## Overview
//! Two equivalent requests under the same runtime claims must produce
//! byte-identical receipts, and every hash in a receipt must be
//! recomputable from the facets it covers.

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

use db_agent_core::Decision;
use db_agent_core::Dialect;
use db_agent_core::ReceiptService;
use db_agent_core::RequestFacet;
use db_agent_core::RuntimeClaims;
use db_agent_core::Stage;
use db_agent_core::codes;
use db_agent_core::hash_canonical_json_hex;
use serde_json::json;

fn facet() -> RequestFacet {
    RequestFacet {
        request_id: "req-1".to_string(),
        tenant_id: Some("acme".to_string()),
        requester: "0x8ba1f109551bd432803012645ac136ddd64dba72".to_string(),
        capability: "balances:read".to_string(),
        query_template: Some("wallet_balances".to_string()),
        query_params: json!({"walletAddress": "0x8ba1f109551bd432803012645ac136ddd64dba72"}),
        auth_nonce: "nonce-1".to_string(),
        auth_signed_at: "2026-02-17T10:00:00Z".to_string(),
    }
}

fn service(enabled: bool) -> ReceiptService {
    ReceiptService::new(
        enabled,
        "private-db-agent",
        RuntimeClaims::unverified("eigen-compute"),
        Dialect::Sqlite,
    )
    .expect("service")
}

#[test]
fn equivalent_requests_produce_identical_receipts() {
    let service = service(true);
    let decision = Decision::allow(Stage::Execution, codes::ALLOWED, "request allowed");

    let first = service.build(&facet(), &decision).expect("build").expect("receipt");
    let second = service.build(&facet(), &decision).expect("build").expect("receipt");

    assert_eq!(first, second);
    assert!(first.receipt_id.starts_with("rcpt_"));
    assert_eq!(first.receipt_id.len(), "rcpt_".len() + 16);
}

#[test]
fn any_facet_change_changes_the_receipt_id() {
    let service = service(true);
    let decision = Decision::allow(Stage::Execution, codes::ALLOWED, "request allowed");
    let base = service.build(&facet(), &decision).expect("build").expect("receipt");

    let mut changed = facet();
    changed.auth_nonce = "nonce-2".to_string();
    let other = service.build(&changed, &decision).expect("build").expect("receipt");
    assert_ne!(base.receipt_id, other.receipt_id);
    assert_ne!(base.request_hash, other.request_hash);
    assert_eq!(base.verification_hash, other.verification_hash);

    let denied = Decision::deny(Stage::Policy, codes::UNKNOWN_CAPABILITY, "unknown capability");
    let other = service.build(&facet(), &denied).expect("build").expect("receipt");
    assert_ne!(base.receipt_id, other.receipt_id);
    assert_ne!(base.decision_hash, other.decision_hash);
}

#[test]
fn hashes_recompute_from_the_embedded_facets() {
    let service = service(true);
    let decision = Decision::deny(Stage::Policy, codes::TEMPLATE_NOT_ALLOWED, "not allowed");
    let receipt = service.build(&facet(), &decision).expect("build").expect("receipt");

    let request_hash = hash_canonical_json_hex(&facet()).expect("request hash");
    let decision_hash = hash_canonical_json_hex(&decision).expect("decision hash");
    let verification_hash = hash_canonical_json_hex(&receipt.verification).expect("verify hash");

    assert_eq!(receipt.request_hash, request_hash);
    assert_eq!(receipt.decision_hash, decision_hash);
    assert_eq!(receipt.verification_hash, verification_hash);
    assert_eq!(
        receipt.receipt_id,
        db_agent_core::derive_receipt_id(&request_hash, &decision_hash, &verification_hash)
    );
}

#[test]
fn disabled_receipts_yield_none() {
    let service = service(false);
    let decision = Decision::allow(Stage::Execution, codes::ALLOWED, "request allowed");
    assert!(service.build(&facet(), &decision).expect("build").is_none());
}

#[test]
fn claims_hash_tracks_the_claim_set() {
    let unverified = RuntimeClaims::unverified("eigen-compute");
    let mut attested = unverified.clone();
    attested.app_id = Some("app-1".to_string());
    assert_ne!(
        unverified.claims_hash().expect("hash"),
        attested.claims_hash().expect("hash")
    );
}
