// crates/db-agent-core/tests/identifiers.rs
// ============================================================================
// Module: Identifier Tests
// Description: Tenant and wallet identifier shape enforcement.
// ============================================================================
//! ## Overview
//! Ensures tenant identifiers enforce their character-class invariant and
//! wallet addresses normalize and checksum-validate correctly.

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

use db_agent_core::TenantId;
use db_agent_core::WalletAddress;

#[test]
fn tenant_ids_accept_the_documented_shape() {
    for ok in ["a", "acme", "acme-prod_2", "0tenant", &"x".repeat(63)] {
        assert!(TenantId::parse(ok).is_ok(), "{ok} should parse");
    }
}

#[test]
fn tenant_ids_reject_bad_shapes() {
    for bad in ["", "Acme", "-acme", "_acme", "acme!", "acme acme", &"x".repeat(64)] {
        assert!(TenantId::parse(bad).is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn lowercase_wallet_parses_verbatim() {
    let parsed = WalletAddress::parse("0x8ba1f109551bd432803012645ac136ddd64dba72")
        .expect("lowercase");
    assert_eq!(parsed.as_str(), "0x8ba1f109551bd432803012645ac136ddd64dba72");
}

#[test]
fn checksummed_wallet_normalizes_to_lowercase() {
    let parsed = WalletAddress::parse("0x8ba1f109551bD432803012645Ac136ddd64DBA72")
        .expect("checksummed");
    assert_eq!(parsed.as_str(), "0x8ba1f109551bd432803012645ac136ddd64dba72");
    assert!(parsed.matches("0x8BA1F109551BD432803012645AC136DDD64DBA72"));
}

#[test]
fn invalid_checksum_is_rejected() {
    assert!(WalletAddress::parse("0x8Ba1f109551bD432803012645Ac136ddd64DBA72").is_err());
}

#[test]
fn malformed_wallets_are_rejected() {
    for bad in [
        "",
        "8ba1f109551bd432803012645ac136ddd64dba72",
        "0x8ba1",
        "0xzz a1f109551bd432803012645ac136ddd64dba7",
    ] {
        assert!(WalletAddress::parse(bad).is_err(), "{bad:?} should be rejected");
    }
}
