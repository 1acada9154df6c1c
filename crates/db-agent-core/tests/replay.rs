// crates/db-agent-core/tests/replay.rs
// ============================================================================
// Module: Replay Guard Tests
// Description: Timestamp window boundaries and nonce replay detection.
// ============================================================================
//! ## Overview
//! Verifies the exact boundary semantics of the skew window and that a
//! second nonce arrival within the TTL is rejected per scope.

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

use db_agent_core::NonceScope;
use db_agent_core::ReplayConfig;
use db_agent_core::ReplayError;
use db_agent_core::ReplayGuard;
use db_agent_core::Timestamp;

fn ts(raw: &str) -> Timestamp {
    Timestamp::parse(raw).expect("timestamp")
}

fn guard() -> ReplayGuard {
    ReplayGuard::new(ReplayConfig {
        nonce_ttl_seconds: 300,
        max_future_skew_seconds: 30,
        max_entries: 16,
    })
}

#[test]
fn signed_at_exactly_at_ttl_is_accepted() {
    let guard = guard();
    let now = ts("2026-02-17T10:05:00Z");
    let signed_at = ts("2026-02-17T10:00:00Z");
    assert!(guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).is_ok());
}

#[test]
fn signed_at_one_second_past_ttl_is_stale() {
    let guard = guard();
    let now = ts("2026-02-17T10:05:01Z");
    let signed_at = ts("2026-02-17T10:00:00Z");
    let err = guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).expect_err("stale");
    assert_eq!(err, ReplayError::Stale);
    assert_eq!(err.code(), "STALE_TIMESTAMP");
}

#[test]
fn signed_at_exactly_at_future_skew_is_accepted() {
    let guard = guard();
    let now = ts("2026-02-17T10:00:00Z");
    let signed_at = ts("2026-02-17T10:00:30Z");
    assert!(guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).is_ok());
}

#[test]
fn signed_at_one_second_past_future_skew_is_rejected() {
    let guard = guard();
    let now = ts("2026-02-17T10:00:00Z");
    let signed_at = ts("2026-02-17T10:00:31Z");
    let err = guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).expect_err("future");
    assert_eq!(err, ReplayError::Future);
    assert_eq!(err.code(), "FUTURE_TIMESTAMP");
}

#[test]
fn second_arrival_within_ttl_is_a_replay() {
    let guard = guard();
    let now = ts("2026-02-17T10:00:30Z");
    let signed_at = ts("2026-02-17T10:00:00Z");
    guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).expect("first");
    let err =
        guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).expect_err("replay");
    assert_eq!(err, ReplayError::Replay(NonceScope::UserQuery));
    assert_eq!(err.code(), "NONCE_REPLAY");
}

#[test]
fn scopes_partition_the_nonce_space() {
    let guard = guard();
    let now = ts("2026-02-17T10:00:30Z");
    let signed_at = ts("2026-02-17T10:00:00Z");
    guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).expect("user scope");
    guard.observe(NonceScope::A2a, "n-1", &signed_at, &now).expect("a2a scope");
    let err = guard.observe(NonceScope::A2a, "n-1", &signed_at, &now).expect_err("replay");
    assert_eq!(err.code(), "A2A_NONCE_REPLAY");
}

#[test]
fn sweep_evicts_expired_entries() {
    let guard = guard();
    let now = ts("2026-02-17T10:00:00Z");
    let signed_at = ts("2026-02-17T10:00:00Z");
    guard.observe(NonceScope::UserQuery, "n-1", &signed_at, &now).expect("observe");
    assert_eq!(guard.len(), 1);

    guard.sweep(&ts("2026-02-17T10:05:01Z"));
    assert!(guard.is_empty());

    // After expiry the nonce may be reused with a fresh timestamp.
    let later = ts("2026-02-17T10:06:00Z");
    assert!(guard.observe(NonceScope::UserQuery, "n-1", &later, &later).is_ok());
}

#[test]
fn capacity_is_bounded_by_oldest_expiry_eviction() {
    let guard = ReplayGuard::new(ReplayConfig {
        nonce_ttl_seconds: 300,
        max_future_skew_seconds: 30,
        max_entries: 4,
    });
    let now = ts("2026-02-17T10:00:00Z");
    for index in 0..8 {
        let nonce = format!("n-{index}");
        guard.observe(NonceScope::UserQuery, &nonce, &now, &now).expect("observe");
    }
    assert!(guard.len() <= 4);
}
