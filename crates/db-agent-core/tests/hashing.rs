// crates/db-agent-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Verifies RFC 8785 canonical JSON hashing behavior.
// ============================================================================
//! ## Overview
//! Ensures canonical JSON hashing is deterministic across key ordering and
//! that canonical bytes parse back to the original value.

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

use db_agent_core::HashAlgorithm;
use db_agent_core::canonical_json_bytes;
use db_agent_core::hash_canonical_json;
use db_agent_core::hash_canonical_json_hex;
use proptest::prelude::*;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

#[test]
fn canonical_hash_is_order_independent_for_maps() {
    let mut map_a = Map::new();
    map_a.insert("b".to_string(), json!(2));
    map_a.insert("a".to_string(), json!(1));

    let mut map_b = Map::new();
    map_b.insert("a".to_string(), json!(1));
    map_b.insert("b".to_string(), json!(2));

    let hash_a =
        hash_canonical_json(HashAlgorithm::Sha256, &Value::Object(map_a)).expect("hash a");
    let hash_b =
        hash_canonical_json(HashAlgorithm::Sha256, &Value::Object(map_b)).expect("hash b");

    assert_eq!(hash_a, hash_b);
}

#[test]
fn canonical_bytes_preserve_array_order() {
    let value = json!({"items": [3, 1, 2]});
    let bytes = canonical_json_bytes(&value).expect("canonical bytes");
    assert_eq!(bytes, br#"{"items":[3,1,2]}"#.to_vec());
}

#[test]
fn canonical_bytes_sort_keys_by_code_point() {
    let value = json!({"b": 1, "A": 2, "a": 3});
    let bytes = canonical_json_bytes(&value).expect("canonical bytes");
    assert_eq!(bytes, br#"{"A":2,"a":3,"b":1}"#.to_vec());
}

#[test]
fn hex_hash_is_stable_for_known_input() {
    let first = hash_canonical_json_hex(&json!({"k": "v"})).expect("hash");
    let second = hash_canonical_json_hex(&json!({"k": "v"})).expect("hash");
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
}

/// Strategy over JSON values without floats (floats normalize under JCS).
fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn canonical_bytes_round_trip(value in json_value()) {
        let bytes = canonical_json_bytes(&value).expect("canonical bytes");
        let parsed: Value = serde_json::from_slice(&bytes).expect("parse canonical bytes");
        prop_assert_eq!(parsed, value);
    }

    #[test]
    fn canonical_bytes_are_reproducible(value in json_value()) {
        let first = canonical_json_bytes(&value).expect("first");
        let second = canonical_json_bytes(&value).expect("second");
        prop_assert_eq!(first, second);
    }
}
