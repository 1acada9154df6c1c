// crates/db-agent-config/tests/config_validation.rs
// ============================================================================
// Module: Config Validation Tests
// Description: Environment parsing, defaults, and validation failures.
// ============================================================================
//! ## Overview
//! Configs are built from explicit variable maps so tests never touch the
//! process environment.

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

use std::collections::BTreeMap;

use db_agent_config::AgentConfig;
use db_agent_config::ConfigError;
use db_agent_config::DbDriver;
use db_agent_core::Capability;
use db_agent_core::CapabilityDecision;

fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

#[test]
fn empty_environment_yields_working_defaults() {
    let config = AgentConfig::from_map(&BTreeMap::new()).expect("defaults");
    assert_eq!(config.service.port, 8080);
    assert_eq!(config.service.name, "private-db-agent");
    assert!(config.auth.enabled);
    assert_eq!(config.auth.nonce_ttl_seconds, 300);
    assert_eq!(config.database.driver, DbDriver::Sqlite);
    assert!(config.policy.enforce_capability_mode);
    assert!(config.proof.enabled);
    // The canonical rule set ships by default.
    assert_eq!(
        config.policy.capability_rules.evaluate(
            "0x8ba1f109551bd432803012645ac136ddd64dba72",
            &Capability::from("balances:read"),
            "wallet_balances",
        ),
        CapabilityDecision::Allowed
    );
}

#[test]
fn capability_rules_json_overrides_the_defaults() {
    let config = AgentConfig::from_map(&vars(&[(
        "POLICY_CAPABILITY_RULES_JSON",
        r#"{"custom:read": {"templates": ["wallet_balances"]}}"#,
    )]))
    .expect("config");
    assert_eq!(
        config.policy.capability_rules.evaluate(
            "0x8ba1f109551bd432803012645ac136ddd64dba72",
            &Capability::from("balances:read"),
            "wallet_balances",
        ),
        CapabilityDecision::UnknownCapability
    );
    assert_eq!(
        config.policy.capability_rules.evaluate(
            "0x8ba1f109551bd432803012645ac136ddd64dba72",
            &Capability::from("custom:read"),
            "wallet_balances",
        ),
        CapabilityDecision::Allowed
    );
}

#[test]
fn malformed_capability_rules_json_is_rejected() {
    let err = AgentConfig::from_map(&vars(&[("POLICY_CAPABILITY_RULES_JSON", "{nope")]))
        .expect_err("malformed");
    assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "POLICY_CAPABILITY_RULES_JSON"));
}

#[test]
fn postgres_driver_requires_a_database_url() {
    let err =
        AgentConfig::from_map(&vars(&[("DB_DRIVER", "postgres")])).expect_err("missing url");
    assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

    let config = AgentConfig::from_map(&vars(&[
        ("DB_DRIVER", "postgres"),
        ("DATABASE_URL", "postgres://agent:pw@localhost:5432/agent"),
    ]))
    .expect("config");
    assert_eq!(config.database.driver, DbDriver::Postgres);
}

#[test]
fn non_postgres_url_scheme_is_rejected() {
    let err = AgentConfig::from_map(&vars(&[
        ("DB_DRIVER", "postgres"),
        ("DATABASE_URL", "mysql://nope"),
    ]))
    .expect_err("scheme");
    assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "DATABASE_URL"));
}

#[test]
fn unknown_db_driver_is_rejected() {
    let err = AgentConfig::from_map(&vars(&[("DB_DRIVER", "oracle")])).expect_err("driver");
    assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "DB_DRIVER"));
}

#[test]
fn booleans_accept_the_usual_spellings() {
    for (raw, expected) in [("true", true), ("1", true), ("YES", true), ("0", false)] {
        let config =
            AgentConfig::from_map(&vars(&[("AUTH_ENABLED", raw)])).expect("config");
        assert_eq!(config.auth.enabled, expected, "spelling {raw:?}");
    }
    let err = AgentConfig::from_map(&vars(&[("AUTH_ENABLED", "maybe")])).expect_err("bool");
    assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "AUTH_ENABLED"));
}

#[test]
fn unsupported_hash_algorithm_is_rejected() {
    let err =
        AgentConfig::from_map(&vars(&[("PROOF_HASH_ALGORITHM", "md5")])).expect_err("algo");
    assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "PROOF_HASH_ALGORITHM"));
}

#[test]
fn zero_nonce_ttl_is_rejected() {
    let err = AgentConfig::from_map(&vars(&[("AUTH_NONCE_TTL_SECONDS", "0")]))
        .expect_err("ttl");
    assert!(matches!(err, ConfigError::Invalid { name, .. } if name == "AUTH_NONCE_TTL_SECONDS"));
}

#[test]
fn runtime_claims_reflect_attestation_presence() {
    let unattested = AgentConfig::from_map(&BTreeMap::new()).expect("config");
    assert!(!unattested.runtime_claims().verified);

    let attested = AgentConfig::from_map(&vars(&[
        ("EIGEN_APP_ID", "app-1"),
        ("EIGEN_ATTESTATION_REPORT_HASH", "abc123"),
    ]))
    .expect("config");
    let claims = attested.runtime_claims();
    assert!(claims.verified);
    assert_eq!(claims.app_id.as_deref(), Some("app-1"));
}
