// crates/db-agent-config/src/config.rs
// ============================================================================
// Module: Agent Configuration
// Description: Typed configuration sections loaded from the environment.
// Purpose: Centralize defaults, parsing, and validation for the agent.
// Dependencies: db-agent-core, serde, serde_json, url
// ============================================================================

//! ## Overview
//! Every recognized environment variable maps onto one field of one typed
//! section. Loading never touches the process environment directly except
//! through [`AgentConfig::from_env`]; tests build configs from explicit
//! maps. Validation fails closed before the server binds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use db_agent_core::CapabilityRules;
use db_agent_core::IdempotencyConfig;
use db_agent_core::ReplayConfig;
use db_agent_core::RuntimeClaims;
use db_agent_core::VerificationStatus;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable failed to parse into its expected type.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Redacted failure reason.
        reason: String,
    },
    /// A required variable is absent for the selected mode.
    #[error("missing required variable: {0}")]
    Missing(&'static str),
}

/// Builds an invalid-value error.
fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Service identity and listener settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Service name surfaced in receipts and the agent card.
    pub name: String,
    /// Service version surfaced in health and the agent card.
    pub version: String,
    /// Deployment environment label.
    pub environment: String,
}

/// Authentication and replay-window settings.
#[derive(Debug, Clone, Copy)]
pub struct AuthConfig {
    /// Whether signature verification is enforced.
    pub enabled: bool,
    /// Nonce time-to-live window in seconds.
    pub nonce_ttl_seconds: i64,
    /// Maximum accepted future skew in seconds.
    pub max_future_skew_seconds: i64,
}

/// Capability policy settings.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Active capability rule set.
    pub capability_rules: CapabilityRules,
    /// Whether the capability mode suffix is enforced against templates.
    pub enforce_capability_mode: bool,
}

/// Database driver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDriver {
    /// Embedded SQLite file store.
    Sqlite,
    /// External PostgreSQL store.
    Postgres,
}

/// Database backend settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Selected driver.
    pub driver: DbDriver,
    /// Connection URL for external stores.
    pub url: Option<String>,
    /// Whether the postgres connection requires TLS.
    pub postgres_ssl: bool,
    /// Connection pool cap for postgres.
    pub postgres_max_pool_size: usize,
    /// SQLite database file path.
    pub sqlite_file_path: PathBuf,
}

/// Signing scheme declared for one peer agent.
///
/// # Invariants
/// - `hmac-sha256` entries carry `shared_secret`; `evm-personal-sign`
///   entries carry `signer`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSignerEntry {
    /// Scheme label (`hmac-sha256` or `evm-personal-sign`).
    pub scheme: String,
    /// Shared secret for HMAC entries.
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Expected signer address for EVM entries.
    #[serde(default)]
    pub signer: Option<String>,
}

/// Peer-agent channel settings.
#[derive(Debug, Clone)]
pub struct A2aConfig {
    /// This service's own agent identifier.
    pub agent_id: Option<String>,
    /// Shared secret for HMAC peer auth.
    pub shared_secret: Option<String>,
    /// Per-agent signing schemes.
    pub signers: BTreeMap<String, AgentSignerEntry>,
    /// Background worker count.
    pub worker_count: usize,
    /// Bounded task queue capacity.
    pub queue_capacity: usize,
    /// Background task execution deadline in seconds.
    pub task_deadline_seconds: u64,
}

/// Receipt / attestation settings.
#[derive(Debug, Clone)]
pub struct ProofConfig {
    /// Whether receipts are issued.
    pub enabled: bool,
    /// Hash algorithm label (only `sha256` is supported).
    pub hash_algorithm: String,
    /// Trust model label surfaced in claims.
    pub trust_model: String,
    /// Runtime application identifier.
    pub app_id: Option<String>,
    /// Runtime image digest.
    pub image_digest: Option<String>,
    /// Runtime attestation report hash.
    pub attestation_report_hash: Option<String>,
    /// Onchain deployment transaction hash.
    pub onchain_deployment_tx_hash: Option<String>,
}

/// Service-level resource limits.
#[derive(Debug, Clone, Copy)]
pub struct LimitsConfig {
    /// Per-request deadline in seconds.
    pub request_deadline_seconds: u64,
    /// Replay guard entry cap.
    pub replay_max_entries: usize,
    /// Idempotency record time-to-live in seconds.
    pub idempotency_ttl_seconds: i64,
    /// Idempotency record cap.
    pub idempotency_max_entries: usize,
    /// Whether the database audit sink is enabled.
    pub audit_enabled: bool,
}

// ============================================================================
// SECTION: Aggregate Config
// ============================================================================

/// Full agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Service identity and listener settings.
    pub service: ServiceConfig,
    /// Authentication settings.
    pub auth: AuthConfig,
    /// Capability policy settings.
    pub policy: PolicyConfig,
    /// Database backend settings.
    pub database: DatabaseConfig,
    /// Peer-agent channel settings.
    pub a2a: A2aConfig,
    /// Receipt / attestation settings.
    pub proof: ProofConfig,
    /// Service-level limits.
    pub limits: LimitsConfig,
}

impl AgentConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on any parse or validation failure.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Loads configuration from an explicit variable map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on any parse or validation failure.
    pub fn from_map(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let service = ServiceConfig {
            port: parse_number(get("PORT"), "PORT", 8080)?,
            name: get("SERVICE_NAME").unwrap_or("private-db-agent").to_string(),
            version: get("SERVICE_VERSION").unwrap_or("0.1.0").to_string(),
            environment: get("NODE_ENV").unwrap_or("development").to_string(),
        };

        let auth = AuthConfig {
            enabled: parse_bool(get("AUTH_ENABLED"), "AUTH_ENABLED", true)?,
            nonce_ttl_seconds: parse_number(
                get("AUTH_NONCE_TTL_SECONDS"),
                "AUTH_NONCE_TTL_SECONDS",
                300,
            )?,
            max_future_skew_seconds: parse_number(
                get("AUTH_MAX_FUTURE_SKEW_SECONDS"),
                "AUTH_MAX_FUTURE_SKEW_SECONDS",
                30,
            )?,
        };

        let capability_rules = match get("POLICY_CAPABILITY_RULES_JSON") {
            Some(raw) => serde_json::from_str::<CapabilityRules>(raw)
                .map_err(|err| invalid("POLICY_CAPABILITY_RULES_JSON", err.to_string()))?,
            None => CapabilityRules::canonical_defaults(),
        };
        let policy = PolicyConfig {
            capability_rules,
            enforce_capability_mode: parse_bool(
                get("POLICY_ENFORCE_CAPABILITY_MODE"),
                "POLICY_ENFORCE_CAPABILITY_MODE",
                true,
            )?,
        };

        let driver = match get("DB_DRIVER") {
            None | Some("sqlite") => DbDriver::Sqlite,
            Some("postgres") => DbDriver::Postgres,
            Some(other) => {
                return Err(invalid("DB_DRIVER", format!("unknown driver: {other}")));
            }
        };
        let database = DatabaseConfig {
            driver,
            url: get("DATABASE_URL").map(ToString::to_string),
            postgres_ssl: parse_bool(get("POSTGRES_SSL"), "POSTGRES_SSL", false)?,
            postgres_max_pool_size: parse_number(
                get("POSTGRES_MAX_POOL_SIZE"),
                "POSTGRES_MAX_POOL_SIZE",
                10,
            )?,
            sqlite_file_path: get("SQLITE_FILE_PATH")
                .map_or_else(|| PathBuf::from("data/agent.db"), PathBuf::from),
        };

        let mut signers: BTreeMap<String, AgentSignerEntry> =
            match get("A2A_AGENT_SIGNERS_JSON") {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|err| invalid("A2A_AGENT_SIGNERS_JSON", err.to_string()))?,
                None => BTreeMap::new(),
            };
        if let (Some(agent_id), Some(shared_secret)) =
            (get("A2A_AGENT_ID"), get("A2A_SHARED_SECRET"))
            && !signers.contains_key(agent_id)
        {
            signers.insert(
                agent_id.to_string(),
                AgentSignerEntry {
                    scheme: "hmac-sha256".to_string(),
                    shared_secret: Some(shared_secret.to_string()),
                    signer: None,
                },
            );
        }
        let a2a = A2aConfig {
            agent_id: get("A2A_AGENT_ID").map(ToString::to_string),
            shared_secret: get("A2A_SHARED_SECRET").map(ToString::to_string),
            signers,
            worker_count: parse_number(get("A2A_WORKER_COUNT"), "A2A_WORKER_COUNT", 2)?,
            queue_capacity: parse_number(get("A2A_QUEUE_CAPACITY"), "A2A_QUEUE_CAPACITY", 64)?,
            task_deadline_seconds: parse_number(
                get("A2A_TASK_DEADLINE_SECONDS"),
                "A2A_TASK_DEADLINE_SECONDS",
                30,
            )?,
        };

        let proof = ProofConfig {
            enabled: parse_bool(get("PROOF_ENABLED"), "PROOF_ENABLED", true)?,
            hash_algorithm: get("PROOF_HASH_ALGORITHM").unwrap_or("sha256").to_string(),
            trust_model: get("PROOF_TRUST_MODEL").unwrap_or("eigen-compute").to_string(),
            app_id: get("EIGEN_APP_ID").map(ToString::to_string),
            image_digest: get("EIGEN_IMAGE_DIGEST").map(ToString::to_string),
            attestation_report_hash: get("EIGEN_ATTESTATION_REPORT_HASH")
                .map(ToString::to_string),
            onchain_deployment_tx_hash: get("EIGEN_ONCHAIN_DEPLOYMENT_TX_HASH")
                .map(ToString::to_string),
        };

        let limits = LimitsConfig {
            request_deadline_seconds: parse_number(
                get("REQUEST_DEADLINE_SECONDS"),
                "REQUEST_DEADLINE_SECONDS",
                15,
            )?,
            replay_max_entries: parse_number(
                get("REPLAY_MAX_ENTRIES"),
                "REPLAY_MAX_ENTRIES",
                100_000,
            )?,
            idempotency_ttl_seconds: parse_number(
                get("IDEMPOTENCY_TTL_SECONDS"),
                "IDEMPOTENCY_TTL_SECONDS",
                86_400,
            )?,
            idempotency_max_entries: parse_number(
                get("IDEMPOTENCY_MAX_ENTRIES"),
                "IDEMPOTENCY_MAX_ENTRIES",
                50_000,
            )?,
            audit_enabled: parse_bool(get("AUDIT_ENABLED"), "AUDIT_ENABLED", true)?,
        };

        let config = Self {
            service,
            auth,
            policy,
            database,
            a2a,
            proof,
            limits,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a section is internally inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.nonce_ttl_seconds <= 0 {
            return Err(invalid("AUTH_NONCE_TTL_SECONDS", "must be greater than zero"));
        }
        if self.auth.max_future_skew_seconds < 0 {
            return Err(invalid("AUTH_MAX_FUTURE_SKEW_SECONDS", "must not be negative"));
        }
        if self.proof.hash_algorithm != "sha256" {
            return Err(invalid(
                "PROOF_HASH_ALGORITHM",
                format!("unsupported algorithm: {}", self.proof.hash_algorithm),
            ));
        }
        if self.database.driver == DbDriver::Postgres {
            let Some(raw) = &self.database.url else {
                return Err(ConfigError::Missing("DATABASE_URL"));
            };
            let parsed =
                Url::parse(raw).map_err(|err| invalid("DATABASE_URL", err.to_string()))?;
            if parsed.scheme() != "postgres" && parsed.scheme() != "postgresql" {
                return Err(invalid(
                    "DATABASE_URL",
                    format!("unexpected scheme: {}", parsed.scheme()),
                ));
            }
            if self.database.postgres_max_pool_size == 0 {
                return Err(invalid("POSTGRES_MAX_POOL_SIZE", "must be greater than zero"));
            }
        }
        for (agent_id, entry) in &self.a2a.signers {
            match entry.scheme.as_str() {
                "hmac-sha256" => {
                    if entry.shared_secret.is_none() {
                        return Err(invalid(
                            "A2A_AGENT_SIGNERS_JSON",
                            format!("agent {agent_id} requires sharedSecret"),
                        ));
                    }
                }
                "evm-personal-sign" => {
                    if entry.signer.is_none() {
                        return Err(invalid(
                            "A2A_AGENT_SIGNERS_JSON",
                            format!("agent {agent_id} requires signer"),
                        ));
                    }
                }
                other => {
                    return Err(invalid(
                        "A2A_AGENT_SIGNERS_JSON",
                        format!("agent {agent_id} has unknown scheme: {other}"),
                    ));
                }
            }
        }
        if self.a2a.worker_count == 0 {
            return Err(invalid("A2A_WORKER_COUNT", "must be greater than zero"));
        }
        if self.a2a.queue_capacity == 0 {
            return Err(invalid("A2A_QUEUE_CAPACITY", "must be greater than zero"));
        }
        if self.limits.request_deadline_seconds == 0 {
            return Err(invalid("REQUEST_DEADLINE_SECONDS", "must be greater than zero"));
        }
        Ok(())
    }

    /// Builds the replay guard configuration.
    #[must_use]
    pub const fn replay_config(&self) -> ReplayConfig {
        ReplayConfig {
            nonce_ttl_seconds: self.auth.nonce_ttl_seconds,
            max_future_skew_seconds: self.auth.max_future_skew_seconds,
            max_entries: self.limits.replay_max_entries,
        }
    }

    /// Builds the idempotency store configuration.
    #[must_use]
    pub const fn idempotency_config(&self) -> IdempotencyConfig {
        IdempotencyConfig {
            ttl_seconds: self.limits.idempotency_ttl_seconds,
            max_entries: self.limits.idempotency_max_entries,
        }
    }

    /// Builds the runtime claim snapshot from proof settings.
    #[must_use]
    pub fn runtime_claims(&self) -> RuntimeClaims {
        let verified = self.proof.enabled && self.proof.attestation_report_hash.is_some();
        RuntimeClaims {
            trust_model: self.proof.trust_model.clone(),
            app_id: self.proof.app_id.clone(),
            image_digest: self.proof.image_digest.clone(),
            attestation_report_hash: self.proof.attestation_report_hash.clone(),
            onchain_deployment_tx_hash: self.proof.onchain_deployment_tx_hash.clone(),
            verification_status: if verified {
                VerificationStatus::Verified
            } else {
                VerificationStatus::Unverified
            },
            verified,
        }
    }
}

// ============================================================================
// SECTION: Parsing Helpers
// ============================================================================

/// Parses a boolean variable accepting `true/false`, `1/0`, and `yes/no`.
fn parse_bool(
    value: Option<&str>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid(name, format!("expected a boolean, found {other:?}"))),
        },
    }
}

/// Parses a numeric variable with a default.
fn parse_number<T>(value: Option<&str>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|err| invalid(name, err.to_string())),
    }
}
