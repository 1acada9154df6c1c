// crates/db-agent-core/src/lib.rs
// ============================================================================
// Module: Agent Core Library
// Description: Public API surface for the Private DB Agent core.
// Purpose: Expose the canonical model, policy engines, and store primitives.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The agent core provides deterministic canonical hashing, capability and
//! grant policy evaluation, the template registry, and the mutex-guarded
//! stores backing the request pipeline. It is backend-agnostic and
//! integrates through explicit interfaces rather than embedding a database
//! driver or HTTP framework.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use self::core::adapter::AdapterError;
pub use self::core::adapter::DbAdapter;
pub use self::core::adapter::Dialect;
pub use self::core::adapter::ExecuteMode;
pub use self::core::adapter::ExecuteOutcome;
pub use self::core::adapter::ExecuteRequest;
pub use self::core::adapter::SharedAdapter;
pub use self::core::audit::AuditRecord;
pub use self::core::audit::AuditStatus;
pub use self::core::capability::Capability;
pub use self::core::capability::CapabilityDecision;
pub use self::core::capability::CapabilityRule;
pub use self::core::capability::CapabilityRules;
pub use self::core::claims::RuntimeClaims;
pub use self::core::claims::VerificationStatus;
pub use self::core::decision::Decision;
pub use self::core::decision::Outcome;
pub use self::core::decision::Stage;
pub use self::core::decision::codes;
pub use self::core::grants::Effect;
pub use self::core::grants::Grant;
pub use self::core::grants::GrantDecision;
pub use self::core::grants::GrantError;
pub use self::core::grants::GrantScope;
pub use self::core::grants::GrantStore;
pub use self::core::grants::Operation;
pub use self::core::grants::ScopeType;
pub use self::core::hashing::HashAlgorithm;
pub use self::core::hashing::HashDigest;
pub use self::core::hashing::HashError;
pub use self::core::hashing::DEFAULT_HASH_ALGORITHM;
pub use self::core::hashing::canonical_json_bytes;
pub use self::core::hashing::hash_bytes;
pub use self::core::hashing::hash_canonical_json;
pub use self::core::hashing::hash_canonical_json_hex;
pub use self::core::idempotency::IdempotencyConfig;
pub use self::core::idempotency::IdempotencyRecord;
pub use self::core::idempotency::IdempotencyResolution;
pub use self::core::idempotency::IdempotencyStore;
pub use self::core::identifiers::AgentId;
pub use self::core::identifiers::ApprovalId;
pub use self::core::identifiers::DraftId;
pub use self::core::identifiers::GrantId;
pub use self::core::identifiers::IdentifierError;
pub use self::core::identifiers::RequestId;
pub use self::core::identifiers::TaskId;
pub use self::core::identifiers::TenantId;
pub use self::core::identifiers::WalletAddress;
pub use self::core::receipt::Receipt;
pub use self::core::receipt::ReceiptService;
pub use self::core::receipt::RequestFacet;
pub use self::core::receipt::VerificationFacet;
pub use self::core::receipt::VerificationRuntime;
pub use self::core::receipt::derive_receipt_id;
pub use self::core::replay::NonceScope;
pub use self::core::replay::ReplayConfig;
pub use self::core::replay::ReplayError;
pub use self::core::replay::ReplayGuard;
pub use self::core::tasks::TaskError;
pub use self::core::tasks::TaskRecord;
pub use self::core::tasks::TaskStatus;
pub use self::core::tasks::TaskStore;
pub use self::core::templates::ParamKind;
pub use self::core::templates::ParamSpec;
pub use self::core::templates::QueryTemplate;
pub use self::core::templates::TemplateError;
pub use self::core::templates::TemplateRegistry;
pub use self::core::time::Clock;
pub use self::core::time::FixedClock;
pub use self::core::time::SharedClock;
pub use self::core::time::SystemClock;
pub use self::core::time::TimeError;
pub use self::core::time::Timestamp;
