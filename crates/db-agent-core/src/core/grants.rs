// crates/db-agent-core/src/core/grants.rs
// ============================================================================
// Module: Grant Policy Engine
// Description: Tenant-scoped allow/deny grants and their evaluation.
// Purpose: Gate policy mutations and dynamic data execution on wallet grants.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Grants are tenant-scoped allow/deny rules over `(wallet, scope,
//! operation)`. Evaluation is deterministic and fail-closed: an explicit
//! deny strictly overrides any allow at equal or broader scope, the `all`
//! operation matches any operation, and the `database:*` scope covers every
//! table. Tenants come into existence lazily with their first grant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::decision::codes;
use crate::core::identifiers::GrantId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::WalletAddress;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Scope & Operation
// ============================================================================

/// Grant scope kind.
///
/// # Invariants
/// - Variants are stable for serialization and grant matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// Entire tenant database.
    Database,
    /// A single table within the tenant.
    Table,
}

/// Operation class gated by grants.
///
/// # Invariants
/// - Variants are stable for serialization and grant matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Row reads.
    Read,
    /// Row inserts.
    Insert,
    /// Row updates.
    Update,
    /// Row deletes.
    Delete,
    /// Schema alteration.
    Alter,
    /// Wildcard matching any operation.
    All,
}

impl Operation {
    /// Returns true when this grant operation matches a requested operation.
    #[must_use]
    pub fn matches(self, requested: Self) -> bool {
        self == Self::All || self == requested
    }
}

/// Grant effect.
///
/// # Invariants
/// - Variants are stable for serialization; deny strictly overrides allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Permit the matched operations.
    Allow,
    /// Forbid the matched operations, overriding any allow.
    Deny,
}

/// Requested or granted scope: a kind plus its identifier.
///
/// # Invariants
/// - `scope_id == "*"` only when `scope_type == Database`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantScope {
    /// Scope kind.
    pub scope_type: ScopeType,
    /// Scope identifier (`*` or a table name).
    pub scope_id: String,
}

impl GrantScope {
    /// Builds the whole-database wildcard scope.
    #[must_use]
    pub fn database() -> Self {
        Self {
            scope_type: ScopeType::Database,
            scope_id: "*".to_string(),
        }
    }

    /// Builds a table scope.
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            scope_type: ScopeType::Table,
            scope_id: name.into(),
        }
    }

    /// Validates the wildcard invariant.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::InvalidScope`] when a table scope carries the
    /// `*` identifier.
    pub fn validate(&self) -> Result<(), GrantError> {
        if self.scope_id == "*" && self.scope_type != ScopeType::Database {
            return Err(GrantError::InvalidScope(
                "wildcard scope id requires database scope".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true when this granted scope covers a requested scope.
    ///
    /// `database:*` covers any scope; a table scope covers exactly itself.
    #[must_use]
    pub fn covers(&self, requested: &Self) -> bool {
        match self.scope_type {
            ScopeType::Database => true,
            ScopeType::Table => {
                requested.scope_type == ScopeType::Table && requested.scope_id == self.scope_id
            }
        }
    }
}

// ============================================================================
// SECTION: Grant
// ============================================================================

/// Tenant-scoped allow/deny grant.
///
/// # Invariants
/// - Uniqueness key is `(tenant, wallet, scope_type, scope_id, operation,
///   effect)`; later issuance replaces the prior grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Grant identifier.
    pub grant_id: GrantId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Wallet the grant applies to.
    pub wallet_address: WalletAddress,
    /// Granted scope.
    #[serde(flatten)]
    pub scope: GrantScope,
    /// Granted operation class.
    pub operation: Operation,
    /// Allow or deny effect.
    pub effect: Effect,
    /// Wallet that issued the grant.
    pub issued_by: WalletAddress,
    /// Issuance timestamp.
    pub issued_at: Timestamp,
    /// Canonical hash of the issuing signature envelope.
    pub signature_hash: String,
}

// ============================================================================
// SECTION: Errors & Decisions
// ============================================================================

/// Errors raised by grant construction and mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GrantError {
    /// Scope violated the wildcard invariant.
    #[error("invalid grant scope: {0}")]
    InvalidScope(String),
    /// Grant not found for revocation.
    #[error("grant not found")]
    NotFound,
    /// Revocation asserted a signature hash that does not match.
    #[error("grant signature hash mismatch")]
    SignatureHashMismatch,
}

/// Outcome of a grant evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantDecision {
    /// A matching allow grant exists and no deny overrides it.
    Allowed,
    /// A matching grant carries an explicit deny effect.
    ExplicitDeny,
    /// No grant matched the requested scope and operation.
    NoMatchingGrant,
}

impl GrantDecision {
    /// Returns the stable decision code for this outcome.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Allowed => codes::ALLOWED,
            Self::ExplicitDeny => codes::POLICY_DENIED_EXPLICIT_DENY,
            Self::NoMatchingGrant => codes::POLICY_NO_MATCHING_GRANT,
        }
    }

    /// Returns true when the outcome is allow.
    #[must_use]
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

// ============================================================================
// SECTION: Grant Store
// ============================================================================

/// In-memory grant store with reader/writer discipline.
///
/// # Invariants
/// - Mutations serialize under the write lock; reads are concurrent.
/// - Grants honoring the uniqueness key replace their predecessor.
#[derive(Debug, Default)]
pub struct GrantStore {
    /// Per-tenant grant lists.
    grants: RwLock<BTreeMap<TenantId, Vec<Grant>>>,
}

impl GrantStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the tenant has no grants yet (bootstrap state).
    #[must_use]
    pub fn is_bootstrap(&self, tenant: &TenantId) -> bool {
        match self.grants.read() {
            Ok(grants) => grants.get(tenant).is_none_or(|entries| entries.is_empty()),
            Err(_) => false,
        }
    }

    /// Inserts a grant, replacing any entry with the same uniqueness key.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::InvalidScope`] when the scope is malformed or
    /// the store lock is poisoned.
    pub fn insert(&self, grant: Grant) -> Result<(), GrantError> {
        grant.scope.validate()?;
        let mut grants = self
            .grants
            .write()
            .map_err(|_| GrantError::InvalidScope("grant store lock poisoned".to_string()))?;
        let entries = grants.entry(grant.tenant_id.clone()).or_default();
        entries.retain(|existing| {
            !(existing.wallet_address == grant.wallet_address
                && existing.scope == grant.scope
                && existing.operation == grant.operation
                && existing.effect == grant.effect)
        });
        entries.push(grant);
        Ok(())
    }

    /// Revokes a grant by identifier.
    ///
    /// When `expected_signature_hash` is supplied it must match the stored
    /// grant's signature hash.
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::NotFound`] when no grant matches and
    /// [`GrantError::SignatureHashMismatch`] on an asserted-hash mismatch.
    pub fn revoke(
        &self,
        tenant: &TenantId,
        grant_id: GrantId,
        expected_signature_hash: Option<&str>,
    ) -> Result<Grant, GrantError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| GrantError::InvalidScope("grant store lock poisoned".to_string()))?;
        let entries = grants.get_mut(tenant).ok_or(GrantError::NotFound)?;
        let position = entries
            .iter()
            .position(|grant| grant.grant_id == grant_id)
            .ok_or(GrantError::NotFound)?;
        if let Some(expected) = expected_signature_hash
            && entries[position].signature_hash != expected
        {
            return Err(GrantError::SignatureHashMismatch);
        }
        Ok(entries.remove(position))
    }

    /// Lists grants for a tenant, optionally filtered by wallet.
    #[must_use]
    pub fn list(&self, tenant: &TenantId, wallet: Option<&WalletAddress>) -> Vec<Grant> {
        match self.grants.read() {
            Ok(grants) => grants
                .get(tenant)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|grant| wallet.is_none_or(|w| &grant.wallet_address == w))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns true when the wallet holds the tenant-admin grant
    /// (`database:*` / `all` / allow).
    #[must_use]
    pub fn is_tenant_admin(&self, tenant: &TenantId, wallet: &WalletAddress) -> bool {
        match self.grants.read() {
            Ok(grants) => grants.get(tenant).is_some_and(|entries| {
                entries.iter().any(|grant| {
                    &grant.wallet_address == wallet
                        && grant.scope.scope_type == ScopeType::Database
                        && grant.operation == Operation::All
                        && grant.effect == Effect::Allow
                })
            }),
            Err(_) => false,
        }
    }

    /// Evaluates `(tenant, wallet, scope, operation)` against the store.
    ///
    /// Deny strictly overrides allow; absent grants deny.
    #[must_use]
    pub fn evaluate(
        &self,
        tenant: &TenantId,
        wallet: &WalletAddress,
        scope: &GrantScope,
        operation: Operation,
    ) -> GrantDecision {
        let Ok(grants) = self.grants.read() else {
            return GrantDecision::NoMatchingGrant;
        };
        let Some(entries) = grants.get(tenant) else {
            return GrantDecision::NoMatchingGrant;
        };
        let matching: Vec<&Grant> = entries
            .iter()
            .filter(|grant| {
                &grant.wallet_address == wallet
                    && grant.scope.covers(scope)
                    && grant.operation.matches(operation)
            })
            .collect();
        if matching.iter().any(|grant| grant.effect == Effect::Deny) {
            return GrantDecision::ExplicitDeny;
        }
        if matching.iter().any(|grant| grant.effect == Effect::Allow) {
            return GrantDecision::Allowed;
        }
        GrantDecision::NoMatchingGrant
    }
}
