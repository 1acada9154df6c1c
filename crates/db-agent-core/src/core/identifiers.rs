// crates/db-agent-core/src/core/identifiers.rs
// ============================================================================
// Module: Agent Identifiers
// Description: Canonical opaque identifiers for tenants, wallets, and agents.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, sha3
// ============================================================================

//! ## Overview
//! This module defines the canonical identifiers used throughout the agent.
//! Identifiers serialize as strings on the wire. Tenant and wallet
//! identifiers enforce their shape invariants at construction boundaries;
//! the remaining identifiers are opaque strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha3::Digest;
use sha3::Keccak256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Tenant identifier failed shape validation.
    #[error("invalid tenant id: {0}")]
    InvalidTenant(String),
    /// Wallet address failed shape or checksum validation.
    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),
}

// ============================================================================
// SECTION: Tenant Identifier
// ============================================================================

/// Tenant identifier scoping every grant, query, and mutation.
///
/// # Invariants
/// - Matches `^[a-z0-9][a-z0-9_-]{0,62}$`; at most 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Parses a tenant identifier, enforcing the shape invariant.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidTenant`] when the value does not
    /// match the tenant identifier shape.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let mut chars = raw.chars();
        let Some(first) = chars.next() else {
            return Err(IdentifierError::InvalidTenant("empty".to_string()));
        };
        if raw.len() > 63 {
            return Err(IdentifierError::InvalidTenant(format!("too long: {} chars", raw.len())));
        }
        if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
            return Err(IdentifierError::InvalidTenant(
                "must start with a lowercase letter or digit".to_string(),
            ));
        }
        for ch in chars {
            if !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-') {
                return Err(IdentifierError::InvalidTenant(format!("illegal character: {ch:?}")));
            }
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Wallet Address
// ============================================================================

/// Canonical EVM wallet address.
///
/// # Invariants
/// - Stored as lowercase `0x`-prefixed 40-hex.
/// - Mixed-case input must carry a valid EIP-55 checksum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parses a wallet address, normalizing to lowercase.
    ///
    /// All-lowercase and all-uppercase hex is accepted as checksum-agnostic;
    /// mixed-case input is verified against its EIP-55 checksum.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidWallet`] on malformed hex or a
    /// failed checksum.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) else {
            return Err(IdentifierError::InvalidWallet("missing 0x prefix".to_string()));
        };
        if hex.len() != 40 {
            return Err(IdentifierError::InvalidWallet(format!(
                "expected 40 hex characters, found {}",
                hex.len()
            )));
        }
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(IdentifierError::InvalidWallet("non-hex character".to_string()));
        }
        let has_upper = hex.chars().any(|ch| ch.is_ascii_uppercase());
        let has_lower = hex.chars().any(|ch| ch.is_ascii_lowercase());
        if has_upper && has_lower && !eip55_checksum_valid(hex) {
            return Err(IdentifierError::InvalidWallet("checksum mismatch".to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// Constructs an address from raw 20 bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("0x{}", super::hashing::hex_encode(bytes)))
    }

    /// Returns the canonical lowercase form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against another address string case-insensitively.
    #[must_use]
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Verifies an EIP-55 checksum over a 40-character hex body.
fn eip55_checksum_valid(hex: &str) -> bool {
    let lower = hex.to_ascii_lowercase();
    let digest = Keccak256::digest(lower.as_bytes());
    for (index, ch) in hex.chars().enumerate() {
        if !ch.is_ascii_alphabetic() {
            continue;
        }
        let byte = digest[index / 2];
        let nibble = if index % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        let expect_upper = nibble >= 8;
        if expect_upper != ch.is_ascii_uppercase() {
            return false;
        }
    }
    true
}

// ============================================================================
// SECTION: Opaque Identifiers
// ============================================================================

/// Peer agent identifier.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Creates a new agent identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Caller-supplied request identifier.
///
/// # Invariants
/// - Opaque UTF-8 string; echoed verbatim into receipts and audit rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a new request identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Background task identifier (UUID v4 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Generates a fresh task identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parses a task identifier from its string form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        uuid::Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Grant identifier (UUID v4 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(uuid::Uuid);

impl GrantId {
    /// Generates a fresh grant identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parses a grant identifier from its string form.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        uuid::Uuid::parse_str(raw).ok().map(Self)
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// AI draft identifier.
///
/// # Invariants
/// - Opaque UTF-8 string; drafts are external artifacts the core only hashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    /// Creates a new draft identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// AI draft approval identifier.
///
/// # Invariants
/// - Opaque UTF-8 string issued by the approval pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalId(String);

impl ApprovalId {
    /// Creates a new approval identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
