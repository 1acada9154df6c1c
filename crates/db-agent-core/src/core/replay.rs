// crates/db-agent-core/src/core/replay.rs
// ============================================================================
// Module: Replay Guard
// Description: TTL-bounded nonce tracking and timestamp skew enforcement.
// Purpose: Reject replayed or time-shifted signed requests per auth channel.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The replay guard tracks `(scope, nonce)` pairs with a TTL and enforces
//! the timestamp skew window around the signed-at instant. Scopes partition
//! nonces by auth channel so a nonce burned on the user-query channel does
//! not collide with the A2A or policy-mutation channels.
//!
//! Boundary semantics: a signed-at exactly `ttl` seconds old is accepted;
//! one second older is stale. A signed-at exactly `max_future_skew` seconds
//! ahead is accepted; one second further is rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::decision::codes;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Auth channel partitioning for nonces.
///
/// # Invariants
/// - Variants are stable for serialization and audit labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceScope {
    /// Wallet-signed query requests.
    UserQuery,
    /// Agent-to-agent task requests.
    A2a,
    /// Wallet-signed policy mutations.
    PolicyMutation,
}

impl NonceScope {
    /// Returns the stable label for the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserQuery => "user_query",
            Self::A2a => "a2a",
            Self::PolicyMutation => "policy_mutation",
        }
    }

    /// Returns the replay decision code for the scope's channel.
    #[must_use]
    pub const fn replay_code(self) -> &'static str {
        match self {
            Self::A2a => codes::A2A_NONCE_REPLAY,
            Self::UserQuery | Self::PolicyMutation => codes::NONCE_REPLAY,
        }
    }
}

// ============================================================================
// SECTION: Config & Errors
// ============================================================================

/// Replay guard configuration.
///
/// # Invariants
/// - All windows are whole seconds; `max_entries` bounds memory.
#[derive(Debug, Clone, Copy)]
pub struct ReplayConfig {
    /// Nonce time-to-live window in seconds.
    pub nonce_ttl_seconds: i64,
    /// Maximum accepted future skew in seconds.
    pub max_future_skew_seconds: i64,
    /// Maximum tracked entries before oldest-expiry eviction.
    pub max_entries: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            nonce_ttl_seconds: 300,
            max_future_skew_seconds: 30,
            max_entries: 100_000,
        }
    }
}

/// Replay guard rejections.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// Signed timestamp older than the TTL window.
    #[error("signed timestamp is stale")]
    Stale,
    /// Signed timestamp further ahead than the allowed skew.
    #[error("signed timestamp is in the future")]
    Future,
    /// Nonce already observed in this scope.
    #[error("nonce already used")]
    Replay(NonceScope),
}

impl ReplayError {
    /// Returns the stable decision code for this rejection.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Stale => codes::STALE_TIMESTAMP,
            Self::Future => codes::FUTURE_TIMESTAMP,
            Self::Replay(scope) => scope.replay_code(),
        }
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Mutex-guarded nonce set with TTL eviction.
///
/// # Invariants
/// - Check-then-insert is atomic under the entry lock.
/// - The entry count never exceeds `max_entries` after an observe call.
#[derive(Debug)]
pub struct ReplayGuard {
    /// Window configuration.
    config: ReplayConfig,
    /// Tracked `(scope, nonce)` pairs and their expiry (unix seconds).
    entries: Mutex<HashMap<(NonceScope, String), i64>>,
}

impl ReplayGuard {
    /// Creates a guard with the given configuration.
    #[must_use]
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured TTL in seconds.
    #[must_use]
    pub const fn nonce_ttl_seconds(&self) -> i64 {
        self.config.nonce_ttl_seconds
    }

    /// Validates the signed timestamp and records the nonce.
    ///
    /// On success the nonce is tracked until `signed_at + ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError`] on a stale or future timestamp, or when the
    /// nonce was already observed in this scope.
    pub fn observe(
        &self,
        scope: NonceScope,
        nonce: &str,
        signed_at: &Timestamp,
        now: &Timestamp,
    ) -> Result<(), ReplayError> {
        let age = now.seconds_since(signed_at);
        if age > self.config.nonce_ttl_seconds {
            return Err(ReplayError::Stale);
        }
        if -age > self.config.max_future_skew_seconds {
            return Err(ReplayError::Future);
        }
        let expires_at = signed_at.unix_seconds().saturating_add(self.config.nonce_ttl_seconds);
        let now_secs = now.unix_seconds();
        let Ok(mut entries) = self.entries.lock() else {
            // Fail closed when the lock is poisoned.
            return Err(ReplayError::Replay(scope));
        };
        let key = (scope, nonce.to_string());
        if let Some(existing) = entries.get(&key)
            && *existing >= now_secs
        {
            return Err(ReplayError::Replay(scope));
        }
        if entries.len() >= self.config.max_entries {
            entries.retain(|_, expiry| *expiry >= now_secs);
        }
        if entries.len() >= self.config.max_entries {
            // Oldest-expiry eviction when the sweep freed nothing.
            if let Some(oldest) =
                entries.iter().min_by_key(|(_, expiry)| **expiry).map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, expires_at);
        Ok(())
    }

    /// Evicts expired entries.
    pub fn sweep(&self, now: &Timestamp) {
        let now_secs = now.unix_seconds();
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, expiry| *expiry >= now_secs);
        }
    }

    /// Returns the current tracked entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns true when no entries are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
