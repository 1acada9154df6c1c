// crates/db-agent-core/src/core/idempotency.rs
// ============================================================================
// Module: Idempotency Store
// Description: TTL-bounded idempotency records for peer-agent task intake.
// Purpose: Make A2A task submission safe to retry without double execution.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Each A2A submission carries an idempotency key. The store maps
//! `(agent_id, key)` to the canonical body hash, the accepted task, and —
//! once the task reaches a terminal state — the exact envelope returned to
//! every matching replay. The compound check-then-insert is atomic under the
//! entry lock, so two racing submissions with the same key resolve to one
//! accepted task.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Stored idempotency record for one `(agent, key)` pair.
///
/// # Invariants
/// - `request_hash` is the canonical hash of `{taskType, input}`.
/// - `terminal` is written exactly once, by the executing worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    /// Canonical body hash bound to the key.
    pub request_hash: String,
    /// Task accepted for this key.
    pub task_id: TaskId,
    /// Terminal response envelope once the task completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal: Option<Value>,
    /// Expiry instant (unix seconds).
    pub expires_at: i64,
}

/// Resolution of an idempotency lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyResolution {
    /// Key unseen; a record was created for the given task.
    New,
    /// Key seen with a matching body hash; replay the stored record.
    Replay(IdempotencyRecord),
    /// Key seen with a different body hash.
    Conflict,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Idempotency store configuration.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyConfig {
    /// Record time-to-live in seconds.
    pub ttl_seconds: i64,
    /// Maximum tracked records before oldest-expiry eviction.
    pub max_entries: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 86_400,
            max_entries: 50_000,
        }
    }
}

/// Mutex-guarded idempotency store.
///
/// # Invariants
/// - Check-then-insert is atomic under the entry lock.
/// - The entry count never exceeds `max_entries` after a resolve call.
#[derive(Debug)]
pub struct IdempotencyStore {
    /// Store configuration.
    config: IdempotencyConfig,
    /// Records keyed by `(agent, key)`.
    entries: Mutex<HashMap<(AgentId, String), IdempotencyRecord>>,
}

impl IdempotencyStore {
    /// Creates a store with the given configuration.
    #[must_use]
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves a submission against the store.
    ///
    /// Unseen keys insert a fresh record bound to `task_id`. Seen keys
    /// replay when the body hash matches and conflict otherwise.
    #[must_use]
    pub fn resolve(
        &self,
        agent_id: &AgentId,
        key: &str,
        request_hash: &str,
        task_id: TaskId,
        now: &Timestamp,
    ) -> IdempotencyResolution {
        let now_secs = now.unix_seconds();
        let Ok(mut entries) = self.entries.lock() else {
            // Fail closed: treat a poisoned lock as a conflict.
            return IdempotencyResolution::Conflict;
        };
        let map_key = (agent_id.clone(), key.to_string());
        if let Some(existing) = entries.get(&map_key)
            && existing.expires_at >= now_secs
        {
            if existing.request_hash == request_hash {
                return IdempotencyResolution::Replay(existing.clone());
            }
            return IdempotencyResolution::Conflict;
        }
        if entries.len() >= self.config.max_entries {
            entries.retain(|_, record| record.expires_at >= now_secs);
        }
        if entries.len() >= self.config.max_entries {
            // Oldest-expiry eviction when the sweep freed nothing.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, record)| record.expires_at)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            map_key,
            IdempotencyRecord {
                request_hash: request_hash.to_string(),
                task_id,
                terminal: None,
                expires_at: now_secs.saturating_add(self.config.ttl_seconds),
            },
        );
        IdempotencyResolution::New
    }

    /// Persists the terminal envelope for a completed task.
    ///
    /// The first terminal write wins; later writes are ignored.
    pub fn record_terminal(&self, agent_id: &AgentId, key: &str, envelope: Value) {
        if let Ok(mut entries) = self.entries.lock()
            && let Some(record) = entries.get_mut(&(agent_id.clone(), key.to_string()))
            && record.terminal.is_none()
        {
            record.terminal = Some(envelope);
        }
    }

    /// Fetches the record for a key when present.
    #[must_use]
    pub fn get(&self, agent_id: &AgentId, key: &str) -> Option<IdempotencyRecord> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&(agent_id.clone(), key.to_string())).cloned())
    }

    /// Evicts expired records.
    pub fn sweep(&self, now: &Timestamp) {
        let now_secs = now.unix_seconds();
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, record| record.expires_at >= now_secs);
        }
    }
}
