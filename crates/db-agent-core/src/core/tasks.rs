// crates/db-agent-core/src/core/tasks.rs
// ============================================================================
// Module: Task Store
// Description: Peer-agent task records and their state machine.
// Purpose: Track A2A background tasks through accepted/running/terminal.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A2A tasks move strictly through `accepted → running → (succeeded |
//! failed)`. Only the accepting worker writes terminal states, and any
//! transition out of a terminal state is rejected. The store is
//! mutex-guarded; every mutation is atomic under the entry lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::decision::codes;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Task lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and queued for execution.
    Accepted,
    /// Picked up by a worker.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error.
    Failed,
}

impl TaskStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Accepted, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    /// Parses a status filter label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accepted" => Some(Self::Accepted),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Record
// ============================================================================

/// Stored task record.
///
/// # Invariants
/// - `result` is set only in `succeeded`; `error` only in `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Task identifier.
    pub task_id: TaskId,
    /// Accepting agent identifier.
    pub agent_id: AgentId,
    /// Task type label (for example `query.execute`).
    pub task_type: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Task input payload.
    pub input: Value,
    /// Terminal result payload when succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Terminal error payload when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last transition timestamp.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Task store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task identifier not found.
    #[error("task not found")]
    NotFound,
    /// Transition attempted out of a terminal state.
    #[error("task is already terminal")]
    AlreadyTerminal,
    /// Transition violated the state machine ordering.
    #[error("illegal task transition")]
    IllegalTransition,
}

impl TaskError {
    /// Returns the stable decision code for this failure.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyTerminal => codes::TASK_ALREADY_TERMINAL,
            Self::NotFound | Self::IllegalTransition => codes::INTERNAL_ERROR,
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Mutex-guarded task store.
///
/// # Invariants
/// - Transitions observe the legal ordering; terminal records are immutable.
/// - Listing returns newest-first by creation order.
#[derive(Debug, Default)]
pub struct TaskStore {
    /// Task records keyed by identifier.
    tasks: Mutex<TaskStoreInner>,
}

/// Inner mutable state behind the store lock.
#[derive(Debug, Default)]
struct TaskStoreInner {
    /// Task records keyed by identifier.
    records: HashMap<TaskId, TaskRecord>,
    /// Creation order for listing.
    order: Vec<TaskId>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a task in the `accepted` state.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::IllegalTransition`] when the store lock is
    /// poisoned.
    pub fn create(
        &self,
        task_id: TaskId,
        agent_id: AgentId,
        task_type: impl Into<String>,
        input: Value,
        now: Timestamp,
    ) -> Result<TaskRecord, TaskError> {
        let record = TaskRecord {
            task_id,
            agent_id,
            task_type: task_type.into(),
            status: TaskStatus::Accepted,
            input,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let mut inner = self.tasks.lock().map_err(|_| TaskError::IllegalTransition)?;
        inner.order.push(task_id);
        inner.records.insert(task_id, record.clone());
        Ok(record)
    }

    /// Fetches a task by identifier.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.tasks.lock().ok().and_then(|inner| inner.records.get(&task_id).cloned())
    }

    /// Transitions a task to `running`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] when the task is missing, terminal, or the
    /// transition is out of order.
    pub fn mark_running(&self, task_id: TaskId, now: Timestamp) -> Result<TaskRecord, TaskError> {
        self.transition(task_id, TaskStatus::Running, None, None, now)
    }

    /// Transitions a task to `succeeded` with its result payload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] when the task is missing, terminal, or the
    /// transition is out of order.
    pub fn mark_succeeded(
        &self,
        task_id: TaskId,
        result: Value,
        now: Timestamp,
    ) -> Result<TaskRecord, TaskError> {
        self.transition(task_id, TaskStatus::Succeeded, Some(result), None, now)
    }

    /// Transitions a task to `failed` with its error payload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] when the task is missing, terminal, or the
    /// transition is out of order.
    pub fn mark_failed(
        &self,
        task_id: TaskId,
        error: Value,
        now: Timestamp,
    ) -> Result<TaskRecord, TaskError> {
        self.transition(task_id, TaskStatus::Failed, None, Some(error), now)
    }

    /// Lists tasks for an agent, newest first, filtered by status.
    #[must_use]
    pub fn list(
        &self,
        agent_id: &AgentId,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Vec<TaskRecord> {
        let Ok(inner) = self.tasks.lock() else {
            return Vec::new();
        };
        inner
            .order
            .iter()
            .rev()
            .filter_map(|task_id| inner.records.get(task_id))
            .filter(|record| &record.agent_id == agent_id)
            .filter(|record| status.is_none_or(|wanted| record.status == wanted))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Applies a single checked transition.
    fn transition(
        &self,
        task_id: TaskId,
        next: TaskStatus,
        result: Option<Value>,
        error: Option<Value>,
        now: Timestamp,
    ) -> Result<TaskRecord, TaskError> {
        let mut inner = self.tasks.lock().map_err(|_| TaskError::IllegalTransition)?;
        let record = inner.records.get_mut(&task_id).ok_or(TaskError::NotFound)?;
        if record.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal);
        }
        if !record.status.allows(next) {
            return Err(TaskError::IllegalTransition);
        }
        record.status = next;
        record.result = result;
        record.error = error;
        record.updated_at = now;
        Ok(record.clone())
    }
}
