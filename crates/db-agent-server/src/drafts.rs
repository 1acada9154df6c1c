// crates/db-agent-server/src/drafts.rs
// ============================================================================
// Module: AI Draft & Approval Store
// Description: Opaque draft records and their approval bindings.
// Purpose: Gate AI-assisted schema applies on explicit signed approvals.
// Dependencies: db-agent-core, serde
// ============================================================================

//! ## Overview
//! Drafts are opaque to the core: the store keeps only the canonical hash,
//! the tenant, and the signer. An approval binds `(draft_id, draft_hash)`
//! to the approving wallet; a schema apply that references a draft must
//! present a matching approval or is denied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use db_agent_core::ApprovalId;
use db_agent_core::DraftId;
use db_agent_core::TenantId;
use db_agent_core::Timestamp;
use db_agent_core::WalletAddress;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Stored opaque draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    /// Draft identifier.
    pub draft_id: DraftId,
    /// Canonical hash of the draft payload.
    pub draft_hash: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Wallet that submitted the draft.
    pub signer_address: WalletAddress,
    /// Verification metadata surfaced to callers.
    pub verification: Value,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

/// Stored approval binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    /// Approval identifier.
    pub approval_id: ApprovalId,
    /// Approved draft identifier.
    pub draft_id: DraftId,
    /// Approved draft hash.
    pub draft_hash: String,
    /// Approving wallet.
    pub approved_by: WalletAddress,
    /// Approval timestamp.
    pub approved_at: Timestamp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Draft store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    /// Referenced draft does not exist.
    #[error("draft not found")]
    NotFound,
    /// Presented hash does not match the stored draft.
    #[error("draft hash mismatch")]
    HashMismatch,
    /// Store lock poisoned.
    #[error("draft store unavailable")]
    Unavailable,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Mutex-guarded draft and approval store.
#[derive(Debug, Default)]
pub struct AiStore {
    /// Drafts keyed by draft id.
    drafts: Mutex<BTreeMap<String, DraftRecord>>,
    /// Approval records in issuance order.
    approvals: Mutex<Vec<ApprovalRecord>>,
}

impl AiStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new draft record.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError::Unavailable`] when the store lock is poisoned.
    pub fn create_draft(&self, record: DraftRecord) -> Result<(), DraftError> {
        let mut drafts = self.drafts.lock().map_err(|_| DraftError::Unavailable)?;
        drafts.insert(record.draft_id.as_str().to_string(), record);
        Ok(())
    }

    /// Returns a draft by identifier.
    #[must_use]
    pub fn get_draft(&self, draft_id: &DraftId) -> Option<DraftRecord> {
        self.drafts.lock().ok().and_then(|drafts| drafts.get(draft_id.as_str()).cloned())
    }

    /// Issues an approval bound to `(draft_id, draft_hash)`.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError::NotFound`] for unknown drafts and
    /// [`DraftError::HashMismatch`] when the presented hash differs.
    pub fn approve(
        &self,
        draft_id: &DraftId,
        draft_hash: &str,
        approved_by: WalletAddress,
        now: Timestamp,
    ) -> Result<ApprovalRecord, DraftError> {
        let drafts = self.drafts.lock().map_err(|_| DraftError::Unavailable)?;
        let draft = drafts.get(draft_id.as_str()).ok_or(DraftError::NotFound)?;
        if draft.draft_hash != draft_hash {
            return Err(DraftError::HashMismatch);
        }
        let record = ApprovalRecord {
            approval_id: ApprovalId::new(format!("appr_{}", uuid::Uuid::new_v4())),
            draft_id: draft_id.clone(),
            draft_hash: draft_hash.to_string(),
            approved_by,
            approved_at: now,
        };
        drop(drafts);
        let mut approvals = self.approvals.lock().map_err(|_| DraftError::Unavailable)?;
        approvals.push(record.clone());
        Ok(record)
    }

    /// Looks up an approval matching every bound field.
    #[must_use]
    pub fn find_approval(
        &self,
        draft_id: &DraftId,
        draft_hash: &str,
        approval_id: &ApprovalId,
        approved_by: &WalletAddress,
    ) -> Option<ApprovalRecord> {
        self.approvals.lock().ok().and_then(|approvals| {
            approvals
                .iter()
                .find(|record| {
                    &record.approval_id == approval_id
                        && &record.draft_id == draft_id
                        && record.draft_hash == draft_hash
                        && &record.approved_by == approved_by
                })
                .cloned()
        })
    }
}
