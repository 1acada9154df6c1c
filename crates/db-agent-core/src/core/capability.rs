// crates/db-agent-core/src/core/capability.rs
// ============================================================================
// Module: Capability Rules
// Description: Capability identifiers and template-allowlist evaluation.
// Purpose: Gate the template query path on configured capability rules.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A capability is a namespaced permission identifier such as
//! `balances:read`. Its `:read` / `:write` suffix selects the template mode
//! the caller may execute. Capability rules map each capability to its
//! allowed template set and an optional requester allowlist. Evaluation is
//! deterministic and fail-closed: unknown capabilities deny.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::adapter::ExecuteMode;
use crate::core::decision::codes;

// ============================================================================
// SECTION: Capability
// ============================================================================

/// Namespaced capability identifier.
///
/// # Invariants
/// - Opaque string on the wire; the `:read` / `:write` suffix selects the
///   required template mode when present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// Creates a new capability identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the capability as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the template mode selected by the capability suffix.
    ///
    /// Suffix `:read` selects read mode, `:write` selects write mode; any
    /// other suffix yields `None`.
    #[must_use]
    pub fn mode_suffix(&self) -> Option<ExecuteMode> {
        match self.0.rsplit(':').next() {
            Some("read") => Some(ExecuteMode::Read),
            Some("write") => Some(ExecuteMode::Write),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Rule attached to a single capability.
///
/// # Invariants
/// - `templates` is the authoritative allowlist for the capability.
/// - `requesters`, when present, holds lowercase wallet addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRule {
    /// Allowed template names.
    pub templates: Vec<String>,
    /// Optional requester allowlist (lowercase addresses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requesters: Option<Vec<String>>,
}

/// Active capability rule set.
///
/// # Invariants
/// - Keys are capability strings; evaluation is deterministic over the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityRules {
    /// Capability to rule mapping.
    rules: BTreeMap<String, CapabilityRule>,
}

/// Outcome of a capability evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityDecision {
    /// Capability, requester, and template all check out.
    Allowed,
    /// Capability is not a key in the rule set.
    UnknownCapability,
    /// Requester is not in the capability allowlist.
    RequesterNotAllowed,
    /// Template is outside the capability template set.
    TemplateNotAllowed {
        /// The configured template set, surfaced to the caller.
        allowed_templates: Vec<String>,
    },
}

impl CapabilityDecision {
    /// Returns the stable decision code for this outcome.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Allowed => codes::ALLOWED,
            Self::UnknownCapability => codes::UNKNOWN_CAPABILITY,
            Self::RequesterNotAllowed => codes::REQUESTER_NOT_ALLOWED,
            Self::TemplateNotAllowed {
                ..
            } => codes::TEMPLATE_NOT_ALLOWED,
        }
    }
}

impl CapabilityRules {
    /// Builds a rule set from a capability to rule mapping.
    #[must_use]
    pub const fn new(rules: BTreeMap<String, CapabilityRule>) -> Self {
        Self {
            rules,
        }
    }

    /// Returns the canonical default rule set shipped with the agent.
    #[must_use]
    pub fn canonical_defaults() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            "balances:read".to_string(),
            CapabilityRule {
                templates: vec!["wallet_balances".to_string()],
                requesters: None,
            },
        );
        rules.insert(
            "positions:read".to_string(),
            CapabilityRule {
                templates: vec!["wallet_positions".to_string()],
                requesters: None,
            },
        );
        rules.insert(
            "transactions:read".to_string(),
            CapabilityRule {
                templates: vec!["wallet_transactions".to_string()],
                requesters: None,
            },
        );
        rules.insert(
            "audit:write".to_string(),
            CapabilityRule {
                templates: vec!["access_log_insert".to_string()],
                requesters: None,
            },
        );
        Self {
            rules,
        }
    }

    /// Returns true when no capabilities are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the rule for a capability when configured.
    #[must_use]
    pub fn rule(&self, capability: &Capability) -> Option<&CapabilityRule> {
        self.rules.get(capability.as_str())
    }

    /// Evaluates `(requester, capability, template)` against the rule set.
    ///
    /// Requester comparison is case-insensitive; the allowlist holds
    /// lowercase addresses.
    #[must_use]
    pub fn evaluate(
        &self,
        requester: &str,
        capability: &Capability,
        template: &str,
    ) -> CapabilityDecision {
        let Some(rule) = self.rules.get(capability.as_str()) else {
            return CapabilityDecision::UnknownCapability;
        };
        if let Some(requesters) = &rule.requesters {
            let lowered = requester.to_ascii_lowercase();
            if !requesters.iter().any(|entry| entry.eq_ignore_ascii_case(&lowered)) {
                return CapabilityDecision::RequesterNotAllowed;
            }
        }
        if !rule.templates.iter().any(|entry| entry == template) {
            return CapabilityDecision::TemplateNotAllowed {
                allowed_templates: rule.templates.clone(),
            };
        }
        CapabilityDecision::Allowed
    }
}
