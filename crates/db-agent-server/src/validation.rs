// crates/db-agent-server/src/validation.rs
// ============================================================================
// Module: Request Validation
// Description: Body-shape validation for wallet-authored requests.
// Purpose: Reject malformed envelopes before authentication runs.
// Dependencies: db-agent-core, serde_json
// ============================================================================

//! ## Overview
//! Validation is the first pipeline stage: the body must be a JSON object,
//! required strings must be present and non-empty, and identifiers must
//! parse. Failures still flow through receipt and audit, so validation also
//! provides a best-effort facet extractor for malformed bodies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use db_agent_core::Capability;
use db_agent_core::RequestFacet;
use db_agent_core::TenantId;
use db_agent_core::WalletAddress;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failures.
///
/// # Invariants
/// - Messages name the offending field but never echo its value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Redacted failure message.
    pub message: String,
}

impl ValidationError {
    /// Builds a validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Parsed Shapes
// ============================================================================

/// Auth sub-object of a wallet request.
#[derive(Debug, Clone)]
pub struct WalletAuthBlock {
    /// Caller-chosen nonce.
    pub nonce: String,
    /// Caller-signed timestamp string.
    pub signed_at: String,
    /// Signature hex when supplied.
    pub signature: Option<String>,
}

/// Validated `/v1/query` request.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Tenant scope when present.
    pub tenant_id: Option<TenantId>,
    /// Parsed requester wallet.
    pub requester: WalletAddress,
    /// Requester string as supplied (echoed into facets).
    pub requester_raw: String,
    /// Requested capability.
    pub capability: Capability,
    /// Requested template name.
    pub query_template: String,
    /// Caller-supplied parameters.
    pub query_params: Map<String, Value>,
    /// Auth block when present.
    pub auth: Option<WalletAuthBlock>,
}

/// Validated policy-mutation request.
#[derive(Debug, Clone)]
pub struct MutationRequest {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Parsed acting wallet.
    pub actor_wallet: WalletAddress,
    /// Acting wallet string as supplied.
    pub actor_wallet_raw: String,
    /// Action-specific payload.
    pub payload: Value,
    /// Auth block when present.
    pub auth: Option<WalletAuthBlock>,
}

// ============================================================================
// SECTION: Field Helpers
// ============================================================================

/// Requires the body to be a JSON object.
fn require_object(body: &Value) -> Result<&Map<String, Value>, ValidationError> {
    body.as_object().ok_or_else(|| ValidationError::new("request body must be a JSON object"))
}

/// Requires a non-empty string field.
fn require_string(map: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    match map.get(field) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        Some(Value::String(_)) => {
            Err(ValidationError::new(format!("{field} must not be empty")))
        }
        Some(_) => Err(ValidationError::new(format!("{field} must be a string"))),
        None => Err(ValidationError::new(format!("{field} is required"))),
    }
}

/// Reads an optional string field.
fn optional_string(
    map: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ValidationError::new(format!("{field} must be a string"))),
    }
}

/// Reads an optional object field, defaulting to empty.
fn optional_object(
    map: &Map<String, Value>,
    field: &str,
) -> Result<Map<String, Value>, ValidationError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(value)) => Ok(value.clone()),
        Some(_) => Err(ValidationError::new(format!("{field} must be an object"))),
    }
}

/// Parses the auth sub-object when present.
fn parse_auth(map: &Map<String, Value>) -> Result<Option<WalletAuthBlock>, ValidationError> {
    match map.get("auth") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(auth)) => Ok(Some(WalletAuthBlock {
            nonce: require_string(auth, "nonce")?,
            signed_at: require_string(auth, "signedAt")?,
            signature: optional_string(auth, "signature")?,
        })),
        Some(_) => Err(ValidationError::new("auth must be an object")),
    }
}

/// Parses an optional tenant id, validating its shape.
fn parse_tenant(
    map: &Map<String, Value>,
    required: bool,
) -> Result<Option<TenantId>, ValidationError> {
    match optional_string(map, "tenantId")? {
        Some(raw) => TenantId::parse(&raw)
            .map(Some)
            .map_err(|err| ValidationError::new(err.to_string())),
        None if required => Err(ValidationError::new("tenantId is required")),
        None => Ok(None),
    }
}

// ============================================================================
// SECTION: Request Parsers
// ============================================================================

/// Validates a `/v1/query` body.
///
/// # Errors
///
/// Returns [`ValidationError`] on the first violated shape constraint.
pub fn parse_query_request(body: &Value) -> Result<QueryRequest, ValidationError> {
    let map = require_object(body)?;
    let request_id = require_string(map, "requestId")?;
    let requester_raw = require_string(map, "requester")?;
    let requester = WalletAddress::parse(&requester_raw)
        .map_err(|err| ValidationError::new(err.to_string()))?;
    let capability = Capability::new(require_string(map, "capability")?);
    let query_template = require_string(map, "queryTemplate")?;
    let query_params = optional_object(map, "queryParams")?;
    let tenant_id = parse_tenant(map, false)?;
    let auth = parse_auth(map)?;
    Ok(QueryRequest {
        request_id,
        tenant_id,
        requester,
        requester_raw,
        capability,
        query_template,
        query_params,
        auth,
    })
}

/// Validates a policy-mutation body.
///
/// # Errors
///
/// Returns [`ValidationError`] on the first violated shape constraint.
pub fn parse_mutation_request(body: &Value) -> Result<MutationRequest, ValidationError> {
    let map = require_object(body)?;
    let request_id = require_string(map, "requestId")?;
    let tenant_id = parse_tenant(map, true)?
        .ok_or_else(|| ValidationError::new("tenantId is required"))?;
    let actor_wallet_raw = require_string(map, "actorWallet")?;
    let actor_wallet = WalletAddress::parse(&actor_wallet_raw)
        .map_err(|err| ValidationError::new(err.to_string()))?;
    let payload = match map.get("payload") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(payload)) => Value::Object(payload.clone()),
        Some(_) => return Err(ValidationError::new("payload must be an object")),
    };
    let auth = parse_auth(map)?;
    Ok(MutationRequest {
        request_id,
        tenant_id,
        actor_wallet,
        actor_wallet_raw,
        payload,
        auth,
    })
}

// ============================================================================
// SECTION: Facet Extraction
// ============================================================================

/// Extracts a best-effort receipt facet from a possibly malformed body.
///
/// Used when validation fails so the receipt and audit stages still run
/// over whatever the caller actually sent.
#[must_use]
pub fn facet_from_raw(body: &Value, capability_label: &str) -> RequestFacet {
    let empty = Map::new();
    let map = body.as_object().unwrap_or(&empty);
    let string_of = |field: &str| {
        map.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
    };
    let auth = map.get("auth").and_then(Value::as_object);
    let auth_string = |field: &str| {
        auth.and_then(|block| block.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    RequestFacet {
        request_id: string_of("requestId"),
        tenant_id: map.get("tenantId").and_then(Value::as_str).map(ToString::to_string),
        requester: if map.contains_key("actorWallet") {
            string_of("actorWallet")
        } else {
            string_of("requester")
        },
        capability: if map.contains_key("capability") {
            string_of("capability")
        } else {
            capability_label.to_string()
        },
        query_template: map
            .get("queryTemplate")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        query_params: map
            .get("queryParams")
            .cloned()
            .or_else(|| map.get("payload").cloned())
            .unwrap_or_else(|| Value::Object(Map::new())),
        auth_nonce: auth_string("nonce"),
        auth_signed_at: auth_string("signedAt"),
    }
}
