// crates/db-agent-server/src/control_plane.rs
// ============================================================================
// Module: Control Plane
// Description: Signed policy-mutation pipeline and AI draft endpoints.
// Purpose: Drive schema, grant, approval, and data-execute actions.
// Dependencies: db-agent-auth, db-agent-core, crate::{app, data_exec, pipeline}
// ============================================================================

//! ## Overview
//! Every control-plane action arrives as a wallet-signed mutation envelope:
//! `{requestId, tenantId, actorWallet, action, payload, nonce, signedAt}`
//! under the policy-mutation signing context. Actions share the pipeline
//! tail — receipt and audit always run — and differ only in their policy
//! checks and effects. Grants, drafts, and approvals write through the
//! adapter so the backing store stays the system of record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use db_agent_auth::PolicyMutationEnvelope;
use db_agent_core::ApprovalId;
use db_agent_core::Decision;
use db_agent_core::DraftId;
use db_agent_core::Effect;
use db_agent_core::ExecuteMode;
use db_agent_core::ExecuteRequest;
use db_agent_core::Grant;
use db_agent_core::GrantError;
use db_agent_core::GrantId;
use db_agent_core::GrantScope;
use db_agent_core::Operation;
use db_agent_core::RequestFacet;
use db_agent_core::ScopeType;
use db_agent_core::Stage;
use db_agent_core::TenantId;
use db_agent_core::WalletAddress;
use db_agent_core::codes;
use db_agent_core::hash_canonical_json_hex;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::app::Application;
use crate::data_exec;
use crate::drafts::DraftError;
use crate::drafts::DraftRecord;
use crate::pipeline::ApiResponse;
use crate::pipeline::finalize;
use crate::schema_registry::TenantSchema;
use crate::schema_registry::create_table_ddl;
use crate::validation::MutationRequest;
use crate::validation::facet_from_raw;
use crate::validation::parse_mutation_request;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Runs a policy-mutation action end to end.
pub async fn run_mutation(app: &Application, action: &str, body: &Value) -> ApiResponse {
    let started = Instant::now();
    let request = match parse_mutation_request(body) {
        Ok(request) => request,
        Err(err) => {
            let facet = facet_from_raw(body, action);
            let decision = Decision::deny(Stage::Validation, codes::INVALID_REQUEST, err.message);
            return finalize(app, "control_plane", started, facet, decision, 400, Map::new())
                .await;
        }
    };
    let facet = mutation_facet(&request, action);

    // Authentication over the mutation envelope.
    let Some(auth) = &request.auth else {
        let decision =
            Decision::deny(Stage::Authentication, codes::MISSING_AUTH, "auth block is required");
        return finalize(app, "control_plane", started, facet, decision, 401, Map::new()).await;
    };
    let envelope = PolicyMutationEnvelope {
        request_id: request.request_id.clone(),
        tenant_id: request.tenant_id.as_str().to_string(),
        actor_wallet: request.actor_wallet_raw.clone(),
        action: action.to_string(),
        payload: request.payload.clone(),
        nonce: auth.nonce.clone(),
        signed_at: auth.signed_at.clone(),
    };
    if let Err(err) = app.authenticator.verify_policy_mutation(
        &request.actor_wallet,
        &envelope,
        auth.signature.as_deref(),
    ) {
        let decision = Decision::deny(Stage::Authentication, err.code(), err.to_string());
        return finalize(app, "control_plane", started, facet, decision, 401, Map::new()).await;
    }
    let signature_hash = hash_canonical_json_hex(&envelope).unwrap_or_default();

    // Action dispatch.
    let outcome = match action {
        "schema:submit" => schema_submit(&request),
        "schema:apply" => schema_apply(app, &request, &signature_hash).await,
        "grant:create" => grant_create(app, &request, &signature_hash).await,
        "grant:revoke" => grant_revoke(app, &request).await,
        "ai:draft:approve" => draft_approve(app, &request).await,
        "ai:draft:create" => draft_create(app, &request).await,
        "data:execute" => data_execute(app, &request).await,
        other => ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            format!("unknown action: {other}"),
            400,
        ),
    };
    finalize(app, "control_plane", started, facet, outcome.decision, outcome.status, outcome.extra)
        .await
}

/// Builds the receipt facet for a mutation request.
fn mutation_facet(request: &MutationRequest, action: &str) -> RequestFacet {
    RequestFacet {
        request_id: request.request_id.clone(),
        tenant_id: Some(request.tenant_id.as_str().to_string()),
        requester: request.actor_wallet_raw.clone(),
        capability: action.to_string(),
        query_template: None,
        query_params: request.payload.clone(),
        auth_nonce: request.auth.as_ref().map(|auth| auth.nonce.clone()).unwrap_or_default(),
        auth_signed_at: request
            .auth
            .as_ref()
            .map(|auth| auth.signed_at.clone())
            .unwrap_or_default(),
    }
}

// ============================================================================
// SECTION: Action Outcome
// ============================================================================

/// Decision, status, and extra payload produced by one action.
struct ActionOutcome {
    /// Decision recorded for the action.
    decision: Decision,
    /// HTTP status code.
    status: u16,
    /// Action-specific response fields.
    extra: Map<String, Value>,
}

impl ActionOutcome {
    /// Builds an allow outcome.
    fn allow(code: &str, message: impl Into<String>, status: u16, extra: Map<String, Value>) -> Self {
        Self {
            decision: Decision::allow(Stage::Execution, code, message),
            status,
            extra,
        }
    }

    /// Builds a deny outcome.
    fn deny(stage: Stage, code: &str, message: impl Into<String>, status: u16) -> Self {
        Self {
            decision: Decision::deny(stage, code, message),
            status,
            extra: Map::new(),
        }
    }
}

// ============================================================================
// SECTION: Privilege Checks
// ============================================================================

/// Returns true when the actor may alter the tenant (admin, explicit alter
/// grant, or bootstrap state).
fn may_alter(app: &Application, tenant: &TenantId, wallet: &WalletAddress) -> bool {
    app.grants.is_bootstrap(tenant)
        || app
            .grants
            .evaluate(tenant, wallet, &GrantScope::database(), Operation::Alter)
            .is_allow()
}

// ============================================================================
// SECTION: Schema Actions
// ============================================================================

/// `schema:submit`: validates the draft payload and forwards it unchanged.
fn schema_submit(request: &MutationRequest) -> ActionOutcome {
    if parse_schema(&request.payload).is_err() {
        return ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "payload does not contain a valid schema",
            400,
        );
    }
    let mut extra = Map::new();
    extra.insert("submission".to_string(), json!({"forwarded": true}));
    ActionOutcome::allow(
        codes::SUBMISSION_FORWARDED,
        "schema submission forwarded",
        202,
        extra,
    )
}

/// `schema:apply`: installs the tenant schema and issues enumerated grants.
async fn schema_apply(
    app: &Application,
    request: &MutationRequest,
    signature_hash: &str,
) -> ActionOutcome {
    let tenant = &request.tenant_id;
    if !may_alter(app, tenant, &request.actor_wallet) {
        let eval = app.grants.evaluate(
            tenant,
            &request.actor_wallet,
            &GrantScope::database(),
            Operation::Alter,
        );
        return ActionOutcome::deny(Stage::Policy, eval.code(), "schema apply denied", 403);
    }

    // AI-assisted applies require a matching approval record.
    if let Some(ai_assist) = request.payload.get("aiAssist").and_then(Value::as_object)
        && let Some(draft_id) = ai_assist.get("draftId").and_then(Value::as_str)
    {
        let draft_hash = ai_assist.get("draftHash").and_then(Value::as_str).unwrap_or_default();
        let approval_id =
            ai_assist.get("approvalId").and_then(Value::as_str).unwrap_or_default();
        let approved_by =
            ai_assist.get("approvedBy").and_then(Value::as_str).unwrap_or_default();
        let approved = WalletAddress::parse(approved_by).ok().and_then(|wallet| {
            app.ai.find_approval(
                &DraftId::new(draft_id),
                draft_hash,
                &ApprovalId::new(approval_id),
                &wallet,
            )
        });
        if approved.is_none() {
            return ActionOutcome::deny(
                Stage::Policy,
                codes::AI_APPROVAL_REQUIRED,
                "ai-assisted apply requires a matching approval",
                403,
            );
        }
    }

    let schema = match parse_schema(&request.payload) {
        Ok(schema) => schema,
        Err(message) => {
            return ActionOutcome::deny(Stage::Validation, codes::INVALID_REQUEST, message, 400);
        }
    };
    if let Err(err) = app.schemas.install(tenant, schema.clone()) {
        return ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            err.to_string(),
            400,
        );
    }
    // Create the physical tables through the adapter.
    let dialect = app.adapter.dialect();
    for table in &schema.tables {
        let ddl = create_table_ddl(tenant, table, dialect);
        let result = app
            .adapter
            .execute(ExecuteRequest {
                mode: ExecuteMode::Write,
                sql: ddl,
                params: Vec::new(),
            })
            .await;
        if let Err(err) = result {
            return ActionOutcome::deny(
                Stage::Execution,
                codes::DB_EXECUTION_FAILED,
                err.to_string(),
                500,
            );
        }
    }

    // Issue any grants enumerated alongside the schema.
    let mut issued = Vec::new();
    if let Some(entries) = request.payload.get("grants").and_then(Value::as_array) {
        for entry in entries {
            let grant = match parse_grant_spec(app, request, entry, signature_hash).await {
                Ok(grant) => grant,
                Err(outcome) => return outcome,
            };
            if let Err(outcome) = store_grant(app, &grant).await {
                return outcome;
            }
            issued.push(json!(grant.grant_id.to_string()));
        }
    }

    let mut extra = Map::new();
    extra.insert(
        "schema".to_string(),
        json!({"tables": schema.tables.len()}),
    );
    extra.insert("grants".to_string(), Value::Array(issued));
    ActionOutcome::allow(codes::ALLOWED, "schema applied", 201, extra)
}

/// Parses the `schema` sub-object of a payload.
fn parse_schema(payload: &Value) -> Result<TenantSchema, String> {
    let schema = payload
        .get("schema")
        .ok_or_else(|| "payload.schema is required".to_string())?;
    serde_json::from_value::<TenantSchema>(schema.clone())
        .map_err(|err| format!("invalid schema: {err}"))
}

// ============================================================================
// SECTION: Grant Actions
// ============================================================================

/// `grant:create`: issues a grant under the admin or bootstrap rule.
async fn grant_create(
    app: &Application,
    request: &MutationRequest,
    signature_hash: &str,
) -> ActionOutcome {
    let tenant = &request.tenant_id;
    let grant = match parse_grant_spec(app, request, &request.payload, signature_hash).await {
        Ok(grant) => grant,
        Err(outcome) => return outcome,
    };

    let bootstrap = app.grants.is_bootstrap(tenant)
        && grant.wallet_address == request.actor_wallet
        && grant.scope.scope_type == ScopeType::Database
        && grant.operation == Operation::All
        && grant.effect == Effect::Allow;
    let admin = app.grants.is_tenant_admin(tenant, &request.actor_wallet);
    if !bootstrap && !admin {
        return ActionOutcome::deny(
            Stage::Policy,
            codes::POLICY_NO_MATCHING_GRANT,
            "grant creation requires tenant admin or bootstrap",
            403,
        );
    }
    if let Err(outcome) = store_grant(app, &grant).await {
        return outcome;
    }
    let mut extra = Map::new();
    extra.insert("grant".to_string(), serde_json::to_value(&grant).unwrap_or(Value::Null));
    ActionOutcome::allow(codes::ALLOWED, "grant created", 201, extra)
}

/// `grant:revoke`: removes a grant, optionally asserting its signature hash.
async fn grant_revoke(app: &Application, request: &MutationRequest) -> ActionOutcome {
    let tenant = &request.tenant_id;
    if !app.grants.is_tenant_admin(tenant, &request.actor_wallet) {
        return ActionOutcome::deny(
            Stage::Policy,
            codes::POLICY_NO_MATCHING_GRANT,
            "grant revocation requires tenant admin",
            403,
        );
    }
    let Some(grant_id) =
        request.payload.get("grantId").and_then(Value::as_str).and_then(GrantId::parse)
    else {
        return ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "payload.grantId is required",
            400,
        );
    };
    let expected = request.payload.get("expectedSignatureHash").and_then(Value::as_str);
    match app.grants.revoke(tenant, grant_id, expected) {
        Ok(revoked) => {
            delete_grant_row(app, &revoked).await;
            let mut extra = Map::new();
            extra.insert(
                "revoked".to_string(),
                serde_json::to_value(&revoked).unwrap_or(Value::Null),
            );
            ActionOutcome::allow(codes::ALLOWED, "grant revoked", 200, extra)
        }
        Err(GrantError::SignatureHashMismatch) => ActionOutcome::deny(
            Stage::Policy,
            codes::GRANT_SIGNATURE_HASH_MISMATCH,
            "expected signature hash does not match",
            409,
        ),
        Err(_) => ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "grant not found",
            404,
        ),
    }
}

/// Parses a grant specification against the acting request.
async fn parse_grant_spec(
    app: &Application,
    request: &MutationRequest,
    spec: &Value,
    signature_hash: &str,
) -> Result<Grant, ActionOutcome> {
    let invalid = |message: &str| {
        Err(ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            message.to_string(),
            400,
        ))
    };
    let Some(map) = spec.as_object() else {
        return invalid("grant spec must be an object");
    };
    let Some(wallet) = map
        .get("walletAddress")
        .and_then(Value::as_str)
        .and_then(|raw| WalletAddress::parse(raw).ok())
    else {
        return invalid("grant walletAddress is invalid");
    };
    let scope_type = match map.get("scopeType").and_then(Value::as_str) {
        Some("database") => ScopeType::Database,
        Some("table") => ScopeType::Table,
        _ => return invalid("grant scopeType must be database or table"),
    };
    let Some(scope_id) = map.get("scopeId").and_then(Value::as_str) else {
        return invalid("grant scopeId is required");
    };
    let operation = match map.get("operation").and_then(Value::as_str) {
        Some("read") => Operation::Read,
        Some("insert") => Operation::Insert,
        Some("update") => Operation::Update,
        Some("delete") => Operation::Delete,
        Some("alter") => Operation::Alter,
        Some("all") => Operation::All,
        _ => return invalid("grant operation is invalid"),
    };
    let effect = match map.get("effect").and_then(Value::as_str) {
        Some("allow") => Effect::Allow,
        Some("deny") => Effect::Deny,
        _ => return invalid("grant effect must be allow or deny"),
    };
    let scope = GrantScope {
        scope_type,
        scope_id: scope_id.to_string(),
    };
    if scope.validate().is_err() {
        return invalid("wildcard scope id requires database scope");
    }
    Ok(Grant {
        grant_id: GrantId::generate(),
        tenant_id: request.tenant_id.clone(),
        wallet_address: wallet,
        scope,
        operation,
        effect,
        issued_by: request.actor_wallet.clone(),
        issued_at: app.clock.now(),
        signature_hash: signature_hash.to_string(),
    })
}

/// Persists a grant through the adapter and inserts it into the store.
async fn store_grant(app: &Application, grant: &Grant) -> Result<(), ActionOutcome> {
    if let Err(err) = persist_grant_row(app, grant).await {
        return Err(ActionOutcome::deny(
            Stage::Execution,
            codes::DB_EXECUTION_FAILED,
            err,
            500,
        ));
    }
    if let Err(err) = app.grants.insert(grant.clone()) {
        return Err(ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            err.to_string(),
            400,
        ));
    }
    Ok(())
}

/// Writes a grant row into `policy_grants`.
async fn persist_grant_row(app: &Application, grant: &Grant) -> Result<(), String> {
    let sql = match app.adapter.dialect() {
        db_agent_core::Dialect::Sqlite => {
            "INSERT OR REPLACE INTO policy_grants (grant_id, tenant_id, wallet_address, \
             scope_type, scope_id, operation, effect, issued_by, issued_at, signature_hash) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        }
        db_agent_core::Dialect::Postgres => {
            "INSERT INTO policy_grants (grant_id, tenant_id, wallet_address, scope_type, \
             scope_id, operation, effect, issued_by, issued_at, signature_hash) VALUES ($1, $2, \
             $3, $4, $5, $6, $7, $8, $9, $10) ON CONFLICT (grant_id) DO NOTHING"
        }
    };
    let issued_at = grant.issued_at.format().map_err(|err| err.to_string())?;
    app.adapter
        .execute(ExecuteRequest {
            mode: ExecuteMode::Write,
            sql: sql.to_string(),
            params: vec![
                json!(grant.grant_id.to_string()),
                json!(grant.tenant_id.as_str()),
                json!(grant.wallet_address.as_str()),
                json!(scope_type_label(grant.scope.scope_type)),
                json!(grant.scope.scope_id),
                json!(operation_label(grant.operation)),
                json!(effect_label(grant.effect)),
                json!(grant.issued_by.as_str()),
                json!(issued_at),
                json!(grant.signature_hash),
            ],
        })
        .await
        .map(|_| ())
        .map_err(|err| err.to_string())
}

/// Best-effort removal of a revoked grant row.
async fn delete_grant_row(app: &Application, grant: &Grant) {
    let sql = match app.adapter.dialect() {
        db_agent_core::Dialect::Sqlite => "DELETE FROM policy_grants WHERE grant_id = ?1",
        db_agent_core::Dialect::Postgres => "DELETE FROM policy_grants WHERE grant_id = $1",
    };
    let _ = app
        .adapter
        .execute(ExecuteRequest {
            mode: ExecuteMode::Write,
            sql: sql.to_string(),
            params: vec![json!(grant.grant_id.to_string())],
        })
        .await;
}

/// Stable label for a scope type.
const fn scope_type_label(scope_type: ScopeType) -> &'static str {
    match scope_type {
        ScopeType::Database => "database",
        ScopeType::Table => "table",
    }
}

/// Stable label for an operation.
const fn operation_label(operation: Operation) -> &'static str {
    match operation {
        Operation::Read => "read",
        Operation::Insert => "insert",
        Operation::Update => "update",
        Operation::Delete => "delete",
        Operation::Alter => "alter",
        Operation::All => "all",
    }
}

/// Stable label for an effect.
const fn effect_label(effect: Effect) -> &'static str {
    match effect {
        Effect::Allow => "allow",
        Effect::Deny => "deny",
    }
}

// ============================================================================
// SECTION: AI Draft Actions
// ============================================================================

/// `ai:draft:create`: stores an opaque draft and returns its hash binding.
async fn draft_create(app: &Application, request: &MutationRequest) -> ActionOutcome {
    let Some(draft) = request.payload.get("draft") else {
        return ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "payload.draft is required",
            400,
        );
    };
    let Ok(draft_hash) = hash_canonical_json_hex(draft) else {
        return ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "draft payload cannot be canonicalized",
            400,
        );
    };
    let record = DraftRecord {
        draft_id: DraftId::new(format!("draft_{}", uuid::Uuid::new_v4())),
        draft_hash,
        tenant_id: request.tenant_id.clone(),
        signer_address: request.actor_wallet.clone(),
        verification: json!({"hashAlgorithm": "sha256"}),
        created_at: app.clock.now(),
    };
    if app.ai.create_draft(record.clone()).is_err() {
        return ActionOutcome::deny(
            Stage::Service,
            codes::INTERNAL_ERROR,
            "draft store unavailable",
            500,
        );
    }
    persist_draft_row(app, &record).await;
    let mut extra = Map::new();
    extra.insert("draft".to_string(), serde_json::to_value(&record).unwrap_or(Value::Null));
    ActionOutcome::allow(codes::ALLOWED, "draft stored", 201, extra)
}

/// `ai:draft:approve`: binds an approval to `(draftId, draftHash)`.
async fn draft_approve(app: &Application, request: &MutationRequest) -> ActionOutcome {
    let tenant = &request.tenant_id;
    if !may_alter(app, tenant, &request.actor_wallet) {
        let eval = app.grants.evaluate(
            tenant,
            &request.actor_wallet,
            &GrantScope::database(),
            Operation::Alter,
        );
        return ActionOutcome::deny(Stage::Policy, eval.code(), "draft approval denied", 403);
    }
    let (Some(draft_id), Some(draft_hash)) = (
        request.payload.get("draftId").and_then(Value::as_str),
        request.payload.get("draftHash").and_then(Value::as_str),
    ) else {
        return ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "payload.draftId and payload.draftHash are required",
            400,
        );
    };
    match app.ai.approve(
        &DraftId::new(draft_id),
        draft_hash,
        request.actor_wallet.clone(),
        app.clock.now(),
    ) {
        Ok(approval) => {
            persist_approval_row(app, &approval).await;
            let mut extra = Map::new();
            extra.insert(
                "approval".to_string(),
                serde_json::to_value(&approval).unwrap_or(Value::Null),
            );
            ActionOutcome::allow(codes::ALLOWED, "draft approved", 201, extra)
        }
        Err(DraftError::NotFound) => ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "draft not found",
            404,
        ),
        Err(DraftError::HashMismatch) => ActionOutcome::deny(
            Stage::Validation,
            codes::INVALID_REQUEST,
            "draft hash does not match",
            400,
        ),
        Err(DraftError::Unavailable) => ActionOutcome::deny(
            Stage::Service,
            codes::INTERNAL_ERROR,
            "draft store unavailable",
            500,
        ),
    }
}

/// Best-effort write of a draft row into `ai_drafts`.
async fn persist_draft_row(app: &Application, record: &DraftRecord) {
    let sql = match app.adapter.dialect() {
        db_agent_core::Dialect::Sqlite => {
            "INSERT OR REPLACE INTO ai_drafts (draft_id, draft_hash, tenant_id, signer_address, \
             verification, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        }
        db_agent_core::Dialect::Postgres => {
            "INSERT INTO ai_drafts (draft_id, draft_hash, tenant_id, signer_address, \
             verification, created_at) VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (draft_id) DO \
             NOTHING"
        }
    };
    let created_at = record.created_at.format().unwrap_or_default();
    let _ = app
        .adapter
        .execute(ExecuteRequest {
            mode: ExecuteMode::Write,
            sql: sql.to_string(),
            params: vec![
                json!(record.draft_id.as_str()),
                json!(record.draft_hash),
                json!(record.tenant_id.as_str()),
                json!(record.signer_address.as_str()),
                json!(record.verification.to_string()),
                json!(created_at),
            ],
        })
        .await;
}

/// Best-effort write of an approval row into `ai_approvals`.
async fn persist_approval_row(app: &Application, record: &crate::drafts::ApprovalRecord) {
    let sql = match app.adapter.dialect() {
        db_agent_core::Dialect::Sqlite => {
            "INSERT OR REPLACE INTO ai_approvals (approval_id, draft_id, draft_hash, \
             approved_by, approved_at) VALUES (?1, ?2, ?3, ?4, ?5)"
        }
        db_agent_core::Dialect::Postgres => {
            "INSERT INTO ai_approvals (approval_id, draft_id, draft_hash, approved_by, \
             approved_at) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (approval_id) DO NOTHING"
        }
    };
    let approved_at = record.approved_at.format().unwrap_or_default();
    let _ = app
        .adapter
        .execute(ExecuteRequest {
            mode: ExecuteMode::Write,
            sql: sql.to_string(),
            params: vec![
                json!(record.approval_id.as_str()),
                json!(record.draft_id.as_str()),
                json!(record.draft_hash),
                json!(record.approved_by.as_str()),
                json!(approved_at),
            ],
        })
        .await;
}

// ============================================================================
// SECTION: Data Execution
// ============================================================================

/// `data:execute`: grant-gated CRUD on a tenant table.
async fn data_execute(app: &Application, request: &MutationRequest) -> ActionOutcome {
    let payload = match data_exec::parse_payload(&request.payload) {
        Ok(payload) => payload,
        Err(err) => {
            return ActionOutcome::deny(Stage::Validation, err.code(), err.to_string(), 400);
        }
    };
    let tenant = &request.tenant_id;
    let scope = GrantScope::table(payload.table.clone());
    let eval = app.grants.evaluate(tenant, &request.actor_wallet, &scope, payload.operation);
    if !eval.is_allow() {
        return ActionOutcome::deny(Stage::Policy, eval.code(), "data execution denied", 403);
    }
    let execute = match data_exec::generate(&app.schemas, tenant, app.adapter.dialect(), &payload)
    {
        Ok(execute) => execute,
        Err(err) => {
            return ActionOutcome::deny(Stage::Execution, err.code(), err.to_string(), 400);
        }
    };
    let deadline = Duration::from_secs(app.config.limits.request_deadline_seconds);
    match tokio::time::timeout(deadline, app.adapter.execute(execute)).await {
        Err(_) => ActionOutcome::deny(
            Stage::Service,
            codes::REQUEST_TIMEOUT,
            "request exceeded its deadline",
            500,
        ),
        Ok(Err(err)) => ActionOutcome::deny(
            Stage::Execution,
            codes::DB_EXECUTION_FAILED,
            err.to_string(),
            500,
        ),
        Ok(Ok(outcome)) => {
            let mut extra = Map::new();
            extra.insert(
                "execution".to_string(),
                serde_json::to_value(&outcome).unwrap_or(Value::Null),
            );
            ActionOutcome::allow(codes::ALLOWED, "data execution allowed", 200, extra)
        }
    }
}
