// crates/db-agent-server/src/pipeline.rs
// ============================================================================
// Module: Request Pipeline
// Description: Validate → auth → policy → execute → receipt → audit ladder.
// Purpose: Drive every request to exactly one decision, receipt, and audit.
// Dependencies: db-agent-auth, db-agent-core, crate::{app, validation}
// ============================================================================

//! ## Overview
//! The pipeline runs its stages strictly in order and short-circuits on the
//! first failure; the receipt and audit stages always run, whatever the
//! outcome. Status mapping: validation 400, authentication 401, policy 403,
//! execution 400/500 by code, service 500 (503 for adapter
//! unavailability).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use db_agent_auth::QuerySigningEnvelope;
use db_agent_core::AuditRecord;
use db_agent_core::AuditStatus;
use db_agent_core::Decision;
use db_agent_core::ExecuteRequest;
use db_agent_core::RequestFacet;
use db_agent_core::Stage;
use db_agent_core::TemplateError;
use db_agent_core::codes;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::app::Application;
use crate::metrics::MetricOutcome;
use crate::validation::QueryRequest;
use crate::validation::facet_from_raw;
use crate::validation::parse_query_request;

// ============================================================================
// SECTION: Response Shape
// ============================================================================

/// Pipeline response: HTTP status plus the JSON envelope.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response envelope.
    pub body: Value,
}

impl ApiResponse {
    /// Returns true when the response is a success status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status < 400
    }
}

// ============================================================================
// SECTION: Finalization
// ============================================================================

/// Runs the receipt and audit stages and assembles the response envelope.
///
/// This is the single exit path of every pipeline: whatever stage decided,
/// the receipt and audit always run here.
pub async fn finalize(
    app: &Application,
    route: &'static str,
    started: Instant,
    facet: RequestFacet,
    decision: Decision,
    status: u16,
    extra: Map<String, Value>,
) -> ApiResponse {
    let receipt = match app.receipts.build(&facet, &decision) {
        Ok(Some(receipt)) => serde_json::to_value(&receipt).unwrap_or(Value::Null),
        Ok(None) | Err(_) => Value::Null,
    };
    let audit_status = append_audit(app, &facet, &decision).await;

    let mut body = Map::new();
    body.insert("code".to_string(), Value::from(decision.code.clone()));
    body.insert("message".to_string(), Value::from(decision.message.clone()));
    body.insert(
        "decision".to_string(),
        serde_json::to_value(&decision).unwrap_or(Value::Null),
    );
    body.insert("receipt".to_string(), receipt);
    body.insert(
        "audit".to_string(),
        serde_json::to_value(&audit_status).unwrap_or(Value::Null),
    );
    for (key, value) in extra {
        body.insert(key, value);
    }

    let outcome = if decision.is_allow() { MetricOutcome::Allow } else { MetricOutcome::Deny };
    app.metrics.record_request(route, outcome, started.elapsed());

    ApiResponse {
        status,
        body: Value::Object(body),
    }
}

/// Attempts the single audit append for a request.
pub(crate) async fn append_audit(
    app: &Application,
    facet: &RequestFacet,
    decision: &Decision,
) -> AuditStatus {
    if !app.config.limits.audit_enabled {
        return AuditStatus::disabled();
    }
    let record = AuditRecord {
        request_id: facet.request_id.clone(),
        tenant_id: facet.tenant_id.clone(),
        requester: facet.requester.clone(),
        capability: facet.capability.clone(),
        query_template: facet.query_template.clone(),
        decision: decision.clone(),
        created_at: app.clock.now(),
    };
    match app.audit.append(&record).await {
        Ok(()) => AuditStatus::logged(),
        Err(_) => AuditStatus::failed(),
    }
}

// ============================================================================
// SECTION: Query Pipeline
// ============================================================================

/// Runs the full wallet-authenticated query pipeline.
pub async fn run_query(app: &Application, body: &Value) -> ApiResponse {
    let started = Instant::now();
    let request = match parse_query_request(body) {
        Ok(request) => request,
        Err(err) => {
            let facet = facet_from_raw(body, "query");
            let decision = Decision::deny(Stage::Validation, codes::INVALID_REQUEST, err.message);
            return finalize(app, "query", started, facet, decision, 400, Map::new()).await;
        }
    };
    let facet = query_facet(&request);

    // Authentication.
    let Some(auth) = &request.auth else {
        let decision =
            Decision::deny(Stage::Authentication, codes::MISSING_AUTH, "auth block is required");
        return finalize(app, "query", started, facet, decision, 401, Map::new()).await;
    };
    let envelope = QuerySigningEnvelope {
        request_id: request.request_id.clone(),
        tenant_id: request.tenant_id.as_ref().map(|tenant| tenant.as_str().to_string()),
        requester: request.requester_raw.clone(),
        capability: request.capability.as_str().to_string(),
        query_template: request.query_template.clone(),
        query_params: Value::Object(request.query_params.clone()),
        nonce: auth.nonce.clone(),
        signed_at: auth.signed_at.clone(),
    };
    if let Err(err) =
        app.authenticator.verify_query(&request.requester, &envelope, auth.signature.as_deref())
    {
        let decision = Decision::deny(Stage::Authentication, err.code(), err.to_string());
        return finalize(app, "query", started, facet, decision, 401, Map::new()).await;
    }

    // Policy, execution, and the shared tail.
    run_query_stages(app, "query", started, request, facet).await
}

/// Runs the query pipeline for a pre-authenticated peer-agent task.
///
/// The A2A channel authenticated and replay-checked the submission at
/// intake, so the wallet signature stage is skipped here.
pub async fn run_query_for_agent(
    app: &Application,
    body: &Value,
    auth_nonce: &str,
    auth_signed_at: &str,
) -> ApiResponse {
    let started = Instant::now();
    let request = match parse_query_request(body) {
        Ok(request) => request,
        Err(err) => {
            let mut facet = facet_from_raw(body, "query");
            facet.auth_nonce = auth_nonce.to_string();
            facet.auth_signed_at = auth_signed_at.to_string();
            let decision = Decision::deny(Stage::Validation, codes::INVALID_REQUEST, err.message);
            return finalize(app, "a2a_query", started, facet, decision, 400, Map::new()).await;
        }
    };
    let mut facet = query_facet(&request);
    facet.auth_nonce = auth_nonce.to_string();
    facet.auth_signed_at = auth_signed_at.to_string();
    run_query_stages(app, "a2a_query", started, request, facet).await
}

/// Policy and execution stages shared by both query entry points.
async fn run_query_stages(
    app: &Application,
    route: &'static str,
    started: Instant,
    request: QueryRequest,
    facet: RequestFacet,
) -> ApiResponse {
    use db_agent_core::CapabilityDecision;

    // Policy: capability evaluation.
    let capability_decision = app.config.policy.capability_rules.evaluate(
        request.requester.as_str(),
        &request.capability,
        &request.query_template,
    );
    match &capability_decision {
        CapabilityDecision::Allowed => {}
        CapabilityDecision::TemplateNotAllowed {
            allowed_templates,
        } => {
            let mut extra = Map::new();
            extra.insert("allowedTemplates".to_string(), json!(allowed_templates));
            let decision = Decision::deny(
                Stage::Policy,
                capability_decision.code(),
                "template is not allowed for this capability",
            );
            return finalize(app, route, started, facet, decision, 403, extra).await;
        }
        CapabilityDecision::UnknownCapability | CapabilityDecision::RequesterNotAllowed => {
            let decision = Decision::deny(
                Stage::Policy,
                capability_decision.code(),
                "capability policy denied the request",
            );
            return finalize(app, route, started, facet, decision, 403, Map::new()).await;
        }
    }

    // Policy: capability mode suffix against the template mode.
    if app.config.policy.enforce_capability_mode
        && let Some(template) = app.templates.get(&request.query_template)
        && let Some(suffix_mode) = request.capability.mode_suffix()
        && suffix_mode != template.mode
    {
        let decision = Decision::deny(
            Stage::Policy,
            codes::CAPABILITY_MODE_MISMATCH,
            "capability mode suffix conflicts with template mode",
        );
        return finalize(app, route, started, facet, decision, 403, Map::new()).await;
    }

    // Execution.
    let Some(template) = app.templates.get(&request.query_template) else {
        let decision = Decision::deny(
            Stage::Execution,
            codes::UNKNOWN_QUERY_TEMPLATE,
            "query template is not registered",
        );
        return finalize(app, route, started, facet, decision, 400, Map::new()).await;
    };
    let values = match template.bind(&request.query_params) {
        Ok(values) => values,
        Err(err) => {
            let mut extra = Map::new();
            if let TemplateError::UnknownParam {
                allowed,
                ..
            } = &err
            {
                extra.insert("allowedParams".to_string(), json!(allowed));
            }
            let decision = Decision::deny(Stage::Execution, err.code(), err.to_string());
            return finalize(app, route, started, facet, decision, 400, extra).await;
        }
    };
    let dialect = app.adapter.dialect();
    let Some(sql) = template.sql_for(dialect) else {
        let decision = Decision::deny(
            Stage::Execution,
            codes::UNSUPPORTED_DIALECT,
            format!("template has no SQL for dialect {}", dialect.as_str()),
        );
        return finalize(app, route, started, facet, decision, 500, Map::new()).await;
    };
    let execute = app.adapter.execute(ExecuteRequest {
        mode: template.mode,
        sql: sql.to_string(),
        params: values,
    });
    let deadline = Duration::from_secs(app.config.limits.request_deadline_seconds);
    let outcome = match tokio::time::timeout(deadline, execute).await {
        Err(_) => {
            let decision = Decision::deny(
                Stage::Service,
                codes::REQUEST_TIMEOUT,
                "request exceeded its deadline",
            );
            return finalize(app, route, started, facet, decision, 500, Map::new()).await;
        }
        Ok(Err(err)) => {
            let decision =
                Decision::deny(Stage::Execution, codes::DB_EXECUTION_FAILED, err.to_string());
            return finalize(app, route, started, facet, decision, 500, Map::new()).await;
        }
        Ok(Ok(outcome)) => outcome,
    };

    let mut extra = Map::new();
    extra.insert(
        "execution".to_string(),
        serde_json::to_value(&outcome).unwrap_or(Value::Null),
    );
    let decision = Decision::allow(Stage::Execution, codes::ALLOWED, "request allowed");
    finalize(app, route, started, facet, decision, 200, extra).await
}

/// Builds the receipt facet for a validated query request.
fn query_facet(request: &QueryRequest) -> RequestFacet {
    RequestFacet {
        request_id: request.request_id.clone(),
        tenant_id: request.tenant_id.as_ref().map(|tenant| tenant.as_str().to_string()),
        requester: request.requester_raw.clone(),
        capability: request.capability.as_str().to_string(),
        query_template: Some(request.query_template.clone()),
        query_params: Value::Object(request.query_params.clone()),
        auth_nonce: request.auth.as_ref().map(|auth| auth.nonce.clone()).unwrap_or_default(),
        auth_signed_at: request
            .auth
            .as_ref()
            .map(|auth| auth.signed_at.clone())
            .unwrap_or_default(),
    }
}
