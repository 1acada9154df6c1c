// crates/db-agent-server/src/routes.rs
// ============================================================================
// Module: HTTP Routes
// Description: Axum router and handlers for the agent's HTTP surface.
// Purpose: Map paths onto the pipeline, control plane, and task intake.
// Dependencies: axum, db-agent-auth, db-agent-core, crate modules
// ============================================================================

//! ## Overview
//! Handlers are thin: they extract bytes and headers, delegate to the
//! pipeline or intake modules, and convert the [`ApiResponse`] back into an
//! HTTP response. Malformed JSON flows through the validation stage like
//! any other bad body, so every failure still earns a receipt and an audit
//! row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use db_agent_auth::A2aHeaders;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::a2a;
use crate::app::Application;
use crate::control_plane::run_mutation;
use crate::pipeline::ApiResponse;
use crate::pipeline::run_query;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server start failures.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Listener bind failure.
    #[error("bind failed: {0}")]
    Bind(String),
    /// Server loop failure.
    #[error("server failed: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full application router.
#[must_use]
pub fn router(app: Arc<Application>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/runtime/attestation", get(attestation))
        .route("/.well-known/agent-card.json", get(agent_card))
        .route("/v1/query", post(query))
        .route("/v1/data/execute", post(data_execute))
        .route("/v1/control-plane/submit", post(schema_submit))
        .route("/v1/control-plane/apply", post(schema_apply))
        .route("/v1/policy/grants", get(list_grants).post(grant_create))
        .route("/v1/policy/grants/revoke", post(grant_revoke))
        .route("/v1/ai/schema-draft", post(ai_draft))
        .route("/v1/ai/policy-draft", post(ai_draft))
        .route("/v1/ai/approve-draft", post(ai_approve))
        .route("/v1/a2a/tasks", post(a2a_submit).get(a2a_list))
        .route("/v1/a2a/tasks/{taskId}", get(a2a_get))
        .route("/v1/a2a/contracts", get(a2a_contracts))
        .route("/v1/ops/metrics", get(ops_metrics))
        .with_state(app)
}

/// Binds the listener and serves the router until shutdown.
///
/// # Errors
///
/// Returns [`ServeError`] when the bind or the server loop fails.
pub async fn serve(app: Arc<Application>) -> Result<(), ServeError> {
    let addr = format!("0.0.0.0:{}", app.config.service.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| ServeError::Bind(err.to_string()))?;
    axum::serve(listener, router(app))
        .await
        .map_err(|err| ServeError::Serve(err.to_string()))
}

// ============================================================================
// SECTION: Response Conversion
// ============================================================================

/// Converts a pipeline response into an HTTP response.
fn to_response(response: ApiResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(response.body)).into_response()
}

/// Parses a request body, treating malformed JSON as a non-object.
fn parse_body(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// Extracts the A2A auth headers from the request.
fn a2a_headers(headers: &HeaderMap) -> A2aHeaders {
    let header = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(ToString::to_string)
    };
    A2aHeaders {
        agent_id: header("x-agent-id"),
        timestamp: header("x-agent-timestamp"),
        nonce: header("x-agent-nonce"),
        signature: header("x-agent-signature"),
        idempotency_key: header("x-idempotency-key"),
        correlation_id: header("x-correlation-id"),
    }
}

// ============================================================================
// SECTION: Service Handlers
// ============================================================================

/// `GET /health`.
async fn health(State(app): State<Arc<Application>>) -> Response {
    axum::Json(json!({
        "status": "ok",
        "service": app.config.service.name,
        "version": app.config.service.version,
    }))
    .into_response()
}

/// `GET /v1/runtime/attestation`.
async fn attestation(State(app): State<Arc<Application>>) -> Response {
    axum::Json(app.runtime_snapshot()).into_response()
}

/// `GET /.well-known/agent-card.json`.
async fn agent_card(State(app): State<Arc<Application>>) -> Response {
    axum::Json(a2a::agent_card(&app)).into_response()
}

/// `GET /v1/ops/metrics`.
async fn ops_metrics(State(app): State<Arc<Application>>) -> Response {
    axum::Json(app.metrics.snapshot()).into_response()
}

// ============================================================================
// SECTION: Query & Mutation Handlers
// ============================================================================

/// `POST /v1/query`.
async fn query(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_query(&app, &parse_body(&bytes)).await)
}

/// `POST /v1/data/execute`.
async fn data_execute(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "data:execute", &parse_body(&bytes)).await)
}

/// `POST /v1/control-plane/submit`.
async fn schema_submit(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "schema:submit", &parse_body(&bytes)).await)
}

/// `POST /v1/control-plane/apply`.
async fn schema_apply(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "schema:apply", &parse_body(&bytes)).await)
}

/// `POST /v1/policy/grants`.
async fn grant_create(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "grant:create", &parse_body(&bytes)).await)
}

/// `POST /v1/policy/grants/revoke`.
async fn grant_revoke(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "grant:revoke", &parse_body(&bytes)).await)
}

/// `POST /v1/ai/schema-draft` and `POST /v1/ai/policy-draft`.
async fn ai_draft(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "ai:draft:create", &parse_body(&bytes)).await)
}

/// `POST /v1/ai/approve-draft`.
async fn ai_approve(State(app): State<Arc<Application>>, bytes: Bytes) -> Response {
    to_response(run_mutation(&app, "ai:draft:approve", &parse_body(&bytes)).await)
}

/// Query parameters for grant listing.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantListParams {
    /// Tenant to list.
    tenant_id: Option<String>,
    /// Optional wallet filter.
    wallet_address: Option<String>,
}

/// `GET /v1/policy/grants`.
async fn list_grants(
    State(app): State<Arc<Application>>,
    Query(params): Query<GrantListParams>,
) -> Response {
    let Some(tenant) =
        params.tenant_id.as_deref().and_then(|raw| db_agent_core::TenantId::parse(raw).ok())
    else {
        return to_response(ApiResponse {
            status: 400,
            body: json!({
                "code": db_agent_core::codes::INVALID_REQUEST,
                "message": "tenantId query parameter is required",
            }),
        });
    };
    let wallet = params
        .wallet_address
        .as_deref()
        .and_then(|raw| db_agent_core::WalletAddress::parse(raw).ok());
    let grants = app.grants.list(&tenant, wallet.as_ref());
    axum::Json(json!({"grants": grants})).into_response()
}

// ============================================================================
// SECTION: A2A Handlers
// ============================================================================

/// `POST /v1/a2a/tasks`.
async fn a2a_submit(
    State(app): State<Arc<Application>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let headers = a2a_headers(&headers);
    to_response(a2a::submit_task(&app, &headers, &parse_body(&bytes)).await)
}

/// Query parameters for task listing.
#[derive(Debug, serde::Deserialize)]
struct TaskListParams {
    /// Status filter.
    status: Option<String>,
    /// Result limit.
    limit: Option<String>,
}

/// `GET /v1/a2a/tasks`.
async fn a2a_list(
    State(app): State<Arc<Application>>,
    headers: HeaderMap,
    Query(params): Query<TaskListParams>,
) -> Response {
    let headers = a2a_headers(&headers);
    to_response(
        a2a::list_tasks(&app, &headers, params.status.as_deref(), params.limit.as_deref()).await,
    )
}

/// `GET /v1/a2a/tasks/{taskId}`.
async fn a2a_get(
    State(app): State<Arc<Application>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Response {
    let headers = a2a_headers(&headers);
    let path = format!("/v1/a2a/tasks/{task_id}");
    to_response(a2a::get_task(&app, &headers, &path, &task_id).await)
}

/// `GET /v1/a2a/contracts`.
async fn a2a_contracts() -> Response {
    axum::Json(a2a::contracts()).into_response()
}
