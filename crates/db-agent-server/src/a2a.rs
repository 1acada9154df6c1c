// crates/db-agent-server/src/a2a.rs
// ============================================================================
// Module: A2A Task Intake
// Description: Peer-agent task submission, idempotency, and workers.
// Purpose: Accept signed tasks, enforce replay safety, execute in background.
// Dependencies: db-agent-auth, db-agent-core, crate::{app, pipeline}
// ============================================================================

//! ## Overview
//! Peer agents submit tasks over the signed A2A channel. Intake runs auth,
//! the per-agent task-type allowlist, and idempotency resolution, then
//! creates the task in `accepted` and enqueues it for a bounded worker
//! pool. Workers drive the strict state machine and persist the terminal
//! envelope into the idempotency record so every matching replay returns
//! the same response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use db_agent_auth::A2aHeaders;
use db_agent_auth::AgentAuthContext;
use db_agent_core::AgentId;
use db_agent_core::Decision;
use db_agent_core::IdempotencyResolution;
use db_agent_core::RequestFacet;
use db_agent_core::Stage;
use db_agent_core::TaskId;
use db_agent_core::TaskStatus;
use db_agent_core::codes;
use db_agent_core::hash_canonical_json_hex;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::app::Application;
use crate::metrics::MetricOutcome;
use crate::pipeline::ApiResponse;
use crate::pipeline::append_audit;
use crate::pipeline::run_query_for_agent;

// ============================================================================
// SECTION: Work Items
// ============================================================================

/// Work item handed to the background pool.
#[derive(Debug, Clone)]
pub struct TaskWork {
    /// Task identifier.
    pub task_id: TaskId,
    /// Accepting agent.
    pub agent_id: AgentId,
    /// Idempotency key bound to the submission.
    pub idempotency_key: String,
    /// Task type label.
    pub task_type: String,
    /// Task input payload.
    pub input: Value,
    /// Nonce echoed into execution receipts.
    pub auth_nonce: String,
    /// Signed-at echoed into execution receipts.
    pub auth_signed_at: String,
}

// ============================================================================
// SECTION: Intake
// ============================================================================

/// Handles `POST /v1/a2a/tasks`.
pub async fn submit_task(app: &Arc<Application>, headers: &A2aHeaders, body: &Value) -> ApiResponse {
    let started = Instant::now();
    let context =
        match app.authenticator.verify_a2a(headers, "POST", "/v1/a2a/tasks", Some(body)) {
            Ok(context) => context,
            Err(err) => {
                return deny(app, started, headers, "task.submit", err.code(), err.to_string(), 401)
                    .await;
            }
        };
    let Some(idempotency_key) = context.idempotency_key.clone() else {
        return deny(
            app,
            started,
            headers,
            "task.submit",
            codes::INVALID_REQUEST,
            "x-idempotency-key is required",
            400,
        )
        .await;
    };
    let Some((task_type, input)) = parse_task_body(body) else {
        return deny(
            app,
            started,
            headers,
            "task.submit",
            codes::INVALID_REQUEST,
            "body must carry taskType and input",
            400,
        )
        .await;
    };

    // Per-agent task-type allowlist; missing mapping fails closed.
    let allowed = app
        .a2a_task_types
        .get(context.agent_id.as_str())
        .is_some_and(|types| types.contains(&task_type));
    if !allowed {
        return deny(
            app,
            started,
            headers,
            "task.submit",
            codes::A2A_TASK_NOT_ALLOWED,
            "task type is not allowed for this agent",
            403,
        )
        .await;
    }

    // Idempotency resolution; check-then-insert is atomic in the store.
    let Ok(request_hash) =
        hash_canonical_json_hex(&json!({"taskType": task_type.as_str(), "input": input.clone()}))
    else {
        return deny(
            app,
            started,
            headers,
            "task.submit",
            codes::INTERNAL_ERROR,
            "body cannot be canonicalized",
            500,
        )
        .await;
    };
    let task_id = TaskId::generate();
    let now = app.clock.now();
    match app.idempotency.resolve(
        &context.agent_id,
        &idempotency_key,
        &request_hash,
        task_id,
        &now,
    ) {
        IdempotencyResolution::Conflict => {
            return deny(
                app,
                started,
                headers,
                "task.submit",
                codes::IDEMPOTENCY_KEY_REUSED_WITH_DIFFERENT_PAYLOAD,
                "idempotency key was already used with a different payload",
                409,
            )
            .await;
        }
        IdempotencyResolution::Replay(record) => {
            let envelope = record.terminal.clone().unwrap_or_else(|| {
                app.tasks
                    .get(record.task_id)
                    .and_then(|task| serde_json::to_value(&task).ok())
                    .map_or(Value::Null, |task| json!({"task": task}))
            });
            let mut body = Map::new();
            body.insert("code".to_string(), Value::from(codes::A2A_TASK_REPLAY));
            if let Value::Object(envelope) = envelope {
                for (key, value) in envelope {
                    body.insert(key, value);
                }
            }
            record_intake(app, started, &context, "task.submit", codes::A2A_TASK_REPLAY, true)
                .await;
            return ApiResponse {
                status: 200,
                body: Value::Object(body),
            };
        }
        IdempotencyResolution::New => {}
    }

    // Create the task and hand it to the pool.
    let record = match app.tasks.create(
        task_id,
        context.agent_id.clone(),
        task_type.clone(),
        input.clone(),
        now,
    ) {
        Ok(record) => record,
        Err(err) => {
            return deny(
                app,
                started,
                headers,
                "task.submit",
                codes::INTERNAL_ERROR,
                err.to_string(),
                500,
            )
            .await;
        }
    };
    let work = TaskWork {
        task_id,
        agent_id: context.agent_id.clone(),
        idempotency_key,
        task_type,
        input,
        auth_nonce: context.nonce.clone(),
        auth_signed_at: headers.timestamp.clone().unwrap_or_default(),
    };
    if let Err(work) = app.enqueue(work) {
        // Queue saturated: the task fails terminally instead of hanging.
        let error = json!({"code": codes::SERVICE_UNAVAILABLE, "message": "task queue is full"});
        let _ = app.tasks.mark_running(work.task_id, app.clock.now());
        if let Ok(failed) = app.tasks.mark_failed(work.task_id, error, app.clock.now())
            && let Ok(envelope) = serde_json::to_value(&failed)
        {
            app.idempotency.record_terminal(
                &work.agent_id,
                &work.idempotency_key,
                json!({"task": envelope}),
            );
        }
        return deny(
            app,
            started,
            headers,
            "task.submit",
            codes::SERVICE_UNAVAILABLE,
            "task queue is full",
            503,
        )
        .await;
    }

    record_intake(app, started, &context, "task.submit", codes::A2A_TASK_ACCEPTED, true).await;
    ApiResponse {
        status: 202,
        body: json!({
            "code": codes::A2A_TASK_ACCEPTED,
            "task": {"taskId": record.task_id, "status": record.status},
        }),
    }
}

/// Parses `{taskType, input}` from the submission body.
fn parse_task_body(body: &Value) -> Option<(String, Value)> {
    let map = body.as_object()?;
    let task_type = map.get("taskType")?.as_str()?.to_string();
    if task_type.is_empty() {
        return None;
    }
    let input = match map.get("input") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(input)) => Value::Object(input.clone()),
        Some(_) => return None,
    };
    Some((task_type, input))
}

// ============================================================================
// SECTION: Task Queries
// ============================================================================

/// Handles `GET /v1/a2a/tasks/{taskId}`.
pub async fn get_task(
    app: &Arc<Application>,
    headers: &A2aHeaders,
    path: &str,
    task_id: &str,
) -> ApiResponse {
    let started = Instant::now();
    let context = match app.authenticator.verify_a2a(headers, "GET", path, None) {
        Ok(context) => context,
        Err(err) => {
            return deny(app, started, headers, "task.get", err.code(), err.to_string(), 401)
                .await;
        }
    };
    let record = TaskId::parse(task_id)
        .and_then(|task_id| app.tasks.get(task_id))
        .filter(|record| record.agent_id == context.agent_id);
    match record {
        Some(record) => {
            record_intake(app, started, &context, "task.get", codes::ALLOWED, true).await;
            ApiResponse {
                status: 200,
                body: json!({"task": record}),
            }
        }
        None => {
            deny(
                app,
                started,
                headers,
                "task.get",
                codes::INVALID_REQUEST,
                "task not found",
                404,
            )
            .await
        }
    }
}

/// Handles `GET /v1/a2a/tasks` with status and limit filters.
pub async fn list_tasks(
    app: &Arc<Application>,
    headers: &A2aHeaders,
    status: Option<&str>,
    limit: Option<&str>,
) -> ApiResponse {
    let started = Instant::now();
    let context = match app.authenticator.verify_a2a(headers, "GET", "/v1/a2a/tasks", None) {
        Ok(context) => context,
        Err(err) => {
            return deny(app, started, headers, "task.list", err.code(), err.to_string(), 401)
                .await;
        }
    };
    let status = match status {
        None => None,
        Some(raw) => match TaskStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return deny(
                    app,
                    started,
                    headers,
                    "task.list",
                    codes::INVALID_REQUEST,
                    "status filter is invalid",
                    400,
                )
                .await;
            }
        },
    };
    let limit = match limit {
        None => 25,
        Some(raw) => match raw.parse::<usize>() {
            Ok(limit) if (1..=200).contains(&limit) => limit,
            _ => {
                return deny(
                    app,
                    started,
                    headers,
                    "task.list",
                    codes::INVALID_REQUEST,
                    "limit must be 1..=200",
                    400,
                )
                .await;
            }
        },
    };
    let tasks = app.tasks.list(&context.agent_id, status, limit);
    let count = tasks.len();
    record_intake(app, started, &context, "task.list", codes::ALLOWED, true).await;
    ApiResponse {
        status: 200,
        body: json!({"tasks": tasks, "count": count}),
    }
}

// ============================================================================
// SECTION: Workers
// ============================================================================

/// Spawns the background worker pool over a shared receiver.
pub fn spawn_workers(app: Arc<Application>, receiver: mpsc::Receiver<TaskWork>) {
    let receiver = Arc::new(Mutex::new(receiver));
    for _ in 0..app.config.a2a.worker_count {
        let app = Arc::clone(&app);
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move {
            loop {
                let work = {
                    let mut receiver = receiver.lock().await;
                    receiver.recv().await
                };
                let Some(work) = work else {
                    break;
                };
                process(&app, work).await;
            }
        });
    }
}

/// Drives one task through `running` to its terminal state.
async fn process(app: &Arc<Application>, work: TaskWork) {
    if app.tasks.mark_running(work.task_id, app.clock.now()).is_err() {
        return;
    }
    let deadline = Duration::from_secs(app.config.a2a.task_deadline_seconds);
    let outcome = tokio::time::timeout(deadline, execute(app, &work)).await;
    let now = app.clock.now();
    let terminal = match outcome {
        Err(_) => app.tasks.mark_failed(
            work.task_id,
            json!({"code": codes::TASK_EXECUTION_TIMEOUT, "message": "task exceeded its deadline"}),
            now,
        ),
        Ok(response) if response.is_success() => {
            app.tasks.mark_succeeded(work.task_id, response.body, now)
        }
        Ok(response) => app.tasks.mark_failed(work.task_id, response.body, now),
    };
    if let Ok(record) = terminal
        && let Ok(task) = serde_json::to_value(&record)
    {
        app.idempotency.record_terminal(
            &work.agent_id,
            &work.idempotency_key,
            json!({"task": task}),
        );
    }
}

/// Executes a task by type.
async fn execute(app: &Arc<Application>, work: &TaskWork) -> ApiResponse {
    match work.task_type.as_str() {
        "query.execute" => {
            run_query_for_agent(app, &work.input, &work.auth_nonce, &work.auth_signed_at).await
        }
        other => ApiResponse {
            status: 400,
            body: json!({
                "code": codes::A2A_TASK_NOT_ALLOWED,
                "message": format!("unsupported task type: {other}"),
            }),
        },
    }
}

// ============================================================================
// SECTION: Catalogue & Card
// ============================================================================

/// Returns the task-type catalogue for `GET /v1/a2a/contracts`.
#[must_use]
pub fn contracts() -> Value {
    json!({
        "taskTypes": [
            {
                "taskType": "query.execute",
                "description": "Run a capability-gated template query.",
                "input": {
                    "requestId": "string",
                    "tenantId": "string?",
                    "requester": "wallet address",
                    "capability": "namespace:action",
                    "queryTemplate": "registered template name",
                    "queryParams": "object",
                },
                "statuses": ["accepted", "running", "succeeded", "failed"],
            }
        ]
    })
}

/// Returns the agent card for `/.well-known/agent-card.json`.
#[must_use]
pub fn agent_card(app: &Application) -> Value {
    json!({
        "name": app.config.service.name,
        "version": app.config.service.version,
        "agentId": app.config.a2a.agent_id,
        "protocol": "a2a/v1",
        "taskTypes": ["query.execute"],
        "authSchemes": ["hmac-sha256", "evm-personal-sign"],
        "endpoints": {
            "tasks": "/v1/a2a/tasks",
            "contracts": "/v1/a2a/contracts",
        },
    })
}

// ============================================================================
// SECTION: Intake Envelopes
// ============================================================================

/// Builds a deny envelope, auditing the intake decision.
async fn deny(
    app: &Arc<Application>,
    started: Instant,
    headers: &A2aHeaders,
    action: &str,
    code: &str,
    message: impl Into<String>,
    status: u16,
) -> ApiResponse {
    let message = message.into();
    let stage = match status {
        401 => Stage::Authentication,
        400 => Stage::Validation,
        500..=599 => Stage::Service,
        _ => Stage::Policy,
    };
    let decision = Decision::deny(stage, code, message.clone());
    let facet = intake_facet(headers, action);
    let audit = append_audit(app, &facet, &decision).await;
    app.metrics.record_request("a2a_intake", MetricOutcome::Deny, started.elapsed());
    ApiResponse {
        status,
        body: json!({
            "code": code,
            "message": message,
            "decision": decision,
            "audit": audit,
        }),
    }
}

/// Audits a successful intake decision.
async fn record_intake(
    app: &Arc<Application>,
    started: Instant,
    context: &AgentAuthContext,
    action: &str,
    code: &str,
    allow: bool,
) {
    let decision = if allow {
        Decision::allow(Stage::Policy, code, "intake accepted")
    } else {
        Decision::deny(Stage::Policy, code, "intake denied")
    };
    let facet = RequestFacet {
        request_id: context.nonce.clone(),
        tenant_id: None,
        requester: context.agent_id.as_str().to_string(),
        capability: format!("a2a:{action}"),
        query_template: None,
        query_params: Value::Object(Map::new()),
        auth_nonce: context.nonce.clone(),
        auth_signed_at: String::new(),
    };
    let _ = append_audit(app, &facet, &decision).await;
    let outcome = if allow { MetricOutcome::Allow } else { MetricOutcome::Deny };
    app.metrics.record_request("a2a_intake", outcome, started.elapsed());
}

/// Best-effort facet for unauthenticated intake failures.
fn intake_facet(headers: &A2aHeaders, action: &str) -> RequestFacet {
    RequestFacet {
        request_id: headers.nonce.clone().unwrap_or_default(),
        tenant_id: None,
        requester: headers.agent_id.clone().unwrap_or_default(),
        capability: format!("a2a:{action}"),
        query_template: None,
        query_params: Value::Object(Map::new()),
        auth_nonce: headers.nonce.clone().unwrap_or_default(),
        auth_signed_at: headers.timestamp.clone().unwrap_or_default(),
    }
}
