// crates/db-agent-server/tests/a2a_tasks.rs
// ============================================================================
// Module: A2A Task Intake Tests
// Description: Idempotency semantics, allowlists, and background execution.
// ============================================================================
//! ## Overview
//! Drives the peer-agent channel end to end: accept, replay, conflict,
//! task-type allowlisting, background execution through the query
//! pipeline, and the task listing filters.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::build_app;
use common::field;
use common::signed_a2a_headers;
use common::wallet;
use db_agent_core::TaskId;
use db_agent_core::TaskStatus;
use db_agent_server::Application;
use db_agent_server::a2a::get_task;
use db_agent_server::a2a::list_tasks;
use db_agent_server::a2a::submit_task;
use serde_json::Value;
use serde_json::json;

/// Task body running an allowed balance read.
fn query_task_body() -> Value {
    json!({
        "taskType": "query.execute",
        "input": {
            "requestId": "task-req-1",
            "requester": wallet().as_str(),
            "capability": "balances:read",
            "queryTemplate": "wallet_balances",
            "queryParams": {"walletAddress": wallet().as_str(), "limit": 5},
        },
    })
}

/// Waits for a task to reach a terminal state.
async fn await_terminal(app: &Arc<Application>, task_id: TaskId) -> TaskStatus {
    for _ in 0..200 {
        if let Some(record) = app.tasks.get(task_id)
            && record.status.is_terminal()
        {
            return record.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never reached a terminal state");
}

#[tokio::test]
async fn accept_replay_and_conflict_follow_the_idempotency_contract() {
    let app = build_app(&[]).await;
    let body = query_task_body();

    // First submission accepts.
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-1", Some("idem-1"));
    let first = submit_task(&app, &headers, &body).await;
    assert_eq!(first.status, 202, "body: {}", first.body);
    assert_eq!(field(&first.body, "code"), Some(&json!("A2A_TASK_ACCEPTED")));
    let task_id = field(&first.body, "task.taskId")
        .and_then(Value::as_str)
        .expect("taskId")
        .to_string();

    // Identical replay returns the same task with the replay code.
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-2", Some("idem-1"));
    let second = submit_task(&app, &headers, &body).await;
    assert_eq!(second.status, 200, "body: {}", second.body);
    assert_eq!(field(&second.body, "code"), Some(&json!("A2A_TASK_REPLAY")));
    assert_eq!(
        field(&second.body, "task.taskId").and_then(Value::as_str),
        Some(task_id.as_str())
    );

    // Same key with a mutated body conflicts.
    let mut mutated = query_task_body();
    if let Some(input) = mutated.get_mut("input").and_then(Value::as_object_mut) {
        input.insert("requestId".to_string(), json!("task-req-2"));
    }
    let headers =
        signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&mutated), "a2a-n-3", Some("idem-1"));
    let third = submit_task(&app, &headers, &mutated).await;
    assert_eq!(third.status, 409, "body: {}", third.body);
    assert_eq!(
        field(&third.body, "code"),
        Some(&json!("IDEMPOTENCY_KEY_REUSED_WITH_DIFFERENT_PAYLOAD"))
    );
}

#[tokio::test]
async fn background_execution_reaches_succeeded_with_a_receipt() {
    let app = build_app(&[]).await;
    let body = query_task_body();
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-4", Some("idem-2"));
    let accepted = submit_task(&app, &headers, &body).await;
    assert_eq!(accepted.status, 202, "body: {}", accepted.body);
    let task_id = field(&accepted.body, "task.taskId")
        .and_then(Value::as_str)
        .and_then(TaskId::parse)
        .expect("taskId");

    let status = await_terminal(&app, task_id).await;
    assert_eq!(status, TaskStatus::Succeeded);

    let record = app.tasks.get(task_id).expect("task");
    let result = record.result.expect("result");
    assert_eq!(field(&result, "decision.outcome"), Some(&json!("allow")));
    assert!(
        field(&result, "receipt.receiptId")
            .and_then(Value::as_str)
            .is_some_and(|id| id.starts_with("rcpt_"))
    );

    // A replay after completion returns the terminal envelope.
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-5", Some("idem-2"));
    let replay = submit_task(&app, &headers, &body).await;
    assert_eq!(replay.status, 200);
    assert_eq!(field(&replay.body, "task.status"), Some(&json!("succeeded")));
}

#[tokio::test]
async fn failed_execution_is_terminal_and_replayable() {
    let app = build_app(&[]).await;
    // Unknown capability makes the pipeline deny; the task fails.
    let mut body = query_task_body();
    if let Some(input) = body.get_mut("input").and_then(Value::as_object_mut) {
        input.insert("capability".to_string(), json!("nope:read"));
    }
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-6", Some("idem-3"));
    let accepted = submit_task(&app, &headers, &body).await;
    assert_eq!(accepted.status, 202, "body: {}", accepted.body);
    let task_id = field(&accepted.body, "task.taskId")
        .and_then(Value::as_str)
        .and_then(TaskId::parse)
        .expect("taskId");

    let status = await_terminal(&app, task_id).await;
    assert_eq!(status, TaskStatus::Failed);
    let record = app.tasks.get(task_id).expect("task");
    let error = record.error.expect("error");
    assert_eq!(field(&error, "decision.code"), Some(&json!("UNKNOWN_CAPABILITY")));
}

#[tokio::test]
async fn unknown_task_types_are_not_allowed() {
    let app = build_app(&[]).await;
    let body = json!({"taskType": "schema.alter", "input": {}});
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-7", Some("idem-4"));
    let response = submit_task(&app, &headers, &body).await;
    assert_eq!(response.status, 403, "body: {}", response.body);
    assert_eq!(field(&response.body, "code"), Some(&json!("A2A_TASK_NOT_ALLOWED")));
}

#[tokio::test]
async fn missing_idempotency_key_is_rejected() {
    let app = build_app(&[]).await;
    let body = query_task_body();
    let headers = signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-8", None);
    let response = submit_task(&app, &headers, &body).await;
    assert_eq!(response.status, 400, "body: {}", response.body);
    assert_eq!(field(&response.body, "code"), Some(&json!("INVALID_REQUEST")));
}

#[tokio::test]
async fn unsigned_submissions_are_rejected() {
    let app = build_app(&[]).await;
    let body = query_task_body();
    let mut headers =
        signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-9", Some("idem-5"));
    headers.signature = Some("deadbeef".to_string());
    let response = submit_task(&app, &headers, &body).await;
    assert_eq!(response.status, 401, "body: {}", response.body);
    assert_eq!(field(&response.body, "code"), Some(&json!("A2A_SIGNATURE_MISMATCH")));
}

#[tokio::test]
async fn listing_and_fetching_are_scoped_to_the_agent() {
    let app = build_app(&[]).await;
    let body = query_task_body();
    let headers =
        signed_a2a_headers("POST", "/v1/a2a/tasks", Some(&body), "a2a-n-10", Some("idem-6"));
    let accepted = submit_task(&app, &headers, &body).await;
    assert_eq!(accepted.status, 202);
    let task_id = field(&accepted.body, "task.taskId")
        .and_then(Value::as_str)
        .expect("taskId")
        .to_string();
    let parsed = TaskId::parse(&task_id).expect("parse");
    await_terminal(&app, parsed).await;

    // Fetch by id.
    let path = format!("/v1/a2a/tasks/{task_id}");
    let headers = signed_a2a_headers("GET", &path, None, "a2a-n-11", None);
    let fetched = get_task(&app, &headers, &path, &task_id).await;
    assert_eq!(fetched.status, 200, "body: {}", fetched.body);
    assert_eq!(
        field(&fetched.body, "task.taskId").and_then(Value::as_str),
        Some(task_id.as_str())
    );

    // List with a status filter.
    let headers = signed_a2a_headers("GET", "/v1/a2a/tasks", None, "a2a-n-12", None);
    let listed = list_tasks(&app, &headers, Some("succeeded"), Some("10")).await;
    assert_eq!(listed.status, 200, "body: {}", listed.body);
    let count = field(&listed.body, "count").and_then(Value::as_u64).expect("count");
    assert!(count >= 1);

    // Bad limits are rejected.
    let headers = signed_a2a_headers("GET", "/v1/a2a/tasks", None, "a2a-n-13", None);
    let rejected = list_tasks(&app, &headers, None, Some("0")).await;
    assert_eq!(rejected.status, 400);
    let headers = signed_a2a_headers("GET", "/v1/a2a/tasks", None, "a2a-n-14", None);
    let rejected = list_tasks(&app, &headers, None, Some("201")).await;
    assert_eq!(rejected.status, 400);
}
