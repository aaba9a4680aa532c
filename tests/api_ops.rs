// tests/api_ops.rs
//
// HTTP-level tests for the score CRUD operations without opening sockets.
// The router is exercised directly via tower::ServiceExt::oneshot, with a
// scripted chat provider, a static issue fetcher and an in-memory store.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use ticket_load_analyzer::ai::ScriptedProvider;
use ticket_load_analyzer::api::{create_router, AppState};
use ticket_load_analyzer::issue::{IssueSnapshot, StaticFetcher};
use ticket_load_analyzer::scores::ScoreService;
use ticket_load_analyzer::store::MemoryScoreStore;

const BODY_LIMIT: usize = 1024 * 1024;

fn router_with(provider: ScriptedProvider, fetcher: StaticFetcher) -> Router {
    let service = ScoreService::new(
        Arc::new(provider),
        Arc::new(fetcher),
        Arc::new(MemoryScoreStore::new()),
    );
    create_router(AppState {
        service: Arc::new(service),
    })
}

fn bare_router() -> Router {
    router_with(ScriptedProvider::new(), StaticFetcher::new())
}

async fn post_op(app: &Router, name: &str, payload: Value) -> Value {
    let req = Request::builder()
        .method("POST")
        .uri(format!("/ops/{name}"))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("oneshot");
    // Operation failures ride inside the envelope, never as HTTP errors.
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_returns_ok() {
    let app = bare_router();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(std::str::from_utf8(&bytes).unwrap(), "ok");
}

#[tokio::test]
async fn save_then_get_round_trips_score_and_metadata() {
    let app = bare_router();

    let saved = post_op(
        &app,
        "saveTicketScore",
        json!({"issueKey": "X-1", "score": 7, "metadata": {"m": 1}}),
    )
    .await;
    assert_eq!(saved["success"], true);
    assert_eq!(saved["data"]["issueKey"], "X-1");

    let got = post_op(&app, "getTicketScore", json!({"issueKey": "X-1"})).await;
    assert_eq!(got["success"], true);
    assert_eq!(got["data"]["score"], 7);
    assert_eq!(got["data"]["metadata"]["m"], 1);
    assert!(got["data"]["updatedAt"].is_string());
}

#[tokio::test]
async fn get_for_never_saved_key_is_success_with_null_data() {
    let app = bare_router();
    let got = post_op(&app, "getTicketScore", json!({"issueKey": "NEVER-1"})).await;
    assert_eq!(got["success"], true);
    assert!(got["data"].is_null());
}

#[tokio::test]
async fn save_with_non_numeric_score_fails_and_writes_nothing() {
    let app = bare_router();

    let resp = post_op(
        &app,
        "saveTicketScore",
        json!({"issueKey": "BAD-1", "score": "high"}),
    )
    .await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "validation");
    assert!(resp["error"].as_str().unwrap().contains("score"));

    let got = post_op(&app, "getTicketScore", json!({"issueKey": "BAD-1"})).await;
    assert!(got["data"].is_null());
}

#[tokio::test]
async fn save_without_issue_key_is_a_validation_error() {
    let app = bare_router();
    let resp = post_op(&app, "saveTicketScore", json!({"score": 5})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "validation");
    assert!(resp["error"].as_str().unwrap().contains("issueKey"));
}

#[tokio::test]
async fn get_multiple_returns_only_existing_keys_with_count() {
    let app = bare_router();
    post_op(
        &app,
        "saveTicketScore",
        json!({"issueKey": "A-1", "score": 5}),
    )
    .await;

    let resp = post_op(
        &app,
        "getMultipleTicketScores",
        json!({"issueKeys": ["A-1", "A-2"]}),
    )
    .await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["count"], 1);
    assert_eq!(resp["data"]["A-1"]["score"], 5);
    assert!(resp["data"].get("A-2").is_none());
}

#[tokio::test]
async fn get_multiple_without_keys_field_is_a_validation_error() {
    let app = bare_router();
    let resp = post_op(&app, "getMultipleTicketScores", json!({})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "validation");
}

#[tokio::test]
async fn delete_succeeds_with_and_without_a_stored_record() {
    let app = bare_router();

    let resp = post_op(&app, "deleteTicketScore", json!({"issueKey": "GONE-1"})).await;
    assert_eq!(resp["success"], true);

    post_op(
        &app,
        "saveTicketScore",
        json!({"issueKey": "GONE-2", "score": 4}),
    )
    .await;
    let resp = post_op(&app, "deleteTicketScore", json!({"issueKey": "GONE-2"})).await;
    assert_eq!(resp["success"], true);

    let got = post_op(&app, "getTicketScore", json!({"issueKey": "GONE-2"})).await;
    assert!(got["data"].is_null());
}

#[tokio::test]
async fn current_issue_ops_use_the_context_key_and_actor() {
    let app = bare_router();
    let context = json!({"issue": {"key": "CUR-1"}, "accountId": "acct-42"});

    let saved = post_op(
        &app,
        "saveCurrentIssueScore",
        json!({"context": context, "score": 6, "metadata": {"source": "panel"}}),
    )
    .await;
    assert_eq!(saved["success"], true);
    assert_eq!(saved["issueKey"], "CUR-1");
    assert_eq!(saved["data"]["updatedBy"], "acct-42");

    let got = post_op(&app, "getCurrentIssueScore", json!({"context": context})).await;
    assert_eq!(got["success"], true);
    assert_eq!(got["issueKey"], "CUR-1");
    assert_eq!(got["data"]["score"], 6);
    assert_eq!(got["data"]["metadata"]["source"], "panel");
}

#[tokio::test]
async fn context_ops_without_an_issue_key_are_validation_errors() {
    let app = bare_router();
    for op in ["getCurrentIssueScore", "saveCurrentIssueScore", "fetchLabels"] {
        let resp = post_op(&app, op, json!({"context": {"accountId": "acct-1"}})).await;
        assert_eq!(resp["success"], false, "{op} should fail without a key");
        assert_eq!(resp["kind"], "validation", "{op} kind");
    }
}

#[tokio::test]
async fn null_context_parts_still_answer_inside_the_envelope() {
    let app = bare_router();
    for payload in [
        json!({"context": null}),
        json!({"context": {"issue": null}}),
        json!({"context": {"issue": null, "accountId": "acct-1"}}),
    ] {
        let resp = post_op(&app, "getCurrentIssueScore", payload).await;
        assert_eq!(resp["success"], false);
        assert_eq!(resp["kind"], "validation");
    }
}

#[tokio::test]
async fn fetch_labels_returns_a_bare_array_and_degrades_to_empty() {
    let mut snapshot = IssueSnapshot::bare("LB-1");
    snapshot.labels = vec!["infra".to_string(), "payments".to_string()];
    let app = router_with(ScriptedProvider::new(), StaticFetcher::new().with(snapshot));

    let labels = post_op(
        &app,
        "fetchLabels",
        json!({"context": {"issue": {"key": "LB-1"}}}),
    )
    .await;
    assert_eq!(labels, json!(["infra", "payments"]));

    // Unknown issue: the fetch fails upstream, the op degrades to [].
    let labels = post_op(
        &app,
        "fetchLabels",
        json!({"context": {"issue": {"key": "LB-404"}}}),
    )
    .await;
    assert_eq!(labels, json!([]));
}

#[tokio::test]
async fn call_openai_passes_through_content_and_usage() {
    let provider = ScriptedProvider::new();
    provider.push_content("a plain text reply");
    let app = router_with(provider, StaticFetcher::new());

    let resp = post_op(
        &app,
        "callOpenAI",
        json!({"prompt": "say something", "maxTokens": 64}),
    )
    .await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["response"], "a plain text reply");
    assert_eq!(resp["usage"]["totalTokens"], 150);
}

#[tokio::test]
async fn call_openai_without_prompt_is_a_validation_error() {
    let app = bare_router();
    let resp = post_op(&app, "callOpenAI", json!({})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "validation");
    assert!(resp["error"].as_str().unwrap().contains("prompt"));
}
