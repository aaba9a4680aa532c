// tests/api_eval_negative.rs
//
// Failure paths for the evaluation operations: model replies that are not
// JSON, replies missing required fields, upstream and configuration errors,
// and requests without an issue key. Every failure comes back as an HTTP 200
// envelope carrying `kind`, and none of them writes a record.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt as _; // for `oneshot`

use ticket_load_analyzer::ai::{OpenAiProvider, ScriptedProvider};
use ticket_load_analyzer::api::{create_router, AppState};
use ticket_load_analyzer::config::AiConfig;
use ticket_load_analyzer::error::ServiceError;
use ticket_load_analyzer::issue::{IssueSnapshot, StaticFetcher};
use ticket_load_analyzer::scores::ScoreService;
use ticket_load_analyzer::store::MemoryScoreStore;

const BODY_LIMIT: usize = 1024 * 1024;

fn fetcher_with_issue(key: &str) -> StaticFetcher {
    StaticFetcher::new().with(IssueSnapshot::bare(key))
}

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

async fn post_op(app: &Router, name: &str, payload: Value) -> Value {
    let req = Request::builder()
        .method("POST")
        .uri(format!("/ops/{name}"))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request");

    let resp = app.clone().oneshot(req).await.expect("oneshot");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn non_json_reply_yields_malformed_response_with_raw_attached() {
    let provider = ScriptedProvider::new();
    provider.push_content("Sorry, I cannot answer that.");
    let app = router_with(provider, fetcher_with_issue("EV-1"));

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-1"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "malformed_response");
    assert_eq!(resp["raw"], "Sorry, I cannot answer that.");

    // The failed evaluation must not leave a record behind.
    let got = post_op(&app, "getTicketScore", json!({"issueKey": "EV-1"})).await;
    assert!(got["data"].is_null());
}

#[tokio::test]
async fn reply_missing_breakdown_yields_invalid_shape_with_parsed_attached() {
    let provider = ScriptedProvider::new();
    provider.push_content(json!({"score": 6, "reason": "tight coupling"}).to_string());
    let app = router_with(provider, fetcher_with_issue("EV-2"));

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-2"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "invalid_shape");
    assert_eq!(resp["parsed"]["score"], 6);
    assert_eq!(resp["parsed"]["reason"], "tight coupling");
}

#[tokio::test]
async fn zero_score_counts_as_missing() {
    let provider = ScriptedProvider::new();
    provider.push_content(
        json!({
            "score": 0,
            "reason": "trivial",
            "breakdown": {
                "ambiguity": 1,
                "technical_complexity": 1,
                "context_switching": 1,
                "technical_debt": 1
            }
        })
        .to_string(),
    );
    let app = router_with(provider, fetcher_with_issue("EV-3"));

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-3"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "invalid_shape");
}

#[tokio::test]
async fn non_numeric_score_yields_invalid_shape() {
    let provider = ScriptedProvider::new();
    provider.push_content(
        json!({
            "score": "seven",
            "reason": "estimate",
            "breakdown": {
                "ambiguity": 5,
                "technical_complexity": 7,
                "context_switching": 4,
                "technical_debt": 3
            }
        })
        .to_string(),
    );
    let app = router_with(provider, fetcher_with_issue("EV-4"));

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-4"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "invalid_shape");
}

#[tokio::test]
async fn provider_failure_yields_upstream_kind() {
    let provider = ScriptedProvider::new();
    provider.push_error(ServiceError::upstream("OpenAI API error 500"));
    let app = router_with(provider, fetcher_with_issue("EV-5"));

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-5"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "upstream");
    assert!(resp["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn missing_api_key_yields_configuration_kind() {
    let cfg = AiConfig {
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
        api_key: String::new(),
        base_url: "https://api.openai.com/v1".to_string(),
    };
    let service = ScoreService::new(
        Arc::new(OpenAiProvider::new(&cfg)),
        Arc::new(fetcher_with_issue("EV-6")),
        Arc::new(MemoryScoreStore::new()),
    );
    let app = create_router(AppState {
        service: Arc::new(service),
    });

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-6"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "configuration");
    assert!(resp["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn evaluate_without_an_issue_key_is_a_validation_error() {
    let app = router_with(ScriptedProvider::new(), StaticFetcher::new());

    let resp = post_op(&app, "evaluateTicketByKey", json!({})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "validation");

    let resp = post_op(
        &app,
        "evaluateTicketLoad",
        json!({"context": {"accountId": "acct-9"}}),
    )
    .await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "validation");
}

#[tokio::test]
async fn unknown_issue_fails_before_the_model_is_called() {
    // Queue one reply; a fetch failure must leave it unconsumed.
    let provider = ScriptedProvider::new();
    provider.push_content("never used");
    let app = router_with(provider, StaticFetcher::new());

    let resp = post_op(&app, "evaluateTicketByKey", json!({"issueKey": "EV-404"})).await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "upstream");
    assert!(resp["error"].as_str().unwrap().contains("EV-404"));
}

#[tokio::test]
async fn analyze_issue_reports_failures_in_the_same_envelope() {
    let provider = ScriptedProvider::new();
    provider.push_content("```not json```");
    let app = router_with(provider, fetcher_with_issue("EV-7"));

    let resp = post_op(
        &app,
        "analyzeIssueWithAI",
        json!({"context": {"issue": {"key": "EV-7"}}}),
    )
    .await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["kind"], "malformed_response");
    assert!(resp["raw"].is_string());
}
