use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::error::ServiceError;
use crate::record::{ScoreRecord, SYSTEM_ACTOR};
use crate::scores::ScoreService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScoreService>,
}

/// One `POST /ops/{name}` route per operation. Every operation answers
/// HTTP 200; failures travel inside the envelope as
/// `{success:false, error, kind}`, never as transport faults.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ops/fetchLabels", post(fetch_labels))
        .route("/ops/callOpenAI", post(call_openai))
        .route("/ops/analyzeIssueWithAI", post(analyze_issue_with_ai))
        .route("/ops/saveTicketScore", post(save_ticket_score))
        .route("/ops/getTicketScore", post(get_ticket_score))
        .route("/ops/getMultipleTicketScores", post(get_multiple_ticket_scores))
        .route("/ops/deleteTicketScore", post(delete_ticket_score))
        .route("/ops/getCurrentIssueScore", post(get_current_issue_score))
        .route("/ops/saveCurrentIssueScore", post(save_current_issue_score))
        .route("/ops/evaluateTicketLoad", post(evaluate_ticket_load))
        .route("/ops/evaluateTicketByKey", post(evaluate_ticket_by_key))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// The host platform's invocation context: which issue the panel sits on and
/// who triggered the call. Everything optional at the wire level, and an
/// explicit null for either part reads the same as leaving it out.
#[derive(serde::Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct InvocationContext {
    issue: Option<IssueRef>,
    account_id: Option<String>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct IssueRef {
    key: Option<String>,
}

impl InvocationContext {
    fn issue_key(&self) -> Result<&str, ServiceError> {
        self.issue
            .as_ref()
            .and_then(|issue| issue.key.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ServiceError::validation("no issue key in invocation context"))
    }

    fn actor(&self) -> &str {
        self.account_id
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(SYSTEM_ACTOR)
    }
}

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct ContextBody {
    context: Option<InvocationContext>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct KeyBody {
    issue_key: Option<String>,
    context: Option<InvocationContext>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct KeysBody {
    issue_keys: Option<Vec<String>>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct CallModelBody {
    prompt: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SaveScoreBody {
    issue_key: Option<String>,
    score: Option<Value>,
    metadata: Option<Value>,
    context: Option<InvocationContext>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SaveCurrentBody {
    context: Option<InvocationContext>,
    score: Option<Value>,
    metadata: Option<Value>,
}

pub fn error_envelope(err: ServiceError) -> Value {
    let mut body = json!({
        "success": false,
        "error": err.to_string(),
        "kind": err.kind(),
    });
    match err {
        ServiceError::MalformedResponse { raw, .. } => {
            body["raw"] = Value::String(raw);
        }
        ServiceError::InvalidEvaluationShape { parsed } => {
            body["parsed"] = parsed;
        }
        _ => {}
    }
    body
}

/// The shared response shape of both evaluation entry points.
pub fn evaluation_envelope(record: ScoreRecord) -> Value {
    json!({
        "success": true,
        "score": record.score,
        "reason": record.metadata["reason"].clone(),
        "breakdown": record.metadata["breakdown"].clone(),
        "weights": record.metadata["weights"].clone(),
        "metadata": record.metadata,
    })
}

async fn fetch_labels(
    State(state): State<AppState>,
    Json(body): Json<ContextBody>,
) -> Json<Value> {
    let context = body.context.unwrap_or_default();
    match context.issue_key() {
        Ok(key) => Json(json!(state.service.fetch_labels(key).await)),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn call_openai(
    State(state): State<AppState>,
    Json(body): Json<CallModelBody>,
) -> Json<Value> {
    match state
        .service
        .call_model(
            body.prompt.as_deref(),
            body.model,
            body.temperature,
            body.max_tokens,
        )
        .await
    {
        Ok(completion) => Json(json!({
            "success": true,
            "response": completion.content,
            "usage": completion.usage.unwrap_or_default(),
        })),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn analyze_issue_with_ai(
    State(state): State<AppState>,
    Json(body): Json<ContextBody>,
) -> Json<Value> {
    let context = body.context.unwrap_or_default();
    let key = match context.issue_key() {
        Ok(k) => k.to_string(),
        Err(e) => return Json(error_envelope(e)),
    };
    match state.service.analyze(&key).await {
        Ok((_, analysis)) => Json(json!({
            "success": true,
            "issueKey": key,
            "analysis": analysis.evaluation,
            "usage": analysis.tokens_used,
        })),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn save_ticket_score(
    State(state): State<AppState>,
    Json(body): Json<SaveScoreBody>,
) -> Json<Value> {
    let context = body.context.unwrap_or_default();
    match state.service.save_score(
        body.issue_key.as_deref(),
        body.score.as_ref(),
        body.metadata,
        context.actor(),
    ) {
        Ok(record) => Json(json!({"success": true, "data": record})),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn get_ticket_score(
    State(state): State<AppState>,
    Json(body): Json<KeyBody>,
) -> Json<Value> {
    match state.service.get_score(body.issue_key.as_deref()) {
        Ok(record) => Json(json!({"success": true, "data": record})),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn get_multiple_ticket_scores(
    State(state): State<AppState>,
    Json(body): Json<KeysBody>,
) -> Json<Value> {
    let keys = match body.issue_keys {
        Some(keys) => keys,
        None => return Json(error_envelope(ServiceError::validation("issueKeys is required"))),
    };
    let found = state.service.get_many(keys).await;
    Json(json!({
        "success": true,
        "count": found.len(),
        "data": found,
    }))
}

async fn delete_ticket_score(
    State(state): State<AppState>,
    Json(body): Json<KeyBody>,
) -> Json<Value> {
    match state.service.delete_score(body.issue_key.as_deref()) {
        Ok(()) => Json(json!({"success": true})),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn get_current_issue_score(
    State(state): State<AppState>,
    Json(body): Json<ContextBody>,
) -> Json<Value> {
    let context = body.context.unwrap_or_default();
    let key = match context.issue_key() {
        Ok(k) => k.to_string(),
        Err(e) => return Json(error_envelope(e)),
    };
    match state.service.get_score(Some(&key)) {
        Ok(record) => Json(json!({"success": true, "data": record, "issueKey": key})),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn save_current_issue_score(
    State(state): State<AppState>,
    Json(body): Json<SaveCurrentBody>,
) -> Json<Value> {
    let context = body.context.unwrap_or_default();
    let key = match context.issue_key() {
        Ok(k) => k.to_string(),
        Err(e) => return Json(error_envelope(e)),
    };
    match state.service.save_score(
        Some(&key),
        body.score.as_ref(),
        body.metadata,
        context.actor(),
    ) {
        Ok(record) => Json(json!({"success": true, "data": record, "issueKey": key})),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn evaluate_ticket_load(
    State(state): State<AppState>,
    Json(body): Json<ContextBody>,
) -> Json<Value> {
    let context = body.context.unwrap_or_default();
    let key = match context.issue_key() {
        Ok(k) => k.to_string(),
        Err(e) => return Json(error_envelope(e)),
    };
    match state
        .service
        .evaluate_and_save(&key, context.actor())
        .await
    {
        Ok(record) => Json(evaluation_envelope(record)),
        Err(e) => Json(error_envelope(e)),
    }
}

async fn evaluate_ticket_by_key(
    State(state): State<AppState>,
    Json(body): Json<KeyBody>,
) -> Json<Value> {
    let key = match body
        .issue_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        Some(k) => k.to_string(),
        None => return Json(error_envelope(ServiceError::validation("issueKey is required"))),
    };
    let context = body.context.unwrap_or_default();
    match state
        .service
        .evaluate_and_save(&key, context.actor())
        .await
    {
        Ok(record) => Json(evaluation_envelope(record)),
        Err(e) => Json(error_envelope(e)),
    }
}
