//! engine.rs — Prompting, response validation and score normalization.
//!
//! The contract with the model is narrow on purpose: a fixed system prompt,
//! a templated user prompt, and a forced-JSON reply of exactly
//! `{score, reason, breakdown}`. Everything the model sends back is treated
//! as hostile until it survives `parse_evaluation`.

use serde_json::Value;

use crate::ai::{ChatMessage, ChatProvider, ChatRequest};
use crate::error::ServiceError;
use crate::evaluation::{Evaluation, PillarBreakdown};
use crate::issue::IssueSnapshot;
use crate::record::TokenUsage;

/// Evaluation calls run colder and shorter than the generic completion
/// surface: scoring wants consistency, not prose.
pub const EVAL_TEMPERATURE: f64 = 0.3;
pub const EVAL_MAX_TOKENS: u32 = 500;

pub const SYSTEM_PROMPT: &str = r#"You are an expert at estimating the cognitive load a software ticket puts on the engineer who picks it up. Score the ticket from 1 to 10: 1-3 mechanical, 4-6 standard, 7-8 high, 9-10 critical.

Weigh four pillars:
- ambiguity (weight 0.30): how unclear the requirements, scope and acceptance criteria are
- technical_complexity (weight 0.40): algorithmic and architectural difficulty of the change
- context_switching (weight 0.20): how many systems, codebases or teams the work spans
- technical_debt (weight 0.10): how much legacy or fragile code the work touches

Respond ONLY with a JSON object, no other text, in exactly this shape:
{"score": <integer 1-10>, "reason": "<one or two sentences>", "breakdown": {"ambiguity": <integer 1-10>, "technical_complexity": <integer 1-10>, "context_switching": <integer 1-10>, "technical_debt": <integer 1-10>}}"#;

/// Renders the snapshot into the user prompt. Text placeholders were already
/// substituted when the snapshot was built; only the list fields need a
/// textual fallback here.
pub fn build_user_prompt(snapshot: &IssueSnapshot) -> String {
    let join_or_none = |items: &[String]| {
        if items.is_empty() {
            "None".to_string()
        } else {
            items.join(", ")
        }
    };

    format!(
        "Evaluate this Jira ticket:\n\n\
         Type: {}\n\
         Title: {}\n\
         Description: {}\n\
         Priority: {}\n\
         Status: {}\n\
         Labels: {}\n\
         Components: {}",
        snapshot.issue_type_name,
        snapshot.summary,
        snapshot.description,
        snapshot.priority_name,
        snapshot.status_name,
        join_or_none(&snapshot.labels),
        join_or_none(&snapshot.component_names),
    )
}

/// JavaScript-style truthiness. The panel's historical behavior treats 0,
/// empty strings, null and false as "missing", and that quirk is part of the
/// contract now (a reply of score 0 is rejected as incomplete).
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn clamp_score(n: f64) -> u8 {
    n.round().clamp(1.0, 10.0) as u8
}

/// Pillars are optional in the reply: a present number is rounded and
/// clamped to [1,10], an absent or non-numeric one reads as 0.
fn normalize_pillar(v: Option<&Value>) -> u8 {
    v.and_then(Value::as_f64).map(clamp_score).unwrap_or(0)
}

fn normalize_reason(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turns the model's raw reply into a validated `Evaluation`.
///
/// Failure modes are distinct on purpose: text that is not JSON at all
/// becomes `MalformedResponse` (raw text preserved), JSON that lacks a
/// truthy `score`/`reason`/`breakdown` becomes `InvalidEvaluationShape`
/// (parsed value preserved).
pub fn parse_evaluation(raw: &str) -> Result<Evaluation, ServiceError> {
    let parsed: Value = serde_json::from_str(raw.trim()).map_err(|e| {
        ServiceError::MalformedResponse {
            raw: raw.to_string(),
            detail: e.to_string(),
        }
    })?;

    let score_v = parsed.get("score").cloned();
    let reason_v = parsed.get("reason").cloned();
    let breakdown_v = parsed.get("breakdown").cloned();

    let all_present = [&score_v, &reason_v, &breakdown_v]
        .into_iter()
        .all(|v| v.as_ref().map(truthy).unwrap_or(false));
    if !all_present {
        return Err(ServiceError::InvalidEvaluationShape { parsed });
    }

    let score = match score_v.as_ref().and_then(Value::as_f64) {
        Some(n) => clamp_score(n),
        None => return Err(ServiceError::InvalidEvaluationShape { parsed }),
    };

    let breakdown_v = breakdown_v.unwrap_or(Value::Null);
    let breakdown = PillarBreakdown {
        ambiguity: normalize_pillar(breakdown_v.get("ambiguity")),
        technical_complexity: normalize_pillar(breakdown_v.get("technical_complexity")),
        context_switching: normalize_pillar(breakdown_v.get("context_switching")),
        technical_debt: normalize_pillar(breakdown_v.get("technical_debt")),
    };

    let reason = normalize_reason(&reason_v.unwrap_or(Value::Null));

    Ok(Evaluation::new(score, reason, breakdown))
}

/// Everything the persistence layer wants to know about one model call.
pub struct Analysis {
    pub evaluation: Evaluation,
    pub model: String,
    pub tokens_used: TokenUsage,
}

/// Runs one issue through the model and validates the reply.
pub async fn analyze_issue(
    provider: &dyn ChatProvider,
    snapshot: &IssueSnapshot,
) -> Result<Analysis, ServiceError> {
    let mut req = ChatRequest::new(vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(snapshot)),
    ]);
    req.temperature = EVAL_TEMPERATURE;
    req.max_tokens = EVAL_MAX_TOKENS;
    req.force_json = true;

    let completion = provider.complete(&req).await?;
    let evaluation = parse_evaluation(&completion.content)?;
    Ok(Analysis {
        evaluation,
        model: completion.model,
        tokens_used: completion.usage.unwrap_or_default(),
    })
}
