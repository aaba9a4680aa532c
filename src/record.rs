//! record.rs — The persisted score record and its assembly.
//!
//! A record is deliberately loose: `score` plus a free-form `metadata`
//! object. Manual saves from the panel store whatever metadata the caller
//! sent; records built from an evaluation carry a fixed metadata layout
//! (method tag, breakdown, weights, reason, issue type, priority, timestamp,
//! model, token usage). Everything the service authors is camelCase on the
//! wire; pillar keys inside breakdown/weights mirror the model contract and
//! stay snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};

use crate::evaluation::Evaluation;
use crate::issue::IssueSnapshot;

/// Method tag stamped into evaluated records so stored scores stay
/// comparable if the scoring method changes later.
pub const EVALUATION_METHOD: &str = "ai-4-pillars";

/// Actor recorded when the invocation context carries no account id.
pub const SYSTEM_ACTOR: &str = "system";

/// Token accounting reported by the model provider. Zeroed when the backend
/// omits usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One stored score for one issue. Last write wins; there is no history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub issue_key: String,
    pub score: Number,
    pub metadata: Value,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl ScoreRecord {
    /// A record for a manual save: score and metadata exactly as the caller
    /// provided them.
    pub fn manual(issue_key: impl Into<String>, score: Number, metadata: Value, actor: &str) -> Self {
        Self {
            issue_key: issue_key.into(),
            score,
            metadata,
            updated_at: Utc::now(),
            updated_by: actor.to_string(),
        }
    }
}

/// Assembles the record persisted after a successful evaluation. Pure, no
/// I/O; stamps the current time into both the record and its metadata.
pub fn build_record(
    snapshot: &IssueSnapshot,
    evaluation: &Evaluation,
    actor: &str,
    model: &str,
    tokens_used: TokenUsage,
) -> ScoreRecord {
    let now = Utc::now();
    let metadata = json!({
        "evaluationMethod": EVALUATION_METHOD,
        "breakdown": evaluation.breakdown,
        "weights": evaluation.weights,
        "reason": evaluation.reason,
        "issueType": snapshot.issue_type_name,
        "priority": snapshot.priority_name,
        "evaluatedAt": now.to_rfc3339(),
        "model": model,
        "tokensUsed": tokens_used,
    });
    ScoreRecord {
        issue_key: snapshot.key.clone(),
        score: Number::from(evaluation.score),
        metadata,
        updated_at: now,
        updated_by: actor.to_string(),
    }
}
