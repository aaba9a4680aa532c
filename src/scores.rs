//! scores.rs — The operation facade behind every route.
//!
//! One `ScoreService` owns the three collaborators (chat provider, issue
//! fetcher, score store) behind their trait seams. Handlers stay thin: they
//! resolve the issue key out of the request and call in here. The
//! evaluate-and-persist path is shared by both evaluation entry points; they
//! only differ in where the key comes from.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::ai::{ChatCompletion, ChatMessage, ChatProvider, ChatRequest};
use crate::engine::{self, Analysis};
use crate::error::ServiceError;
use crate::issue::{IssueFetcher, IssueSnapshot};
use crate::record::{build_record, ScoreRecord};
use crate::store::ScoreStore;

pub struct ScoreService {
    provider: Arc<dyn ChatProvider>,
    fetcher: Arc<dyn IssueFetcher>,
    store: Arc<dyn ScoreStore>,
}

impl ScoreService {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        fetcher: Arc<dyn IssueFetcher>,
        store: Arc<dyn ScoreStore>,
    ) -> Self {
        Self {
            provider,
            fetcher,
            store,
        }
    }

    /// Labels for one issue; any failure degrades to an empty list so the
    /// panel can render without them.
    pub async fn fetch_labels(&self, issue_key: &str) -> Vec<String> {
        match self.fetcher.fetch(issue_key).await {
            Ok(snapshot) => snapshot.labels,
            Err(e) => {
                warn!(issue_key, error = %e, "label fetch failed, continuing without labels");
                Vec::new()
            }
        }
    }

    /// Raw completion passthrough with caller-controlled knobs. Defaults to
    /// the configured model, temperature 0.7 and 1000 tokens.
    pub async fn call_model(
        &self,
        prompt: Option<&str>,
        model: Option<String>,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
    ) -> Result<ChatCompletion, ServiceError> {
        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ServiceError::validation("prompt is required"))?;

        let mut req = ChatRequest::new(vec![ChatMessage::user(prompt)]);
        req.model = model;
        if let Some(t) = temperature {
            req.temperature = t;
        }
        if let Some(m) = max_tokens {
            req.max_tokens = m;
        }
        self.provider.complete(&req).await
    }

    /// Fetch plus model call, no persistence. Returns the snapshot alongside
    /// the analysis so callers can reuse it for record assembly.
    pub async fn analyze(
        &self,
        issue_key: &str,
    ) -> Result<(IssueSnapshot, Analysis), ServiceError> {
        let snapshot = self.fetcher.fetch(issue_key).await?;
        let analysis = engine::analyze_issue(self.provider.as_ref(), &snapshot).await?;
        Ok((snapshot, analysis))
    }

    /// The full pipeline: fetch, analyze, assemble, persist. Both evaluation
    /// routes end up here.
    pub async fn evaluate_and_save(
        &self,
        issue_key: &str,
        actor: &str,
    ) -> Result<ScoreRecord, ServiceError> {
        let started = Instant::now();
        let result: Result<ScoreRecord, ServiceError> = async {
            let (snapshot, analysis) = self.analyze(issue_key).await?;
            let record = build_record(
                &snapshot,
                &analysis.evaluation,
                actor,
                &analysis.model,
                analysis.tokens_used,
            );
            self.store.save(&record)?;
            Ok(record)
        }
        .await;
        metrics::histogram!("evaluation_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(record) => {
                metrics::counter!("evaluations_total", "outcome" => "ok").increment(1);
                info!(issue_key, score = %record.score, "ticket evaluated and saved");
            }
            Err(e) => {
                metrics::counter!("evaluations_total", "outcome" => e.kind()).increment(1);
                warn!(issue_key, error = %e, "ticket evaluation failed");
            }
        }
        result
    }

    /// Manual save. Validates before touching the store: a bad payload must
    /// leave existing records alone.
    pub fn save_score(
        &self,
        issue_key: Option<&str>,
        score: Option<&Value>,
        metadata: Option<Value>,
        actor: &str,
    ) -> Result<ScoreRecord, ServiceError> {
        let key = require_key(issue_key)?;
        let number = match score {
            Some(Value::Number(n)) => n.clone(),
            Some(Value::Null) | None => {
                return Err(ServiceError::validation("score is required"))
            }
            Some(_) => return Err(ServiceError::validation("score must be numeric")),
        };

        let record = ScoreRecord::manual(key, number, metadata.unwrap_or_else(|| json!({})), actor);
        self.store.save(&record)?;
        metrics::counter!("score_ops_total", "op" => "save").increment(1);
        Ok(record)
    }

    pub fn get_score(&self, issue_key: Option<&str>) -> Result<Option<ScoreRecord>, ServiceError> {
        let key = require_key(issue_key)?;
        metrics::counter!("score_ops_total", "op" => "get").increment(1);
        self.store.get(key)
    }

    /// Batch read with per-key fan-out. A failing read is logged and its key
    /// excluded; the batch itself never fails.
    pub async fn get_many(&self, issue_keys: Vec<String>) -> HashMap<String, ScoreRecord> {
        metrics::counter!("score_ops_total", "op" => "get_many").increment(1);

        let mut set = JoinSet::new();
        for key in issue_keys {
            let store = Arc::clone(&self.store);
            set.spawn(async move {
                match store.get(&key) {
                    Ok(Some(record)) => Some((key, record)),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(issue_key = %key, error = %e, "batch read failed, key excluded");
                        None
                    }
                }
            });
        }

        let mut found = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some((key, record))) => {
                    found.insert(key, record);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "batch read task failed"),
            }
        }
        found
    }

    /// Idempotent delete: removing a key that was never saved still succeeds.
    pub fn delete_score(&self, issue_key: Option<&str>) -> Result<(), ServiceError> {
        let key = require_key(issue_key)?;
        let existed = self.store.delete(key)?;
        metrics::counter!("score_ops_total", "op" => "delete").increment(1);
        if !existed {
            info!(issue_key = key, "delete requested for an issue with no stored score");
        }
        Ok(())
    }
}

fn require_key(issue_key: Option<&str>) -> Result<&str, ServiceError> {
    issue_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ServiceError::validation("issueKey is required"))
}
