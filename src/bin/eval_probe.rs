//! One-shot evaluation probe.
//!
//! Runs the full pipeline (fetch, analyze, persist) for a single issue key
//! against the live configuration and prints the response envelope.
//!
//! Usage: `eval_probe PROJ-123`

use std::sync::Arc;

use anyhow::{bail, Result};

use ticket_load_analyzer::ai::OpenAiProvider;
use ticket_load_analyzer::api::{error_envelope, evaluation_envelope};
use ticket_load_analyzer::config::AppConfig;
use ticket_load_analyzer::issue::JiraFetcher;
use ticket_load_analyzer::record::SYSTEM_ACTOR;
use ticket_load_analyzer::scores::ScoreService;
use ticket_load_analyzer::store::FileScoreStore;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().compact().init();

    let issue_key = match std::env::args().nth(1) {
        Some(k) => k,
        None => bail!("usage: eval_probe <ISSUE-KEY>"),
    };

    let config = AppConfig::load()?;
    let service = ScoreService::new(
        Arc::new(OpenAiProvider::new(&config.ai)),
        Arc::new(JiraFetcher::new(&config.jira)),
        Arc::new(FileScoreStore::new(&config.store.dir)),
    );

    let envelope = match service.evaluate_and_save(&issue_key, SYSTEM_ACTOR).await {
        Ok(record) => evaluation_envelope(record),
        Err(e) => error_envelope(e),
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}
