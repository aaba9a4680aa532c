//! Ticket Load Analyzer — Binary Entrypoint
//! Boots the Axum HTTP server, wiring config, shared state, and middleware.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticket_load_analyzer::ai::OpenAiProvider;
use ticket_load_analyzer::api::{create_router, AppState};
use ticket_load_analyzer::config::AppConfig;
use ticket_load_analyzer::issue::JiraFetcher;
use ticket_load_analyzer::metrics::Metrics;
use ticket_load_analyzer::scores::ScoreService;
use ticket_load_analyzer::store::FileScoreStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticket_load_analyzer=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load()?;

    let provider = OpenAiProvider::new(&config.ai);
    if !provider.is_configured() {
        // Startup survives a missing key; the affected operations report it.
        tracing::warn!("OpenAI API key is not configured; evaluation calls will fail");
    }
    let fetcher = JiraFetcher::new(&config.jira);
    if !fetcher.is_configured() {
        tracing::warn!("Jira credentials are not configured; issue fetches will fail");
    }

    let service = ScoreService::new(
        Arc::new(provider),
        Arc::new(fetcher),
        Arc::new(FileScoreStore::new(&config.store.dir)),
    );

    let metrics = Metrics::init();
    let router = create_router(AppState {
        service: Arc::new(service),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "ticket load analyzer listening");
    axum::serve(listener, router).await?;
    Ok(())
}
