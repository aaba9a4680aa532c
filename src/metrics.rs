use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Registers metric descriptions once per process. Safe to call from
/// anywhere; only the first call does work.
pub fn ensure_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("evaluations_total", "Ticket evaluations by outcome");
        describe_counter!("ai_requests_total", "Chat completion calls by outcome");
        describe_counter!("jira_fetch_total", "Jira issue fetches by outcome");
        describe_counter!("score_ops_total", "Score store operations by kind");
        describe_histogram!("evaluation_seconds", "End-to-end ticket evaluation latency");
        describe_histogram!("ai_request_seconds", "Chat completion round-trip latency");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize the Prometheus recorder. Call once at process start.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_described();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
