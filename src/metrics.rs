use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        // The once-guard may already have fired against the no-op recorder.
        describe_all();
        Ok(Self { handle })
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

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

fn describe_all() {
    describe_counter!("events_ingested_total", "Events persisted by ingestion.");
    describe_counter!(
        "ingest_failures_total",
        "Ingestion items rejected, by error kind."
    );
    describe_counter!(
        "ranking_requests_total",
        "Ranking engine calls attempted (non-empty candidate sets)."
    );
    describe_counter!(
        "ranking_fallback_total",
        "Ranked queries served unscored, by failure reason."
    );
    describe_histogram!(
        "ranking_latency_ms",
        "Wall time of the ranking engine call in milliseconds."
    );
    describe_histogram!(
        "ranking_engine_processing_ms",
        "Processing time reported by the ranking engine."
    );
}
