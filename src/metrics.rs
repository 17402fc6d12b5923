use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register every analyzer series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_metrics();
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
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("analyzer_cache_hits_total", "Result cache lookups that hit.");
        describe_counter!("analyzer_cache_misses_total", "Result cache lookups that missed.");
        describe_counter!(
            "analyzer_cache_evictions_total",
            "Entries dropped from the result cache by FIFO eviction."
        );
        describe_gauge!("analyzer_cache_entries", "Current result cache size.");
        describe_counter!(
            "analyzer_adapter_failures_total",
            "Adapter calls that failed and fell back to rules, by task."
        );
        describe_counter!(
            "analyzer_comment_fallbacks_total",
            "Comments that degraded to the all-neutral default result."
        );
        describe_histogram!(
            "analyzer_batch_duration_ms",
            "Wall time of one process_batch call in milliseconds."
        );
        describe_counter!("analyzer_jobs_total", "Finished analysis jobs, by outcome.");
    });
}
