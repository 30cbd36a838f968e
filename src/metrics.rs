// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe every
    /// series the pipeline emits.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_all();
        Ok(Self { handle })
    }

    /// Sample lines of the current exposition (no `# HELP`/`# TYPE`).
    pub fn summary(&self) -> Vec<String> {
        self.handle
            .render()
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    /// One-shot runs have no scrape endpoint; log the series instead.
    pub fn log_summary(&self) {
        for line in self.summary() {
            info!(target: "metrics", "{line}");
        }
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

pub fn describe_all() {
    describe_counter!("ingest_items_total", "Items parsed from feeds, by source kind.");
    describe_counter!("ingest_fetched_total", "Items after cross-source URL de-duplication.");
    describe_counter!("ingest_provider_errors_total", "Provider fetch/parse errors.");
    describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    describe_gauge!("ingest_last_fetch_ts", "Unix ts of the last fetch.");

    describe_counter!("ranking_deduplicated_total", "Items dropped as already seen.");
    describe_counter!("ranking_keyword_matched_total", "Items with a positive keyword score.");
    describe_counter!("ranking_semantic_rescued_total", "Zero-keyword items assigned a topic by similarity.");
    describe_counter!("ranking_embedding_fallback_total", "Embedding batches replaced with zero vectors.");
    describe_counter!("ranking_selected_total", "Items selected into digests.");

    describe_counter!("ai_calls_total", "Real text-generation calls, by provider.");
    describe_counter!("digest_runs_total", "Pipeline runs, by outcome.");
    describe_gauge!("digest_last_run_ts", "Unix ts of the last completed digest.");
}
