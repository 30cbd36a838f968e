// src/pipeline.rs
//! One digest run: gate → fetch → rank → (dry-run print | enrich → summarize →
//! deliver → export) → commit state.
//!
//! State is passed in and handed back; nothing here is global. Run at most one
//! pipeline at a time against the same state directory.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use tracing::{error, info, warn};

use crate::analyze::{build_embedder, rank, RankStats, SemanticReranker};
use crate::config::AppConfig;
use crate::export::{DigestSink, JsonDigestStore};
use crate::ingest::{self, types::SourceProvider, Enricher};
use crate::item::{Digest, DigestSection};
use crate::llm::{build_generator, summarizer::category_for_day, Summarizer};
use crate::notify::{DigestNotifier, EmailSender};
use crate::state::{RunState, StateStore};

/// Digests whose project ideas count as "recent" for duplicate avoidance.
pub const RECENT_PROJECT_DIGESTS: usize = 14;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Interval since the last run has not elapsed.
    Skipped,
    /// Nothing qualified; no digest, state untouched.
    Empty,
    /// Rendered sections; nothing was written.
    DryRun(String),
    Delivered {
        digest_id: Option<String>,
        items: usize,
    },
}

impl RunOutcome {
    fn label(&self) -> &'static str {
        match self {
            RunOutcome::Skipped => "skipped",
            RunOutcome::Empty => "empty",
            RunOutcome::DryRun(_) => "dry_run",
            RunOutcome::Delivered { .. } => "delivered",
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub outcome: RunOutcome,
    pub stats: Option<RankStats>,
}

pub struct DigestRunner {
    config: AppConfig,
    providers: Vec<Arc<dyn SourceProvider>>,
    reranker: Option<SemanticReranker>,
    summarizer: Summarizer,
    enricher: Option<Enricher>,
    notifiers: Vec<Arc<dyn DigestNotifier>>,
    sink: Arc<dyn DigestSink>,
    store: StateStore,
}

impl DigestRunner {
    pub fn new(
        config: AppConfig,
        providers: Vec<Arc<dyn SourceProvider>>,
        summarizer: Summarizer,
        sink: Arc<dyn DigestSink>,
    ) -> Self {
        let store = StateStore::new(config.paths.state_dir.clone());
        Self {
            config,
            providers,
            reranker: None,
            summarizer,
            enricher: None,
            notifiers: Vec::new(),
            sink,
            store,
        }
    }

    /// Wire real backends from configuration and environment.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let providers = ingest::build_providers(&config.sources, &config.schedule);
        let summarizer = Summarizer::new(build_generator(&config.ai));
        let sink: Arc<dyn DigestSink> = Arc::new(JsonDigestStore::new(config.paths.export_dir.clone()));

        let reranker = build_embedder(&config.ai)
            .map(|backend| SemanticReranker::new(backend, config.ranking, config.retry));

        let mut notifiers: Vec<Arc<dyn DigestNotifier>> = Vec::new();
        match &config.email {
            Some(email) => {
                let sender = EmailSender::from_config(email).context("email configuration")?;
                notifiers.push(Arc::new(sender));
            }
            None => info!("no [email] section; email delivery disabled"),
        }

        let enricher = Enricher::from_env();
        if enricher.is_none() {
            info!("FIRECRAWL_API_KEY not set; content enrichment disabled");
        }

        let mut runner = Self::new(config, providers, summarizer, sink);
        runner.reranker = reranker;
        runner.enricher = enricher;
        runner.notifiers = notifiers;
        Ok(runner)
    }

    pub fn with_reranker(mut self, reranker: SemanticReranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DigestNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn state_store(&self) -> &StateStore {
        &self.store
    }

    /// Load state from disk and run once at the current time.
    pub async fn run_once(&self, opts: RunOptions) -> Result<RunReport> {
        let state = self.store.load();
        self.run(state, opts, Utc::now()).await
    }

    pub async fn run(&self, mut state: RunState, opts: RunOptions, now: DateTime<Utc>) -> Result<RunReport> {
        let interval = Duration::try_days(self.config.schedule.interval_days).unwrap_or(Duration::MAX);
        if !state.should_run(interval, opts.force, now) {
            info!(last_run = ?state.last_run, "too soon since last run; use --force to override");
            return Ok(finish(state, RunOutcome::Skipped, None));
        }

        let fetched = ingest::fetch_all(&self.providers).await;
        let ranked = rank(
            fetched,
            &state.seen,
            &self.config.topics,
            self.reranker.as_ref(),
            self.config.schedule.max_items_in_digest,
        )
        .await;

        if ranked.is_empty() {
            info!("no relevant items found; skipping digest");
            return Ok(finish(state, RunOutcome::Empty, Some(ranked.stats)));
        }

        if opts.dry_run {
            let text = render_dry_run(&ranked.sections);
            return Ok(finish(state, RunOutcome::DryRun(text), Some(ranked.stats)));
        }

        let stats = ranked.stats;
        let mut sections = ranked.sections;

        if let Some(enricher) = &self.enricher {
            let n = enricher
                .enrich(sections.iter_mut().flat_map(|s| s.items.iter_mut()))
                .await;
            info!(enriched = n, "content enrichment done");
        }

        if !self.summarizer.is_enabled() {
            warn!("text generation disabled; digest goes out without summaries");
        }
        self.summarizer.summarize_sections(&mut sections).await;
        let intro = self.summarizer.summarize_digest(&sections).await;

        let project_recommendations = if self.summarizer.is_enabled() {
            let recent = self.sink.recent_projects(RECENT_PROJECT_DIGESTS);
            let category = category_for_day(now.date_naive());
            info!(category, recent = recent.len(), "generating project recommendation");
            self.summarizer
                .recommend_projects(&sections, &recent, Some(category))
                .await
        } else {
            "[]".to_string()
        };

        let total_items = sections.iter().map(|s| s.items.len()).sum();
        let digest = Digest {
            generated_at: now,
            intro_summary: intro,
            sections,
            total_items,
            sources_checked: self.config.sources.sources_checked(),
            project_recommendations,
        };

        for n in &self.notifiers {
            match n.deliver(&digest).await {
                Ok(()) => info!(notifier = n.name(), "digest delivered"),
                Err(e) => error!(notifier = n.name(), error = ?e, "digest delivery failed"),
            }
        }

        let digest_id = match self.sink.store(&digest).await {
            Ok(id) => {
                info!(id = %id, "digest exported");
                Some(id)
            }
            Err(e) => {
                warn!(error = ?e, "digest export failed");
                None
            }
        };

        let digested = digest.sections.iter().flat_map(|s| s.items.iter());
        self.store
            .commit(&mut state, digested, now)
            .context("saving run state")?;
        gauge!("digest_last_run_ts").set(now.timestamp() as f64);

        let outcome = RunOutcome::Delivered {
            digest_id,
            items: total_items,
        };
        Ok(finish(state, outcome, Some(stats)))
    }
}

fn finish(state: RunState, outcome: RunOutcome, stats: Option<RankStats>) -> RunReport {
    counter!("digest_runs_total", "outcome" => outcome.label()).increment(1);
    RunReport { state, outcome, stats }
}

/// Console listing of a would-be digest.
pub fn render_dry_run(sections: &[DigestSection]) -> String {
    let total: usize = sections.iter().map(|s| s.items.len()).sum();
    let rule = "=".repeat(60);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}\nDRY RUN - {total} items would be in the digest\n{rule}\n");
    for s in sections {
        let _ = writeln!(out, "--- {} ({} items) ---", s.title, s.items.len());
        for item in &s.items {
            let _ = writeln!(out, "  [{:.0}] [{}] {}", item.score, item.source_name, item.title);
            let _ = writeln!(out, "         {}", item.url);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{NewsItem, SourceKind};

    #[test]
    fn dry_run_lists_score_source_and_url() {
        let mut a = NewsItem::new("GPT-5 lands", "https://x/1", "Feed", SourceKind::FeedArticle);
        a.score = 12.6;
        let sections = vec![DigestSection {
            title: "Large Language Models".into(),
            topic_key: "llm".into(),
            items: vec![a],
        }];
        let out = render_dry_run(&sections);
        assert!(out.contains("DRY RUN - 1 items would be in the digest"));
        assert!(out.contains("--- Large Language Models (1 items) ---"));
        assert!(out.contains("  [13] [Feed] GPT-5 lands\n         https://x/1"));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(RunOutcome::Skipped.label(), "skipped");
        assert_eq!(RunOutcome::DryRun(String::new()).label(), "dry_run");
    }
}
