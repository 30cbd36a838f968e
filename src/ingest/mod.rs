// src/ingest/mod.rs
pub mod enrich;
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use metrics::{counter, gauge};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinSet;

use crate::config::{FeedGroup, ScheduleConfig, SourcesConfig};
use crate::ingest::providers::{github::GithubSearchProvider, rss::FeedProvider};
use crate::ingest::types::SourceProvider;
use crate::item::{truncate_chars, NewsItem, SourceKind};

pub use enrich::Enricher;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Plain text from feed HTML: decode entities, strip tags, collapse
/// whitespace, cap at `max_chars`.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // decode twice: feeds often double-escape markup inside descriptions
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let collapsed = RE_WS.replace_all(&stripped, " ");
    truncate_chars(collapsed.trim(), max_chars)
}

/// Keep the first item per URL. Returns how many were dropped.
pub fn dedup_by_url(items: &mut Vec<NewsItem>) -> usize {
    let before = items.len();
    let mut seen = HashSet::new();
    items.retain(|i| seen.insert(i.url.clone()));
    before - items.len()
}

/// Providers for every configured feed and the GitHub search queries.
pub fn build_providers(sources: &SourcesConfig, schedule: &ScheduleConfig) -> Vec<Arc<dyn SourceProvider>> {
    let mut out: Vec<Arc<dyn SourceProvider>> = Vec::new();
    let groups: [(&FeedGroup, SourceKind); 3] = [
        (&sources.reddit, SourceKind::ForumPost),
        (&sources.youtube, SourceKind::Video),
        (&sources.news, SourceKind::FeedArticle),
    ];
    for (group, kind) in groups {
        for feed in &group.feeds {
            out.push(Arc::new(
                FeedProvider::from_url(&feed.name, &feed.url, kind)
                    .max_items(schedule.max_items_per_source)
                    .lookback_hours(schedule.lookback_hours),
            ));
        }
    }
    if !sources.github.search_queries.is_empty() {
        out.push(Arc::new(GithubSearchProvider::new(sources.github.search_queries.clone())));
    }
    out
}

/// Run all providers concurrently. Output keeps provider order; a failing
/// provider is logged and contributes nothing. URLs are de-duplicated across
/// providers.
pub async fn fetch_all(providers: &[Arc<dyn SourceProvider>]) -> Vec<NewsItem> {
    let mut set = JoinSet::new();
    for (idx, p) in providers.iter().enumerate() {
        let p = Arc::clone(p);
        set.spawn(async move {
            let res = p.fetch_latest().await;
            (idx, p.name().to_string(), res)
        });
    }

    let mut batches: Vec<Option<Vec<NewsItem>>> = vec![None; providers.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, _, Ok(items))) => batches[idx] = Some(items),
            Ok((_, name, Err(e))) => {
                tracing::warn!(error = ?e, provider = %name, "provider error");
                counter!("ingest_provider_errors_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(error = %e, "provider task failed");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
    }

    let mut all: Vec<NewsItem> = batches.into_iter().flatten().flatten().collect();
    let dupes = dedup_by_url(&mut all);

    counter!("ingest_fetched_total").increment(all.len() as u64);
    gauge!("ingest_last_fetch_ts").set(chrono::Utc::now().timestamp() as f64);
    tracing::info!(items = all.len(), duplicates = dupes, providers = providers.len(), "fetched all sources");
    all
}
