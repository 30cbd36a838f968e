// src/ingest/enrich.rs
//! Optional full-text enrichment through the Firecrawl scrape API.
//!
//! Only feed articles and forum posts with short snippets are scraped; longer
//! scraped text replaces the snippet. Failures leave the item untouched.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{read_success, BackendError};
use crate::item::{truncate_chars, NewsItem, SourceKind};

pub const FIRECRAWL_URL: &str = "https://api.firecrawl.dev/v1/scrape";
pub const MAX_CONTENT_CHARS: usize = 3000;
/// Snippets shorter than this are worth scraping.
pub const MIN_SNIPPET_CHARS: usize = 500;
const MAX_CONCURRENCY: usize = 4;

pub fn needs_enrichment(item: &NewsItem) -> bool {
    matches!(item.source_kind, SourceKind::FeedArticle | SourceKind::ForumPost)
        && item.snippet.chars().count() < MIN_SNIPPET_CHARS
}

pub struct Enricher {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl Enricher {
    pub fn new(api_key: String) -> Self {
        Self {
            http: crate::net::http_client(),
            api_key,
            endpoint: FIRECRAWL_URL.to_string(),
        }
    }

    /// Built from `FIRECRAWL_API_KEY`; `None` when unset.
    pub fn from_env() -> Option<Self> {
        crate::net::non_empty_env("FIRECRAWL_API_KEY").map(Self::new)
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Enrich eligible items in place. Returns how many were updated.
    pub async fn enrich<'a, I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = &'a mut NewsItem>,
    {
        let mut targets: Vec<&mut NewsItem> = items.into_iter().filter(|i| needs_enrichment(i)).collect();
        if targets.is_empty() {
            info!("no items need enrichment");
            return 0;
        }
        info!(items = targets.len(), "enriching items with full content");

        let permits = Arc::new(Semaphore::new(MAX_CONCURRENCY));
        let mut set = JoinSet::new();
        for (idx, item) in targets.iter().enumerate() {
            let http = self.http.clone();
            let key = self.api_key.clone();
            let endpoint = self.endpoint.clone();
            let url = item.url.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (idx, scrape(&http, &endpoint, &key, &url).await, url)
            });
        }

        let mut enriched = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Ok(text), _)) => {
                    let item = &mut targets[idx];
                    if text.chars().count() > item.snippet.chars().count() {
                        item.set_snippet(&text);
                        enriched += 1;
                    }
                }
                Ok((_, Err(e), url)) => warn!(url = %url, error = %e, "enrichment failed"),
                Err(e) => warn!(error = %e, "enrichment task panicked"),
            }
        }
        info!(enriched, total = targets.len(), "enrichment done");
        enriched
    }
}

async fn scrape(http: &reqwest::Client, endpoint: &str, key: &str, url: &str) -> Result<String, BackendError> {
    #[derive(Deserialize)]
    struct Resp {
        #[serde(default)]
        data: Option<Data>,
    }
    #[derive(Deserialize)]
    struct Data {
        #[serde(default)]
        markdown: String,
    }

    let resp = http
        .post(endpoint)
        .bearer_auth(key)
        .json(&serde_json::json!({ "url": url, "formats": ["markdown"] }))
        .send()
        .await?;
    let body: Resp = read_success(resp)
        .await?
        .json()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    let md = body.data.map(|d| d.markdown).unwrap_or_default();
    if md.trim().is_empty() {
        return Err(BackendError::Decode("empty markdown".into()));
    }
    Ok(truncate_chars(&md, MAX_CONTENT_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_short_articles_and_posts_qualify() {
        let short = NewsItem::new("a", "u1", "s", SourceKind::FeedArticle).with_snippet("tiny");
        let post = NewsItem::new("b", "u2", "s", SourceKind::ForumPost);
        let long = NewsItem::new("c", "u3", "s", SourceKind::FeedArticle).with_snippet("x".repeat(500));
        let video = NewsItem::new("d", "u4", "s", SourceKind::Video);
        let repo = NewsItem::new("e", "u5", "s", SourceKind::Repository);
        assert!(needs_enrichment(&short));
        assert!(needs_enrichment(&post));
        assert!(!needs_enrichment(&long));
        assert!(!needs_enrichment(&video));
        assert!(!needs_enrichment(&repo));
    }
}
