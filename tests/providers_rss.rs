// tests/providers_rss.rs
use std::sync::Arc;

use ai_news_digest::ingest::fetch_all;
use ai_news_digest::ingest::providers::rss::FeedProvider;
use ai_news_digest::ingest::types::SourceProvider;
use ai_news_digest::item::SourceKind;
use anyhow::{bail, Result};
use async_trait::async_trait;

const NEWS_XML: &str = include_str!("fixtures/ai_news_rss.xml");
const YOUTUBE_XML: &str = include_str!("fixtures/youtube_atom.xml");

#[tokio::test]
async fn rss_fixture_parses_clean_items() {
    let provider = FeedProvider::from_fixture("AI Newsroom", NEWS_XML, SourceKind::FeedArticle);
    let items = provider.fetch_latest().await.expect("rss parse ok");

    assert_eq!(items.len(), 3, "entry without a link is skipped");
    assert!(items.iter().all(|i| i.source_name == "AI Newsroom" && i.score == 0.0));
    assert!(items.iter().all(|i| i.matched_topics.is_empty()));

    assert_eq!(items[0].title, "Open-weights LLM tops the reasoning leaderboard");
    assert_eq!(items[0].snippet, "A new open-weights model beats closed rivals on math.");
    assert!(items[0].published.is_some());

    // content:encoded wins over the teaser description
    assert_eq!(
        items[1].snippet,
        "Three major agent frameworks now speak the same tool protocol."
    );

    assert_eq!(items[2].title, "No title");
    assert!(items[2].published.is_none());
    assert_eq!(items[2].snippet, "Body without a headline - still news.");
}

#[tokio::test]
async fn atom_fixture_uses_media_description() {
    let provider = FeedProvider::from_fixture("AI Explained", YOUTUBE_XML, SourceKind::Video).max_items(1);
    let items = provider.fetch_latest().await.expect("atom parse ok");

    assert_eq!(items.len(), 1);
    let v = &items[0];
    assert_eq!(v.url, "https://www.youtube.com/watch?v=abc123");
    assert_eq!(v.source_kind, SourceKind::Video);
    assert_eq!(v.snippet, "We test three agent frameworks on tool synthesis.");
    assert_eq!(
        v.published.map(|d| d.to_rfc3339()),
        Some("2026-10-18T16:00:00+00:00".to_string())
    );
}

struct Broken;

#[async_trait]
impl SourceProvider for Broken {
    async fn fetch_latest(&self) -> Result<Vec<ai_news_digest::item::NewsItem>> {
        bail!("feed offline")
    }
    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn fetch_all_skips_failing_provider_and_dedupes_urls() {
    let providers: Vec<Arc<dyn SourceProvider>> = vec![
        Arc::new(FeedProvider::from_fixture("A", NEWS_XML, SourceKind::FeedArticle)),
        Arc::new(Broken),
        Arc::new(FeedProvider::from_fixture("B", NEWS_XML, SourceKind::ForumPost)),
        Arc::new(FeedProvider::from_fixture("YT", YOUTUBE_XML, SourceKind::Video)),
    ];
    let items = fetch_all(&providers).await;

    assert_eq!(items.len(), 5);
    assert!(items[..3].iter().all(|i| i.source_name == "A"), "first provider wins duplicates");
    assert!(items[3..].iter().all(|i| i.source_name == "YT"));
}
