// src/item.rs
//! Canonical record for a candidate piece of content, plus the digest structures
//! built from it.
//!
//! Identity is a pure function of the URL: the first 16 hex chars of its SHA-256.
//! Two items with the same URL are the same entity for dedup and for persisted
//! records, whatever their other fields say.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for snippets held in memory (enriched article bodies included).
pub const MAX_SNIPPET_CHARS: usize = 3000;

/// Where an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "news")]
    FeedArticle,
    #[serde(rename = "youtube")]
    Video,
    #[serde(rename = "reddit")]
    ForumPost,
    #[serde(rename = "github")]
    Repository,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::FeedArticle => "news",
            SourceKind::Video => "youtube",
            SourceKind::ForumPost => "reddit",
            SourceKind::Repository => "github",
        }
    }
}

/// Stable identifier derived from a URL.
pub fn item_id(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Truncate to at most `max` chars (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub source_kind: SourceKind,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub score: f64,
    /// Insertion-ordered; the first entry is the primary topic.
    #[serde(default)]
    pub matched_topics: Vec<String>,
    /// Opaque to ranking (stars, language, ...).
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub summary: String,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        source_kind: SourceKind,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            source_name: source_name.into(),
            source_kind,
            published: None,
            snippet: String::new(),
            score: 0.0,
            matched_topics: Vec::new(),
            extra: serde_json::Map::new(),
            summary: String::new(),
        }
    }

    pub fn with_snippet(mut self, snippet: impl AsRef<str>) -> Self {
        self.set_snippet(snippet.as_ref());
        self
    }

    pub fn with_published(mut self, published: Option<DateTime<Utc>>) -> Self {
        self.published = published;
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn set_snippet(&mut self, snippet: &str) {
        self.snippet = truncate_chars(snippet, MAX_SNIPPET_CHARS);
    }

    pub fn id(&self) -> String {
        item_id(&self.url)
    }

    pub fn primary_topic(&self) -> Option<&str> {
        self.matched_topics.first().map(String::as_str)
    }
}

/// One topic section of the digest; items keep descending-score order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DigestSection {
    pub title: String,
    pub topic_key: String,
    pub items: Vec<NewsItem>,
}

/// Finished digest handed to delivery and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub intro_summary: String,
    pub sections: Vec<DigestSection>,
    pub total_items: usize,
    pub sources_checked: usize,
    /// JSON array string (`"[]"` when no idea could be produced).
    pub project_recommendations: String,
}

impl Digest {
    pub fn id(&self) -> String {
        self.generated_at.format("%Y%m%d_%H%M%S").to_string()
    }
}
