// src/export.rs
//! Dashboard persistence: one JSON file per digest plus a newest-first index.
//!
//! Layout under the export root:
//! - `digests/<YYYYMMDD_HHMMSS>.json`
//! - `index.json`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::item::{Digest, NewsItem, SourceKind};
use crate::llm::summarizer::{projects_from_json, ProjectIdea};

const INTRO_SNIPPET_CHARS: usize = 200;

#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Persist a finished digest; returns its id.
    async fn store(&self, digest: &Digest) -> Result<String>;

    /// Project ideas from the most recent `limit` stored digests.
    fn recent_projects(&self, _limit: usize) -> Vec<ProjectIdea> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedItem {
    pub item_id: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub source_type: SourceKind,
    pub published: Option<DateTime<Utc>>,
    pub score: f64,
    #[serde(default)]
    pub matched_topics: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<&NewsItem> for ExportedItem {
    fn from(it: &NewsItem) -> Self {
        Self {
            item_id: it.id(),
            title: it.title.clone(),
            url: it.url.clone(),
            source_name: it.source_name.clone(),
            source_type: it.source_kind,
            published: it.published,
            score: (it.score * 10.0).round() / 10.0,
            matched_topics: it.matched_topics.clone(),
            summary: it.summary.clone(),
            extra: it.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSection {
    pub title: String,
    #[serde(default)]
    pub topic_key: String,
    pub items: Vec<ExportedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedDigest {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub intro_summary: String,
    pub project_recommendations: String,
    pub total_items: usize,
    pub sources_checked: usize,
    pub sections: Vec<ExportedSection>,
}

impl From<&Digest> for ExportedDigest {
    fn from(d: &Digest) -> Self {
        Self {
            id: d.id(),
            generated_at: d.generated_at,
            intro_summary: d.intro_summary.clone(),
            project_recommendations: d.project_recommendations.clone(),
            total_items: d.total_items,
            sources_checked: d.sources_checked,
            sections: d
                .sections
                .iter()
                .map(|s| ExportedSection {
                    title: s.title.clone(),
                    topic_key: s.topic_key.clone(),
                    items: s.items.iter().map(ExportedItem::from).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub total_items: usize,
    pub sources_checked: usize,
    pub intro_snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub digest_id: String,
    pub generated_at: DateTime<Utc>,
    pub section: String,
    pub item: ExportedItem,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportStats {
    pub digests: usize,
    pub items: usize,
    pub by_topic: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_source_type: BTreeMap<String, usize>,
}

/// First sentence (through its period) or the first 200 chars.
pub fn intro_snippet(intro: &str) -> String {
    match intro.find(". ") {
        Some(pos) if pos > 0 => intro[..=pos].to_string(),
        _ => crate::item::truncate_chars(intro, INTRO_SNIPPET_CHARS),
    }
}

/// Digest ids are timestamps; anything else is rejected before touching disk.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 32 && id.chars().all(|c| c.is_ascii_digit() || c == '_')
}

#[derive(Debug, Clone)]
pub struct JsonDigestStore {
    root: PathBuf,
}

impl JsonDigestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn digests_dir(&self) -> PathBuf {
        self.root.join("digests")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// Write the digest file and update the index. Returns the digest id.
    pub fn save(&self, digest: &Digest) -> Result<String> {
        let exported = ExportedDigest::from(digest);
        let dir = self.digests_dir();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let file = dir.join(format!("{}.json", exported.id));
        write_json(&file, &exported)?;
        info!(path = %file.display(), "wrote digest json");

        let mut index = self.list();
        index.retain(|e| e.id != exported.id);
        index.insert(
            0,
            IndexEntry {
                id: exported.id.clone(),
                generated_at: exported.generated_at,
                total_items: exported.total_items,
                sources_checked: exported.sources_checked,
                intro_snippet: intro_snippet(&exported.intro_summary),
            },
        );
        write_json(&self.index_path(), &index)?;
        Ok(exported.id)
    }

    /// Index entries, newest first. Missing or corrupt index reads as empty.
    pub fn list(&self) -> Vec<IndexEntry> {
        let path = self.index_path();
        match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring corrupt digest index");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<ExportedDigest>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.digests_dir().join(format!("{id}.json"));
        let s = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let d = serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(d))
    }

    /// Digests in index order; unreadable files are skipped.
    fn digests(&self) -> impl Iterator<Item = ExportedDigest> + '_ {
        self.list().into_iter().filter_map(move |e| match self.get(&e.id) {
            Ok(d) => d,
            Err(err) => {
                warn!(id = %e.id, error = %err, "skipping unreadable digest");
                None
            }
        })
    }

    /// Project ideas from the `limit` most recent digests.
    pub fn recent_projects(&self, limit: usize) -> Vec<ProjectIdea> {
        self.digests()
            .take(limit)
            .flat_map(|d| projects_from_json(&d.project_recommendations))
            .collect()
    }

    /// Case-insensitive match on item title or summary, newest digest first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for d in self.digests() {
            for s in d.sections {
                for item in s.items {
                    if item.title.to_lowercase().contains(&q) || item.summary.to_lowercase().contains(&q) {
                        hits.push(SearchHit {
                            digest_id: d.id.clone(),
                            generated_at: d.generated_at,
                            section: s.title.clone(),
                            item,
                        });
                        if hits.len() >= limit {
                            return hits;
                        }
                    }
                }
            }
        }
        hits
    }

    pub fn stats(&self) -> ExportStats {
        let mut st = ExportStats::default();
        for d in self.digests() {
            st.digests += 1;
            for s in &d.sections {
                for item in &s.items {
                    st.items += 1;
                    *st.by_topic.entry(s.title.clone()).or_default() += 1;
                    *st.by_source.entry(item.source_name.clone()).or_default() += 1;
                    *st
                        .by_source_type
                        .entry(item.source_type.as_str().to_string())
                        .or_default() += 1;
                }
            }
        }
        st
    }
}

#[async_trait]
impl DigestSink for JsonDigestStore {
    async fn store(&self, digest: &Digest) -> Result<String> {
        self.save(digest)
    }

    fn recent_projects(&self, limit: usize) -> Vec<ProjectIdea> {
        JsonDigestStore::recent_projects(self, limit)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming to {}", path.display()))
}
