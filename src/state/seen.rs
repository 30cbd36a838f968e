// src/state/seen.rs
//! Seen-state: identity → first-seen timestamp, persisted as a JSON object of
//! RFC 3339 strings. Reads fail open (a broken file means "nothing seen").

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::item::NewsItem;

/// Retention window for seen entries.
pub const SEEN_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeenState {
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl SeenState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. Missing, unreadable or malformed files yield an empty
    /// state; individual entries with unparsable timestamps are skipped.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read seen state; starting empty");
                return Self::default();
            }
        };
        Self::from_json_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "malformed seen state; starting empty");
            Self::default()
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(s)?;
        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;
        for (id, ts) in raw {
            match DateTime::parse_from_rfc3339(&ts) {
                Ok(dt) => {
                    entries.insert(id, dt.with_timezone(&Utc));
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "seen state entries with bad timestamps ignored");
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied()
    }

    pub fn insert(&mut self, id: impl Into<String>, ts: DateTime<Utc>) {
        self.entries.insert(id.into(), ts);
    }

    /// Items whose identity is not present, in input order.
    pub fn filter_new(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        items.into_iter().filter(|it| !self.contains(&it.id())).collect()
    }

    /// Record every item's identity at `now`.
    pub fn record<'a, I>(&mut self, items: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = &'a NewsItem>,
    {
        for it in items {
            self.entries.insert(it.id(), now);
        }
    }

    /// Drop entries not strictly newer than `now - window`. Returns how many went.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        let before = self.entries.len();
        self.entries.retain(|_, ts| *ts > cutoff);
        before - self.entries.len()
    }

    pub fn to_json_string(&self) -> Result<String> {
        let raw: BTreeMap<&str, String> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_rfc3339()))
            .collect();
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    /// Whole-file overwrite via temp file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = self.to_json_string()?;
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(json.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    /// Merge `items` at `now`, prune to the retention window, persist.
    pub fn commit<'a, I>(&mut self, items: I, now: DateTime<Utc>, path: &Path) -> Result<()>
    where
        I: IntoIterator<Item = &'a NewsItem>,
    {
        self.record(items, now);
        let pruned = self.prune(now, Duration::days(SEEN_RETENTION_DAYS));
        self.save(path)?;
        info!(kept = self.len(), pruned, "saved seen items");
        Ok(())
    }
}
