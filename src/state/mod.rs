// src/state/mod.rs
//! Explicit run state passed into and returned from the pipeline: seen items
//! and the last successful run. No globals; callers run one pipeline at a time.

pub mod seen;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use seen::{SeenState, SEEN_RETENTION_DAYS};

const SEEN_FILE: &str = "seen_items.json";
const LAST_RUN_FILE: &str = "last_run.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct LastRunFile {
    last_run: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub seen: SeenState,
    pub last_run: Option<DateTime<Utc>>,
}

impl RunState {
    /// True when forced, never ran, or at least `interval` has passed.
    pub fn should_run(&self, interval: Duration, force: bool, now: DateTime<Utc>) -> bool {
        if force {
            return true;
        }
        match self.last_run {
            None => true,
            Some(last) => now - last >= interval,
        }
    }
}

/// File-backed store for [`RunState`] under one directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn seen_path(&self) -> PathBuf {
        self.dir.join(SEEN_FILE)
    }

    pub fn last_run_path(&self) -> PathBuf {
        self.dir.join(LAST_RUN_FILE)
    }

    /// Never fails: broken files read as "no state".
    pub fn load(&self) -> RunState {
        RunState {
            seen: SeenState::load(&self.seen_path()),
            last_run: read_last_run(&self.last_run_path()),
        }
    }

    /// Merge `digested` into seen-state, prune, and persist both files.
    pub fn commit<'a, I>(&self, state: &mut RunState, digested: I, now: DateTime<Utc>) -> Result<()>
    where
        I: IntoIterator<Item = &'a crate::item::NewsItem>,
    {
        state.seen.commit(digested, now, &self.seen_path())?;
        state.last_run = Some(now);
        write_last_run(&self.last_run_path(), now)
    }
}

fn read_last_run(path: &Path) -> Option<DateTime<Utc>> {
    let text = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<LastRunFile>(&text) {
        Ok(f) => Some(f.last_run),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed last-run file");
            None
        }
    }
}

fn write_last_run(path: &Path, now: DateTime<Utc>) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string(&LastRunFile { last_run: now })?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}
