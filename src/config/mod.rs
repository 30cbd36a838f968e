// src/config/mod.rs
//! Typed application configuration loaded from TOML.
//!
//! Resolution order for the file: explicit path → `$DIGEST_CONFIG_PATH` →
//! `config/digest.toml`. `${VAR}` placeholders are substituted from the
//! environment before parsing; unknown variables are left untouched.

pub mod ai;
pub mod topics;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::RetryPolicy;
pub use ai::AiConfig;
pub use topics::{Topic, Topics};

pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";
pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_days")]
    pub interval_days: i64,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    #[serde(default = "default_max_per_source")]
    pub max_items_per_source: usize,
    #[serde(default = "default_max_in_digest")]
    pub max_items_in_digest: usize,
}

fn default_interval_days() -> i64 {
    1
}
fn default_lookback_hours() -> i64 {
    48
}
fn default_max_per_source() -> usize {
    20
}
fn default_max_in_digest() -> usize {
    25
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_days: default_interval_days(),
            lookback_hours: default_lookback_hours(),
            max_items_per_source: default_max_per_source(),
            max_items_in_digest: default_max_in_digest(),
        }
    }
}

/// Texts per embedding request the backends accept.
pub const MAX_EMBED_BATCH_SIZE: usize = 100;

/// Upper bound for day/hour windows; keeps `chrono::Duration` arithmetic in range.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Constants of the semantic stage.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    /// Minimum similarity for assigning a topic to a zero-keyword item.
    pub semantic_threshold: f32,
    /// Bonus at similarity 1.0.
    pub semantic_scale: f64,
    /// Texts per minute the embedding backend accepts (topics included).
    pub embed_budget: usize,
    pub embed_batch_size: usize,
    /// Dimension of substitute zero vectors.
    pub embedding_dims: usize,
    /// Snippet chars appended to the title when embedding an item.
    pub item_text_chars: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.65,
            semantic_scale: 20.0,
            embed_budget: 90,
            embed_batch_size: 100,
            embedding_dims: 3072,
            item_text_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedGroup {
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GithubQuery {
    pub topic: String,
    #[serde(default = "default_min_stars")]
    pub min_stars: u32,
    #[serde(default = "default_created_within_days")]
    pub created_within_days: i64,
}

fn default_min_stars() -> u32 {
    50
}
fn default_created_within_days() -> i64 {
    7
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubSources {
    #[serde(default)]
    pub search_queries: Vec<GithubQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub news: FeedGroup,
    #[serde(default)]
    pub reddit: FeedGroup,
    #[serde(default)]
    pub youtube: FeedGroup,
    #[serde(default)]
    pub github: GithubSources,
}

impl SourcesConfig {
    /// Feed count plus one per GitHub query batch; reported in the digest header.
    pub fn sources_checked(&self) -> usize {
        let feeds = self.news.feeds.len() + self.reddit.feeds.len() + self.youtube.feeds.len();
        feeds + usize::from(!self.github.search_queries.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender_email: String,
    #[serde(default)]
    pub sender_password: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_smtp_port() -> u16 {
    465
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            export_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    schedule: ScheduleConfig,
    #[serde(default)]
    ranking: RankingConfig,
    #[serde(default)]
    retry: RetryPolicy,
    #[serde(default)]
    topics: Vec<Topic>,
    #[serde(default)]
    sources: SourcesConfig,
    #[serde(default)]
    email: Option<EmailConfig>,
    #[serde(default)]
    ai: AiConfig,
    #[serde(default)]
    paths: PathsConfig,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub schedule: ScheduleConfig,
    pub ranking: RankingConfig,
    /// Policy for embedding calls.
    pub retry: RetryPolicy,
    pub topics: Topics,
    pub sources: SourcesConfig,
    pub email: Option<EmailConfig>,
    pub ai: AiConfig,
    pub paths: PathsConfig,
}

impl AppConfig {
    /// Load using `$DIGEST_CONFIG_PATH` or the default path.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let expanded = substitute_env(s);
        let raw: RawConfig = toml::from_str(&expanded)?;
        let mut ai = raw.ai;
        ai.normalize();
        let cfg = Self {
            schedule: raw.schedule,
            ranking: raw.ranking,
            retry: raw.retry,
            topics: Topics::new(raw.topics)?,
            sources: raw.sources,
            email: raw.email,
            ai,
            paths: raw.paths,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject structurally invalid values. Empty topic lists and a zero digest
    /// capacity are valid: they simply produce an empty digest.
    pub fn validate(&self) -> Result<()> {
        let r = &self.ranking;
        if r.embed_batch_size == 0 || r.embed_batch_size > MAX_EMBED_BATCH_SIZE {
            bail!(
                "ranking.embed_batch_size must be in 1..={MAX_EMBED_BATCH_SIZE}, got {}",
                r.embed_batch_size
            );
        }
        if !r.semantic_threshold.is_finite() || !r.semantic_scale.is_finite() {
            bail!("ranking thresholds must be finite");
        }
        for p in [&self.retry, &self.ai.retry] {
            if !(p.multiplier.is_finite() && p.multiplier > 0.0) {
                bail!("retry multiplier must be positive, got {}", p.multiplier);
            }
        }
        let s = &self.schedule;
        if !(0..=MAX_WINDOW_DAYS).contains(&s.interval_days)
            || !(0..=MAX_WINDOW_DAYS * 24).contains(&s.lookback_hours)
        {
            bail!(
                "schedule.interval_days must be in 0..={MAX_WINDOW_DAYS} and lookback_hours in 0..={}",
                MAX_WINDOW_DAYS * 24
            );
        }
        for q in &self.sources.github.search_queries {
            if !(0..=MAX_WINDOW_DAYS).contains(&q.created_within_days) {
                bail!(
                    "github query {:?}: created_within_days must be in 0..={MAX_WINDOW_DAYS}",
                    q.topic
                );
            }
        }
        Ok(())
    }
}

static ENV_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\w+)\}").expect("env placeholder regex"));

/// Replace `${VAR}` with the environment value; leave unknown placeholders as-is.
pub fn substitute_env(s: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(s, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
