// src/config/ai.rs
//! Backend settings for text generation and embeddings (`[ai]` table).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

fn default_text_provider() -> String {
    "openai".to_string()
}
fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_daily_limit() -> u32 {
    200
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}
fn default_llm_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(5), 2.0)
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// "openai" | "gemini" | "disabled" (case-insensitive)
    #[serde(default = "default_text_provider")]
    pub text_provider: String,
    #[serde(default)]
    pub text_model: Option<String>,
    /// "gemini" | "openai" | "disabled"
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Real text-generation calls allowed per day; cache hits are free.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_llm_retry")]
    pub retry: RetryPolicy,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            text_provider: default_text_provider(),
            text_model: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: None,
            daily_limit: default_daily_limit(),
            cache_dir: default_cache_dir(),
            retry: default_llm_retry(),
        }
    }
}

impl AiConfig {
    pub fn normalize(&mut self) {
        self.text_provider = self.text_provider.trim().to_lowercase();
        self.embedding_provider = self.embedding_provider.trim().to_lowercase();
    }
}
