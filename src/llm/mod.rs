// src/llm/mod.rs
//! Text generation: provider abstraction + file cache + daily limit.
//!
//! Callers only see [`TextGenerator`]. Every failure (disabled backend, limit
//! reached, exhausted retries, empty answer) comes back as `None`; the digest
//! is still produced, just without that piece of text.

pub mod summarizer;

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::AiConfig;
use crate::error::{read_success, BackendError};
use crate::net::{http_client, non_empty_env};
use crate::retry::{retry_async, RetryPolicy};

pub use summarizer::Summarizer;

pub const OPENAI_TEXT_MODEL: &str = "gpt-4o-mini";
pub const GEMINI_TEXT_MODEL: &str = "gemini-2.0-flash";

pub const SYSTEM_MSG: &str = "You are a concise AI news summarizer. \
Respond ONLY with the requested summary text. \
Do not include reasoning, thinking, citations, or web search results. \
Do not use markdown links or URL citations.";

/// One generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_MSG.to_string(),
            prompt: prompt.into(),
            max_tokens: 300,
            temperature: 0.3,
        }
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }
}

pub type GenFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the rest of the app talks to.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, req: &'a GenRequest) -> GenFuture<'a, Option<String>>;
    fn provider_name(&self) -> &'static str;
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynGenerator = Arc<dyn TextGenerator>;

/// Build the configured generator.
///
/// * `AI_TEST_MODE=mock` → deterministic mock behind the cache.
/// * Missing key or unknown provider → [`DisabledClient`].
pub fn build_generator(cfg: &AiConfig) -> DynGenerator {
    let cache_dir = PathBuf::from(&cfg.cache_dir);
    if std::env::var("AI_TEST_MODE").map(|v| v == "mock").unwrap_or(false) {
        let mock = MockProvider::new("Mock summary.");
        return Arc::new(CachingClient::new(mock, cache_dir, cfg.daily_limit, RetryPolicy::immediate(1)));
    }

    match cfg.text_provider.as_str() {
        "openai" => match non_empty_env("OPENAI_API_KEY") {
            Some(key) => {
                let model = cfg.text_model.as_deref().unwrap_or(OPENAI_TEXT_MODEL);
                let p = OpenAiProvider::new(key, model);
                Arc::new(CachingClient::new(p, cache_dir, cfg.daily_limit, cfg.retry))
            }
            None => {
                warn!("OPENAI_API_KEY not set; text generation disabled");
                Arc::new(DisabledClient)
            }
        },
        "gemini" => match non_empty_env("GEMINI_API_KEY") {
            Some(key) => {
                let model = cfg.text_model.as_deref().unwrap_or(GEMINI_TEXT_MODEL);
                let p = GeminiProvider::new(key, model);
                Arc::new(CachingClient::new(p, cache_dir, cfg.daily_limit, cfg.retry))
            }
            None => {
                warn!("GEMINI_API_KEY not set; text generation disabled");
                Arc::new(DisabledClient)
            }
        },
        "disabled" | "" => Arc::new(DisabledClient),
        other => {
            warn!(provider = other, "unknown text provider; text generation disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// Low-level provider doing the remote call; wrapped by [`CachingClient`].
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, req: &'a GenRequest) -> GenFuture<'a, Result<String, BackendError>>;
    fn name(&self) -> &'static str;
    /// Part of the cache key so switching models does not reuse old answers.
    fn model(&self) -> &str {
        ""
    }
}

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model.to_string(),
        }
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, req: &'a GenRequest) -> GenFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                #[serde(default)]
                content: Option<String>,
            }

            let body = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: &req.system,
                    },
                    Msg {
                        role: "user",
                        content: &req.prompt,
                    },
                ],
                temperature: req.temperature,
                max_tokens: req.max_tokens,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;
            let parsed: Resp = read_success(resp)
                .await?
                .json()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()))?;
            Ok(parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default())
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Gemini generateContent.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model.to_string(),
        }
    }
}

impl Provider for GeminiProvider {
    fn fetch<'a>(&'a self, req: &'a GenRequest) -> GenFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: Option<Content>,
            }
            #[derive(Deserialize)]
            struct Content {
                #[serde(default)]
                parts: Vec<Part>,
            }
            #[derive(Deserialize)]
            struct Part {
                #[serde(default)]
                text: String,
            }

            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );
            let body = serde_json::json!({
                "systemInstruction": { "parts": [{ "text": req.system }] },
                "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
                "generationConfig": {
                    "maxOutputTokens": req.max_tokens,
                    "temperature": req.temperature,
                },
            });
            let resp = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;
            let parsed: Resp = read_success(resp)
                .await?
                .json()
                .await
                .map_err(|e| BackendError::Decode(e.to_string()))?;
            Ok(parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
                .unwrap_or_default())
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Returns `None` always; used when no backend is configured.
pub struct DisabledClient;

impl TextGenerator for DisabledClient {
    fn generate<'a>(&'a self, _req: &'a GenRequest) -> GenFuture<'a, Option<String>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Fixed answer for tests and local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self { fixed: fixed.into() }
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _req: &'a GenRequest) -> GenFuture<'a, Result<String, BackendError>> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit + retry)
// ------------------------------------------------------------

pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    retry: RetryPolicy,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32, retry: RetryPolicy) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(dir = %cache_dir.display(), error = %e, "cannot create AI cache dir");
        }
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            retry,
            counter,
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        let g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.is_expired() {
            0
        } else {
            g.count
        }
    }

    async fn generate_impl(&self, req: &GenRequest) -> Option<String> {
        let key = cache_key(self.inner.name(), self.inner.model(), req);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            debug!(key = %key, "AI cache hit");
            return Some(hit);
        }

        // Limit applies to real calls only.
        {
            let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                warn!(provider = self.inner.name(), limit = self.daily_limit_max, "daily AI limit reached");
                return None;
            }
        }

        let res = retry_async(&self.retry, self.inner.name(), |_| self.inner.fetch(req)).await;
        {
            let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        counter!("ai_calls_total", "provider" => self.inner.name()).increment(1);

        match res {
            Ok(raw) => {
                let text = clean_response(&raw);
                if text.is_empty() {
                    warn!(provider = self.inner.name(), "empty AI response");
                    return None;
                }
                if let Err(e) = write_cache_file(&self.cache_dir, &key, &text) {
                    debug!(error = %e, "AI cache write failed");
                }
                info!(provider = self.inner.name(), model = self.inner.model(), "generated text");
                Some(text)
            }
            Err(e) => {
                warn!(
                    provider = self.inner.name(),
                    error = %e,
                    prompt = %crate::item::truncate_chars(&req.prompt, 80),
                    "text generation failed"
                );
                None
            }
        }
    }
}

impl<P: Provider> TextGenerator for CachingClient<P> {
    fn generate<'a>(&'a self, req: &'a GenRequest) -> GenFuture<'a, Option<String>> {
        Box::pin(self.generate_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct CachedText {
    text: String,
}

fn cache_key(provider: &str, model: &str, req: &GenRequest) -> String {
    let mut h = Sha256::new();
    for part in [provider, model, req.system.as_str(), req.prompt.as_str()] {
        h.update(part.as_bytes());
        h.update([0u8]);
    }
    h.update(req.max_tokens.to_le_bytes());
    h.update(req.temperature.to_le_bytes());
    h.finalize().iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str::<CachedText>(&s).ok().map(|c| c.text)
}

fn write_cache_file(dir: &Path, key: &str, text: &str) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(&CachedText { text: text.to_string() })?;
    fs::write(&tmp, json)?;
    fs::rename(tmp, path)
}

// ------------------------------------------------------------
// Daily counter
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string(dc)?)?;
    fs::rename(tmp, p)
}

// ------------------------------------------------------------
// Response cleaning
// ------------------------------------------------------------

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("think regex"));
static MD_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(https?://[^)]+\)").expect("link regex"));

const REASONING_PREFIXES: [&str; 5] = ["the user", "okay,", "let me", "i need to", "looking at"];

/// Strip `<think>` blocks, turn markdown link citations into their text and
/// drop reasoning-preamble lines.
pub fn clean_response(text: &str) -> String {
    let text = THINK_BLOCK.replace_all(text, "");
    let text = MD_LINK.replace_all(&text, "$1");
    text.lines()
        .filter(|line| {
            let l = line.trim().to_lowercase();
            !REASONING_PREFIXES.iter().any(|p| l.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        answer: Result<String, u16>,
    }

    impl Provider for Counting {
        fn fetch<'a>(&'a self, _req: &'a GenRequest) -> GenFuture<'a, Result<String, BackendError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = match &self.answer {
                Ok(s) => Ok(s.clone()),
                Err(code) => Err(BackendError::from_status(*code, String::new())),
            };
            Box::pin(async move { out })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn counting(answer: Result<&str, u16>) -> Counting {
        Counting {
            calls: AtomicUsize::new(0),
            answer: answer.map(str::to_string),
        }
    }

    #[test]
    fn clean_response_strips_reasoning_artifacts() {
        let raw = "<think>plan\nmore</think>Okay, here goes\nOpenAI shipped [a model](https://x.ai/p).\nLet me check\nIt matters.";
        assert_eq!(clean_response(raw), "OpenAI shipped a model.\nIt matters.");
        assert_eq!(clean_response("  plain  "), "plain");
    }

    #[tokio::test]
    async fn cache_hit_skips_provider_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let client = CachingClient::new(counting(Ok("Answer.")), dir.path().to_path_buf(), 1, RetryPolicy::immediate(1));
        let req = GenRequest::new("prompt");

        assert_eq!(client.generate(&req).await.as_deref(), Some("Answer."));
        assert_eq!(client.generate(&req).await.as_deref(), Some("Answer."));
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);

        // limit of 1 already used by the first real call
        assert!(client.generate(&GenRequest::new("other")).await.is_none());
        assert_eq!(client.calls_today(), 1);
    }

    #[tokio::test]
    async fn rate_limits_are_retried_then_give_none() {
        let dir = tempfile::tempdir().unwrap();
        let client = CachingClient::new(counting(Err(429)), dir.path().to_path_buf(), 10, RetryPolicy::immediate(3));
        assert!(client.generate(&GenRequest::new("p")).await.is_none());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);

        let dir = tempfile::tempdir().unwrap();
        let client = CachingClient::new(counting(Err(401)), dir.path().to_path_buf(), 10, RetryPolicy::immediate(3));
        assert!(client.generate(&GenRequest::new("p")).await.is_none());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_key_depends_on_parameters() {
        let a = GenRequest::new("p");
        let b = GenRequest::new("p").temperature(0.9);
        assert_ne!(cache_key("x", "m", &a), cache_key("x", "m", &b));
        assert_ne!(cache_key("x", "m", &a), cache_key("x", "n", &a));
        assert_eq!(cache_key("x", "m", &a).len(), 32);
    }

    #[tokio::test]
    async fn disabled_client_returns_none() {
        let c = DisabledClient;
        assert!(!c.is_enabled());
        assert!(c.generate(&GenRequest::new("x")).await.is_none());
    }
}
