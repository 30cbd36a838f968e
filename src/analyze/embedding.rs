// src/analyze/embedding.rs
//! Embedding backends and the batched, rate-limit-tolerant embedding call.
//!
//! Retry strategy for one batch:
//! - HTTP 429 / RESOURCE_EXHAUSTED → back off and retry under the policy
//! - anything else → log, substitute zero vectors for that batch
//! - retries exhausted → substitute zero vectors for that batch
//!
//! A zero vector has cosine similarity 0.0 to everything, so a failed batch
//! contributes no semantic bonus and the run still completes.

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::AiConfig;
use crate::error::{read_success, BackendError};
use crate::net::{http_client, non_empty_env};
use crate::retry::{retry_async, RetryPolicy, Transient};

pub const GEMINI_EMBED_MODEL: &str = "gemini-embedding-001";
pub const OPENAI_EMBED_MODEL: &str = "text-embedding-3-small";

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// One request: returns one vector per input text, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;
    fn name(&self) -> &str;
}

/// Build the configured backend. `None` means keyword-only ranking.
pub fn build_embedder(cfg: &AiConfig) -> Option<Arc<dyn EmbeddingBackend>> {
    match cfg.embedding_provider.as_str() {
        "gemini" => {
            let key = non_empty_env("GEMINI_API_KEY")?;
            let model = cfg.embedding_model.as_deref().unwrap_or(GEMINI_EMBED_MODEL);
            Some(Arc::new(GeminiEmbedder::new(key, model)))
        }
        "openai" => {
            let key = non_empty_env("OPENAI_API_KEY")?;
            let model = cfg.embedding_model.as_deref().unwrap_or(OPENAI_EMBED_MODEL);
            Some(Arc::new(OpenAiEmbedder::new(key, model)))
        }
        "disabled" | "" => None,
        other => {
            warn!(provider = other, "unknown embedding provider; semantic ranking disabled");
            None
        }
    }
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

pub struct GeminiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            embeddings: Vec<Values>,
        }
        #[derive(Deserialize)]
        struct Values {
            values: Vec<f32>,
        }

        let model_path = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/{}:batchEmbedContents",
            model_path
        );
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }))
            .send()
            .await?;
        let body: Resp = read_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            http: http_client(),
            api_key,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Datum>,
        }
        #[derive(Deserialize)]
        struct Datum {
            index: usize,
            embedding: Vec<f32>,
        }

        let resp = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await?;
        let mut body: Resp = read_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ------------------------------------------------------------
// Batching
// ------------------------------------------------------------

/// Only rate limiting is worth waiting for on the embedding path.
struct RateLimitOnly(BackendError);

impl fmt::Display for RateLimitOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Transient for RateLimitOnly {
    fn is_transient(&self) -> bool {
        self.0.is_rate_limited()
    }
}

/// Result of embedding a list of texts.
#[derive(Debug, Clone, Default)]
pub struct Embedded {
    /// One vector per input text.
    pub vectors: Vec<Vec<f32>>,
    /// Batches replaced with zero vectors.
    pub fallback_batches: usize,
}

/// Embed `texts` in chunks of `batch_size`. Never fails: a batch that cannot be
/// embedded (rate limit exhausted, other error, wrong count) becomes `dims`-long
/// zero vectors.
pub async fn embed_batched(
    backend: &dyn EmbeddingBackend,
    texts: &[String],
    batch_size: usize,
    dims: usize,
    policy: &RetryPolicy,
) -> Embedded {
    let mut out = Embedded {
        vectors: Vec::with_capacity(texts.len()),
        fallback_batches: 0,
    };

    for batch in texts.chunks(batch_size.max(1)) {
        let res = retry_async(policy, "embed", |_| async move {
            backend.embed(batch).await.map_err(RateLimitOnly)
        })
        .await;

        match res {
            Ok(vectors) if vectors.len() == batch.len() => out.vectors.extend(vectors),
            Ok(vectors) => {
                warn!(
                    backend = backend.name(),
                    expected = batch.len(),
                    got = vectors.len(),
                    "embedding count mismatch; using zero vectors"
                );
                push_zeros(&mut out, batch.len(), dims);
            }
            Err(RateLimitOnly(e)) if e.is_rate_limited() => {
                error!(backend = backend.name(), size = batch.len(), "embedding batch failed after retries");
                push_zeros(&mut out, batch.len(), dims);
            }
            Err(RateLimitOnly(e)) => {
                warn!(backend = backend.name(), size = batch.len(), error = %e, "embedding batch failed; using zero vectors");
                push_zeros(&mut out, batch.len(), dims);
            }
        }
    }
    out
}

fn push_zeros(out: &mut Embedded, n: usize, dims: usize) {
    counter!("ranking_embedding_fallback_total").increment(1);
    out.fallback_batches += 1;
    out.vectors.extend(std::iter::repeat_with(|| vec![0.0f32; dims]).take(n));
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: AtomicUsize,
        rate_limited_calls: usize,
        fail_hard: bool,
    }

    #[async_trait]
    impl EmbeddingBackend for Scripted {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_hard {
                return Err(BackendError::Status {
                    status: 400,
                    body: "bad request".into(),
                });
            }
            if n < self.rate_limited_calls {
                return Err(BackendError::RateLimited("slow down".into()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[test]
    fn cosine_basics() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn batches_are_split_by_size() {
        let b = Scripted {
            calls: AtomicUsize::new(0),
            rate_limited_calls: 0,
            fail_hard: false,
        };
        let out = embed_batched(&b, &texts(5), 2, 2, &RetryPolicy::immediate(3)).await;
        assert_eq!(out.vectors.len(), 5);
        assert_eq!(out.vectors[4], vec![5.0, 1.0]);
        assert_eq!(b.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.fallback_batches, 0);
    }

    #[tokio::test]
    async fn rate_limit_recovers_within_attempts() {
        let b = Scripted {
            calls: AtomicUsize::new(0),
            rate_limited_calls: 2,
            fail_hard: false,
        };
        let out = embed_batched(&b, &texts(2), 100, 2, &RetryPolicy::immediate(3)).await;
        assert_eq!(out.fallback_batches, 0);
        assert_eq!(out.vectors[0], vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_yields_zero_vectors() {
        let b = Scripted {
            calls: AtomicUsize::new(0),
            rate_limited_calls: usize::MAX,
            fail_hard: false,
        };
        let out = embed_batched(&b, &texts(2), 100, 4, &RetryPolicy::immediate(3)).await;
        assert_eq!(b.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.fallback_batches, 1);
        assert_eq!(out.vectors, vec![vec![0.0; 4], vec![0.0; 4]]);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let b = Scripted {
            calls: AtomicUsize::new(0),
            rate_limited_calls: 0,
            fail_hard: true,
        };
        let out = embed_batched(&b, &texts(3), 100, 3, &RetryPolicy::immediate(3)).await;
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.vectors.len(), 3);
        assert!(out.vectors.iter().all(|v| v.iter().all(|x| *x == 0.0)));
    }

    #[serial_test::serial]
    #[test]
    fn disabled_or_keyless_provider_builds_nothing() {
        let mut cfg = AiConfig::default();
        cfg.embedding_provider = "disabled".into();
        assert!(build_embedder(&cfg).is_none());

        std::env::remove_var("GEMINI_API_KEY");
        cfg.embedding_provider = "gemini".into();
        assert!(build_embedder(&cfg).is_none());
    }
}
