// src/analyze/semantic.rs
//! Semantic re-ranking: embedding similarity between items and topics.
//!
//! - Keyword-matched items are embedded first, then zero-score items in input
//!   order, up to `embed_budget - topics` texts. The rest is carried through
//!   unchanged.
//! - Every embedded item gets `best_similarity * semantic_scale` added.
//! - A zero-keyword item whose best similarity reaches `semantic_threshold`
//!   is assigned that single topic (semantic rescue).
//!
//! Inclusion filtering happens afterwards in [`super::select::retain_qualified`].

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info};

use super::embedding::{cosine_similarity, embed_batched, EmbeddingBackend};
use crate::config::{RankingConfig, Topics};
use crate::item::{truncate_chars, NewsItem};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RerankStats {
    pub embedded: usize,
    pub keyword_candidates: usize,
    pub zero_candidates: usize,
    pub carried: usize,
    pub rescued: usize,
    pub fallback_batches: usize,
}

/// Split into (to embed, carried through) under `budget`.
pub fn select_for_embedding(items: Vec<NewsItem>, budget: usize) -> (Vec<NewsItem>, Vec<NewsItem>) {
    let (keyword, zero): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| i.score > 0.0);

    let mut embed = Vec::with_capacity(budget.min(keyword.len() + zero.len()));
    let mut carried = Vec::new();
    for it in keyword.into_iter().chain(zero) {
        if embed.len() < budget {
            embed.push(it);
        } else {
            carried.push(it);
        }
    }
    (embed, carried)
}

/// Text embedded for an item: `"{title}. {first N snippet chars}"`.
pub fn item_text(item: &NewsItem, snippet_chars: usize) -> String {
    format!("{}. {}", item.title, truncate_chars(&item.snippet, snippet_chars))
}

/// Best-matching topic by cosine similarity; ties keep the earlier topic and
/// only strictly positive similarities count.
pub fn best_topic<'a>(item_vec: &[f32], topic_vecs: &[(&'a str, Vec<f32>)]) -> (Option<&'a str>, f32) {
    let mut best_sim = 0.0f32;
    let mut best_key = None;
    for (key, vec) in topic_vecs {
        let sim = cosine_similarity(item_vec, vec);
        if sim > best_sim {
            best_sim = sim;
            best_key = Some(*key);
        }
    }
    (best_key, best_sim)
}

/// Add the semantic bonus and rescue if eligible. Returns true on rescue.
pub fn apply_similarity(
    item: &mut NewsItem,
    best: (Option<&str>, f32),
    settings: &RankingConfig,
) -> bool {
    let (key, sim) = best;
    item.score += f64::from(sim) * settings.semantic_scale;

    match key {
        Some(k) if item.matched_topics.is_empty() && sim >= settings.semantic_threshold => {
            item.matched_topics = vec![k.to_string()];
            debug!(
                target: "ranking",
                title = %truncate_chars(&item.title, 60),
                topic = k,
                sim,
                "semantic rescue"
            );
            true
        }
        _ => false,
    }
}

pub struct SemanticReranker {
    backend: Arc<dyn EmbeddingBackend>,
    settings: RankingConfig,
    policy: RetryPolicy,
}

impl SemanticReranker {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, settings: RankingConfig, policy: RetryPolicy) -> Self {
        Self {
            backend,
            settings,
            policy,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Item slots left after reserving one per topic description.
    pub fn item_budget(&self, topic_count: usize) -> usize {
        self.settings.embed_budget.saturating_sub(topic_count)
    }

    /// Re-score `items`. Output is embedded items followed by carried items;
    /// nothing is dropped here.
    pub async fn rerank(&self, items: Vec<NewsItem>, topics: &Topics) -> (Vec<NewsItem>, RerankStats) {
        let mut stats = RerankStats::default();
        if items.is_empty() || topics.is_empty() {
            stats.carried = items.len();
            return (items, stats);
        }

        let budget = self.item_budget(topics.len());
        let keyword_total = items.iter().filter(|i| i.score > 0.0).count();
        let (mut embed, carried) = select_for_embedding(items, budget);
        stats.embedded = embed.len();
        stats.keyword_candidates = keyword_total.min(embed.len());
        stats.zero_candidates = embed.len() - stats.keyword_candidates;
        stats.carried = carried.len();
        info!(
            target: "ranking",
            embedded = stats.embedded,
            keyword = stats.keyword_candidates,
            zero_score = stats.zero_candidates,
            carried = stats.carried,
            "embedding items for semantic scoring"
        );

        let s = &self.settings;
        let topic_texts: Vec<String> = topics.iter().map(|t| t.semantic_text()).collect();
        let topic_emb = embed_batched(
            self.backend.as_ref(),
            &topic_texts,
            s.embed_batch_size,
            s.embedding_dims,
            &self.policy,
        )
        .await;
        let topic_vecs: Vec<(&str, Vec<f32>)> = topics.keys().zip(topic_emb.vectors).collect();

        let item_texts: Vec<String> = embed.iter().map(|i| item_text(i, s.item_text_chars)).collect();
        let item_emb = embed_batched(
            self.backend.as_ref(),
            &item_texts,
            s.embed_batch_size,
            s.embedding_dims,
            &self.policy,
        )
        .await;
        stats.fallback_batches = topic_emb.fallback_batches + item_emb.fallback_batches;

        for (item, vec) in embed.iter_mut().zip(item_emb.vectors.iter()) {
            if apply_similarity(item, best_topic(vec, &topic_vecs), s) {
                stats.rescued += 1;
            }
        }
        counter!("ranking_semantic_rescued_total").increment(stats.rescued as u64);

        embed.extend(carried);
        (embed, stats)
    }
}
