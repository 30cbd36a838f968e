// src/analyze/mod.rs
//! Ranking core entry: dedup → keyword → optional semantic → inclusion →
//! select → group.
//!
//! `rank` never fails. A missing reranker means keyword-only ranking; backend
//! trouble inside the reranker degrades to zero vectors.

pub mod embedding;
pub mod keyword;
pub mod select;
pub mod semantic;

use metrics::counter;
use tracing::info;

use crate::config::Topics;
use crate::item::{DigestSection, NewsItem};
use crate::state::SeenState;

pub use embedding::{build_embedder, cosine_similarity, EmbeddingBackend};
pub use select::{group_into_sections, qualifies, sort_and_limit, SEMANTIC_NOISE_FLOOR};
pub use semantic::{RerankStats, SemanticReranker};

/// Counts reported for one ranking pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankStats {
    pub fetched: usize,
    pub fresh: usize,
    pub keyword_matched: usize,
    /// Present when the semantic stage ran.
    pub rerank: Option<RerankStats>,
    /// Qualifying items whose score is at or below [`SEMANTIC_NOISE_FLOOR`].
    pub near_noise_floor: usize,
    pub excluded: usize,
    pub selected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Ranked {
    pub sections: Vec<DigestSection>,
    pub stats: RankStats,
}

impl Ranked {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    /// Items in section order, for seen-state commits.
    pub fn items(&self) -> impl Iterator<Item = &NewsItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }
}

/// Rank raw fetched items into topic sections.
pub async fn rank(
    items: Vec<NewsItem>,
    seen: &SeenState,
    topics: &Topics,
    reranker: Option<&SemanticReranker>,
    max_items: usize,
) -> Ranked {
    let mut stats = RankStats {
        fetched: items.len(),
        ..Default::default()
    };

    let fresh = seen.filter_new(items);
    stats.fresh = fresh.len();
    counter!("ranking_deduplicated_total").increment((stats.fetched - stats.fresh) as u64);
    info!(target: "ranking", kept = stats.fresh, dropped = stats.fetched - stats.fresh, "dedup against seen-state");

    let scored = keyword::score_items(fresh, topics);
    stats.keyword_matched = scored.iter().filter(|i| i.score > 0.0).count();
    counter!("ranking_keyword_matched_total").increment(stats.keyword_matched as u64);
    info!(target: "ranking", matched = stats.keyword_matched, total = scored.len(), "keyword scoring");

    let mut candidates = match reranker {
        Some(r) => {
            let (out, rs) = r.rerank(scored, topics).await;
            info!(
                target: "ranking",
                backend = r.backend_name(),
                rescued = rs.rescued,
                fallback_batches = rs.fallback_batches,
                "semantic rerank"
            );
            stats.rerank = Some(rs);
            out
        }
        None => {
            info!(target: "ranking", "no embedding backend; keyword-only ranking");
            scored
        }
    };

    stats.excluded = select::retain_qualified(&mut candidates);
    stats.near_noise_floor = candidates
        .iter()
        .filter(|i| i.score <= SEMANTIC_NOISE_FLOOR)
        .count();

    let selected = sort_and_limit(candidates, max_items);
    stats.selected = selected.len();
    counter!("ranking_selected_total").increment(stats.selected as u64);
    info!(
        target: "ranking",
        excluded = stats.excluded,
        selected = stats.selected,
        max_items,
        "selection"
    );

    Ranked {
        sections: group_into_sections(selected, topics),
        stats,
    }
}
