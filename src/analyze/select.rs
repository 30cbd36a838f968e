// src/analyze/select.rs
//! Inclusion, selection and grouping into topic sections.

use std::cmp::Ordering;
use tracing::warn;

use crate::config::Topics;
use crate::item::{DigestSection, NewsItem};

/// Bonus below which a semantic-only score is treated as noise. Reported only;
/// inclusion is decided by [`qualifies`].
pub const SEMANTIC_NOISE_FLOOR: f64 = 0.5;

/// One predicate for both modes: at least one matched topic and a positive score.
pub fn qualifies(item: &NewsItem) -> bool {
    !item.matched_topics.is_empty() && item.score > 0.0
}

/// Keep qualifying items, preserving order. Returns how many were dropped.
pub fn retain_qualified(items: &mut Vec<NewsItem>) -> usize {
    let before = items.len();
    items.retain(qualifies);
    before - items.len()
}

/// Stable sort by score (descending), then truncate.
pub fn sort_and_limit(mut items: Vec<NewsItem>, max_items: usize) -> Vec<NewsItem> {
    items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    items.truncate(max_items);
    items
}

/// One section per topic with items, in config order; each item goes to its
/// primary topic. Items without a known primary topic are dropped and logged.
pub fn group_into_sections(items: Vec<NewsItem>, topics: &Topics) -> Vec<DigestSection> {
    let mut buckets: Vec<Vec<NewsItem>> = vec![Vec::new(); topics.len()];

    for item in items {
        let slot = item
            .primary_topic()
            .and_then(|key| topics.keys().position(|k| k == key));
        match slot {
            Some(i) => buckets[i].push(item),
            None => warn!(
                target: "ranking",
                url = %item.url,
                primary = ?item.primary_topic(),
                "item reached grouping without a configured topic; dropped"
            ),
        }
    }

    topics
        .iter()
        .zip(buckets)
        .filter(|(_, b)| !b.is_empty())
        .map(|(t, items)| DigestSection {
            title: t.display_label().to_string(),
            topic_key: t.key.clone(),
            items,
        })
        .collect()
}
