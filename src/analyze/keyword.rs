// src/analyze/keyword.rs
//! Deterministic keyword scoring.
//!
//! Per topic: `sum over keywords of (title_hits * 3 + snippet_hits) * weight`.
//! Hits are case-insensitive, literal, non-overlapping substring counts; a
//! keyword contained in another keyword counts independently. A topic with a
//! positive contribution is appended to `matched_topics` in config order.
//!
//! Not idempotent: scoring the same items twice double-counts.

use crate::config::Topics;
use crate::item::NewsItem;

pub const TITLE_MULTIPLIER: f64 = 3.0;

/// Non-overlapping occurrences of `needle` in `haystack` (both already lowercased).
fn count_hits(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// Score one item in place. Returns its total.
pub fn score_item(item: &mut NewsItem, topics: &Topics) -> f64 {
    let title = item.title.to_lowercase();
    let snippet = item.snippet.to_lowercase();

    let mut total = 0.0f64;
    let mut matched = Vec::new();

    for topic in topics {
        let mut topic_score = 0.0f64;
        for kw in &topic.keywords {
            let kw = kw.to_lowercase();
            let title_hits = count_hits(&title, &kw) as f64;
            let snippet_hits = count_hits(&snippet, &kw) as f64;
            topic_score += (title_hits * TITLE_MULTIPLIER + snippet_hits) * topic.weight;
        }
        if topic_score > 0.0 {
            total += topic_score;
            matched.push(topic.key.clone());
        }
    }

    item.score = total;
    item.matched_topics = matched;
    total
}

/// Score every item; zero-score items stay in the list for later stages.
pub fn score_items(mut items: Vec<NewsItem>, topics: &Topics) -> Vec<NewsItem> {
    for it in items.iter_mut() {
        score_item(it, topics);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topic;
    use crate::item::SourceKind;

    fn topics(list: Vec<Topic>) -> Topics {
        Topics::new(list).unwrap()
    }

    fn item(title: &str, snippet: &str) -> NewsItem {
        NewsItem::new(title, format!("https://x/{title}"), "src", SourceKind::FeedArticle)
            .with_snippet(snippet)
    }

    #[test]
    fn no_keywords_scores_zero() {
        let t = topics(vec![Topic::new("llm", "LLM", 2.0, &["llm"])]);
        let out = score_items(vec![item("Gardening tips", "tomatoes")], &t);
        assert_eq!(out[0].score, 0.0);
        assert!(out[0].matched_topics.is_empty());
    }

    #[test]
    fn single_title_hit_with_weight_two_scores_six() {
        let t = topics(vec![Topic::new("llm", "LLM", 2.0, &["LLM"])]);
        let out = score_items(vec![item("New llm released", "")], &t);
        assert_eq!(out[0].score, 6.0);
        assert_eq!(out[0].matched_topics, vec!["llm".to_string()]);
    }

    #[test]
    fn title_and_snippet_hits_combine() {
        let t = topics(vec![Topic::new("rust", "Rust", 1.0, &["rust"])]);
        let out = score_items(vec![item("Rust and RUST", "rust once")], &t);
        // 2 title hits * 3 + 1 snippet hit
        assert_eq!(out[0].score, 7.0);
    }

    #[test]
    fn overlapping_keywords_count_independently() {
        let t = topics(vec![Topic::new("ai", "AI", 1.0, &["gpt", "gpt-4"])]);
        let out = score_items(vec![item("gpt-4 is out", "")], &t);
        assert_eq!(out[0].score, 6.0);
    }

    #[test]
    fn matched_topics_follow_config_order() {
        let t = topics(vec![
            Topic::new("b", "B", 1.0, &["beta"]),
            Topic::new("a", "A", 5.0, &["alpha"]),
            Topic::new("zero", "Zero", 0.0, &["alpha"]),
        ]);
        let out = score_items(vec![item("alpha beta", "")], &t);
        assert_eq!(out[0].matched_topics, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(out[0].score, 3.0 + 15.0);
    }

    #[test]
    fn total_is_independent_of_topic_order() {
        let a = Topic::new("a", "A", 1.5, &["agent", "tool"]);
        let b = Topic::new("b", "B", 2.0, &["model"]);
        let it = item("agent model tool", "model agent");
        let s1 = score_item(&mut it.clone(), &topics(vec![a.clone(), b.clone()]));
        let s2 = score_item(&mut it.clone(), &topics(vec![b, a]));
        assert_eq!(s1, s2);
    }

    #[test]
    fn empty_topics_leave_items_unscored() {
        let out = score_items(vec![item("llm", "llm")], &Topics::default());
        assert_eq!(out[0].score, 0.0);
    }
}
