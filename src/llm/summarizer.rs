// src/llm/summarizer.rs
//! Digest text: item summaries, executive intro and one project idea.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{DynGenerator, GenRequest};
use crate::item::{truncate_chars, DigestSection, NewsItem};

pub const PROJECT_CATEGORIES: [&str; 7] = [
    "tool",
    "framework",
    "model",
    "library",
    "saas",
    "community",
    "marketplace",
];

const ITEM_CONTENT_CHARS: usize = 2000;
const ITEMS_PER_SECTION_IN_PROMPT: usize = 5;
const AVOID_NAMES_MAX: usize = 12;
const SIGNATURE_DESC_CHARS: usize = 120;
/// Names at least this similar (normalized Levenshtein) count as the same idea.
const NAME_SIMILARITY: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectIdea {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
}

impl ProjectIdea {
    fn signature(&self) -> String {
        format!(
            "{}|{}",
            self.name.to_lowercase(),
            truncate_chars(&self.description.to_lowercase(), SIGNATURE_DESC_CHARS)
        )
    }
}

/// Category to aim for on `date`; rotates through all categories.
pub fn category_for_day(date: NaiveDate) -> &'static str {
    PROJECT_CATEGORIES[date.ordinal0() as usize % PROJECT_CATEGORIES.len()]
}

fn normalize_category(c: &str) -> &'static str {
    let c = c.trim().to_lowercase();
    PROJECT_CATEGORIES
        .iter()
        .find(|v| **v == c)
        .copied()
        .unwrap_or("tool")
}

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\s*").expect("fence regex"));
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").expect("fence regex"));

/// Validate model output into a JSON array holding at most one idea.
/// Anything unparsable becomes `"[]"`.
pub fn parse_projects_json(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "[]".to_string();
    }
    let stripped = FENCE_OPEN.replace(raw, "");
    let stripped = FENCE_CLOSE.replace(stripped.trim(), "");

    let value: serde_json::Value = match serde_json::from_str(stripped.trim()) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, raw = %truncate_chars(raw, 200), "failed to parse project JSON");
            return "[]".to_string();
        }
    };
    let first = match value {
        serde_json::Value::Array(mut list) if !list.is_empty() => list.swap_remove(0),
        serde_json::Value::Array(_) => return "[]".to_string(),
        obj @ serde_json::Value::Object(_) => obj,
        other => {
            warn!(kind = %other, "project JSON is not an array");
            return "[]".to_string();
        }
    };

    let field = |k: &str| -> String {
        match first.get(k) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(v) => v.to_string(),
        }
    };
    let name = field("name");
    let idea = ProjectIdea {
        name: if name.is_empty() { "Unnamed".to_string() } else { name },
        description: field("description"),
        why: field("why"),
        url: field("url"),
        category: normalize_category(&field("category")).to_string(),
    };
    serde_json::to_string(&[idea]).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a validated project array string.
pub fn projects_from_json(s: &str) -> Vec<ProjectIdea> {
    serde_json::from_str(s).unwrap_or_default()
}

/// True when the generated idea repeats a recent one: same name (or nearly),
/// or same name + description signature.
pub fn is_project_duplicate(projects_json: &str, recent: &[ProjectIdea]) -> bool {
    let Some(p) = projects_from_json(projects_json).into_iter().next() else {
        return false;
    };
    let sig = p.signature();
    let name = p.name.trim().to_lowercase();
    recent.iter().any(|r| {
        let r_name = r.name.trim().to_lowercase();
        r.signature() == sig
            || r_name == name
            || (!name.is_empty() && strsim::normalized_levenshtein(&r_name, &name) >= NAME_SIMILARITY)
    })
}

pub struct Summarizer {
    gen: DynGenerator,
}

impl Summarizer {
    pub fn new(gen: DynGenerator) -> Self {
        Self { gen }
    }

    pub fn is_enabled(&self) -> bool {
        self.gen.is_enabled()
    }

    async fn call(&self, req: GenRequest) -> String {
        self.gen.generate(&req).await.unwrap_or_default()
    }

    /// 2-3 sentence summary of one item.
    pub async fn summarize_item(&self, item: &NewsItem) -> String {
        let content = if item.snippet.is_empty() {
            item.title.clone()
        } else {
            truncate_chars(&item.snippet, ITEM_CONTENT_CHARS)
        };
        let prompt = format!(
            "Summarize this AI news item in 2-3 concise sentences. \
             Focus on: what happened, why it matters, and any key facts.\n\n\
             Title: {}\nSource: {}\nContent: {}\n\nSummary:",
            item.title, item.source_name, content
        );
        self.call(GenRequest::new(prompt)).await
    }

    /// Fill `summary` for every item, one call at a time.
    pub async fn summarize_sections(&self, sections: &mut [DigestSection]) {
        let total: usize = sections.iter().map(|s| s.items.len()).sum();
        info!(items = total, provider = self.gen.provider_name(), "summarizing items");
        for section in sections.iter_mut() {
            for item in section.items.iter_mut() {
                item.summary = self.summarize_item(item).await;
            }
        }
    }

    /// 3-4 sentence executive overview.
    pub async fn summarize_digest(&self, sections: &[DigestSection]) -> String {
        let overview = sections
            .iter()
            .map(|s| {
                let titles: Vec<&str> = s
                    .items
                    .iter()
                    .take(ITEMS_PER_SECTION_IN_PROMPT)
                    .map(|i| i.title.as_str())
                    .collect();
                format!("- {}: {}", s.title, titles.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Write a 3-4 sentence executive summary of today's AI news digest. \
             Highlight the most important trends and announcements. \
             Be concise and informative.\n\n\
             Sections and key items:\n{overview}\n\nExecutive Summary:"
        );
        self.call(GenRequest::new(prompt)).await
    }

    /// One project idea as a JSON array string; `"[]"` when generation fails.
    pub async fn recommend_projects(
        &self,
        sections: &[DigestSection],
        recent: &[ProjectIdea],
        target_category: Option<&str>,
    ) -> String {
        let category = normalize_category(target_category.unwrap_or("tool"));
        let prompt = project_prompt(sections, recent, category);

        let parsed = parse_projects_json(
            &self
                .call(GenRequest::new(prompt.clone()).max_tokens(450).temperature(0.85))
                .await,
        );

        if !recent.is_empty() && is_project_duplicate(&parsed, recent) {
            info!("project idea repeats a recent one; regenerating");
            let retry_prompt = format!(
                "{prompt}\n\nPrevious output was too close to recent ideas. \
                 Regenerate with a distinctly different product name, audience, and value proposition."
            );
            let retried = parse_projects_json(
                &self
                    .call(GenRequest::new(retry_prompt).max_tokens(450).temperature(0.9))
                    .await,
            );
            if retried != "[]" && !is_project_duplicate(&retried, recent) {
                return retried;
            }
        }
        parsed
    }
}

/// Star count as plain text; absent, empty and zero counts are skipped.
fn stars_label(item: &NewsItem) -> Option<String> {
    let v = item.extra.get("stars")?;
    let text = match v {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty() && text != "0").then_some(text)
}

fn project_prompt(sections: &[DigestSection], recent: &[ProjectIdea], category: &str) -> String {
    let mut lines = Vec::new();
    for s in sections {
        for i in s.items.iter().take(ITEMS_PER_SECTION_IN_PROMPT) {
            let mut line = format!("- [{}] {}", s.title, i.title);
            if let Some(stars) = stars_label(i) {
                line.push_str(&format!(" ({stars} stars)"));
            }
            if !i.url.is_empty() {
                line.push_str(&format!(" | {}", i.url));
            }
            lines.push(line);
        }
    }
    let avoid: Vec<&str> = recent
        .iter()
        .map(|p| p.name.as_str())
        .filter(|n| !n.is_empty())
        .take(AVOID_NAMES_MAX)
        .collect();
    let avoid = if avoid.is_empty() { "None".to_string() } else { avoid.join(", ") };

    format!(
        "You are a creative startup advisor for daily AI build ideas.\n\n\
         Generate ONE original project idea based on today's digest. \
         The idea must be specific and implementation-oriented, not generic.\n\n\
         Hard constraints:\n\
         1) Category MUST be exactly \"{category}\".\n\
         2) Do not reuse names or concepts from recent ideas.\n\
         3) Avoid generic coding-copilot concepts unless strongly differentiated.\n\
         4) Connect directly to at least two concrete trends in today's digest.\n\n\
         Recent idea names to avoid: {avoid}\n\n\
         Respond ONLY with a JSON array containing exactly 1 object (no markdown, no code fences). \
         The object must have:\n\
         - \"name\": a catchy name for the project idea\n\
         - \"description\": one sentence describing what it does\n\
         - \"why\": one sentence on why this is a good idea right now (connect it to today's trends)\n\
         - \"url\": leave as empty string \"\"\n\
         - \"category\": exactly \"{category}\"\n\n\
         Today's digest items:\n{}\n\nJSON array:",
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SourceKind;
    use crate::llm::{GenFuture, TextGenerator};
    use std::sync::{Arc, Mutex};

    /// Replays answers in order; records prompts.
    struct Scripted {
        answers: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl TextGenerator for Scripted {
        fn generate<'a>(&'a self, req: &'a GenRequest) -> GenFuture<'a, Option<String>> {
            self.prompts.lock().unwrap().push(req.prompt.clone());
            let next = self.answers.lock().unwrap().pop();
            Box::pin(async move { next })
        }
        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn section() -> DigestSection {
        DigestSection {
            title: "LLMs".into(),
            topic_key: "llm".into(),
            items: vec![NewsItem::new("New model", "https://x/m", "Feed", SourceKind::FeedArticle)
                .with_extra("stars", "120")],
        }
    }

    fn idea(name: &str, description: &str) -> ProjectIdea {
        ProjectIdea {
            name: name.into(),
            description: description.into(),
            why: String::new(),
            url: String::new(),
            category: "tool".into(),
        }
    }

    #[test]
    fn parse_strips_fences_and_normalizes() {
        let raw = "```json\n[{\"name\":\"Lens\",\"description\":\"d\",\"category\":\"SaaS\"},{\"name\":\"x\"}]\n```";
        let out = projects_from_json(&parse_projects_json(raw));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Lens");
        assert_eq!(out[0].category, "saas");

        let single = projects_from_json(&parse_projects_json("{\"category\":\"weird\"}"));
        assert_eq!(single[0].name, "Unnamed");
        assert_eq!(single[0].category, "tool");

        assert_eq!(parse_projects_json("not json"), "[]");
        assert_eq!(parse_projects_json(""), "[]");
        assert_eq!(parse_projects_json("42"), "[]");
    }

    #[test]
    fn duplicates_by_name_or_signature() {
        let recent = vec![idea("PaperPilot", "Reads papers for you")];
        let same_name = parse_projects_json("[{\"name\":\"paperpilot \",\"description\":\"other\"}]");
        assert!(is_project_duplicate(&same_name, &recent));
        let near_name = parse_projects_json("[{\"name\":\"PaperPilots\",\"description\":\"other\"}]");
        assert!(is_project_duplicate(&near_name, &recent));
        let fresh = parse_projects_json("[{\"name\":\"GraphForge\",\"description\":\"other\"}]");
        assert!(!is_project_duplicate(&fresh, &recent));
        assert!(!is_project_duplicate("[]", &recent));
    }

    #[test]
    fn category_rotates_daily() {
        let d1 = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let d8 = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        assert_eq!(category_for_day(d1), "tool");
        assert_eq!(category_for_day(d2), "framework");
        assert_eq!(category_for_day(d8), "tool");
    }

    #[tokio::test]
    async fn duplicate_idea_is_regenerated_once() {
        let gen = Scripted::new(&[
            "[{\"name\":\"PaperPilot\",\"description\":\"x\"}]",
            "[{\"name\":\"GraphForge\",\"description\":\"y\",\"category\":\"library\"}]",
        ]);
        let s = Summarizer::new(gen.clone());
        let out = s
            .recommend_projects(&[section()], &[idea("PaperPilot", "Reads papers")], Some("library"))
            .await;
        assert_eq!(projects_from_json(&out)[0].name, "GraphForge");
        let prompts = gen.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Recent idea names to avoid: PaperPilot"));
        assert!(prompts[0].contains("(120 stars)"));
        assert!(prompts[1].contains("too close to recent ideas"));
    }

    #[test]
    fn repository_stars_render_as_plain_numbers() {
        let body = r#"{"items":[
            {"full_name":"acme/agent","html_url":"https://github.com/acme/agent","stargazers_count":321},
            {"full_name":"acme/fresh","html_url":"https://github.com/acme/fresh","stargazers_count":0}]}"#;
        let items = crate::ingest::providers::github::parse_search_response(body, "agents").unwrap();
        let section = DigestSection {
            title: "Tools".into(),
            topic_key: "tools".into(),
            items,
        };
        let prompt = project_prompt(&[section], &[], "tool");
        assert!(prompt.contains("- [Tools] acme/agent (321 stars) | https://github.com/acme/agent"));
        assert!(prompt.contains("- [Tools] acme/fresh | https://github.com/acme/fresh"));
        assert!(!prompt.contains("(\""));
    }

    #[tokio::test]
    async fn failed_generation_yields_empty_text() {
        let s = Summarizer::new(Scripted::new(&[]));
        let item = NewsItem::new("t", "u", "s", SourceKind::Video);
        assert_eq!(s.summarize_item(&item).await, "");
        assert_eq!(s.recommend_projects(&[section()], &[], None).await, "[]");
    }
}
