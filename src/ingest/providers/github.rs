// src/ingest/providers/github.rs
//! Recently created repositories from the GitHub search API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use std::collections::HashSet;

use crate::config::GithubQuery;
use crate::ingest::types::SourceProvider;
use crate::item::{NewsItem, SourceKind};

pub const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: u32 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

/// Items from one search response body.
pub fn parse_search_response(body: &str, topic: &str) -> Result<Vec<NewsItem>> {
    let resp: SearchResponse = serde_json::from_str(body).context("parsing github search json")?;
    let source = format!("GitHub Search ({topic})");
    Ok(resp
        .items
        .into_iter()
        .map(|r| {
            NewsItem::new(r.full_name, r.html_url, source.as_str(), SourceKind::Repository)
                .with_snippet(r.description.unwrap_or_default())
                .with_extra("stars", r.stargazers_count.to_string())
                .with_extra("language", r.language.unwrap_or_default())
                .with_extra("topics", r.topics)
        })
        .collect())
}

pub struct GithubSearchProvider {
    queries: Vec<GithubQuery>,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl GithubSearchProvider {
    pub fn new(queries: Vec<GithubQuery>) -> Self {
        Self {
            queries,
            base_url: GITHUB_API.to_string(),
            token: crate::net::non_empty_env("GITHUB_TOKEN"),
            client: crate::net::http_client(),
        }
    }

    /// Point at another API root (GitHub Enterprise, local test server).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self, q: &GithubQuery) -> String {
        let created = Duration::try_days(q.created_within_days)
            .and_then(|d| Utc::now().checked_sub_signed(d))
            .map(|since| format!("+created:>{}", since.format("%Y-%m-%d")))
            .unwrap_or_default();
        format!(
            "{}/search/repositories?q=topic:{}{}+stars:>={}&sort=stars&order=desc&per_page={}",
            self.base_url, q.topic, created, q.min_stars, PER_PAGE
        )
    }

    async fn search(&self, q: &GithubQuery) -> Result<Vec<NewsItem>> {
        let mut req = self
            .client
            .get(self.search_url(q))
            .header("Accept", "application/vnd.github+json");
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }
        let body = req
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("github search for topic {}", q.topic))?
            .text()
            .await?;
        parse_search_response(&body, &q.topic)
    }
}

#[async_trait]
impl SourceProvider for GithubSearchProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for q in &self.queries {
            match self.search(q).await {
                // same repo may match several topics
                Ok(items) => out.extend(items.into_iter().filter(|i| seen.insert(i.url.clone()))),
                Err(e) => {
                    tracing::warn!(error = ?e, topic = %q.topic, "github search failed");
                    counter!("ingest_provider_errors_total").increment(1);
                }
            }
        }
        tracing::info!(repos = out.len(), "fetched github search");
        Ok(out)
    }

    fn name(&self) -> &str {
        "GitHub Search"
    }
}
