// src/ingest/providers/rss.rs
//! RSS 2.0 and Atom feeds (news sites, subreddits, YouTube channels).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::normalize_text;
use crate::ingest::types::SourceProvider;
use crate::item::{NewsItem, SourceKind};

/// Snippet length kept from feed bodies.
pub const FEED_SNIPPET_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<Text>,
    content: Option<Text>,
    #[serde(rename = "media:group")]
    media_group: Option<MediaGroup>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct MediaGroup {
    #[serde(rename = "media:description")]
    description: Option<String>,
}

/// Feed entry before lookback filtering.
#[derive(Debug)]
struct Entry {
    title: String,
    link: String,
    published: Option<DateTime<Utc>>,
    body: String,
}

fn to_utc(odt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(odt.unix_timestamp(), 0)
}

/// RFC 2822 (RSS) or RFC 3339 (Atom); `None` when neither parses.
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .and_then(to_utc)
}

/// Named HTML entities are not valid XML; replace the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

fn is_atom(xml: &str) -> bool {
    let head: String = xml.chars().take(512).collect();
    head.contains("<feed") && !head.contains("<rss")
}

fn parse_entries(xml: &str) -> Result<Vec<Entry>> {
    let xml = scrub_html_entities_for_xml(xml);
    if is_atom(&xml) {
        let feed: AtomFeed = from_str(&xml).context("parsing atom xml")?;
        Ok(feed
            .entry
            .into_iter()
            .map(|e| {
                let link = e
                    .links
                    .iter()
                    .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                    .or_else(|| e.links.first())
                    .and_then(|l| l.href.clone())
                    .unwrap_or_default();
                let body = e
                    .content
                    .map(|t| t.value)
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| e.summary.map(|t| t.value))
                    .or_else(|| e.media_group.and_then(|m| m.description))
                    .unwrap_or_default();
                Entry {
                    title: e.title.map(|t| t.value).unwrap_or_default(),
                    link,
                    published: e
                        .published
                        .or(e.updated)
                        .as_deref()
                        .and_then(parse_feed_date),
                    body,
                }
            })
            .collect())
    } else {
        let rss: Rss = from_str(&xml).context("parsing rss xml")?;
        Ok(rss
            .channel
            .item
            .into_iter()
            .map(|it| Entry {
                title: it.title.unwrap_or_default(),
                link: it.link.unwrap_or_default().trim().to_string(),
                published: it.pub_date.as_deref().and_then(parse_feed_date),
                body: it
                    .content
                    .filter(|s| !s.trim().is_empty())
                    .or(it.description)
                    .unwrap_or_default(),
            })
            .collect())
    }
}

/// Parse a feed document into items.
///
/// Takes the first `max_items` entries, then drops those published before
/// `cutoff`. Entries without a date are kept.
pub fn parse_feed(
    xml: &str,
    source_name: &str,
    kind: SourceKind,
    max_items: usize,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<NewsItem>> {
    let t0 = std::time::Instant::now();
    let entries = parse_entries(xml)?;

    let mut out = Vec::new();
    for e in entries.into_iter().take(max_items) {
        if let (Some(published), Some(cutoff)) = (e.published, cutoff) {
            if published < cutoff {
                continue;
            }
        }
        if e.link.is_empty() {
            continue;
        }
        let title = normalize_text(&e.title, usize::MAX);
        let title = if title.is_empty() { "No title".to_string() } else { title };
        out.push(
            NewsItem::new(title, e.link, source_name, kind)
                .with_published(e.published)
                .with_snippet(normalize_text(&e.body, FEED_SNIPPET_CHARS)),
        );
    }

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_items_total", "kind" => kind.as_str()).increment(out.len() as u64);
    Ok(out)
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

pub struct FeedProvider {
    name: String,
    kind: SourceKind,
    max_items: usize,
    lookback: Option<Duration>,
    mode: Mode,
}

impl FeedProvider {
    pub fn from_url(name: &str, url: &str, kind: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            max_items: 20,
            lookback: None,
            mode: Mode::Http {
                url: url.to_string(),
                client: crate::net::http_client(),
            },
        }
    }

    pub fn from_fixture(name: &str, xml: &str, kind: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            max_items: 20,
            lookback: None,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = n;
        self
    }

    /// Out-of-range windows disable the lookback filter.
    pub fn lookback_hours(mut self, hours: i64) -> Self {
        self.lookback = Duration::try_hours(hours);
        self
    }
}

#[async_trait]
impl SourceProvider for FeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>> {
        let cutoff = self.lookback.and_then(|d| Utc::now().checked_sub_signed(d));
        let items = match &self.mode {
            Mode::Fixture(s) => parse_feed(s, &self.name, self.kind, self.max_items, cutoff)?,
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("GET {url}"))?
                    .text()
                    .await
                    .context("feed body")?;
                parse_feed(&body, &self.name, self.kind, self.max_items, cutoff)?
            }
        };
        tracing::info!(source = %self.name, items = items.len(), "fetched feed");
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
