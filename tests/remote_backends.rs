// tests/remote_backends.rs
//
// HTTP providers against a local axum server standing in for the
// Firecrawl scrape API and the GitHub search API.

use std::collections::HashMap;
use std::net::SocketAddr;

use ai_news_digest::config::GithubQuery;
use ai_news_digest::ingest::providers::github::GithubSearchProvider;
use ai_news_digest::ingest::types::SourceProvider;
use ai_news_digest::ingest::Enricher;
use ai_news_digest::item::{NewsItem, SourceKind};
use axum::{
    extract::Query,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn scrape(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let url = body["url"].as_str().unwrap_or_default();
    if url.contains("fail") {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })));
    }
    let md = format!("# Full article for {url}\n\n{}", "Lorem ipsum dolor sit amet. ".repeat(40));
    (StatusCode::OK, Json(json!({ "success": true, "data": { "markdown": md } })))
}

#[tokio::test]
async fn enrichment_replaces_short_snippets_only() {
    let addr = spawn(Router::new().route("/v1/scrape", post(scrape))).await;
    let enricher = Enricher::new("test-key".into()).with_endpoint(&format!("http://{addr}/v1/scrape"));

    let mut items = vec![
        NewsItem::new("a", "https://n/ok", "N", SourceKind::FeedArticle).with_snippet("teaser"),
        NewsItem::new("b", "https://n/fail", "N", SourceKind::ForumPost).with_snippet("teaser"),
        NewsItem::new("c", "https://yt/v", "Y", SourceKind::Video).with_snippet("teaser"),
    ];
    let n = enricher.enrich(items.iter_mut()).await;

    assert_eq!(n, 1);
    assert!(items[0].snippet.starts_with("# Full article for https://n/ok"));
    assert!(items[0].snippet.chars().count() > 500);
    assert_eq!(items[1].snippet, "teaser");
    assert_eq!(items[2].snippet, "teaser");
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let q = params.get("q").cloned().unwrap_or_default();
    let repo = |name: &str, stars: u64| {
        json!({
            "full_name": name,
            "html_url": format!("https://github.com/{name}"),
            "description": format!("{name} repo"),
            "stargazers_count": stars,
            "language": "Rust",
            "topics": ["llm"]
        })
    };
    let items = if q.contains("topic:llm") {
        vec![repo("acme/infer", 900), repo("acme/agentkit", 400)]
    } else if q.contains("topic:agents") {
        vec![repo("acme/agentkit", 400), repo("bee/planner", 120)]
    } else {
        vec![]
    };
    Json(json!({ "total_count": items.len(), "items": items }))
}

#[tokio::test]
async fn github_search_merges_queries_without_duplicates() {
    let addr = spawn(Router::new().route("/search/repositories", get(search))).await;
    let query = |topic: &str| GithubQuery {
        topic: topic.into(),
        min_stars: 50,
        created_within_days: 7,
    };
    let provider = GithubSearchProvider::new(vec![query("llm"), query("agents")]).with_base_url(&format!("http://{addr}"));

    let items = provider.fetch_latest().await.unwrap();
    let names: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(names, vec!["acme/infer", "acme/agentkit", "bee/planner"]);
    assert_eq!(items[0].extra["stars"], "900");
    assert_eq!(items[2].source_name, "GitHub Search (agents)");
    assert!(items.iter().all(|i| i.source_kind == SourceKind::Repository));
}
