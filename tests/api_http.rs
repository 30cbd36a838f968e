// tests/api_http.rs
//
// HTTP-level tests for the dashboard Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /api/digests, /api/digests/{id}
// - GET /api/search?q=
// - GET /api/stats

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use ai_news_digest::api;
use ai_news_digest::export::JsonDigestStore;
use ai_news_digest::item::{Digest, DigestSection, NewsItem, SourceKind};

const BODY_LIMIT: usize = 1024 * 1024;

fn digest(day: u32, titles: &[&str]) -> Digest {
    let items: Vec<NewsItem> = titles
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let mut it = NewsItem::new(*t, format!("https://x/{day}/{i}"), "Hacker News", SourceKind::FeedArticle);
            it.score = 4.26;
            it.matched_topics = vec!["llm".into()];
            it.summary = format!("Summary of {t}.");
            it
        })
        .collect();
    Digest {
        generated_at: Utc.with_ymd_and_hms(2026, 10, day, 7, 0, 0).unwrap(),
        intro_summary: "Models got faster. Agents got cheaper.".into(),
        total_items: items.len(),
        sections: vec![DigestSection {
            title: "Large Language Models".into(),
            topic_key: "llm".into(),
            items,
        }],
        sources_checked: 5,
        project_recommendations: "[]".into(),
    }
}

fn test_router(dir: &std::path::Path) -> Router {
    let store = JsonDigestStore::new(dir);
    store.save(&digest(17, &["Open weights model tops leaderboard"])).unwrap();
    store.save(&digest(18, &["New agent SDK", "Model distillation guide"])).unwrap();
    api::router(store)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "OK");
}

#[tokio::test]
async fn digests_are_listed_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let (status, v) = get_json(test_router(dir.path()), "/api/digests").await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<&str> = v.as_array().unwrap().iter().map(|e| e["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["20261018_070000", "20261017_070000"]);
    assert_eq!(v[0]["intro_snippet"], "Models got faster.");
    assert_eq!(v[0]["total_items"], 2);
}

#[tokio::test]
async fn single_digest_and_missing_digest() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, v) = get_json(app.clone(), "/api/digests/20261018_070000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["sections"][0]["items"][1]["title"], "Model distillation guide");
    assert_eq!(v["sections"][0]["items"][0]["score"], 4.3);

    let (status, _) = get_json(app.clone(), "/api/digests/20200101_000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(app, "/api/digests/..%2Findex").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_matches_title_and_summary_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let (status, v) = get_json(app.clone(), "/api/search?q=MODEL").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["query"], "MODEL");
    let results = v["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["digest_id"], "20261018_070000");
    assert_eq!(results[1]["item"]["title"], "Open weights model tops leaderboard");

    let (_, v) = get_json(app.clone(), "/api/search?q=summary%20of%20new%20agent").await;
    assert_eq!(v["results"].as_array().unwrap().len(), 1);

    let (_, v) = get_json(app, "/api/search").await;
    assert!(v["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn stats_count_items_by_topic_and_source() {
    let dir = tempfile::tempdir().unwrap();
    let (status, v) = get_json(test_router(dir.path()), "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["digests"], 2);
    assert_eq!(v["items"], 3);
    assert_eq!(v["by_topic"]["Large Language Models"], 3);
    assert_eq!(v["by_source"]["Hacker News"], 3);
    assert_eq!(v["by_source_type"]["news"], 3);
}
