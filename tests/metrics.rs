// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use ai_news_digest::analyze::rank;
use ai_news_digest::config::{Topic, Topics};
use ai_news_digest::export::JsonDigestStore;
use ai_news_digest::ingest::fetch_all;
use ai_news_digest::ingest::providers::rss::FeedProvider;
use ai_news_digest::ingest::types::SourceProvider;
use ai_news_digest::item::SourceKind;
use ai_news_digest::metrics::Metrics;
use ai_news_digest::state::SeenState;

const NEWS_XML: &str = include_str!("fixtures/ai_news_rss.xml");

// One recorder per process: keep a single test in this file.
#[tokio::test]
async fn metrics_endpoint_contains_pipeline_series() {
    let metrics = Metrics::init().expect("install recorder");

    let providers: Vec<Arc<dyn SourceProvider>> = vec![Arc::new(FeedProvider::from_fixture(
        "AI Newsroom",
        NEWS_XML,
        SourceKind::FeedArticle,
    ))];
    let items = fetch_all(&providers).await;
    let topics = Topics::new(vec![Topic::new("llm", "LLMs", 1.0, &["LLM"])]).unwrap();
    let ranked = rank(items, &SeenState::new(), &topics, None, 10).await;
    assert_eq!(ranked.total_items(), 1);

    let dir = tempfile::tempdir().unwrap();
    let app = ai_news_digest::router(JsonDigestStore::new(dir.path())).merge(metrics.router());

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "ingest_items_total",
        "ingest_fetched_total",
        "ingest_parse_ms",
        "ingest_last_fetch_ts",
        "ranking_keyword_matched_total",
        "ranking_selected_total",
    ] {
        assert!(text.contains(needle), "missing metric {needle} in:\n{text}");
    }
    assert!(text.contains(r#"ingest_items_total{kind="news"} 3"#));

    // the log summary of a one-shot run carries the same samples
    let summary = metrics.summary();
    assert!(summary.iter().any(|l| l == r#"ingest_items_total{kind="news"} 3"#));
    assert!(summary.iter().all(|l| !l.starts_with('#')));
}
