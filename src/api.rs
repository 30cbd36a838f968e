// src/api.rs
//! Read-only dashboard API over the JSON export.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::export::{ExportStats, IndexEntry, JsonDigestStore, SearchHit};

pub const SEARCH_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    store: Arc<JsonDigestStore>,
}

pub fn router(store: JsonDigestStore) -> Router {
    let state = AppState {
        store: Arc::new(store),
    };

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/digests", get(list_digests))
        .route("/api/digests/{id}", get(get_digest))
        .route("/api/search", get(search))
        .route("/api/stats", get(stats))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn list_digests(State(state): State<AppState>) -> Json<Vec<IndexEntry>> {
    Json(state.store.list())
}

async fn get_digest(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Ok(Some(d)) => Json(d).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "digest not found", "id": id })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(id = %id, error = ?e, "digest read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "digest unreadable" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct SearchResp {
    query: String,
    results: Vec<SearchHit>,
}

async fn search(State(state): State<AppState>, Query(p): Query<SearchParams>) -> Json<SearchResp> {
    let results = state.store.search(&p.q, SEARCH_LIMIT);
    Json(SearchResp { query: p.q, results })
}

async fn stats(State(state): State<AppState>) -> Json<ExportStats> {
    Json(state.store.stats())
}
