// src/net.rs
//! Shared HTTP client settings and environment lookups for outbound calls.

use std::time::Duration;

pub const USER_AGENT: &str = concat!("ai-news-digest/", env!("CARGO_PKG_VERSION"));

/// Client used for every outbound call (feeds, search, embeddings, generation).
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
}

/// Environment variable, ignoring unset and blank values.
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
