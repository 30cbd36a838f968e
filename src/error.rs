// src/error.rs
//! Typed failures from external backends (embeddings, text generation, scraping).

use crate::retry::Transient;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// HTTP 429 or a RESOURCE_EXHAUSTED payload.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("backend disabled: {0}")]
    Disabled(&'static str),
}

impl Transient for BackendError {
    fn is_transient(&self) -> bool {
        match self {
            BackendError::RateLimited(_) => true,
            BackendError::Status { status, .. } => *status >= 500,
            BackendError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BackendError::Decode(_) | BackendError::Disabled(_) => false,
        }
    }
}

impl BackendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited(_))
    }

    /// Classify a non-success HTTP response body.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            BackendError::RateLimited(truncate_body(&body))
        } else {
            BackendError::Status {
                status,
                body: truncate_body(&body),
            }
        }
    }
}

/// Turn a response into its body, or a classified error for non-2xx.
pub async fn read_success(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::from_status(status.as_u16(), body))
}

fn truncate_body(body: &str) -> String {
    crate::item::truncate_chars(body.trim(), 300)
}
