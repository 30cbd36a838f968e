// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod item;
pub mod llm;
pub mod metrics;
pub mod net;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod state;

pub use crate::api::router;
pub use crate::pipeline::{DigestRunner, RunOptions, RunOutcome};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "DIGEST_LOG_FORMAT";

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `DIGEST_LOG_FORMAT=json` switches to JSON lines. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_digest=info,warn"));

    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
