// src/ingest/types.rs
use anyhow::Result;

use crate::item::NewsItem;

/// A source of candidate items. Implementations return items with score 0 and
/// no matched topics.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &str;
}
