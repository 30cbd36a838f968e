// src/notify/mod.rs
//! Digest delivery.

pub mod email;

use anyhow::Result;
use async_trait::async_trait;

use crate::item::Digest;

pub use email::EmailSender;

/// A channel the finished digest is delivered to.
#[async_trait]
pub trait DigestNotifier: Send + Sync {
    async fn deliver(&self, digest: &Digest) -> Result<()>;
    fn name(&self) -> &str;
}
