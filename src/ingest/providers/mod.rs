// src/ingest/providers/mod.rs
pub mod github;
pub mod rss;
