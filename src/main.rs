//! AI News Digest CLI.
//!
//! ```bash
//! ai-news-digest run               # fetch, rank, summarize, email, export
//! ai-news-digest run --dry-run     # fetch + rank only, print the sections
//! ai-news-digest run --force       # ignore the last-run interval
//! ai-news-digest serve --addr 0.0.0.0:8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use ai_news_digest::{
    config::AppConfig, export::JsonDigestStore, init_tracing, metrics::Metrics, router, DigestRunner,
    RunOptions, RunOutcome,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "ai-news-digest", version, about = "Topic-ranked AI news digest")]
struct Cli {
    /// Configuration file (TOML). Falls back to `$DIGEST_CONFIG_PATH`, then
    /// `config/digest.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the digest pipeline once.
    Run {
        /// Fetch and rank only; no AI calls, email, export or state writes.
        #[arg(long)]
        dry_run: bool,
        /// Run even if the last run was recent.
        #[arg(long)]
        force: bool,
    },
    /// Serve the dashboard API and `/metrics`.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_default()?,
    };

    match cli.command {
        Commands::Run { dry_run, force } => {
            let metrics = Metrics::init()?;
            let runner = DigestRunner::from_config(config)?;
            let report = runner.run_once(RunOptions { dry_run, force }).await?;
            metrics.log_summary();
            match report.outcome {
                RunOutcome::DryRun(text) => print!("{text}"),
                RunOutcome::Delivered { digest_id, items } => {
                    info!(items, digest_id = ?digest_id, "digest run complete");
                }
                RunOutcome::Skipped | RunOutcome::Empty => {}
            }
        }
        Commands::Serve { addr } => {
            let metrics = Metrics::init()?;
            let app = router(JsonDigestStore::new(config.paths.export_dir.clone())).merge(metrics.router());
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!(%addr, "dashboard API listening");
            axum::serve(listener, app).await.context("server error")?;
        }
    }
    Ok(())
}
