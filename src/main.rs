use anyhow::{Context, Result};
use social_rank::config::Config;
use social_rank::model::{FsModelStore, MlpTrainer};
use social_rank::pipeline::Pipeline;
use social_rank::server;
use social_rank::source::{feed_indexer::FeedIndexer, social_index::SocialIndexGraph};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

/// `--config <path>`, falling back to `config.toml`.
fn config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("social_rank=info,tower_http=info")),
        )
        .init();

    let path = config_path();
    let config = if path.exists() {
        Config::load(&path)?
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    let graph = Arc::new(SocialIndexGraph::new(&config.graph)?);
    let posts = Arc::new(FeedIndexer::new(&config.posts)?);
    let trainer = Arc::new(MlpTrainer::new(config.trainer.clone()));
    let store = Arc::new(FsModelStore::new(&config.store.models_dir));
    let pipeline = Arc::new(Pipeline::new(
        graph,
        posts,
        trainer,
        store,
        config.pipeline.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(
        bind = %config.server.bind,
        models_dir = %config.store.models_dir,
        max_depth = config.pipeline.max_depth,
        "social-rank listening"
    );

    axum::serve(listener, server::build_router(pipeline))
        .await
        .context("server error")?;
    Ok(())
}
