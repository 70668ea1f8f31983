use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub posts: PostsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_index_url")]
    pub index_url: String,
    #[serde(default = "default_graph_timeout")]
    pub request_timeout_ms: u64,
}

fn default_index_url() -> String {
    "https://api.near.social/index".to_string()
}
fn default_graph_timeout() -> u64 { 5000 }

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            request_timeout_ms: default_graph_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostsConfig {
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_hasura_role")]
    pub hasura_role: String,
    #[serde(default = "default_posts_timeout")]
    pub request_timeout_ms: u64,
}

fn default_graphql_url() -> String {
    "https://queryapi-hasura-graphql-24ktefolwq-ew.a.run.app/v1/graphql".to_string()
}
fn default_hasura_role() -> String {
    "dataplatform_near".to_string()
}
fn default_posts_timeout() -> u64 { 10_000 }

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_graphql_url(),
            hasura_role: default_hasura_role(),
            request_timeout_ms: default_posts_timeout(),
        }
    }
}

/// Crawl and dataset policy for a single training request.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub page_offset: u32,
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
    /// Upper bound on in-flight follow-graph fetches per crawl level.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: usize,
    /// Log and drop a follower's post branch on fetch failure instead of failing the request.
    #[serde(default = "default_skip_failed_branches")]
    pub skip_failed_branches: bool,
    /// How many recent feed posts the ranking endpoint scores.
    #[serde(default = "default_rank_limit")]
    pub rank_limit: u32,
}

fn default_max_depth() -> u32 { 2 }
fn default_page_size() -> u32 { 10 }
fn default_train_fraction() -> f64 { 0.8 }
fn default_crawl_concurrency() -> usize { 8 }
fn default_skip_failed_branches() -> bool { true }
fn default_rank_limit() -> u32 { 300 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            page_size: default_page_size(),
            page_offset: 0,
            train_fraction: default_train_fraction(),
            crawl_concurrency: default_crawl_concurrency(),
            skip_failed_branches: default_skip_failed_branches(),
            rank_limit: default_rank_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainerConfig {
    #[serde(default = "default_hidden_units")]
    pub hidden_units: Vec<usize>,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

fn default_hidden_units() -> Vec<usize> { vec![64, 32] }
fn default_epochs() -> usize { 30 }
fn default_batch_size() -> usize { 32 }
fn default_learning_rate() -> f64 { 0.001 }
fn default_seed() -> u64 { 42 }
fn default_shuffle() -> bool { true }

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            hidden_units: default_hidden_units(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            seed: default_seed(),
            shuffle: default_shuffle(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
}

fn default_models_dir() -> String {
    "models".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { models_dir: default_models_dir() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .with_context(|| "Failed to parse config TOML")?;
        if !(0.0..=1.0).contains(&config.pipeline.train_fraction) {
            anyhow::bail!(
                "pipeline.train_fraction must be within [0, 1], got {}",
                config.pipeline.train_fraction
            );
        }
        Ok(config)
    }
}
