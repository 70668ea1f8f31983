use crate::config::PipelineConfig;
use crate::engine::{extract_features, Crawler, Dataset, FeatureVector, PageWindow, PostCollector};
use crate::error::PipelineError;
use crate::model::store::validate_account_key;
use crate::model::{DenseNetwork, ModelStore, Trainer};
use crate::source::types::{AccountId, Post};
use crate::source::{GraphSource, PostSource};
use serde::Serialize;
use std::sync::Arc;

/// Result of training one account's model.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub account: AccountId,
    #[serde(skip)]
    pub model: DenseNetwork,
    pub neighborhood_size: usize,
    pub posts_collected: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub test_error: Option<f64>,
    pub test_predictions: Vec<f64>,
}

/// Where a model handed out by [`Pipeline::load_or_train`] came from.
#[derive(Debug, Clone)]
pub enum ModelOrigin {
    Stored,
    Trained(TrainingOutcome),
}

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model: DenseNetwork,
    pub origin: ModelOrigin,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedPost {
    pub post: Post,
    pub features: FeatureVector,
    pub predicted_score: f64,
}

pub struct Pipeline {
    graph: Arc<dyn GraphSource>,
    posts: Arc<dyn PostSource>,
    trainer: Arc<dyn Trainer>,
    store: Arc<dyn ModelStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        graph: Arc<dyn GraphSource>,
        posts: Arc<dyn PostSource>,
        trainer: Arc<dyn Trainer>,
        store: Arc<dyn ModelStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            graph,
            posts,
            trainer,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ModelStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Crawl, collect, featurise, split and fit a model for `account`.
    ///
    /// The account's own follow list is the feature context, so failing to
    /// fetch it fails the request.
    pub async fn train_for_account(&self, account: &str) -> Result<TrainingOutcome, PipelineError> {
        let followings = self.graph.fetch_followings(account).await?;

        let crawler = Crawler::new(self.graph.clone(), self.config.crawl_concurrency);
        let collector = PostCollector::new(
            self.graph.clone(),
            self.posts.clone(),
            self.config.skip_failed_branches,
        );
        let window = PageWindow {
            limit: self.config.page_size,
            offset: self.config.page_offset,
        };

        let (neighborhood, posts) = tokio::join!(
            crawler.crawl_followers(account, self.config.max_depth),
            collector.collect_posts(account, self.config.max_depth, window),
        );
        let posts = posts?;

        let split =
            Dataset::from_posts(&posts, &followings, account).split(self.config.train_fraction);
        let (train_size, test_size) = (split.train_y.len(), split.test_y.len());
        tracing::info!(
            account,
            followings = followings.len(),
            neighborhood = neighborhood.len(),
            posts = posts.len(),
            train = train_size,
            test = test_size,
            "dataset built"
        );

        let trainer = self.trainer.clone();
        let (model, evaluation) = tokio::task::spawn_blocking(move || {
            let model = trainer.fit(&split.train_x, &split.train_y)?;
            let evaluation = trainer.evaluate(&model, &split.test_x, &split.test_y);
            Ok::<_, crate::error::TrainingError>((model, evaluation))
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

        tracing::info!(account, mse = ?evaluation.mse, "model trained");

        Ok(TrainingOutcome {
            account: account.to_string(),
            model,
            neighborhood_size: neighborhood.len(),
            posts_collected: posts.len(),
            train_size,
            test_size,
            test_error: evaluation.mse,
            test_predictions: evaluation.predictions,
        })
    }

    /// Reuse the stored model for `account`, or train and store a new one.
    /// An unreadable stored model is logged and replaced. Ids that cannot be
    /// stored are rejected before any fetching.
    pub async fn load_or_train(&self, account: &str) -> Result<LoadedModel, PipelineError> {
        validate_account_key(account)?;
        match self.store.load(account).await {
            Ok(Some(model)) => {
                tracing::info!(account, "reusing stored model");
                return Ok(LoadedModel {
                    model,
                    origin: ModelOrigin::Stored,
                });
            }
            Ok(None) => tracing::info!(account, "no stored model, training"),
            Err(e) => tracing::warn!(account, error = %e, "stored model unusable, retraining"),
        }

        let outcome = self.train_for_account(account).await?;
        self.store.save(account, &outcome.model).await?;
        Ok(LoadedModel {
            model: outcome.model.clone(),
            origin: ModelOrigin::Trained(outcome),
        })
    }

    /// Score the most recent feed posts for `account` with its stored model,
    /// highest predicted score first.
    pub async fn rank_recent(&self, account: &str) -> Result<Vec<RankedPost>, PipelineError> {
        let model = self
            .store
            .load(account)
            .await?
            .ok_or_else(|| PipelineError::NoModel(account.to_string()))?;
        let followings = self.graph.fetch_followings(account).await?;
        let posts = self.posts.fetch_recent(self.config.rank_limit, 0).await?;

        let mut ranked: Vec<RankedPost> = posts
            .into_iter()
            .map(|post| {
                let features = extract_features(&post, &followings, account);
                let predicted_score = model.predict(&features.to_array());
                RankedPost {
                    post,
                    features,
                    predicted_score,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.predicted_score.total_cmp(&a.predicted_score));

        tracing::info!(account, posts = ranked.len(), "ranked recent posts");
        Ok(ranked)
    }
}
