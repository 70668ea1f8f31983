use thiserror::Error;

/// Failure to read an account's follow list from the graph index.
#[derive(Debug, Error)]
pub enum GraphFetchError {
    #[error("network error fetching followings of {account}: {message}")]
    Network { account: String, message: String },

    #[error("graph index returned {status} for {account}: {body}")]
    Status {
        account: String,
        status: u16,
        body: String,
    },

    #[error("malformed graph response for {account}: {message}")]
    Malformed { account: String, message: String },

    #[error("graph fetch for {account} timed out after {after_ms}ms")]
    Timeout { account: String, after_ms: u64 },
}

/// Failure to read posts from the feed indexer.
#[derive(Debug, Error)]
pub enum PostFetchError {
    #[error("network error fetching posts for {scope}: {message}")]
    Network { scope: String, message: String },

    #[error("feed indexer returned {status} for {scope}: {body}")]
    Status {
        scope: String,
        status: u16,
        body: String,
    },

    #[error("malformed feed response for {scope}: {message}")]
    Malformed { scope: String, message: String },

    #[error("post fetch for {scope} timed out after {after_ms}ms")]
    Timeout { scope: String, after_ms: u64 },
}

/// A stored model exists but cannot be used. Callers treat this as "must train".
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact for {account} is corrupt: {reason}")]
    Corrupt { account: String, reason: String },

    #[error("failed to read model artifact for {account}: {source}")]
    Io {
        account: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account id {0:?} cannot be used as a storage key")]
    InvalidAccount(String),

    #[error("model store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode model: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training set is empty")]
    EmptyDataset,

    #[error("feature rows ({features}) and labels ({labels}) differ in length")]
    ShapeMismatch { features: usize, labels: usize },

    #[error("training diverged at epoch {epoch} (loss is not finite)")]
    Diverged { epoch: usize },

    #[error("trainer configuration invalid: {0}")]
    InvalidConfig(String),
}

/// Everything a training or ranking request can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] GraphFetchError),

    #[error(transparent)]
    Posts(#[from] PostFetchError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error("no trained model for {0}; train it first")]
    NoModel(String),

    #[error("background task failed: {0}")]
    Task(String),
}
