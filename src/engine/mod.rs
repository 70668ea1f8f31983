pub mod collector;
pub mod crawler;
pub mod dataset;
pub mod features;

pub use collector::{PageWindow, PostCollector};
pub use crawler::{Crawler, Neighborhood};
pub use dataset::{build_dataset, Dataset, FeatureRow, SplitDataset};
pub use features::{extract_features, FeatureVector, FEATURE_COUNT};
