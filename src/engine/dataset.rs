use super::features::{extract_features, FEATURE_COUNT};
use crate::error::TrainingError;
use crate::source::types::{AccountId, Post};

pub type FeatureRow = [f64; FEATURE_COUNT];

/// Feature rows and labels in collection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    features: Vec<FeatureRow>,
    labels: Vec<f64>,
}

/// Ordered prefix/suffix cut of a [`Dataset`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitDataset {
    pub train_x: Vec<FeatureRow>,
    pub train_y: Vec<f64>,
    pub test_x: Vec<FeatureRow>,
    pub test_y: Vec<f64>,
}

impl Dataset {
    pub fn new(features: Vec<FeatureRow>, labels: Vec<f64>) -> Result<Self, TrainingError> {
        if features.len() != labels.len() {
            return Err(TrainingError::ShapeMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { features, labels })
    }

    /// One row per post, scored against `target` and its `followings`.
    pub fn from_posts(posts: &[Post], followings: &[AccountId], target: &str) -> Self {
        let mut dataset = Self::default();
        for post in posts {
            let fv = extract_features(post, followings, target);
            dataset.features.push(fv.to_array());
            dataset.labels.push(fv.post_score());
        }
        dataset
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self) -> &[FeatureRow] {
        &self.features
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// First `floor(train_fraction * len)` rows train, the rest test. No shuffling.
    pub fn split(self, train_fraction: f64) -> SplitDataset {
        let at = split_index(self.len(), train_fraction);
        let mut train_x = self.features;
        let mut train_y = self.labels;
        let test_x = train_x.split_off(at);
        let test_y = train_y.split_off(at);
        SplitDataset {
            train_x,
            train_y,
            test_x,
            test_y,
        }
    }
}

/// `floor(fraction * count)`, with the fraction clamped to `[0, 1]`.
pub fn split_index(count: usize, train_fraction: f64) -> usize {
    let fraction = if train_fraction.is_nan() { 0.0 } else { train_fraction.clamp(0.0, 1.0) };
    ((fraction * count as f64).floor() as usize).min(count)
}

pub fn build_dataset(
    features: Vec<FeatureRow>,
    labels: Vec<f64>,
    train_fraction: f64,
) -> Result<SplitDataset, TrainingError> {
    Ok(Dataset::new(features, labels)?.split(train_fraction))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> (Vec<FeatureRow>, Vec<f64>) {
        let features = (0..n).map(|i| [i as f64, 0.0, 0.0, 0.0]).collect();
        let labels = (0..n).map(|i| i as f64 * 10.0).collect();
        (features, labels)
    }

    #[test]
    fn test_eighty_twenty_split_preserves_order() {
        let (x, y) = rows(10);
        let split = build_dataset(x, y, 0.8).unwrap();
        assert_eq!(split.train_x.len(), 8);
        assert_eq!(split.test_x.len(), 2);
        assert_eq!(split.train_y, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]);
        assert_eq!(split.test_y, vec![80.0, 90.0]);
        assert_eq!(split.test_x[0][0], 8.0);
    }

    #[test]
    fn test_split_floors() {
        assert_eq!(split_index(7, 0.8), 5);
        assert_eq!(split_index(1, 0.8), 0);
        assert_eq!(split_index(3, 1.0), 3);
        assert_eq!(split_index(3, 2.0), 3);
        assert_eq!(split_index(3, -1.0), 0);
    }

    #[test]
    fn test_empty_dataset_splits_cleanly() {
        let split = build_dataset(Vec::new(), Vec::new(), 0.8).unwrap();
        assert!(split.train_x.is_empty());
        assert!(split.test_x.is_empty());
    }

    #[test]
    fn test_full_fraction_leaves_empty_test() {
        let (x, y) = rows(4);
        let split = build_dataset(x, y, 1.0).unwrap();
        assert_eq!(split.train_x.len(), 4);
        assert!(split.test_y.is_empty());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (x, _) = rows(3);
        let err = build_dataset(x, vec![1.0], 0.8).unwrap_err();
        assert!(matches!(err, TrainingError::ShapeMismatch { features: 3, labels: 1 }));
    }

    #[test]
    fn test_from_posts_labels_each_post() {
        let posts = vec![
            Post::new(1, "a").liked_by(&["f", "t"]),
            Post::new(2, "a").commented_by(&["f"]),
        ];
        let followings = vec!["f".to_string()];
        let dataset = Dataset::from_posts(&posts, &followings, "t");
        assert_eq!(dataset.len(), 2);
        // post 1: engagement 1, avg 1, like 3 -> (1 + 1) * 3
        assert_eq!(dataset.features()[0], [1.0, 1.0, 3.0, 0.0]);
        assert_eq!(dataset.labels()[0], 6.0);
        // post 2: engagement 1, avg 1, no target signals -> 0
        assert_eq!(dataset.labels()[1], 0.0);
    }
}
