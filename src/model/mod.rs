pub mod codec;
pub mod network;
pub mod store;
pub mod trainer;

use crate::engine::FeatureRow;
use crate::error::TrainingError;
use serde::Serialize;

pub use network::{Activation, DenseLayer, DenseNetwork};
pub use store::{Artifact, FsModelStore, InMemoryModelStore, ModelStore};
pub use trainer::MlpTrainer;

/// Held-out predictions and their error. `mse` is `None` for an empty test split.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub predictions: Vec<f64>,
    pub mse: Option<f64>,
}

/// Fits a regression model to feature rows.
pub trait Trainer: Send + Sync {
    fn fit(&self, train_x: &[FeatureRow], train_y: &[f64]) -> Result<DenseNetwork, TrainingError>;

    fn evaluate(&self, model: &DenseNetwork, test_x: &[FeatureRow], test_y: &[f64]) -> Evaluation {
        let predictions = model.predict_batch(test_x);
        let mse = mean_squared_error(&predictions, test_y);
        Evaluation { predictions, mse }
    }
}

pub fn mean_squared_error(predictions: &[f64], actual: &[f64]) -> Option<f64> {
    let n = predictions.len().min(actual.len());
    if n == 0 {
        return None;
    }
    let sum: f64 = predictions
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum();
    Some(sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse() {
        assert_eq!(mean_squared_error(&[1.0, 3.0], &[1.0, 1.0]), Some(2.0));
        assert_eq!(mean_squared_error(&[], &[]), None);
    }
}
