//! Dense feed-forward regression network.

use crate::engine::{FeatureRow, FEATURE_COUNT};
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    pub fn apply(self, z: f32) -> f32 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Linear => z,
        }
    }

    pub fn derivative(self, z: f32) -> f32 {
        match self {
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

/// Fully connected layer. `kernel` is `[inputs, units]`, so a forward pass is
/// `x . kernel + bias`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    pub activation: Activation,
    pub kernel: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    /// Glorot-uniform kernel, zero bias.
    pub fn glorot<R: Rng>(
        inputs: usize,
        units: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (inputs + units) as f32).sqrt();
        Self {
            activation,
            kernel: Array2::from_shape_fn((inputs, units), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(units),
        }
    }

    pub fn inputs(&self) -> usize {
        self.kernel.nrows()
    }

    pub fn units(&self) -> usize {
        self.kernel.ncols()
    }

    pub fn pre_activation(&self, input: ArrayView1<f32>) -> Array1<f32> {
        input.dot(&self.kernel) + &self.bias
    }

    pub fn parameter_count(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }
}

/// Activations and pre-activations of one forward pass, kept for backprop.
/// `activations[0]` is the input; `activations[l + 1]` is layer `l`'s output.
pub(crate) struct ForwardTrace {
    pub activations: Vec<Array1<f32>>,
    pub pre_activations: Vec<Array1<f32>>,
}

/// A network over [`FEATURE_COUNT`] inputs with a single output unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseNetwork {
    pub(crate) layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Validate that layer shapes chain from the feature width to one output unit.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self, String> {
        let (Some(first), Some(last)) = (layers.first(), layers.last()) else {
            return Err("network has no layers".to_string());
        };
        if first.inputs() != FEATURE_COUNT {
            return Err(format!(
                "network takes {} inputs, expected {} features",
                first.inputs(),
                FEATURE_COUNT
            ));
        }
        if last.units() != 1 {
            return Err(format!("output layer has {} units, expected 1", last.units()));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.units() == 0 {
                return Err(format!("layer {} has no units", i));
            }
            if layer.bias.len() != layer.units() {
                return Err(format!("layer {} bias does not match its units", i));
            }
            if i > 0 && layers[i - 1].units() != layer.inputs() {
                return Err(format!(
                    "layer {} expects {} inputs but previous layer has {} units",
                    i,
                    layer.inputs(),
                    layers[i - 1].units()
                ));
            }
        }
        Ok(Self { layers })
    }

    /// Hidden relu layers of the given widths followed by one linear output unit.
    pub fn initialise<R: Rng>(hidden_units: &[usize], rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(hidden_units.len() + 1);
        let mut inputs = FEATURE_COUNT;
        for &units in hidden_units {
            layers.push(DenseLayer::glorot(inputs, units, Activation::Relu, rng));
            inputs = units;
        }
        layers.push(DenseLayer::glorot(inputs, 1, Activation::Linear, rng));
        Self { layers }
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::inputs)
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    pub(crate) fn forward(&self, input: Array1<f32>) -> ForwardTrace {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        activations.push(input);
        for layer in &self.layers {
            let z = layer.pre_activation(activations[activations.len() - 1].view());
            activations.push(z.mapv(|v| layer.activation.apply(v)));
            pre_activations.push(z);
        }
        ForwardTrace {
            activations,
            pre_activations,
        }
    }

    pub fn predict(&self, features: &FeatureRow) -> f64 {
        let input: Array1<f32> = features.iter().map(|&v| v as f32).collect();
        let trace = self.forward(input);
        trace
            .activations
            .last()
            .and_then(|out| out.get(0))
            .map_or(0.0, |&v| f64::from(v))
    }

    pub fn predict_batch(&self, rows: &[FeatureRow]) -> Vec<f64> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}
