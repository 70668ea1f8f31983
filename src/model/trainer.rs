//! Mini-batch Adam training of a [`DenseNetwork`] on mean-squared error.

use super::network::DenseNetwork;
use super::Trainer;
use crate::config::TrainerConfig;
use crate::engine::FeatureRow;
use crate::error::TrainingError;
use ndarray::{Array, Array1, Array2, Axis, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-7;

pub struct MlpTrainer {
    config: TrainerConfig,
}

/// Per-parameter gradient (or moment) buffers shaped like a network.
struct LayerBuffers {
    kernel: Vec<Array2<f32>>,
    bias: Vec<Array1<f32>>,
}

impl LayerBuffers {
    fn zeros_like(net: &DenseNetwork) -> Self {
        Self {
            kernel: net.layers.iter().map(|l| Array2::zeros(l.kernel.raw_dim())).collect(),
            bias: net.layers.iter().map(|l| Array1::zeros(l.bias.len())).collect(),
        }
    }

    fn reset(&mut self) {
        self.kernel.iter_mut().for_each(|k| k.fill(0.0));
        self.bias.iter_mut().for_each(|b| b.fill(0.0));
    }
}

/// Bias-corrected step size terms for one Adam step.
struct AdamStep {
    learning_rate: f32,
    c1: f32,
    c2: f32,
}

impl AdamStep {
    fn update<D: Dimension>(
        &self,
        params: &mut Array<f32, D>,
        grad: &Array<f32, D>,
        m: &mut Array<f32, D>,
        v: &mut Array<f32, D>,
    ) {
        Zip::from(params)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                let m_hat = *m / self.c1;
                let v_hat = *v / self.c2;
                *p -= self.learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
            });
    }
}

struct Adam {
    learning_rate: f32,
    step: i32,
    m: LayerBuffers,
    v: LayerBuffers,
}

impl Adam {
    fn new(net: &DenseNetwork, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            step: 0,
            m: LayerBuffers::zeros_like(net),
            v: LayerBuffers::zeros_like(net),
        }
    }

    fn apply(&mut self, net: &mut DenseNetwork, grads: &LayerBuffers) {
        self.step += 1;
        let step = AdamStep {
            learning_rate: self.learning_rate,
            c1: 1.0 - BETA1.powi(self.step),
            c2: 1.0 - BETA2.powi(self.step),
        };

        for (l, layer) in net.layers.iter_mut().enumerate() {
            step.update(
                &mut layer.kernel,
                &grads.kernel[l],
                &mut self.m.kernel[l],
                &mut self.v.kernel[l],
            );
            step.update(
                &mut layer.bias,
                &grads.bias[l],
                &mut self.m.bias[l],
                &mut self.v.bias[l],
            );
        }
    }
}

/// Accumulate the gradient of `scale * (prediction - target)^2` into `grads`.
/// Returns the squared error.
fn backprop(
    net: &DenseNetwork,
    input: &Array1<f32>,
    target: f32,
    scale: f32,
    grads: &mut LayerBuffers,
) -> f32 {
    let trace = net.forward(input.clone());
    let prediction = trace.activations[net.layers.len()][0];
    let err = prediction - target;

    let mut delta = Array1::from_elem(1, 2.0 * err * scale);
    for l in (0..net.layers.len()).rev() {
        let layer = &net.layers[l];
        delta.zip_mut_with(&trace.pre_activations[l], |d, &z| {
            *d *= layer.activation.derivative(z)
        });

        // outer(input, delta) has the kernel's [inputs, units] shape
        let layer_input = trace.activations[l].view().insert_axis(Axis(1));
        grads.kernel[l] += &layer_input.dot(&delta.view().insert_axis(Axis(0)));
        grads.bias[l] += &delta;

        if l > 0 {
            delta = layer.kernel.dot(&delta);
        }
    }

    err * err
}

impl MlpTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    fn validate(&self) -> Result<(), TrainingError> {
        if self.config.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch_size must be positive".into()));
        }
        if !(self.config.learning_rate.is_finite() && self.config.learning_rate > 0.0) {
            return Err(TrainingError::InvalidConfig("learning_rate must be positive".into()));
        }
        if self.config.hidden_units.contains(&0) {
            return Err(TrainingError::InvalidConfig("hidden layers need at least one unit".into()));
        }
        Ok(())
    }
}

impl Trainer for MlpTrainer {
    fn fit(&self, train_x: &[FeatureRow], train_y: &[f64]) -> Result<DenseNetwork, TrainingError> {
        self.validate()?;
        if train_x.len() != train_y.len() {
            return Err(TrainingError::ShapeMismatch {
                features: train_x.len(),
                labels: train_y.len(),
            });
        }
        if train_x.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut net = DenseNetwork::initialise(&self.config.hidden_units, &mut rng);
        let mut adam = Adam::new(&net, self.config.learning_rate as f32);
        let mut grads = LayerBuffers::zeros_like(&net);

        let inputs: Vec<Array1<f32>> = train_x
            .iter()
            .map(|row| row.iter().map(|&v| v as f32).collect())
            .collect();
        let targets: Vec<f32> = train_y.iter().map(|&v| v as f32).collect();
        let mut order: Vec<usize> = (0..inputs.len()).collect();

        for epoch in 0..self.config.epochs {
            if self.config.shuffle {
                order.shuffle(&mut rng);
            }

            let mut loss_sum = 0.0f64;
            for batch in order.chunks(self.config.batch_size) {
                grads.reset();
                let scale = 1.0 / batch.len() as f32;
                for &i in batch {
                    let squared_error = backprop(&net, &inputs[i], targets[i], scale, &mut grads);
                    loss_sum += f64::from(squared_error);
                }
                adam.apply(&mut net, &grads);
            }

            let loss = loss_sum / inputs.len() as f64;
            if !loss.is_finite() {
                return Err(TrainingError::Diverged { epoch });
            }
            tracing::debug!(epoch, loss, "epoch complete");
        }

        Ok(net)
    }
}
