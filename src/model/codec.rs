//! On-disk model format: `model.json` (topology and weight manifest) plus
//! `weights.bin` (little-endian f32 values, concatenated in manifest order).

use super::network::{Activation, DenseLayer, DenseNetwork};
use crate::engine::FEATURE_COUNT;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

pub const FORMAT: &str = "social-rank/dense-v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelTopology {
    pub format: String,
    pub input_dim: usize,
    pub layers: Vec<LayerSpec>,
    pub weights_manifest: Vec<WeightSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl WeightSpec {
    /// Number of values the entry covers; `None` if the shape overflows.
    fn len(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

/// Both artifact files of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    pub model_json: String,
    pub weights: Vec<u8>,
}

pub fn encode(net: &DenseNetwork) -> Result<ModelArtifacts, serde_json::Error> {
    let mut manifest = Vec::with_capacity(net.layers().len() * 2);
    let mut weights = Vec::with_capacity(net.parameter_count() * 4);

    for (i, layer) in net.layers().iter().enumerate() {
        manifest.push(WeightSpec {
            name: format!("dense_{}/kernel", i),
            shape: vec![layer.inputs(), layer.units()],
        });
        manifest.push(WeightSpec {
            name: format!("dense_{}/bias", i),
            shape: vec![layer.units()],
        });
        for v in layer.kernel.iter().chain(&layer.bias) {
            weights.extend_from_slice(&v.to_le_bytes());
        }
    }

    let topology = ModelTopology {
        format: FORMAT.to_string(),
        input_dim: net.input_dim(),
        layers: net
            .layers()
            .iter()
            .map(|l| LayerSpec {
                units: l.units(),
                activation: l.activation,
            })
            .collect(),
        weights_manifest: manifest,
    };

    Ok(ModelArtifacts {
        model_json: serde_json::to_string_pretty(&topology)?,
        weights,
    })
}

pub fn decode(model_json: &str, weights: &[u8]) -> Result<DenseNetwork, String> {
    let topology: ModelTopology =
        serde_json::from_str(model_json).map_err(|e| format!("invalid model.json: {}", e))?;

    if topology.format != FORMAT {
        return Err(format!("unsupported model format {:?}", topology.format));
    }
    if topology.input_dim != FEATURE_COUNT {
        return Err(format!(
            "model takes {} inputs, expected {} features",
            topology.input_dim, FEATURE_COUNT
        ));
    }
    if topology.weights_manifest.len() != topology.layers.len() * 2 {
        return Err("weight manifest does not match layer count".to_string());
    }
    if weights.len() % 4 != 0 {
        return Err(format!("weights.bin length {} is not a multiple of 4", weights.len()));
    }

    let values: Vec<f32> = weights
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let expected = topology
        .weights_manifest
        .iter()
        .try_fold(0usize, |acc, spec| spec.len().and_then(|n| acc.checked_add(n)))
        .ok_or_else(|| "manifest shape overflows".to_string())?;
    if values.len() != expected {
        return Err(format!(
            "weights.bin holds {} values, manifest expects {}",
            values.len(),
            expected
        ));
    }

    let mut offset = 0;
    let mut inputs = topology.input_dim;
    let mut layers = Vec::with_capacity(topology.layers.len());

    for (spec, pair) in topology.layers.iter().zip(topology.weights_manifest.chunks(2)) {
        let (kernel_spec, bias_spec) = (&pair[0], &pair[1]);
        if kernel_spec.shape != [inputs, spec.units] || bias_spec.shape != [spec.units] {
            return Err(format!("manifest entry {} has an unexpected shape", kernel_spec.name));
        }
        // shapes match the manifest, whose total was checked above
        let kernel_len = inputs * spec.units;
        let kernel = Array2::from_shape_vec(
            (inputs, spec.units),
            values[offset..offset + kernel_len].to_vec(),
        )
        .map_err(|e| format!("{}: {}", kernel_spec.name, e))?;
        offset += kernel_len;
        let bias = Array1::from(values[offset..offset + spec.units].to_vec());
        offset += spec.units;

        layers.push(DenseLayer {
            activation: spec.activation,
            kernel,
            bias,
        });
        inputs = spec.units;
    }

    DenseNetwork::from_layers(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_network() -> DenseNetwork {
        let mut rng = StdRng::seed_from_u64(11);
        DenseNetwork::initialise(&[8, 4], &mut rng)
    }

    #[test]
    fn test_encode_layout() {
        let net = sample_network();
        let artifacts = encode(&net).unwrap();
        assert_eq!(artifacts.weights.len(), net.parameter_count() * 4);
        let topology: ModelTopology = serde_json::from_str(&artifacts.model_json).unwrap();
        assert_eq!(topology.input_dim, 4);
        assert_eq!(topology.weights_manifest[0].name, "dense_0/kernel");
        assert_eq!(topology.weights_manifest[0].shape, vec![4, 8]);
        assert_eq!(topology.layers[2].activation, Activation::Linear);
        assert!(artifacts.model_json.contains("\"relu\""));
    }

    #[test]
    fn test_decode_restores_identical_predictions() {
        let net = sample_network();
        let artifacts = encode(&net).unwrap();
        let restored = decode(&artifacts.model_json, &artifacts.weights).unwrap();
        assert_eq!(restored, net);
        let row = [2.0, 0.5, 3.0, 0.0];
        assert_eq!(restored.predict(&row), net.predict(&row));
    }

    #[test]
    fn test_decode_rejects_truncated_weights() {
        let artifacts = encode(&sample_network()).unwrap();
        let truncated = &artifacts.weights[..artifacts.weights.len() - 4];
        let err = decode(&artifacts.model_json, truncated).unwrap_err();
        assert!(err.contains("manifest expects"));
    }

    #[test]
    fn test_decode_rejects_overflowing_manifest_shape() {
        let json = serde_json::json!({
            "format": FORMAT,
            "input_dim": 4,
            "layers": [{ "units": 1, "activation": "linear" }],
            "weights_manifest": [
                { "name": "dense_0/kernel", "shape": [usize::MAX, 2] },
                { "name": "dense_0/bias", "shape": [1] }
            ]
        })
        .to_string();
        let err = decode(&json, &[0; 4]).unwrap_err();
        assert!(err.contains("overflows"));
    }

    #[test]
    fn test_decode_rejects_other_input_width() {
        let artifacts = encode(&sample_network()).unwrap();
        let mut topology: ModelTopology = serde_json::from_str(&artifacts.model_json).unwrap();
        topology.input_dim = 2;
        let json = serde_json::to_string(&topology).unwrap();
        let err = decode(&json, &artifacts.weights).unwrap_err();
        assert!(err.contains("expected 4 features"));
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let artifacts = encode(&sample_network()).unwrap();
        let json = artifacts.model_json.replace(FORMAT, "other/v9");
        assert!(decode(&json, &artifacts.weights).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage_json() {
        assert!(decode("not json", &[]).is_err());
    }
}
