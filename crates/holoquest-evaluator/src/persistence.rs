//! Saving and loading [`QNetwork`]s as a topology document plus a flat weight buffer.
//!
//! A saved model directory holds two files:
//!
//! - `model.json` - a [`ModelTopology`] describing the layer stack and the order and
//!   shape of every weight tensor
//! - `weights.bin` - all tensors concatenated as little-endian `f32`, in manifest order
//!
//! Each dense layer `dense_N` contributes `dense_N/kernel` (`[input_dim, units]`,
//! row-major) followed by `dense_N/bias` (`[units]`). Decoding slices the buffer in
//! exactly that order and rejects any document whose manifest deviates from it, whose
//! layers do not chain into a `3 -> ... -> 3` stack, or whose declared sizes overflow.
//!
//! # Example
//!
//! ```
//! use holoquest_engine::SkillState;
//! use holoquest_evaluator::{QNetwork, persistence};
//! use rand::SeedableRng as _;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let network = QNetwork::new(&[16], &mut rng);
//!
//! let (topology, weights) = persistence::encode(&network);
//! let restored = persistence::decode(&topology, &weights).unwrap();
//!
//! let state = SkillState::new(0.2, 0.3, 0.9);
//! assert_eq!(network.predict(&state), restored.predict(&state));
//! ```

use std::{
    fs,
    io::{self, BufReader, BufWriter, Write as _},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::q_network::{self, Activation, DenseLayer, NetworkShapeError, QNetwork};

/// Current version of the topology document.
pub const FORMAT_VERSION: u32 = 1;
pub const TOPOLOGY_FILE: &str = "model.json";
pub const WEIGHTS_FILE: &str = "weights.bin";

const FORMAT: &str = "layers-model";
const DTYPE: &str = "float32";
const GENERATED_BY: &str = concat!("holoquest-evaluator ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTopology {
    pub format_version: u32,
    pub format: String,
    pub generated_by: String,
    pub layers: Vec<LayerSpec>,
    pub weights_manifest: WeightsManifest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSpec {
    pub name: String,
    pub input_dim: usize,
    pub units: usize,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightsManifest {
    pub paths: Vec<String>,
    pub weights: Vec<WeightSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

impl WeightSpec {
    fn float32(name: String, shape: Vec<usize>) -> Self {
        Self {
            name,
            shape,
            dtype: DTYPE.to_owned(),
        }
    }

    /// Element count, or `None` if it overflows `usize`.
    fn len(&self) -> Option<usize> {
        self.shape.iter().try_fold(1_usize, |acc, &dim| acc.checked_mul(dim))
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ModelLoadError {
    #[display("failed to read model file: {_0}")]
    Io(io::Error),
    #[display("failed to parse model topology: {_0}")]
    Json(serde_json::Error),
    #[display("unsupported model format version {found} (expected {FORMAT_VERSION})")]
    #[from(ignore)]
    UnsupportedVersion { found: u32 },
    #[display("weights manifest lists {found} tensors, expected {expected}")]
    #[from(ignore)]
    ManifestLength { expected: usize, found: usize },
    #[display("weights manifest entry {index} is {found}, expected {expected}")]
    #[from(ignore)]
    ManifestEntry {
        index: usize,
        expected: String,
        found: String,
    },
    #[display("weight buffer holds {found} bytes, expected {expected}")]
    #[from(ignore)]
    BufferLength { expected: usize, found: usize },
    #[display("declared weight shapes exceed the addressable size")]
    #[from(ignore)]
    Oversized,
    #[display("invalid layer stack: {_0}")]
    Shape(NetworkShapeError),
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ModelSaveError {
    #[display("failed to write model file: {_0}")]
    Io(io::Error),
    #[display("failed to encode model topology: {_0}")]
    Json(serde_json::Error),
}

fn layer_name(index: usize) -> String {
    format!("dense_{}", index + 1)
}

fn expected_manifest(layers: &[LayerSpec]) -> Vec<WeightSpec> {
    layers
        .iter()
        .flat_map(|layer| {
            [
                WeightSpec::float32(
                    format!("{}/kernel", layer.name),
                    vec![layer.input_dim, layer.units],
                ),
                WeightSpec::float32(format!("{}/bias", layer.name), vec![layer.units]),
            ]
        })
        .collect()
}

fn describe(spec: &WeightSpec) -> String {
    format!("{} {:?} {}", spec.name, spec.shape, spec.dtype)
}

/// Splits a network into its topology document and weight buffer.
#[must_use]
pub fn encode(network: &QNetwork) -> (ModelTopology, Vec<u8>) {
    let layers: Vec<_> = network
        .layers()
        .iter()
        .enumerate()
        .map(|(index, layer)| LayerSpec {
            name: layer_name(index),
            input_dim: layer.input_dim(),
            units: layer.units(),
            activation: layer.activation(),
        })
        .collect();
    let weights = expected_manifest(&layers);

    let mut buffer = Vec::with_capacity(network.parameter_count() * size_of::<f32>());
    for layer in network.layers() {
        for value in layer.kernel().iter().chain(layer.bias()) {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
    }

    let topology = ModelTopology {
        format_version: FORMAT_VERSION,
        format: FORMAT.to_owned(),
        generated_by: GENERATED_BY.to_owned(),
        layers,
        weights_manifest: WeightsManifest {
            paths: vec![WEIGHTS_FILE.to_owned()],
            weights,
        },
    };
    (topology, buffer)
}

/// Rebuilds a network from a topology document and its weight buffer.
pub fn decode(topology: &ModelTopology, bytes: &[u8]) -> Result<QNetwork, ModelLoadError> {
    if topology.format_version != FORMAT_VERSION {
        return Err(ModelLoadError::UnsupportedVersion {
            found: topology.format_version,
        });
    }
    q_network::check_shapes(topology.layers.iter().map(|l| (l.input_dim, l.units)))?;

    let expected = expected_manifest(&topology.layers);
    let declared = &topology.weights_manifest.weights;
    if declared.len() != expected.len() {
        return Err(ModelLoadError::ManifestLength {
            expected: expected.len(),
            found: declared.len(),
        });
    }
    for (index, (want, got)) in expected.iter().zip(declared).enumerate() {
        if want != got {
            return Err(ModelLoadError::ManifestEntry {
                index,
                expected: describe(want),
                found: describe(got),
            });
        }
    }

    let expected_bytes = expected
        .iter()
        .try_fold(0_usize, |acc, spec| acc.checked_add(spec.len()?))
        .and_then(|count| count.checked_mul(size_of::<f32>()))
        .ok_or(ModelLoadError::Oversized)?;
    if bytes.len() != expected_bytes {
        return Err(ModelLoadError::BufferLength {
            expected: expected_bytes,
            found: bytes.len(),
        });
    }

    let mut values = bytes
        .chunks_exact(size_of::<f32>())
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    let mut layers = Vec::with_capacity(topology.layers.len());
    for spec in &topology.layers {
        let kernel_len = spec
            .input_dim
            .checked_mul(spec.units)
            .ok_or(ModelLoadError::Oversized)?;
        let kernel: Vec<f32> = values.by_ref().take(kernel_len).collect();
        let bias: Vec<f32> = values.by_ref().take(spec.units).collect();
        let layer =
            DenseLayer::from_parts(spec.input_dim, spec.units, spec.activation, kernel, bias)
                .ok_or(ModelLoadError::BufferLength {
                    expected: expected_bytes,
                    found: bytes.len(),
                })?;
        layers.push(layer);
    }
    QNetwork::from_layers(layers).map_err(ModelLoadError::from)
}

/// Writes `model.json` and `weights.bin` into `dir`, creating it if needed.
pub fn save_model_dir(network: &QNetwork, dir: &Path) -> Result<(), ModelSaveError> {
    fs::create_dir_all(dir)?;
    let (topology, weights) = encode(network);

    let mut writer = BufWriter::new(fs::File::create(dir.join(TOPOLOGY_FILE))?);
    serde_json::to_writer_pretty(&mut writer, &topology)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    fs::write(dir.join(WEIGHTS_FILE), weights)?;
    tracing::info!(
        dir = %dir.display(),
        parameters = network.parameter_count(),
        "model saved"
    );
    Ok(())
}

/// Reads a model previously written by [`save_model_dir`].
pub fn load_model_dir(dir: &Path) -> Result<QNetwork, ModelLoadError> {
    let reader = BufReader::new(fs::File::open(dir.join(TOPOLOGY_FILE))?);
    let topology: ModelTopology = serde_json::from_reader(reader)?;
    let weights = fs::read(dir.join(WEIGHTS_FILE))?;
    let network = decode(&topology, &weights)?;
    tracing::info!(
        dir = %dir.display(),
        parameters = network.parameter_count(),
        "model loaded"
    );
    Ok(network)
}

#[cfg(test)]
mod tests {
    use holoquest_engine::SkillState;
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::q_network::DEFAULT_HIDDEN_LAYERS;

    fn network() -> QNetwork {
        let mut rng = Pcg32::seed_from_u64(42);
        QNetwork::new(&DEFAULT_HIDDEN_LAYERS, &mut rng)
    }

    #[test]
    fn test_save_load_reproduces_q_values() {
        let dir = tempfile::tempdir().unwrap();
        let original = network();
        save_model_dir(&original, dir.path()).unwrap();
        let loaded = load_model_dir(dir.path()).unwrap();

        for state in [
            SkillState::new(0.067, 0.167, 0.95),
            SkillState::new(0.333, 0.333, 0.6),
            SkillState::new(0.667, 0.667, 0.3),
        ] {
            assert_eq!(original.predict(&state), loaded.predict(&state));
        }
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_topology_document_shape() {
        let (topology, weights) = encode(&network());
        assert_eq!(weights.len(), network().parameter_count() * 4);

        let value = serde_json::to_value(&topology).unwrap();
        assert_eq!(value["formatVersion"], 1);
        assert_eq!(value["layers"][0]["inputDim"], 3);
        assert_eq!(value["layers"][2]["activation"], "linear");
        let names: Vec<_> = topology
            .weights_manifest
            .weights
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "dense_1/kernel",
                "dense_1/bias",
                "dense_2/kernel",
                "dense_2/bias",
                "dense_3/kernel",
                "dense_3/bias",
            ]
        );
        assert_eq!(topology.weights_manifest.weights[0].shape, [3, 32]);
    }

    #[test]
    fn test_decode_rejects_reordered_manifest() {
        let (mut topology, weights) = encode(&network());
        topology.weights_manifest.weights.swap(0, 1);
        assert!(matches!(
            decode(&topology, &weights),
            Err(ModelLoadError::ManifestEntry { index: 0, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_buffer() {
        let (topology, weights) = encode(&network());
        assert!(matches!(
            decode(&topology, &weights[..weights.len() - 4]),
            Err(ModelLoadError::BufferLength { .. })
        ));
    }

    /// Replaces the layer stack and keeps the manifest consistent with it, so only the
    /// shape checks stand between the document and the decoder.
    fn with_layers(topology: &mut ModelTopology, shapes: &[(usize, usize)]) {
        for (layer, &(input_dim, units)) in topology.layers.iter_mut().zip(shapes) {
            layer.input_dim = input_dim;
            layer.units = units;
        }
        topology.layers.truncate(shapes.len());
        topology.weights_manifest.weights = expected_manifest(&topology.layers);
    }

    #[test]
    fn test_decode_rejects_zero_width_layer() {
        let (mut topology, _) = encode(&network());
        with_layers(&mut topology, &[(3, 0), (0, 3)]);
        // only the output bias would be read
        let weights = vec![0; 3 * 4];
        assert!(matches!(
            decode(&topology, &weights),
            Err(ModelLoadError::Shape(NetworkShapeError::ZeroWidth { index: 0 }))
        ));
    }

    #[test]
    fn test_decode_rejects_overflowing_shapes() {
        let (mut topology, weights) = encode(&network());
        let huge = usize::MAX / 2;
        with_layers(&mut topology, &[(3, huge), (huge, 3)]);
        assert!(matches!(
            decode(&topology, &weights),
            Err(ModelLoadError::Oversized)
        ));
    }

    #[test]
    fn test_decode_rejects_mischained_layers() {
        let (mut topology, weights) = encode(&network());
        with_layers(&mut topology, &[(3, 32), (16, 32), (32, 3)]);
        assert!(matches!(
            decode(&topology, &weights),
            Err(ModelLoadError::Shape(NetworkShapeError::Chain {
                index: 1,
                expected: 16,
                found: 32
            }))
        ));

        let (mut topology, weights) = encode(&network());
        with_layers(&mut topology, &[(3, 32), (32, 32), (32, 4)]);
        assert!(matches!(
            decode(&topology, &weights),
            Err(ModelLoadError::Shape(NetworkShapeError::Output {
                expected: 3,
                found: 4
            }))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let (mut topology, weights) = encode(&network());
        topology.format_version = 2;
        assert!(matches!(
            decode(&topology, &weights),
            Err(ModelLoadError::UnsupportedVersion { found: 2 })
        ));
    }

    #[test]
    fn test_load_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_model_dir(&dir.path().join("absent")),
            Err(ModelLoadError::Io(_))
        ));
    }
}
