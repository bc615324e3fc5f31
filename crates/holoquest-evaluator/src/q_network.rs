//! Dense Q-network mapping a [`SkillState`] to one score per [`SkillTier`].
//!
//! The network is a small multi-layer perceptron (`3 -> 32 relu -> 32 relu -> 3 linear`
//! by default). Hidden layers use He-normal initialization, the linear head uses
//! Glorot-uniform, and all biases start at zero.
//!
//! Training is plain mini-batch backpropagation of the mean squared error between the
//! predicted Q-values and the TD targets, with the update applied by [`Adam`].

use holoquest_engine::{SkillState, SkillTier};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::optimizer::Adam;

/// Default hidden layer sizes.
pub const DEFAULT_HIDDEN_LAYERS: [usize; 2] = [32, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[display("relu")]
    Relu,
    #[display("linear")]
    Linear,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::Relu => x.max(0.0),
            Self::Linear => x,
        }
    }

    /// Derivative expressed in terms of the activation output.
    fn derivative(self, output: f32) -> f32 {
        match self {
            Self::Relu => {
                if output > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Linear => 1.0,
        }
    }
}

/// Fully connected layer. The kernel is stored row-major as `[input_dim][units]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    input_dim: usize,
    units: usize,
    activation: Activation,
    kernel: Vec<f32>,
    bias: Vec<f32>,
}

impl DenseLayer {
    /// Creates a randomly initialized layer.
    ///
    /// Both dimensions must be non-zero.
    #[expect(clippy::cast_precision_loss)]
    pub fn random<R>(input_dim: usize, units: usize, activation: Activation, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        assert!(input_dim > 0 && units > 0, "layer dimensions must be non-zero");
        let kernel = match activation {
            Activation::Relu => {
                let std_dev = (2.0 / input_dim as f32).sqrt();
                let normal = Normal::new(0.0, std_dev).unwrap();
                normal.sample_iter(&mut *rng).take(input_dim * units).collect()
            }
            Activation::Linear => {
                let limit = (6.0 / (input_dim + units) as f32).sqrt();
                let uniform = Uniform::new_inclusive(-limit, limit).unwrap();
                uniform.sample_iter(&mut *rng).take(input_dim * units).collect()
            }
        };
        Self {
            input_dim,
            units,
            activation,
            kernel,
            bias: vec![0.0; units],
        }
    }

    /// Builds a layer from existing parameters.
    ///
    /// Returns `None` if either dimension is zero or the parameter lengths do not
    /// match the declared shape.
    #[must_use]
    pub fn from_parts(
        input_dim: usize,
        units: usize,
        activation: Activation,
        kernel: Vec<f32>,
        bias: Vec<f32>,
    ) -> Option<Self> {
        if input_dim == 0 || units == 0 {
            return None;
        }
        let kernel_len = input_dim.checked_mul(units)?;
        (kernel.len() == kernel_len && bias.len() == units).then_some(Self {
            input_dim,
            units,
            activation,
            kernel,
            bias,
        })
    }

    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[must_use]
    pub fn units(&self) -> usize {
        self.units
    }

    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[must_use]
    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    #[must_use]
    pub fn bias(&self) -> &[f32] {
        &self.bias
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(input.len(), self.input_dim);
        let mut output = self.bias.clone();
        for (x, row) in input.iter().zip(self.kernel.chunks_exact(self.units)) {
            for (o, w) in output.iter_mut().zip(row) {
                *o += x * w;
            }
        }
        for o in &mut output {
            *o = self.activation.apply(*o);
        }
        output
    }

    /// Propagates an output-side gradient back to the layer input.
    fn backward_input(&self, delta: &[f32]) -> Vec<f32> {
        self.kernel
            .chunks_exact(self.units)
            .map(|row| row.iter().zip(delta).map(|(w, d)| w * d).sum())
            .collect()
    }
}

#[derive(Debug, Clone)]
struct LayerGradients {
    kernel: Vec<f32>,
    bias: Vec<f32>,
}

impl LayerGradients {
    fn zeros_like(layer: &DenseLayer) -> Self {
        Self {
            kernel: vec![0.0; layer.kernel.len()],
            bias: vec![0.0; layer.bias.len()],
        }
    }

    fn accumulate(&mut self, input: &[f32], delta: &[f32]) {
        for (x, row) in input.iter().zip(self.kernel.chunks_exact_mut(delta.len())) {
            for (g, d) in row.iter_mut().zip(delta) {
                *g += x * d;
            }
        }
        for (g, d) in self.bias.iter_mut().zip(delta) {
            *g += d;
        }
    }
}

/// Layer stack that does not chain into a `3 -> ... -> 3` network.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum NetworkShapeError {
    #[display("network has no layers")]
    Empty,
    #[display("layer {index} has zero width")]
    ZeroWidth { index: usize },
    #[display("network input must be {expected} wide, found {found}")]
    Input { expected: usize, found: usize },
    #[display("network output must be {expected} wide, found {found}")]
    Output { expected: usize, found: usize },
    #[display("layer {index} expects {expected} inputs but the previous layer has {found} units")]
    Chain {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Checks that `(input_dim, units)` pairs chain into a `3 -> ... -> 3` network.
///
/// ```
/// use holoquest_evaluator::q_network::{NetworkShapeError, check_shapes};
///
/// assert_eq!(check_shapes([(3, 8), (8, 3)]), Ok(()));
/// assert_eq!(
///     check_shapes([(3, 0), (0, 3)]),
///     Err(NetworkShapeError::ZeroWidth { index: 0 })
/// );
/// ```
pub fn check_shapes<I>(shapes: I) -> Result<(), NetworkShapeError>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut prev_units = None;
    for (index, (input_dim, units)) in shapes.into_iter().enumerate() {
        if input_dim == 0 || units == 0 {
            return Err(NetworkShapeError::ZeroWidth { index });
        }
        match prev_units {
            None if input_dim != SkillState::LEN => {
                return Err(NetworkShapeError::Input {
                    expected: SkillState::LEN,
                    found: input_dim,
                });
            }
            Some(found) if input_dim != found => {
                return Err(NetworkShapeError::Chain {
                    index,
                    expected: input_dim,
                    found,
                });
            }
            _ => {}
        }
        prev_units = Some(units);
    }
    match prev_units {
        None => Err(NetworkShapeError::Empty),
        Some(found) if found != SkillTier::LEN => Err(NetworkShapeError::Output {
            expected: SkillTier::LEN,
            found,
        }),
        Some(_) => Ok(()),
    }
}

/// One score per tier, indexed by [`SkillTier::index`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QValues(pub [f32; SkillTier::LEN]);

impl QValues {
    /// Tier with the highest score. Ties go to the lowest index.
    ///
    /// ```
    /// use holoquest_engine::SkillTier;
    /// use holoquest_evaluator::QValues;
    ///
    /// assert_eq!(QValues([1.0, 3.0, 3.0]).argmax(), SkillTier::Intermediate);
    /// assert_eq!(QValues([0.0, 0.0, 0.0]).argmax(), SkillTier::Beginner);
    /// ```
    #[must_use]
    pub fn argmax(&self) -> SkillTier {
        let mut best = 0;
        for (i, &q) in self.0.iter().enumerate().skip(1) {
            if q > self.0[best] {
                best = i;
            }
        }
        SkillTier::ALL[best]
    }

    #[must_use]
    pub fn max(&self) -> f32 {
        self.0[self.argmax().index()]
    }

    #[must_use]
    pub fn get(&self, tier: SkillTier) -> f32 {
        self.0[tier.index()]
    }

    #[must_use]
    pub fn as_array(&self) -> &[f32; SkillTier::LEN] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QNetwork {
    layers: Vec<DenseLayer>,
}

impl QNetwork {
    /// Creates a freshly initialized network with the given hidden layer sizes.
    ///
    /// Zero entries are skipped.
    pub fn new<R>(hidden_layers: &[usize], rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut layers = Vec::with_capacity(hidden_layers.len() + 1);
        let mut input_dim = SkillState::LEN;
        for &units in hidden_layers.iter().filter(|&&units| units > 0) {
            layers.push(DenseLayer::random(input_dim, units, Activation::Relu, rng));
            input_dim = units;
        }
        layers.push(DenseLayer::random(
            input_dim,
            SkillTier::LEN,
            Activation::Linear,
            rng,
        ));
        Self { layers }
    }

    /// Assembles a network from prebuilt layers, checking that they chain.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self, NetworkShapeError> {
        check_shapes(layers.iter().map(|l| (l.input_dim, l.units)))?;
        Ok(Self { layers })
    }

    #[must_use]
    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.kernel.len() + l.bias.len())
            .sum()
    }

    #[must_use]
    pub fn predict(&self, state: &SkillState) -> QValues {
        let output = self
            .layers
            .iter()
            .fold(state.as_array().to_vec(), |x, layer| layer.forward(&x));
        let mut values = [0.0; SkillTier::LEN];
        values.copy_from_slice(&output);
        QValues(values)
    }

    /// Overwrites every parameter with those of `other`.
    pub fn copy_weights_from(&mut self, other: &Self) {
        self.clone_from(other);
    }

    /// Runs one optimizer step toward `targets` and returns the batch MSE loss
    /// measured before the update.
    ///
    /// An empty batch leaves the network untouched and returns `0.0`.
    #[expect(clippy::cast_precision_loss)]
    pub fn train_batch(
        &mut self,
        states: &[SkillState],
        targets: &[QValues],
        optimizer: &mut Adam,
    ) -> f32 {
        assert_eq!(states.len(), targets.len());
        if states.is_empty() {
            return 0.0;
        }

        let scale = 1.0 / (states.len() * SkillTier::LEN) as f32;
        let mut gradients: Vec<_> = self.layers.iter().map(LayerGradients::zeros_like).collect();
        let mut loss = 0.0;

        for (state, target) in states.iter().zip(targets) {
            let mut activations = Vec::with_capacity(self.layers.len() + 1);
            activations.push(state.as_array().to_vec());
            for layer in &self.layers {
                let next = layer.forward(&activations[activations.len() - 1]);
                activations.push(next);
            }

            let output = &activations[self.layers.len()];
            let mut delta: Vec<f32> = output
                .iter()
                .zip(target.as_array())
                .map(|(o, t)| {
                    let diff = o - t;
                    loss += diff * diff * scale;
                    2.0 * diff * scale
                })
                .collect();

            for (index, layer) in self.layers.iter().enumerate().rev() {
                for (d, &out) in delta.iter_mut().zip(&activations[index + 1]) {
                    *d *= layer.activation.derivative(out);
                }
                gradients[index].accumulate(&activations[index], &delta);
                if index > 0 {
                    delta = layer.backward_input(&delta);
                }
            }
        }

        optimizer.step(
            self.layers
                .iter_mut()
                .zip(&gradients)
                .flat_map(|(layer, grad)| {
                    [
                        (layer.kernel.as_mut_slice(), grad.kernel.as_slice()),
                        (layer.bias.as_mut_slice(), grad.bias.as_slice()),
                    ]
                }),
        );
        loss
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn network(seed: u64) -> QNetwork {
        let mut rng = Pcg32::seed_from_u64(seed);
        QNetwork::new(&DEFAULT_HIDDEN_LAYERS, &mut rng)
    }

    #[test]
    fn test_default_topology() {
        let net = network(0);
        let shapes: Vec<_> = net
            .layers()
            .iter()
            .map(|l| (l.input_dim(), l.units(), l.activation()))
            .collect();
        assert_eq!(
            shapes,
            [
                (3, 32, Activation::Relu),
                (32, 32, Activation::Relu),
                (32, 3, Activation::Linear),
            ]
        );
        assert_eq!(net.parameter_count(), 3 * 32 + 32 + 32 * 32 + 32 + 32 * 3 + 3);
        assert!(net.layers().iter().all(|l| l.bias().iter().all(|&b| b == 0.0)));
    }

    #[test]
    fn test_argmax_first_index_wins() {
        assert_eq!(QValues([2.0, 2.0, 2.0]).argmax(), SkillTier::Beginner);
        assert_eq!(QValues([1.0, 2.0, 2.0]).argmax(), SkillTier::Intermediate);
        assert_eq!(QValues([1.0, 2.0, 5.0]).argmax(), SkillTier::Expert);
        assert_eq!(QValues([f32::NAN, 1.0, 0.0]).argmax(), SkillTier::Beginner);
    }

    #[test]
    fn test_same_seed_same_network() {
        assert_eq!(network(7), network(7));
        assert_ne!(network(7), network(8));
    }

    #[test]
    fn test_copy_weights_from() {
        let mut target = network(1);
        let online = network(2);
        let state = SkillState::new(0.3, 0.4, 0.6);
        assert_ne!(target.predict(&state), online.predict(&state));
        target.copy_weights_from(&online);
        assert_eq!(target.predict(&state), online.predict(&state));
    }

    #[test]
    fn test_train_batch_reduces_loss() {
        let mut net = network(3);
        let mut adam = Adam::new(1e-2);
        let states = [
            SkillState::new(0.8, 0.8, 0.2),
            SkillState::new(0.4, 0.4, 0.5),
            SkillState::new(0.1, 0.1, 0.95),
        ];
        let targets = [
            QValues([1.0, 0.0, -1.0]),
            QValues([0.0, 1.0, 0.0]),
            QValues([-1.0, 0.0, 1.0]),
        ];
        let first = net.train_batch(&states, &targets, &mut adam);
        let mut last = first;
        for _ in 0..300 {
            last = net.train_batch(&states, &targets, &mut adam);
        }
        assert!(last < first * 0.1, "loss {first} -> {last}");
        for (state, target) in states.iter().zip(&targets) {
            assert_eq!(net.predict(state).argmax(), target.argmax());
        }
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut net = network(4);
        let before = net.clone();
        let loss = net.train_batch(&[], &[], &mut Adam::new(1e-3));
        assert_eq!(loss, 0.0);
        assert_eq!(net, before);
    }

    #[test]
    fn test_from_layers_rejects_broken_chain() {
        let mut rng = Pcg32::seed_from_u64(0);
        let layers = vec![
            DenseLayer::random(3, 8, Activation::Relu, &mut rng),
            DenseLayer::random(4, 3, Activation::Linear, &mut rng),
        ];
        assert_eq!(
            QNetwork::from_layers(layers),
            Err(NetworkShapeError::Chain {
                index: 1,
                expected: 4,
                found: 8
            })
        );
        assert_eq!(QNetwork::from_layers(vec![]), Err(NetworkShapeError::Empty));
    }

    #[test]
    fn test_zero_width_hidden_layer_is_skipped() {
        let mut rng = Pcg32::seed_from_u64(0);
        let net = QNetwork::new(&[0, 8, 0], &mut rng);
        let shapes: Vec<_> = net
            .layers()
            .iter()
            .map(|l| (l.input_dim(), l.units()))
            .collect();
        assert_eq!(shapes, [(3, 8), (8, 3)]);
        let q = net.predict(&SkillState::new(0.5, 0.5, 0.5));
        assert!(q.as_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_width_layers_are_rejected() {
        assert_eq!(
            DenseLayer::from_parts(3, 0, Activation::Relu, vec![], vec![]),
            None
        );
        assert_eq!(
            DenseLayer::from_parts(0, 3, Activation::Linear, vec![], vec![0.0; 3]),
            None
        );
        assert_eq!(
            DenseLayer::from_parts(usize::MAX, 2, Activation::Relu, vec![], vec![0.0; 2]),
            None
        );
        assert_eq!(
            check_shapes([(3, 0), (0, 3)]),
            Err(NetworkShapeError::ZeroWidth { index: 0 })
        );
        assert_eq!(
            check_shapes([(3, 8), (8, 0)]),
            Err(NetworkShapeError::ZeroWidth { index: 1 })
        );
        assert_eq!(
            check_shapes([(2, 3)]),
            Err(NetworkShapeError::Input {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            check_shapes([(3, 8)]),
            Err(NetworkShapeError::Output {
                expected: 3,
                found: 8
            })
        );
    }
}
