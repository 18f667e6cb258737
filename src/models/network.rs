//! Fixed-topology autoencoder.
//!
//! Encoder 5→16→8→4 and decoder 4→8→16→5, ReLU on every hidden layer and a
//! linear output layer. The topology is part of the artifact contract:
//! weights trained for it only load back into it.

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Width of the encoded representation.
pub const LATENT_SIZE: usize = 4;

/// Layer shapes and activations, encoder first.
pub const TOPOLOGY: [(usize, usize, Activation); 6] = [
    (FEATURE_COUNT, 16, Activation::Relu),
    (16, 8, Activation::Relu),
    (8, LATENT_SIZE, Activation::Relu),
    (LATENT_SIZE, 8, Activation::Relu),
    (8, 16, Activation::Relu),
    (16, FEATURE_COUNT, Activation::Linear),
];

/// Number of encoder layers in [`TOPOLOGY`].
const ENCODER_LAYERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(&self, z: &mut Array2<f64>) {
        if let Activation::Relu = self {
            z.mapv_inplace(|x| x.max(0.0));
        }
    }
}

/// Fully connected layer computing `x · W + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// Shape `(inputs, outputs)`
    pub(crate) weights: Array2<f64>,
    pub(crate) bias: Array1<f64>,
    pub(crate) activation: Activation,
}

impl Dense {
    /// Uniform initialization in `±1/sqrt(fan_in)` for weights and bias.
    fn init<R: Rng>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        let bound = 1.0 / (inputs as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-bound..bound)),
            bias: Array1::from_shape_fn(outputs, |_| rng.gen_range(-bound..bound)),
            activation,
        }
    }

    pub(crate) fn forward(&self, input: &ArrayView2<f64>) -> Array2<f64> {
        let mut z = input.dot(&self.weights) + &self.bias;
        self.activation.apply(&mut z);
        z
    }

    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }
}

/// Compressive encode/decode model shared by all clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Autoencoder {
    layers: Vec<Dense>,
}

impl Autoencoder {
    /// Randomly initialized model following [`TOPOLOGY`].
    pub fn initialize<R: Rng>(rng: &mut R) -> Self {
        let layers = TOPOLOGY
            .iter()
            .map(|&(inputs, outputs, activation)| Dense::init(inputs, outputs, activation, rng))
            .collect();
        Self { layers }
    }

    /// Rebuild a model from stored layers, checking them against [`TOPOLOGY`].
    pub fn from_layers(layers: Vec<Dense>) -> Result<Self, String> {
        if layers.len() != TOPOLOGY.len() {
            return Err(format!(
                "expected {} layers, found {}",
                TOPOLOGY.len(),
                layers.len()
            ));
        }
        for (i, (layer, &(inputs, outputs, activation))) in layers.iter().zip(TOPOLOGY.iter()).enumerate() {
            if layer.shape() != (inputs, outputs) || layer.bias.len() != outputs {
                return Err(format!(
                    "layer {} has shape {:?}, expected ({}, {})",
                    i,
                    layer.shape(),
                    inputs,
                    outputs
                ));
            }
            if layer.activation != activation {
                return Err(format!("layer {} has activation {:?}", i, layer.activation));
            }
            let finite = layer.weights.iter().chain(layer.bias.iter()).all(|w| w.is_finite());
            if !finite {
                return Err(format!("layer {} contains non-finite weights", i));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Dense] {
        &mut self.layers
    }

    /// Map a feature vector to its 4-value latent code.
    pub fn encode(&self, vector: &FeatureVector) -> Array1<f64> {
        let mut x = as_row(vector);
        for layer in &self.layers[..ENCODER_LAYERS] {
            x = layer.forward(&x.view());
        }
        x.index_axis_move(Axis(0), 0)
    }

    /// Map a latent code back to feature space.
    pub fn decode(&self, latent: &Array1<f64>) -> FeatureVector {
        let mut x = latent.clone().insert_axis(Axis(0));
        for layer in &self.layers[ENCODER_LAYERS..] {
            x = layer.forward(&x.view());
        }
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, v) in values.iter_mut().zip(x.iter()) {
            *slot = *v;
        }
        FeatureVector::new(values)
    }

    /// `decode(encode(vector))`
    pub fn reconstruct(&self, vector: &FeatureVector) -> FeatureVector {
        self.decode(&self.encode(vector))
    }

    /// Mean squared difference between a vector and its reconstruction.
    pub fn reconstruction_error(&self, vector: &FeatureVector) -> f64 {
        let reconstructed = self.reconstruct(vector);
        vector
            .values()
            .iter()
            .zip(reconstructed.values())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            / FEATURE_COUNT as f64
    }

    /// Forward a batch (rows are samples), returning the input followed by
    /// every layer's output. Used for backpropagation.
    pub(crate) fn forward_trace(&self, batch: Array2<f64>) -> Vec<Array2<f64>> {
        let mut trace = Vec::with_capacity(self.layers.len() + 1);
        trace.push(batch);
        for layer in &self.layers {
            let next = layer.forward(&trace[trace.len() - 1].view());
            trace.push(next);
        }
        trace
    }
}

fn as_row(vector: &FeatureVector) -> Array2<f64> {
    Array2::from_shape_fn((1, FEATURE_COUNT), |(_, c)| vector.values()[c])
}

/// Stack feature vectors into a `(n, FEATURE_COUNT)` matrix.
pub fn to_matrix<'a, I>(vectors: I) -> Array2<f64>
where
    I: IntoIterator<Item = &'a FeatureVector>,
{
    let rows: Vec<&FeatureVector> = vectors.into_iter().collect();
    Array2::from_shape_fn((rows.len(), FEATURE_COUNT), |(r, c)| rows[r].values()[c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> Autoencoder {
        Autoencoder::initialize(&mut StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_topology_shapes() {
        let model = model();
        let shapes: Vec<(usize, usize)> = model.layers().iter().map(Dense::shape).collect();
        assert_eq!(shapes, vec![(5, 16), (16, 8), (8, 4), (4, 8), (8, 16), (16, 5)]);
        assert_eq!(model.layers()[5].activation, Activation::Linear);
    }

    #[test]
    fn test_encode_is_non_negative() {
        let model = model();
        let latent = model.encode(&FeatureVector::new([-3.0, 2.0, 13.0, 4.0, 1.0]));
        assert_eq!(latent.len(), LATENT_SIZE);
        assert!(latent.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn test_initialization_is_seeded() {
        assert_eq!(model(), model());
        let other = Autoencoder::initialize(&mut StdRng::seed_from_u64(43));
        assert_ne!(model(), other);
    }

    #[test]
    fn test_reconstruction_error_matches_batch_forward() {
        let model = model();
        let v = FeatureVector::new([0.3, -0.7, 18.0, 5.0, 0.0]);

        let trace = model.forward_trace(to_matrix([&v]));
        let output = trace.last().unwrap();
        let expected: f64 = v
            .values()
            .iter()
            .zip(output.row(0).iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            / 5.0;

        assert!((model.reconstruction_error(&v) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_from_layers_rejects_wrong_topology() {
        let mut layers = model().layers().to_vec();
        assert!(Autoencoder::from_layers(layers.clone()).is_ok());

        layers.pop();
        assert!(Autoencoder::from_layers(layers).is_err());

        let mut layers = model().layers().to_vec();
        layers[1].weights = Array2::zeros((16, 7));
        assert!(Autoencoder::from_layers(layers).is_err());
    }

    #[test]
    fn test_to_matrix() {
        let a = FeatureVector::new([1.0, 2.0, 3.0, 4.0, 0.0]);
        let b = FeatureVector::new([5.0, 6.0, 7.0, 1.0, 1.0]);
        let m = to_matrix([&a, &b]);
        assert_eq!(m.dim(), (2, 5));
        assert_eq!(m[[1, 2]], 7.0);
        assert_eq!(m.row(0).to_vec(), a.values().to_vec());

        let empty = to_matrix(std::iter::empty());
        assert_eq!(empty.dim(), (0, 5));
    }
}
