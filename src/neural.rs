//! Feed-forward neural controller over a flat weight buffer
//!
//! Fixed topology: layer sizes are set at construction and never change for
//! the lifetime of the controller. Weights for layer `l` occupy
//! `fan_in * fan_out` entries laid out output-neuron-major
//! (`weight[j * fan_in + k]`), immediately followed by `fan_out` biases.
//! The forward pass is pure and deterministic; all randomness lives in
//! construction and in the evolution operator.

use rand::Rng;

use crate::error::EvogaitError;

/// Sample a standard gaussian via the Box-Muller transform.
///
/// Single gaussian source for the whole crate: Xavier initialization and
/// mutation both draw from here so seeded runs reproduce exactly.
pub fn gaussian(rng: &mut impl Rng) -> f32 {
    let u1: f32 = 1.0 - rng.gen::<f32>(); // (0, 1], keeps ln finite
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Total weight count (weights + biases) for a layer-size array
pub fn weight_count_for(layer_sizes: &[usize]) -> usize {
    layer_sizes
        .windows(2)
        .map(|pair| pair[0] * pair[1] + pair[1])
        .sum()
}

/// Fixed-topology feed-forward network with tanh activations
#[derive(Debug, Clone)]
pub struct NeuralController {
    layer_sizes: Vec<usize>,
    weights: Vec<f32>,
    /// Per-layer activation buffers, cached for inspection/visualization
    activations: Vec<Vec<f32>>,
}

impl NeuralController {
    /// Create a controller with Xavier/Glorot-initialized weights and zero biases
    pub fn new(layer_sizes: &[usize], rng: &mut impl Rng) -> Self {
        debug_assert!(layer_sizes.len() >= 2);
        let mut weights = vec![0.0; weight_count_for(layer_sizes)];

        let mut offset = 0;
        for pair in layer_sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
            for w in &mut weights[offset..offset + fan_in * fan_out] {
                *w = std * gaussian(rng);
            }
            // Biases stay zero
            offset += fan_in * fan_out + fan_out;
        }

        Self {
            layer_sizes: layer_sizes.to_vec(),
            activations: layer_sizes.iter().map(|&n| vec![0.0; n]).collect(),
            weights,
        }
    }

    /// Create a controller directly from an existing flat weight buffer
    pub fn from_weights(layer_sizes: &[usize], weights: &[f32]) -> Result<Self, EvogaitError> {
        let expected = weight_count_for(layer_sizes);
        if weights.len() != expected {
            return Err(EvogaitError::WeightCountMismatch {
                expected,
                actual: weights.len(),
            });
        }
        Ok(Self {
            layer_sizes: layer_sizes.to_vec(),
            activations: layer_sizes.iter().map(|&n| vec![0.0; n]).collect(),
            weights: weights.to_vec(),
        })
    }

    /// Layer sizes, input layer first
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    /// Required flat buffer length for this topology
    pub fn weight_count(&self) -> usize {
        weight_count_for(&self.layer_sizes)
    }

    /// Input dimension
    pub fn input_dim(&self) -> usize {
        self.layer_sizes[0]
    }

    /// Output dimension
    pub fn output_dim(&self) -> usize {
        *self.layer_sizes.last().unwrap_or(&0)
    }

    /// Cached activation buffer for a layer (post-activation values)
    pub fn activations(&self, layer: usize) -> &[f32] {
        &self.activations[layer]
    }

    /// Forward pass: inputs -> motor commands in [-1, 1]
    ///
    /// The input vector is tolerantly zero-padded or truncated to the input
    /// layer size (sensor dimensionality is derived, not user-supplied).
    /// Returns a live reference into the output activation buffer; callers
    /// must not retain it across successive calls.
    pub fn forward(&mut self, inputs: &[f32]) -> &[f32] {
        let in_dim = self.layer_sizes[0];
        let copy = inputs.len().min(in_dim);
        self.activations[0][..copy].copy_from_slice(&inputs[..copy]);
        for slot in &mut self.activations[0][copy..] {
            *slot = 0.0;
        }

        let mut offset = 0;
        for layer in 1..self.layer_sizes.len() {
            let prev_size = self.layer_sizes[layer - 1];
            let curr_size = self.layer_sizes[layer];
            let bias_base = offset + prev_size * curr_size;

            // Split borrow: previous layer is read-only, current is written
            let (prev_slice, curr_slice) = self.activations.split_at_mut(layer);
            let prev = &prev_slice[layer - 1];
            let curr = &mut curr_slice[0];

            for j in 0..curr_size {
                let mut sum = self.weights[bias_base + j];
                let row = offset + j * prev_size;
                for k in 0..prev_size {
                    sum += prev[k] * self.weights[row + k];
                }
                curr[j] = sum.tanh();
            }

            offset = bias_base + curr_size;
        }

        &self.activations[self.layer_sizes.len() - 1]
    }

    /// Snapshot the flat weight buffer
    pub fn to_flat(&self) -> Vec<f32> {
        self.weights.clone()
    }

    /// Replace the flat weight buffer; fails fast on length mismatch
    pub fn from_flat(&mut self, values: &[f32]) -> Result<(), EvogaitError> {
        if values.len() != self.weights.len() {
            return Err(EvogaitError::WeightCountMismatch {
                expected: self.weights.len(),
                actual: values.len(),
            });
        }
        self.weights.copy_from_slice(values);
        Ok(())
    }
}
