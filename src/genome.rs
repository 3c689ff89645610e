//! Genome representation: flat weight buffer plus architecture descriptor
//!
//! A genome is immutable once assigned to a live creature; the evolution
//! operator always produces new genome values, never mutates in place.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::neural::{weight_count_for, NeuralController};

/// Allowed hidden layer count range
pub const HIDDEN_LAYERS_RANGE: (u32, u32) = (0, 6);
/// Allowed neurons-per-hidden-layer range
pub const NEURONS_RANGE: (u32, u32) = (4, 32);

/// Morphology-derived network input/output dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIo {
    pub inputs: usize,
    pub outputs: usize,
}

/// Hidden-layer architecture of a controller network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    /// Number of hidden layers, in [0, 6]
    pub hidden_layers: u32,
    /// Neurons per hidden layer, in [4, 32]
    pub neurons_per_layer: u32,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            hidden_layers: 1,
            neurons_per_layer: 12,
        }
    }
}

impl Architecture {
    /// Clamp both fields into their allowed ranges
    pub fn clamped(self) -> Self {
        Self {
            hidden_layers: self
                .hidden_layers
                .clamp(HIDDEN_LAYERS_RANGE.0, HIDDEN_LAYERS_RANGE.1),
            neurons_per_layer: self.neurons_per_layer.clamp(NEURONS_RANGE.0, NEURONS_RANGE.1),
        }
    }

    /// Full layer-size array for a given input/output dimensionality
    pub fn layer_sizes(&self, io: NetworkIo) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers as usize + 2);
        sizes.push(io.inputs);
        for _ in 0..self.hidden_layers {
            sizes.push(self.neurons_per_layer as usize);
        }
        sizes.push(io.outputs);
        sizes
    }

    /// Required flat weight buffer length for this architecture
    pub fn weight_count(&self, io: NetworkIo) -> usize {
        weight_count_for(&self.layer_sizes(io))
    }

    /// Random architecture within the given sub-ranges (used by diversity injection)
    pub fn random_in(
        hidden: std::ops::RangeInclusive<u32>,
        neurons: std::ops::RangeInclusive<u32>,
        rng: &mut impl Rng,
    ) -> Self {
        Self {
            hidden_layers: rng.gen_range(hidden),
            neurons_per_layer: rng.gen_range(neurons),
        }
        .clamped()
    }

    /// Perturb the architecture: hidden layers by ±1 with probability 0.10,
    /// neurons per layer by one of {-4, -2, 0, 2, 4} with probability 0.15.
    /// Returns the (possibly unchanged) clamped result.
    pub fn mutated(self, rng: &mut impl Rng) -> Self {
        let mut next = self;
        if rng.gen::<f32>() < 0.10 {
            let delta: i64 = if rng.gen::<bool>() { 1 } else { -1 };
            next.hidden_layers = (next.hidden_layers as i64 + delta).max(0) as u32;
        }
        if rng.gen::<f32>() < 0.15 {
            const STEPS: [i64; 5] = [-4, -2, 0, 2, 4];
            let delta = STEPS[rng.gen_range(0..STEPS.len())];
            next.neurons_per_layer = (next.neurons_per_layer as i64 + delta).max(0) as u32;
        }
        next.clamped()
    }
}

/// Flat weight buffer plus the architecture that shapes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub weights: Vec<f32>,
    pub architecture: Architecture,
}

impl Genome {
    /// Fresh genome with Xavier-scale random weights for the given architecture
    pub fn random(architecture: Architecture, io: NetworkIo, rng: &mut impl Rng) -> Self {
        let sizes = architecture.layer_sizes(io);
        let weights = NeuralController::new(&sizes, rng).to_flat();
        Self {
            weights,
            architecture,
        }
    }

    /// Whether the weight buffer matches the architecture's required length
    pub fn is_consistent(&self, io: NetworkIo) -> bool {
        self.weights.len() == self.architecture.weight_count(io)
    }

    /// Re-shape this genome's weights onto a new architecture.
    ///
    /// Overlapping per-layer weight blocks are copied (output-major layout
    /// preserved); entries with no counterpart are Xavier-initialized, so an
    /// architecture mutation degrades learned behavior gracefully instead of
    /// discarding it.
    pub fn reshaped(&self, architecture: Architecture, io: NetworkIo, rng: &mut impl Rng) -> Self {
        if architecture == self.architecture {
            return Self {
                weights: self.weights.clone(),
                architecture,
            };
        }

        let old_sizes = self.architecture.layer_sizes(io);
        let new_sizes = architecture.layer_sizes(io);
        let mut weights = NeuralController::new(&new_sizes, rng).to_flat();

        // Layer offsets into each flat buffer
        let offsets = |sizes: &[usize]| -> Vec<usize> {
            let mut out = vec![0];
            for pair in sizes.windows(2) {
                out.push(out.last().unwrap() + pair[0] * pair[1] + pair[1]);
            }
            out
        };
        let old_offsets = offsets(&old_sizes);
        let new_offsets = offsets(&new_sizes);

        let shared_layers = (old_sizes.len() - 1).min(new_sizes.len() - 1);
        for layer in 0..shared_layers {
            let (old_in, old_out) = (old_sizes[layer], old_sizes[layer + 1]);
            let (new_in, new_out) = (new_sizes[layer], new_sizes[layer + 1]);
            let copy_in = old_in.min(new_in);
            let copy_out = old_out.min(new_out);

            for j in 0..copy_out {
                for k in 0..copy_in {
                    weights[new_offsets[layer] + j * new_in + k] =
                        self.weights[old_offsets[layer] + j * old_in + k];
                }
                // Bias for output neuron j
                weights[new_offsets[layer] + new_in * new_out + j] =
                    self.weights[old_offsets[layer] + old_in * old_out + j];
            }
        }

        Self {
            weights,
            architecture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    const IO: NetworkIo = NetworkIo {
        inputs: 14,
        outputs: 3,
    };

    #[test]
    fn test_layer_sizes_no_hidden() {
        let arch = Architecture {
            hidden_layers: 0,
            neurons_per_layer: 8,
        };
        assert_eq!(arch.layer_sizes(IO), vec![14, 3]);
        assert_eq!(arch.weight_count(IO), 14 * 3 + 3);
    }

    #[test]
    fn test_layer_sizes_with_hidden() {
        let arch = Architecture {
            hidden_layers: 2,
            neurons_per_layer: 8,
        };
        assert_eq!(arch.layer_sizes(IO), vec![14, 8, 8, 3]);
    }

    #[test]
    fn test_random_genome_is_consistent() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let genome = Genome::random(Architecture::default(), IO, &mut rng);
        assert!(genome.is_consistent(IO));
    }

    #[test]
    fn test_architecture_clamping() {
        let arch = Architecture {
            hidden_layers: 99,
            neurons_per_layer: 1,
        }
        .clamped();
        assert_eq!(arch.hidden_layers, 6);
        assert_eq!(arch.neurons_per_layer, 4);
    }

    #[test]
    fn test_mutated_stays_in_range() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(77);
        let mut arch = Architecture::default();
        for _ in 0..500 {
            arch = arch.mutated(&mut rng);
            assert!(arch.hidden_layers <= 6);
            assert!((4..=32).contains(&arch.neurons_per_layer));
        }
    }

    #[test]
    fn test_reshaped_preserves_overlap() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(21);
        let small = Architecture {
            hidden_layers: 1,
            neurons_per_layer: 8,
        };
        let large = Architecture {
            hidden_layers: 1,
            neurons_per_layer: 12,
        };
        let genome = Genome::random(small, IO, &mut rng);
        let grown = genome.reshaped(large, IO, &mut rng);

        assert!(grown.is_consistent(IO));
        // First hidden neuron's input row survives the resize
        for k in 0..IO.inputs {
            assert_eq!(grown.weights[k], genome.weights[k]);
        }
    }

    #[test]
    fn test_reshaped_same_architecture_is_copy() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(6);
        let genome = Genome::random(Architecture::default(), IO, &mut rng);
        let copy = genome.reshaped(genome.architecture, IO, &mut rng);
        assert_eq!(copy.weights, genome.weights);
    }
}
