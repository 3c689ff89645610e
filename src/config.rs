//! Simulation configuration
//!
//! One explicit, immutable configuration struct passed into constructors.
//! Every field has a documented default; nothing is merged onto live objects
//! after construction.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a simulation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub episode: EpisodeSettings,
    pub world: WorldSettings,
    pub evolution: EvolutionSettings,
    pub actuation: ActuationConfig,
    pub scoring: ScoringWeights,
}

/// Episode timing and population sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSettings {
    /// Number of creatures evaluated per generation
    pub population_size: usize,
    /// Episode length in simulated seconds
    pub duration: f32,
    /// Fixed physics timestep in seconds
    pub fixed_dt: f32,
    /// Simulation speed multiplier (sub-steps per host frame scale)
    pub speed: f32,
    /// Hard cap on physics sub-steps per host frame
    pub max_substeps: usize,
    /// Generation history ring capacity
    pub history_cap: usize,
    /// Leader ghost-trail point capacity
    pub ghost_cap: usize,
    /// Number of full leader replays retained
    pub replay_cap: usize,
    /// Leader must be ahead by this many world units to take over
    pub leader_margin: f32,
    /// Minimum simulated seconds between leader switches
    pub leader_min_interval: f32,
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        Self {
            population_size: 20,
            duration: 15.0,
            fixed_dt: 1.0 / 60.0,
            speed: 1.0,
            max_substeps: 240,
            history_cap: 300,
            ghost_cap: 600,
            replay_cap: 30,
            leader_margin: 12.0,
            leader_min_interval: 1.0,
        }
    }
}

/// World/physics parameters for the evaluation arena
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    /// Y coordinate of the ground surface
    pub ground_height: f32,
    /// Downward gravity magnitude (world units per second squared)
    pub gravity: f32,
    /// Ground friction coefficient
    pub ground_friction: f32,
    /// Node body density
    pub node_density: f32,
    /// Node body friction
    pub node_friction: f32,
    /// Spawn position above ground for the creature root
    pub spawn_height: f32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            ground_height: 0.0,
            gravity: 300.0,
            ground_friction: 0.8,
            node_density: 1.0,
            node_friction: 0.7,
            spawn_height: 60.0,
        }
    }
}

/// Evolution operator parameters shared by the scheduler and the UI layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionSettings {
    /// Base per-weight mutation probability
    pub base_mutation_rate: f32,
    /// Mutation rate added per consecutive stagnant generation
    pub stagnation_bonus_per_gen: f32,
    /// Ceiling on the effective mutation rate
    pub max_mutation_rate: f32,
    /// Gaussian stddev multiplier for weight perturbations
    pub mutation_size: f32,
    /// Number of genomes preserved verbatim (winner only for now)
    pub elite_count: usize,
    /// Consecutive non-improving generations before diversity injection
    pub stagnation_threshold: u32,
    /// RNG seed for the run
    pub seed: u64,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            base_mutation_rate: 0.08,
            stagnation_bonus_per_gen: 0.01,
            max_mutation_rate: 0.35,
            mutation_size: 0.35,
            elite_count: 1,
            stagnation_threshold: 8,
            seed: 0,
        }
    }
}

/// Per-creature energy reservoir gating muscle strength
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyConfig {
    /// Starting and maximum energy
    pub capacity: f32,
    /// Energy regenerated per second
    pub regen_per_sec: f32,
    /// Energy drained per second at full actuation
    pub cost_per_sec: f32,
    /// Strength multiplier when the reservoir is empty
    pub depleted_strength: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            capacity: 1.0,
            regen_per_sec: 0.15,
            cost_per_sec: 0.25,
            depleted_strength: 0.3,
        }
    }
}

/// Muscle actuation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuationConfig {
    /// Exponential smoothing coefficient toward the raw network signal
    pub smoothing: f32,
    /// Fraction of rest length a muscle may contract/extend
    pub range: f32,
    /// Muscle strength scale applied to the range
    pub strength: f32,
    /// Maximum per-tick length delta as a fraction of rest length
    pub move_speed: f32,
    /// Strength multiplier when neither muscle endpoint touches the ground
    pub airborne_strength: f32,
    /// Optional energy-pool gating (None disables the reservoir entirely)
    pub energy: Option<EnergyConfig>,
    /// Ground-contact tolerance for the binary contact sensor
    pub contact_tolerance: f32,
    /// Velocity scale used before clamping sensor velocities to [-1, 1]
    pub velocity_scale: f32,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.3,
            range: 0.5,
            strength: 1.0,
            move_speed: 0.05,
            airborne_strength: 0.4,
            energy: None,
            contact_tolerance: 2.0,
            velocity_scale: 120.0,
        }
    }
}

/// Tunable weights for the scalar fitness score
///
/// The qualitative shape of the score is fixed; the exact weights are
/// configuration. Stability reward ships disabled (weight 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Reward per meter of maximum forward progress
    pub distance_weight: f32,
    /// Bonus per unit of average speed
    pub speed_bonus: f32,
    /// Penalty per stumble event
    pub stumble_penalty: f32,
    /// Spin magnitude below this threshold is free
    pub spin_threshold: f32,
    /// Penalty per unit of spin beyond the threshold
    pub spin_penalty: f32,
    /// Penalty weight on net backward travel (heavier than the forward reward)
    pub regression_weight: f32,
    /// Reward weight on the smoothed stability accumulator
    pub stability_weight: f32,
    /// Penalty weight on ground slip (skating instead of walking)
    pub slip_penalty: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distance_weight: 10.0,
            speed_bonus: 0.5,
            stumble_penalty: 0.4,
            spin_threshold: 2.0,
            spin_penalty: 0.6,
            regression_weight: 15.0,
            stability_weight: 0.0,
            slip_penalty: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = SimulationConfig::default();
        assert!(config.episode.population_size >= 1);
        assert!(config.episode.duration > 0.0);
        assert!(config.episode.fixed_dt > 0.0);
        assert!(config.episode.max_substeps <= 240);
        assert!(config.evolution.base_mutation_rate <= config.evolution.max_mutation_rate);
        assert!(config.actuation.smoothing > 0.0 && config.actuation.smoothing <= 1.0);
    }

    #[test]
    fn test_regression_heavier_than_reward() {
        let weights = ScoringWeights::default();
        assert!(weights.regression_weight > weights.distance_weight);
    }

    #[test]
    fn test_stability_disabled_by_default() {
        assert_eq!(ScoringWeights::default().stability_weight, 0.0);
    }
}
