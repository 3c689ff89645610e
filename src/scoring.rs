//! Scalar fitness scoring
//!
//! Turns an episode's telemetry snapshot into the single number selection
//! pressure acts on. The shape of the score is fixed; the weights are
//! configuration (`ScoringWeights`).

use crate::config::ScoringWeights;
use crate::creature::FitnessStats;

/// World units per meter for distance-based terms
pub const UNITS_PER_METER: f32 = 100.0;

/// Score one creature's episode.
///
/// Distance uses the maximum forward displacement reached, not the final
/// position, so a creature that walks far and falls back still outranks one
/// that never left the spawn. Net backward travel is penalized more heavily
/// than forward travel is rewarded. Spin is only penalized for the portion
/// beyond the threshold.
pub fn score(stats: &FitnessStats, weights: &ScoringWeights) -> f32 {
    let distance_m = stats.max_forward / UNITS_PER_METER;
    let speed_m = stats.speed / UNITS_PER_METER;
    let regression_m = (-stats.displacement).max(0.0) / UNITS_PER_METER;
    let excess_spin = (stats.spin - weights.spin_threshold).max(0.0);
    let slip_m = stats.slip / UNITS_PER_METER;

    distance_m * weights.distance_weight
        + speed_m * weights.speed_bonus
        + stats.stability * weights.stability_weight
        - stats.stumbles as f32 * weights.stumble_penalty
        - excess_spin * weights.spin_penalty
        - regression_m * weights.regression_weight
        - slip_m * weights.slip_penalty
}

/// Episode distance in meters, the headline number shown per generation
pub fn distance_meters(stats: &FitnessStats) -> f32 {
    stats.max_forward / UNITS_PER_METER
}
