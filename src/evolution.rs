//! Generational evolution operator
//!
//! Pure function from a scored population to the next generation's genomes:
//! elitism, rank-ordered cloning, uniform crossover, gaussian weight mutation,
//! stagnation-triggered diversity injection, rare immigrants, and architecture
//! mutation. All randomness flows through the caller-supplied RNG so runs
//! reproduce exactly from a seed.

use rand::Rng;

use crate::genome::{Architecture, Genome, NetworkIo};
use crate::neural::gaussian;

/// One population member with its episode score
#[derive(Debug, Clone)]
pub struct ScoredGenome {
    pub genome: Genome,
    pub fitness: f32,
}

/// Parameters for one evolution step
#[derive(Debug, Clone)]
pub struct EvolveParams {
    /// Per-weight mutation probability
    pub mutation_rate: f32,
    /// Gaussian stddev multiplier for weight perturbations
    pub mutation_size: f32,
    /// Genomes preserved verbatim at the top of the next generation
    pub elite_count: usize,
    /// Consecutive non-improving generations, supplied by the caller
    pub stagnant_gens: u32,
    /// Stagnation level at which diversity injection kicks in
    pub stagnation_threshold: u32,
}

impl Default for EvolveParams {
    fn default() -> Self {
        Self {
            mutation_rate: 0.08,
            mutation_size: 0.35,
            elite_count: 1,
            stagnant_gens: 0,
            stagnation_threshold: 8,
        }
    }
}

/// Probability that an offspring slot is filled by crossover rather than
/// mutation of a single parent
const CROSSOVER_PROB: f32 = 0.3;
/// Rank-weighted parent sampling weights for the top three genomes
const RANK_WEIGHTS: [f32; 3] = [3.0, 2.0, 1.0];
/// Chance that a mutated weight is replaced outright instead of perturbed
const HARD_RESET_PROB: f32 = 0.02;

/// Produce the next generation's genomes from a scored population.
///
/// Deterministic given the RNG state. Never fails for valid non-empty input;
/// an empty population yields an empty next generation.
pub fn evolve(
    scored: &[ScoredGenome],
    target_size: usize,
    params: &EvolveParams,
    io: NetworkIo,
    rng: &mut impl Rng,
) -> Vec<Genome> {
    if scored.is_empty() || target_size == 0 {
        return Vec::new();
    }

    // Stable sort keeps prior relative order on exact ties
    let mut ranked: Vec<&ScoredGenome> = scored.iter().collect();
    ranked.sort_by(|a, b| {
        b.fitness
            .partial_cmp(&a.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut next = Vec::with_capacity(target_size);

    // Elite: winner(s) survive verbatim
    let elite = params.elite_count.max(1).min(target_size);
    for member in ranked.iter().take(elite) {
        next.push(member.genome.clone());
    }

    // Clones: next-best genomes copied in rank order
    let clone_slots = (target_size / 2).saturating_sub(elite);
    for i in 0..clone_slots {
        let rank = (elite + i) % ranked.len();
        next.push(ranked[rank].genome.clone());
    }

    // Offspring: crossover of the top two, or mutation of a rank-weighted pick
    while next.len() < target_size {
        let mut child = if rng.gen::<f32>() < CROSSOVER_PROB && ranked.len() >= 2 {
            let crossed = crossover(&ranked[0].genome, &ranked[1].genome, io, rng);
            mutate(&crossed, params.mutation_rate, params.mutation_size, rng)
        } else {
            let parent = rank_weighted_pick(&ranked, rng);
            mutate(parent, params.mutation_rate, params.mutation_size, rng)
        };

        let mutated_arch = child.architecture.mutated(rng);
        if mutated_arch != child.architecture {
            child = child.reshaped(mutated_arch, io, rng);
        }
        next.push(child);
    }

    // Diversity injection: prolonged stagnation wipes the bottom fifth
    if params.stagnant_gens >= params.stagnation_threshold {
        let inject = target_size / 5;
        for slot in target_size.saturating_sub(inject)..target_size {
            if slot == 0 {
                continue;
            }
            next[slot] = random_immigrant(io, rng);
        }
        if inject > 0 {
            log::debug!(
                "diversity injection: replaced {} genomes after {} stagnant generations",
                inject,
                params.stagnant_gens
            );
        }
    }

    // Rare immigrant: steady diversity pressure in larger populations
    if target_size > 10 && rng.gen::<f32>() < 0.1 {
        next[target_size - 1] = random_immigrant(io, rng);
    }

    next
}

/// Gaussian weight mutation producing a new genome.
///
/// Each weight independently has `rate` probability of a gaussian nudge; of
/// those, a further 2% chance replaces the value entirely (hard reset out of
/// local optima).
pub fn mutate(genome: &Genome, rate: f32, size: f32, rng: &mut impl Rng) -> Genome {
    let mut weights = genome.weights.clone();
    for w in &mut weights {
        if rng.gen::<f32>() < rate {
            if rng.gen::<f32>() < HARD_RESET_PROB {
                *w = gaussian(rng) * 0.5;
            } else {
                *w += gaussian(rng) * size;
            }
        }
    }
    Genome {
        weights,
        architecture: genome.architecture,
    }
}

/// Uniform crossover: per gene, an independent 50/50 pick of either parent's
/// value — never an interpolation. The child carries the fitter parent's
/// architecture; the other parent is reshaped onto it first.
pub fn crossover(a: &Genome, b: &Genome, io: NetworkIo, rng: &mut impl Rng) -> Genome {
    let b_aligned = if b.architecture == a.architecture {
        b.clone()
    } else {
        b.reshaped(a.architecture, io, rng)
    };

    let weights = a
        .weights
        .iter()
        .zip(b_aligned.weights.iter())
        .map(|(&wa, &wb)| if rng.gen::<bool>() { wa } else { wb })
        .collect();

    Genome {
        weights,
        architecture: a.architecture,
    }
}

/// Pick one of the top three ranked genomes with weights 3:2:1 (truncated to
/// however many exist)
fn rank_weighted_pick<'a>(ranked: &[&'a ScoredGenome], rng: &mut impl Rng) -> &'a Genome {
    let n = ranked.len().min(RANK_WEIGHTS.len());
    let total: f32 = RANK_WEIGHTS[..n].iter().sum();
    let mut draw = rng.gen::<f32>() * total;
    for (i, &w) in RANK_WEIGHTS[..n].iter().enumerate() {
        if draw < w {
            return &ranked[i].genome;
        }
        draw -= w;
    }
    &ranked[n - 1].genome
}

/// Fully random genome: Xavier-scale weights and a small random architecture
fn random_immigrant(io: NetworkIo, rng: &mut impl Rng) -> Genome {
    let architecture = Architecture::random_in(0..=2, 4..=16, rng);
    Genome::random(architecture, io, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    const IO: NetworkIo = NetworkIo {
        inputs: 9,
        outputs: 2,
    };

    fn scored_population(fitnesses: &[f32], seed: u64) -> Vec<ScoredGenome> {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        fitnesses
            .iter()
            .map(|&fitness| ScoredGenome {
                genome: Genome::random(Architecture::default(), IO, &mut rng),
                fitness,
            })
            .collect()
    }

    #[test]
    fn test_empty_population_yields_empty() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0);
        let out = evolve(&[], 10, &EvolveParams::default(), IO, &mut rng);
        assert!(out.is_empty());
    }

    #[test]
    fn test_size_invariant() {
        for target in [1usize, 2, 3, 7, 20, 41] {
            let scored = scored_population(&[3.0, 2.0, 1.0], 1);
            let mut rng = Xoshiro256StarStar::seed_from_u64(9);
            let out = evolve(&scored, target, &EvolveParams::default(), IO, &mut rng);
            assert_eq!(out.len(), target, "target {}", target);
        }
    }

    #[test]
    fn test_elitism_preserves_winner_verbatim() {
        let scored = scored_population(&[1.0, 10.0, 5.0], 2);
        let winner = scored[1].genome.clone();

        for stagnant in [0u32, 5, 12] {
            let params = EvolveParams {
                stagnant_gens: stagnant,
                ..Default::default()
            };
            let mut rng = Xoshiro256StarStar::seed_from_u64(3);
            let out = evolve(&scored, 5, &params, IO, &mut rng);
            assert_eq!(out[0], winner, "stagnant={}", stagnant);
        }
    }

    #[test]
    fn test_elite_only_scenario() {
        // Population of 3 with fitness [10, 5, 1], target 3, elite 1
        let scored = scored_population(&[10.0, 5.0, 1.0], 4);
        let mut rng = Xoshiro256StarStar::seed_from_u64(7);
        let out = evolve(&scored, 3, &EvolveParams::default(), IO, &mut rng);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], scored[0].genome);
    }

    #[test]
    fn test_mutation_rate_zero_is_identity_copy() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(5);
        let genome = Genome::random(Architecture::default(), IO, &mut rng);
        let copy = mutate(&genome, 0.0, 0.5, &mut rng);
        assert_eq!(copy.weights, genome.weights);
        assert_eq!(copy.architecture, genome.architecture);
    }

    #[test]
    fn test_mutation_touches_only_drawn_positions() {
        // With a tiny rate, most weights must be bit-identical to the parent
        let mut rng = Xoshiro256StarStar::seed_from_u64(8);
        let genome = Genome::random(Architecture::default(), IO, &mut rng);
        let child = mutate(&genome, 0.05, 0.5, &mut rng);

        let changed = genome
            .weights
            .iter()
            .zip(child.weights.iter())
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed < genome.weights.len() / 2);
        assert!(genome
            .weights
            .iter()
            .zip(child.weights.iter())
            .any(|(a, b)| a == b));
    }

    #[test]
    fn test_crossover_genes_come_from_a_parent() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(12);
        let a = Genome::random(Architecture::default(), IO, &mut rng);
        let b = Genome::random(Architecture::default(), IO, &mut rng);
        let child = crossover(&a, &b, IO, &mut rng);

        assert_eq!(child.weights.len(), a.weights.len());
        for (i, &w) in child.weights.iter().enumerate() {
            assert!(
                w == a.weights[i] || w == b.weights[i],
                "gene {} is an interpolation",
                i
            );
        }
    }

    #[test]
    fn test_diversity_injection_replaces_bottom_slots() {
        let scored = scored_population(&[9.0, 8.0, 7.0, 6.0, 5.0], 13);
        let params = EvolveParams {
            mutation_rate: 0.0,
            stagnant_gens: 8,
            ..Default::default()
        };
        let mut rng = Xoshiro256StarStar::seed_from_u64(2);
        let out = evolve(&scored, 20, &params, IO, &mut rng);

        // Bottom fifth (4 slots) are fresh genomes with small architectures
        for genome in &out[16..] {
            assert!(genome.architecture.hidden_layers <= 2);
            assert!((4..=16).contains(&genome.architecture.neurons_per_layer));
        }
        // Winner untouched
        assert_eq!(out[0], scored[0].genome);
    }

    #[test]
    fn test_clone_block_copies_in_rank_order() {
        let scored = scored_population(&[1.0, 3.0, 2.0], 17);
        let params = EvolveParams {
            mutation_rate: 0.0,
            ..Default::default()
        };
        let mut rng = Xoshiro256StarStar::seed_from_u64(6);
        let out = evolve(&scored, 6, &params, IO, &mut rng);

        // Ranked order is [3.0, 2.0, 1.0] -> indices 1, 2, 0
        assert_eq!(out[0], scored[1].genome);
        assert_eq!(out[1], scored[2].genome);
        assert_eq!(out[2], scored[0].genome);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let scored = scored_population(&[4.0, 3.0, 2.0, 1.0], 30);
        let params = EvolveParams::default();

        let mut rng1 = Xoshiro256StarStar::seed_from_u64(99);
        let mut rng2 = Xoshiro256StarStar::seed_from_u64(99);
        let out1 = evolve(&scored, 12, &params, IO, &mut rng1);
        let out2 = evolve(&scored, 12, &params, IO, &mut rng2);
        assert_eq!(out1, out2);
    }

    #[test]
    fn test_stable_tie_break() {
        // Equal fitness: earlier population index ranks first
        let scored = scored_population(&[5.0, 5.0, 5.0], 40);
        let params = EvolveParams {
            mutation_rate: 0.0,
            ..Default::default()
        };
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let out = evolve(&scored, 2, &params, IO, &mut rng);
        assert_eq!(out[0], scored[0].genome);
    }
}
