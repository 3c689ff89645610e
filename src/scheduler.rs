//! Generation scheduler and fitness evaluator
//!
//! Owns the whole run: the physics world, the live population, the episode
//! clock, generation records, the champion, and the evolution transition.
//! The host drives it with `step(dt_hint)`; there is no internal scheduling.
//!
//! State machine: `Idle -> Running -> Evaluating -> Running -> ...` with an
//! absorbing `Stopped` reachable at any point. Evaluating is transient; a
//! single `step` call that crosses an episode boundary scores, evolves and
//! respawns before returning.

use std::collections::VecDeque;

use glam::Vec2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::creature::CreatureController;
use crate::error::EvogaitError;
use crate::evolution::{evolve, EvolveParams, ScoredGenome};
use crate::genome::{Architecture, Genome};
use crate::morphology::Morphology;
use crate::physics::PhysicsWorld;
use crate::scoring::{distance_meters, score};

/// Lifecycle of one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Evaluating,
    Stopped,
}

/// Best genome ever observed in a run, kept apart from the live population so
/// it survives extinction events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Champion {
    pub genome: Genome,
    pub fitness: f32,
    pub distance: f32,
    pub generation: u32,
}

/// Per-generation summary appended to a bounded history ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: u32,
    /// Best distance this generation, in meters
    pub gen_best: f32,
    /// Best distance ever, in meters
    pub all_time_best: f32,
    pub avg_distance: f32,
    pub avg_speed: f32,
    pub avg_stability: f32,
    pub avg_stumbles: f32,
    pub avg_spin: f32,
    pub avg_slip: f32,
    pub avg_actuation: f32,
    /// Mean scalar score across the population
    pub evo_score: f32,
    pub champion_fitness: f32,
    pub mutation_rate: f32,
    pub stagnant_gens: u32,
}

/// What one `step` call produced, for the host's render/telemetry layer
#[derive(Debug, Clone, Default)]
pub struct FrameResult {
    /// Simulated seconds elapsed in the current episode
    pub sim_time: f32,
    pub generation: u32,
    /// Population index of the current episode leader
    pub leader_index: Option<usize>,
    pub leader_position: Option<Vec2>,
    /// Present exactly once, on the step that ended a generation
    pub generation_ended: Option<GenerationRecord>,
}

/// Drives evaluation episodes and generation transitions for one run
pub struct GenerationScheduler {
    config: SimulationConfig,
    state: RunState,
    rng: Xoshiro256StarStar,

    morphology: Option<Morphology>,
    world: Option<PhysicsWorld>,
    population: Vec<CreatureController>,
    /// Fixed genome driving sandbox mode; None means evolving mode
    sandbox_genome: Option<Genome>,

    generation: u32,
    sim_time: f32,
    accumulator: f32,
    next_creature_id: u64,

    all_time_best: f32,
    stagnant_gens: u32,
    champion: Option<Champion>,
    /// Winner of the most recent completed generation, verbatim
    last_generation_brain: Option<Genome>,
    history: VecDeque<GenerationRecord>,

    leader_index: Option<usize>,
    last_leader_switch: f32,
    /// Leader trajectory of the current episode
    ghost: VecDeque<Vec2>,
    /// Full leader paths of past generations
    replays: VecDeque<Vec<Vec2>>,
}

impl GenerationScheduler {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = Xoshiro256StarStar::seed_from_u64(config.evolution.seed);
        Self {
            config,
            state: RunState::Idle,
            rng,
            morphology: None,
            world: None,
            population: Vec::new(),
            sandbox_genome: None,
            generation: 0,
            sim_time: 0.0,
            accumulator: 0.0,
            next_creature_id: 1,
            all_time_best: 0.0,
            stagnant_gens: 0,
            champion: None,
            last_generation_brain: None,
            history: VecDeque::new(),
            leader_index: None,
            last_leader_switch: 0.0,
            ghost: VecDeque::new(),
            replays: VecDeque::new(),
        }
    }

    /// Begin an evolving run with a fresh random population.
    ///
    /// Rejects degenerate morphologies before any physics state exists.
    pub fn start(&mut self, morphology: &Morphology) -> Result<(), EvogaitError> {
        morphology.validate()?;
        self.sandbox_genome = None;
        self.begin_run(morphology, None)?;
        log::info!(
            "Run started: population {}, {} nodes, {} muscles",
            self.config.episode.population_size,
            morphology.nodes.len(),
            morphology.muscle_count()
        );
        Ok(())
    }

    /// Begin a single-creature sandbox run driven by a fixed genome.
    ///
    /// Episode end respawns the same genome; the evolution operator is never
    /// invoked.
    pub fn start_sandbox(
        &mut self,
        morphology: &Morphology,
        genome: Genome,
    ) -> Result<(), EvogaitError> {
        morphology.validate()?;
        let io = morphology.network_io();
        if !genome.is_consistent(io) {
            return Err(EvogaitError::WeightCountMismatch {
                expected: genome.architecture.weight_count(io),
                actual: genome.weights.len(),
            });
        }
        self.sandbox_genome = Some(genome.clone());
        self.begin_run(morphology, Some(genome))?;
        log::info!("Sandbox run started");
        Ok(())
    }

    fn begin_run(
        &mut self,
        morphology: &Morphology,
        fixed: Option<Genome>,
    ) -> Result<(), EvogaitError> {
        let io = morphology.network_io();
        let genomes = match fixed {
            Some(genome) => vec![genome],
            None => (0..self.config.episode.population_size.max(1))
                .map(|_| Genome::random(Architecture::default(), io, &mut self.rng))
                .collect(),
        };

        self.morphology = Some(morphology.clone());
        self.world = Some(PhysicsWorld::new(&self.config.world));
        self.population.clear();
        self.generation = 1;
        self.sim_time = 0.0;
        self.accumulator = 0.0;
        self.all_time_best = 0.0;
        self.stagnant_gens = 0;
        self.champion = None;
        self.last_generation_brain = None;
        self.history.clear();
        self.ghost.clear();
        self.replays.clear();
        self.leader_index = None;
        self.last_leader_switch = 0.0;

        self.spawn_population(genomes)?;
        self.state = RunState::Running;
        Ok(())
    }

    /// Stop the run and release all simulation state. Absorbing.
    pub fn stop(&mut self) {
        self.state = RunState::Stopped;
        self.population.clear();
        self.world = None;
        log::info!("Run stopped at generation {}", self.generation);
    }

    /// Advance the simulation by up to `dt_hint * speed` simulated seconds.
    ///
    /// Runs whole fixed-dt sub-steps, hard-capped per call so extreme speed
    /// settings or slow host frames cannot blow up frame time. Within each
    /// sub-step every creature is sensed-and-actuated in index order, physics
    /// integrates once, then fitness is sampled for every creature.
    pub fn step(&mut self, dt_hint: f32) -> FrameResult {
        if self.state != RunState::Running {
            return FrameResult {
                generation: self.generation,
                ..Default::default()
            };
        }

        let dt = self.config.episode.fixed_dt;
        self.accumulator += dt_hint.max(0.0) * self.config.episode.speed;

        let mut ended = None;
        let mut substeps = 0;
        while self.accumulator >= dt && substeps < self.config.episode.max_substeps {
            self.accumulator -= dt;
            substeps += 1;
            self.tick(dt);

            if self.sim_time >= self.config.episode.duration {
                ended = Some(self.finish_generation());
                break;
            }
        }
        // Leftover beyond one sub-step is dropped, not carried into a spiral
        self.accumulator = self.accumulator.min(dt);

        FrameResult {
            sim_time: self.sim_time,
            generation: self.generation,
            leader_index: self.leader_index,
            leader_position: self.leader_position(),
            generation_ended: ended,
        }
    }

    fn tick(&mut self, dt: f32) {
        let Some(world) = self.world.as_mut() else {
            return;
        };

        for creature in &mut self.population {
            creature.update(world, self.sim_time, dt);
        }
        world.step(dt);
        for creature in &mut self.population {
            creature.sample_fitness(world, dt);
        }
        self.sim_time += dt;

        self.update_leader();
        if let Some(pos) = self.leader_position() {
            self.ghost.push_back(pos);
            while self.ghost.len() > self.config.episode.ghost_cap {
                self.ghost.pop_front();
            }
        }
    }

    /// Leader hysteresis: a challenger takes over only when ahead by a margin
    /// and enough simulated time has passed since the last switch, so noisy
    /// leapfrogging does not flicker the leader
    fn update_leader(&mut self) {
        let displacements: Vec<f32> = self
            .population
            .iter()
            .map(|c| c.stats().displacement)
            .collect();

        let challenger = displacements
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i);

        let Some(challenger) = challenger else {
            return;
        };

        match self.leader_index {
            None => {
                self.leader_index = Some(challenger);
                self.last_leader_switch = self.sim_time;
            }
            Some(current) if current != challenger => {
                let lead = displacements[challenger] - displacements[current];
                let elapsed = self.sim_time - self.last_leader_switch;
                if lead > self.config.episode.leader_margin
                    && elapsed >= self.config.episode.leader_min_interval
                {
                    self.leader_index = Some(challenger);
                    self.last_leader_switch = self.sim_time;
                }
            }
            _ => {}
        }
    }

    fn leader_position(&self) -> Option<Vec2> {
        let world = self.world.as_ref()?;
        let index = self.leader_index?;
        self.population.get(index).map(|c| c.center(world))
    }

    /// Score, record, evolve, respawn. Called on the sub-step that exhausted
    /// the episode clock.
    fn finish_generation(&mut self) -> GenerationRecord {
        self.state = RunState::Evaluating;

        let weights = &self.config.scoring;
        let mut scored: Vec<(usize, f32, f32)> = self
            .population
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let stats = c.stats();
                (i, score(&stats, weights), distance_meters(&stats))
            })
            .collect();
        // Stable sort: exact ties keep population index order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (winner_index, winner_fitness, winner_distance) = scored[0];
        self.last_generation_brain = Some(self.population[winner_index].genome().clone());

        let n = self.population.len() as f32;
        let mut record = GenerationRecord {
            generation: self.generation,
            gen_best: winner_distance,
            all_time_best: self.all_time_best,
            avg_distance: 0.0,
            avg_speed: 0.0,
            avg_stability: 0.0,
            avg_stumbles: 0.0,
            avg_spin: 0.0,
            avg_slip: 0.0,
            avg_actuation: 0.0,
            evo_score: 0.0,
            champion_fitness: self.champion.as_ref().map(|c| c.fitness).unwrap_or(0.0),
            mutation_rate: 0.0,
            stagnant_gens: self.stagnant_gens,
        };
        for creature in &self.population {
            let stats = creature.stats();
            record.avg_distance += distance_meters(&stats) / n;
            record.avg_speed += stats.speed / n;
            record.avg_stability += stats.stability / n;
            record.avg_stumbles += stats.stumbles as f32 / n;
            record.avg_spin += stats.spin / n;
            record.avg_slip += stats.slip / n;
            record.avg_actuation += stats.actuation_level / n;
        }
        record.evo_score = scored.iter().map(|(_, s, _)| s).sum::<f32>() / n;

        // Stagnation resets only on strict improvement
        if winner_distance > self.all_time_best {
            self.all_time_best = winner_distance;
            self.stagnant_gens = 0;
        } else {
            self.stagnant_gens += 1;
        }
        record.all_time_best = self.all_time_best;
        record.stagnant_gens = self.stagnant_gens;
        record.mutation_rate = self.effective_mutation_rate();

        let champion_beaten = self
            .champion
            .as_ref()
            .map(|c| winner_fitness > c.fitness)
            .unwrap_or(true);
        if champion_beaten {
            self.champion = Some(Champion {
                genome: self.population[winner_index].genome().clone(),
                fitness: winner_fitness,
                distance: winner_distance,
                generation: self.generation,
            });
        }
        record.champion_fitness = self.champion.as_ref().map(|c| c.fitness).unwrap_or(0.0);

        log::info!(
            "Generation {}: best {:.2}m (all-time {:.2}m), stagnant {}, mutation rate {:.3}",
            self.generation,
            winner_distance,
            self.all_time_best,
            self.stagnant_gens,
            record.mutation_rate
        );

        self.history.push_back(record.clone());
        while self.history.len() > self.config.episode.history_cap {
            self.history.pop_front();
        }

        let path: Vec<Vec2> = self.ghost.iter().copied().collect();
        if !path.is_empty() {
            self.replays.push_back(path);
            while self.replays.len() > self.config.episode.replay_cap {
                self.replays.pop_front();
            }
        }
        self.ghost.clear();

        let next_genomes = match &self.sandbox_genome {
            Some(genome) => vec![genome.clone()],
            None => {
                let io = self
                    .morphology
                    .as_ref()
                    .map(|m| m.network_io())
                    .unwrap_or(crate::genome::NetworkIo {
                        inputs: 0,
                        outputs: 0,
                    });
                let scored_genomes: Vec<ScoredGenome> = self
                    .population
                    .iter()
                    .map(|c| ScoredGenome {
                        genome: c.genome().clone(),
                        fitness: score(&c.stats(), &self.config.scoring),
                    })
                    .collect();
                let params = EvolveParams {
                    mutation_rate: self.effective_mutation_rate(),
                    mutation_size: self.config.evolution.mutation_size,
                    elite_count: self.config.evolution.elite_count,
                    stagnant_gens: self.stagnant_gens,
                    stagnation_threshold: self.config.evolution.stagnation_threshold,
                };
                evolve(
                    &scored_genomes,
                    self.config.episode.population_size.max(1),
                    &params,
                    io,
                    &mut self.rng,
                )
            }
        };

        self.despawn_population();
        // Spawn failures cannot happen here: evolved genomes are consistent
        // by construction, but a failure still stops the run instead of
        // panicking the step loop
        if let Err(err) = self.spawn_population(next_genomes) {
            log::warn!("Respawn failed, stopping run: {}", err);
            self.stop();
            return record;
        }

        self.generation += 1;
        self.sim_time = 0.0;
        self.leader_index = None;
        self.last_leader_switch = 0.0;
        self.state = RunState::Running;
        record
    }

    fn despawn_population(&mut self) {
        if let Some(world) = self.world.as_mut() {
            for creature in &self.population {
                world.remove_creature(creature.id());
            }
        }
        self.population.clear();
    }

    fn spawn_population(&mut self, genomes: Vec<Genome>) -> Result<(), EvogaitError> {
        let Some(morphology) = self.morphology.clone() else {
            return Ok(());
        };
        let Some(world) = self.world.as_mut() else {
            return Ok(());
        };
        let spawn = Vec2::new(0.0, self.config.world.ground_height + self.config.world.spawn_height);

        for genome in genomes {
            let id = self.next_creature_id;
            self.next_creature_id += 1;
            let body = world.spawn_creature(id, &morphology, spawn);
            let creature = CreatureController::new(
                genome,
                &morphology,
                body,
                &self.config.actuation,
                spawn,
                self.config.world.ground_height,
            )?;
            self.population.push(creature);
        }
        Ok(())
    }

    /// Mutation rate escalating with stagnation, shared by the evolution call
    /// and any host UI showing the current pressure
    pub fn effective_mutation_rate(&self) -> f32 {
        let evo = &self.config.evolution;
        (evo.base_mutation_rate + self.stagnant_gens as f32 * evo.stagnation_bonus_per_gen)
            .min(evo.max_mutation_rate)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn sim_time(&self) -> f32 {
        self.sim_time
    }

    pub fn population_len(&self) -> usize {
        self.population.len()
    }

    pub fn stagnant_gens(&self) -> u32 {
        self.stagnant_gens
    }

    pub fn champion(&self) -> Option<&Champion> {
        self.champion.as_ref()
    }

    /// Winner genome of the most recent completed generation
    pub fn last_generation_brain(&self) -> Option<&Genome> {
        self.last_generation_brain.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.history.iter()
    }

    pub fn latest_record(&self) -> Option<&GenerationRecord> {
        self.history.back()
    }

    /// Stored leader paths of past generations, oldest first
    pub fn replays(&self) -> impl Iterator<Item = &[Vec2]> {
        self.replays.iter().map(|p| p.as_slice())
    }
}
