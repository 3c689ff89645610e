//! Per-creature control: sensing, actuation, fitness telemetry
//!
//! A `CreatureController` exclusively owns its brain and telemetry; the
//! physics bodies belong to the world and are reached through handles. The
//! controller is created at generation spawn and dropped (with its bodies
//! released by the scheduler) at generation end.

use glam::Vec2;

use crate::config::ActuationConfig;
use crate::error::EvogaitError;
use crate::genome::Genome;
use crate::morphology::Morphology;
use crate::neural::NeuralController;
use crate::physics::{CreatureBody, PhysicsWorld};

/// Fraction of body extent above ground below which the center of mass
/// counts as stumbling
const STUMBLE_EXTENT_FRACTION: f32 = 0.25;

/// Exponentially-smoothed telemetry for one creature's episode.
///
/// Every accumulator uses `v = v*0.9 + sample*0.1`, so scores stay comparable
/// across runs and hosts.
#[derive(Debug, Clone, Default)]
pub struct FitnessStats {
    /// Smoothed horizontal speed (world units per second)
    pub speed: f32,
    /// Smoothed inverse-instability proxy in [0, 1]
    pub stability: f32,
    /// Smoothed fraction of nodes touching the ground
    pub grounded_ratio: f32,
    /// Edge-triggered count of center-of-mass drops near the ground
    pub stumbles: u32,
    /// Smoothed mean absolute angular velocity
    pub spin: f32,
    /// Smoothed horizontal speed of grounded nodes (skating proxy)
    pub slip: f32,
    /// Smoothed mean absolute muscle signal
    pub actuation_level: f32,
    /// Smoothed mean per-tick muscle signal change
    pub actuation_jerk: f32,
    /// Remaining energy fraction (1.0 when gating is disabled)
    pub energy: f32,
    /// Current horizontal displacement from spawn
    pub displacement: f32,
    /// Maximum forward displacement reached during the episode
    pub max_forward: f32,
}

/// One tick's raw physical observations, already averaged over nodes
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSample {
    pub center: Vec2,
    pub avg_abs_vy: f32,
    pub height_spread: f32,
    pub avg_abs_spin: f32,
    pub grounded_fraction: f32,
    pub grounded_abs_vx: f32,
    pub actuation_level: f32,
    pub actuation_jerk: f32,
}

fn smooth(value: f32, sample: f32) -> f32 {
    value * 0.9 + sample * 0.1
}

/// Accumulates `FitnessStats` from per-tick samples.
///
/// Separate from the controller so telemetry semantics (smoothing, stumble
/// edge-triggering) are testable on synthetic trajectories.
#[derive(Debug, Clone)]
pub struct FitnessTracker {
    stats: FitnessStats,
    spawn_x: f32,
    stumble_height: f32,
    extent: f32,
    velocity_scale: f32,
    prev_center_x: Option<f32>,
    below_stumble: bool,
}

impl FitnessTracker {
    pub fn new(spawn: Vec2, extent: f32, ground_height: f32, velocity_scale: f32) -> Self {
        Self {
            stats: FitnessStats {
                energy: 1.0,
                ..Default::default()
            },
            spawn_x: spawn.x,
            stumble_height: ground_height + extent * STUMBLE_EXTENT_FRACTION,
            extent,
            velocity_scale,
            prev_center_x: None,
            below_stumble: false,
        }
    }

    /// Fold one tick of observations into the accumulators
    pub fn record(&mut self, sample: &TickSample, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        let speed_sample = match self.prev_center_x {
            Some(prev) => (sample.center.x - prev) / dt,
            None => 0.0,
        };
        self.prev_center_x = Some(sample.center.x);
        self.stats.speed = smooth(self.stats.speed, speed_sample);

        // Instability proxy: vertical agitation plus node height spread
        let instability =
            sample.avg_abs_vy / self.velocity_scale + sample.height_spread / self.extent;
        self.stats.stability = smooth(self.stats.stability, 1.0 / (1.0 + instability));

        self.stats.grounded_ratio = smooth(self.stats.grounded_ratio, sample.grounded_fraction);
        self.stats.spin = smooth(self.stats.spin, sample.avg_abs_spin);
        self.stats.slip = smooth(self.stats.slip, sample.grounded_abs_vx);
        self.stats.actuation_level = smooth(self.stats.actuation_level, sample.actuation_level);
        self.stats.actuation_jerk = smooth(self.stats.actuation_jerk, sample.actuation_jerk);

        // Edge-triggered: one stumble per dip, not one per tick below
        let below = sample.center.y < self.stumble_height;
        if below && !self.below_stumble {
            self.stats.stumbles += 1;
        }
        self.below_stumble = below;

        self.stats.displacement = sample.center.x - self.spawn_x;
        self.stats.max_forward = self.stats.max_forward.max(self.stats.displacement);
    }

    pub fn set_energy(&mut self, fraction: f32) {
        self.stats.energy = fraction;
    }

    /// Read-only clamped copy for external scoring
    pub fn snapshot(&self) -> FitnessStats {
        let mut out = self.stats.clone();
        out.stability = out.stability.clamp(0.0, 1.0);
        out.grounded_ratio = out.grounded_ratio.clamp(0.0, 1.0);
        out.energy = out.energy.clamp(0.0, 1.0);
        out
    }
}

/// One live creature: physics composite handles, brain, telemetry
pub struct CreatureController {
    id: u64,
    genome: Genome,
    morphology: Morphology,
    body: CreatureBody,
    brain: NeuralController,
    config: ActuationConfig,
    /// Smoothed network output per muscle
    signals: Vec<f32>,
    /// Previous tick's smoothed signals, for the jerk accumulator
    prev_signals: Vec<f32>,
    /// Current rate-limited target length per muscle
    targets: Vec<f32>,
    /// Remaining energy, meaningful only when gating is configured
    energy: f32,
    extent: f32,
    tracker: FitnessTracker,
}

impl CreatureController {
    /// Wire a genome to a freshly spawned physics composite.
    ///
    /// Fails with `WeightCountMismatch` if the genome's weight buffer does not
    /// match the morphology-derived network shape.
    pub fn new(
        genome: Genome,
        morphology: &Morphology,
        body: CreatureBody,
        config: &ActuationConfig,
        spawn: Vec2,
        ground_height: f32,
    ) -> Result<Self, EvogaitError> {
        let io = morphology.network_io();
        let layer_sizes = genome.architecture.layer_sizes(io);
        let brain = NeuralController::from_weights(&layer_sizes, &genome.weights)?;

        let muscle_count = body.muscle_joints.len();
        let targets = body.muscle_joints.iter().map(|m| m.rest_length).collect();
        let extent = morphology.max_extent();
        let energy = config.energy.as_ref().map(|e| e.capacity).unwrap_or(1.0);

        Ok(Self {
            id: body.id,
            genome,
            morphology: morphology.clone(),
            body,
            brain,
            config: config.clone(),
            signals: vec![0.0; muscle_count],
            prev_signals: vec![0.0; muscle_count],
            targets,
            energy,
            extent,
            tracker: FitnessTracker::new(spawn, extent, ground_height, config.velocity_scale),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn body(&self) -> &CreatureBody {
        &self.body
    }

    /// Average node position
    pub fn center(&self, world: &PhysicsWorld) -> Vec2 {
        let mut sum = Vec2::ZERO;
        let mut count = 0;
        for &handle in &self.body.node_bodies {
            if let Some(pos) = world.body_position(handle) {
                sum += pos;
                count += 1;
            }
        }
        if count == 0 {
            Vec2::ZERO
        } else {
            sum / count as f32
        }
    }

    fn node_grounded(&self, world: &PhysicsWorld, index: usize) -> bool {
        let Some(pos) = world.body_position(self.body.node_bodies[index]) else {
            return false;
        };
        let radius = self.morphology.nodes[index].radius;
        pos.y - radius <= world.ground_height() + self.config.contact_tolerance
    }

    /// Build the network input vector: five span-normalized features per node
    /// plus four globals. Scale invariance matters here; raw world coordinates
    /// would tie the learned gait to one body size.
    pub fn build_inputs(&self, world: &PhysicsWorld, sim_time: f32) -> Vec<f32> {
        let center = self.center(world);
        let ground = world.ground_height();
        let mut inputs = Vec::with_capacity(self.morphology.input_count());

        let mut avg_vx = 0.0;
        let mut avg_height = 0.0;
        for (i, &handle) in self.body.node_bodies.iter().enumerate() {
            let pos = world.body_position(handle).unwrap_or(center);
            let vel = world.body_linvel(handle).unwrap_or(Vec2::ZERO);

            inputs.push((pos.x - center.x) / self.extent);
            inputs.push((pos.y - center.y) / self.extent);
            inputs.push((vel.x / self.config.velocity_scale).clamp(-1.0, 1.0));
            inputs.push((vel.y / self.config.velocity_scale).clamp(-1.0, 1.0));
            inputs.push(if self.node_grounded(world, i) { 1.0 } else { 0.0 });

            avg_vx += vel.x;
            avg_height += pos.y - ground;
        }
        let n = self.body.node_bodies.len().max(1) as f32;
        avg_vx /= n;
        avg_height /= n;

        inputs.push((sim_time * 0.1).sin());
        inputs.push((sim_time * 0.1).cos());
        inputs.push((avg_vx / self.config.velocity_scale).clamp(-1.0, 1.0));
        inputs.push((avg_height / self.extent).clamp(-1.0, 1.0));

        inputs
    }

    /// Sense, think, actuate. Skips entirely for muscle-less bodies.
    pub fn update(&mut self, world: &mut PhysicsWorld, sim_time: f32, dt: f32) {
        if self.body.muscle_joints.is_empty() {
            return;
        }

        let inputs = self.build_inputs(world, sim_time);
        let outputs: Vec<f32> = self.brain.forward(&inputs).to_vec();

        // Ground-contact strength curve: full strength with both endpoints
        // planted, reduced strength in the air (no free air-time momentum)
        let muscles: Vec<_> = self.morphology.muscles().copied().collect();
        let amplitude = self.config.range * self.config.strength;

        self.prev_signals.copy_from_slice(&self.signals);

        let energy_mult = match &self.config.energy {
            Some(cfg) => {
                let level = mean_abs(&self.signals);
                self.energy = (self.energy - cfg.cost_per_sec * level * dt
                    + cfg.regen_per_sec * dt)
                    .clamp(0.0, cfg.capacity);
                let fraction = self.energy / cfg.capacity;
                self.tracker.set_energy(fraction);
                cfg.depleted_strength + (1.0 - cfg.depleted_strength) * fraction
            }
            None => 1.0,
        };

        let joints = self.body.muscle_joints.clone();
        for (i, muscle) in joints.iter().enumerate() {
            let raw = outputs.get(i).copied().unwrap_or(0.0);
            self.signals[i] += (raw - self.signals[i]) * self.config.smoothing;

            let grounded_ends = [muscles[i].a, muscles[i].b]
                .iter()
                .filter(|&&n| self.node_grounded(world, n))
                .count();
            let contact_mult = self.config.airborne_strength
                + (1.0 - self.config.airborne_strength) * (grounded_ends as f32 / 2.0);

            let rest = muscle.rest_length;
            let offset = self.signals[i] * amplitude * rest * contact_mult * energy_mult;
            let desired = rest + offset;

            // Rate limit: no impulsive teleport actuation
            let max_delta = rest * self.config.move_speed;
            let delta = (desired - self.targets[i]).clamp(-max_delta, max_delta);
            self.targets[i] += delta;

            world.set_muscle_target(muscle, self.targets[i]);
        }
    }

    /// Accumulate one physics tick of telemetry
    pub fn sample_fitness(&mut self, world: &PhysicsWorld, dt: f32) {
        let center = self.center(world);
        let n = self.body.node_bodies.len().max(1) as f32;

        let mut avg_abs_vy = 0.0;
        let mut avg_abs_spin = 0.0;
        let mut min_y = f32::MAX;
        let mut max_y = f32::MIN;
        let mut grounded = 0usize;
        let mut grounded_abs_vx = 0.0;

        for (i, &handle) in self.body.node_bodies.iter().enumerate() {
            let pos = world.body_position(handle).unwrap_or(center);
            let vel = world.body_linvel(handle).unwrap_or(Vec2::ZERO);
            let spin = world.body_angvel(handle).unwrap_or(0.0);

            avg_abs_vy += vel.y.abs();
            avg_abs_spin += spin.abs();
            min_y = min_y.min(pos.y);
            max_y = max_y.max(pos.y);

            if self.node_grounded(world, i) {
                grounded += 1;
                grounded_abs_vx += vel.x.abs();
            }
        }

        let jerk = self
            .signals
            .iter()
            .zip(self.prev_signals.iter())
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / self.signals.len().max(1) as f32;

        let sample = TickSample {
            center,
            avg_abs_vy: avg_abs_vy / n,
            height_spread: (max_y - min_y).max(0.0),
            avg_abs_spin: avg_abs_spin / n,
            grounded_fraction: grounded as f32 / n,
            grounded_abs_vx: if grounded > 0 {
                grounded_abs_vx / grounded as f32
            } else {
                0.0
            },
            actuation_level: mean_abs(&self.signals),
            actuation_jerk: jerk,
        };
        self.tracker.record(&sample, dt);
    }

    /// Read-only telemetry snapshot
    pub fn stats(&self) -> FitnessStats {
        self.tracker.snapshot()
    }
}

fn mean_abs(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v.abs()).sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> FitnessTracker {
        // extent 40 -> stumble height at y=10
        FitnessTracker::new(Vec2::new(0.0, 40.0), 40.0, 0.0, 120.0)
    }

    fn sample_at(x: f32, y: f32) -> TickSample {
        TickSample {
            center: Vec2::new(x, y),
            ..Default::default()
        }
    }

    #[test]
    fn test_stumble_edge_triggered_once_per_dip() {
        let mut t = tracker();
        let heights = [40.0, 30.0, 8.0, 5.0, 7.0, 20.0, 40.0];
        for &y in &heights {
            t.record(&sample_at(0.0, y), 1.0 / 60.0);
        }
        // Three ticks below threshold, one dip, one stumble
        assert_eq!(t.snapshot().stumbles, 1);
    }

    #[test]
    fn test_two_dips_count_twice() {
        let mut t = tracker();
        for &y in &[40.0, 5.0, 40.0, 5.0, 40.0] {
            t.record(&sample_at(0.0, y), 1.0 / 60.0);
        }
        assert_eq!(t.snapshot().stumbles, 2);
    }

    #[test]
    fn test_max_forward_tracks_peak_not_final() {
        let mut t = tracker();
        for &x in &[0.0, 50.0, 120.0, 80.0, 30.0] {
            t.record(&sample_at(x, 40.0), 1.0 / 60.0);
        }
        let stats = t.snapshot();
        assert!((stats.max_forward - 120.0).abs() < 1e-4);
        assert!((stats.displacement - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_smoothing_coefficients() {
        let mut t = tracker();
        let mut sample = sample_at(0.0, 40.0);
        sample.avg_abs_spin = 2.0;
        t.record(&sample, 1.0 / 60.0);
        // First sample: 0*0.9 + 2.0*0.1
        assert!((t.snapshot().spin - 0.2).abs() < 1e-6);
        t.record(&sample, 1.0 / 60.0);
        assert!((t.snapshot().spin - (0.2 * 0.9 + 0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_clamps_ratios() {
        let mut t = tracker();
        t.set_energy(3.5);
        let stats = t.snapshot();
        assert!(stats.energy <= 1.0);
    }

    #[test]
    fn test_zero_dt_sample_ignored() {
        let mut t = tracker();
        t.record(&sample_at(100.0, 5.0), 0.0);
        let stats = t.snapshot();
        assert_eq!(stats.stumbles, 0);
        assert_eq!(stats.max_forward, 0.0);
    }

    mod live {
        use super::*;
        use crate::config::{ActuationConfig, WorldSettings};
        use crate::genome::{Architecture, Genome};
        use rand::SeedableRng;
        use rand_xoshiro::Xoshiro256StarStar;

        fn spawn_controller(world: &mut PhysicsWorld) -> CreatureController {
            let morphology = Morphology::test_hopper();
            let mut rng = Xoshiro256StarStar::seed_from_u64(1);
            let genome = Genome::random(Architecture::default(), morphology.network_io(), &mut rng);
            let spawn = Vec2::new(0.0, 60.0);
            let body = world.spawn_creature(1, &morphology, spawn);
            CreatureController::new(
                genome,
                &morphology,
                body,
                &ActuationConfig::default(),
                spawn,
                world.ground_height(),
            )
            .unwrap()
        }

        #[test]
        fn test_input_vector_has_derived_length() {
            let mut world = PhysicsWorld::new(&WorldSettings::default());
            let creature = spawn_controller(&mut world);
            let inputs = creature.build_inputs(&world, 0.0);
            assert_eq!(inputs.len(), 3 * 5 + 4);
            for v in &inputs {
                assert!(v.is_finite());
            }
        }

        #[test]
        fn test_update_and_sample_run_clean() {
            let mut world = PhysicsWorld::new(&WorldSettings::default());
            let mut creature = spawn_controller(&mut world);
            let dt = 1.0 / 60.0;
            for tick in 0..120 {
                creature.update(&mut world, tick as f32 * dt, dt);
                world.step(dt);
                creature.sample_fitness(&world, dt);
            }
            let stats = creature.stats();
            assert!(stats.speed.is_finite());
            assert!(stats.max_forward >= stats.displacement.min(0.0));
        }

        #[test]
        fn test_wrong_genome_size_rejected() {
            let mut world = PhysicsWorld::new(&WorldSettings::default());
            let morphology = Morphology::test_hopper();
            let genome = Genome {
                weights: vec![0.0; 3],
                architecture: Architecture::default(),
            };
            let spawn = Vec2::new(0.0, 60.0);
            let body = world.spawn_creature(2, &morphology, spawn);
            let result = CreatureController::new(
                genome,
                &morphology,
                body,
                &ActuationConfig::default(),
                spawn,
                world.ground_height(),
            );
            assert!(matches!(
                result,
                Err(EvogaitError::WeightCountMismatch { .. })
            ));
        }
    }
}
