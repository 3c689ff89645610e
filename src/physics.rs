//! Rigid body physics for creature evaluation arenas
//!
//! Wraps rapier2d behind the small surface the evolution core needs: spawn a
//! creature from a morphology, drive muscle targets, query body state, step,
//! and tear the creature down. Different creatures never collide with each
//! other; the ground collides with everything; directly-jointed node pairs of
//! one creature have contacts disabled on the joint.

use ahash::AHashMap;
use glam::Vec2;
use rapier2d::prelude::*;

use crate::config::WorldSettings;
use crate::morphology::{LinkKind, Morphology};

/// Collider user_data value reserved for world geometry
const WORLD_TAG: u128 = 0;

/// Position-motor gains for muscle joints
const MUSCLE_STIFFNESS: f32 = 5.0e4;
const MUSCLE_DAMPING: f32 = 1.0e3;

/// One actuated joint of a spawned creature
#[derive(Debug, Clone, Copy)]
pub struct MuscleJoint {
    pub handle: ImpulseJointHandle,
    /// Length at spawn; the controller's targets are offsets from this
    pub rest_length: f32,
}

/// Handles for one spawned creature's physics composite
#[derive(Debug, Clone)]
pub struct CreatureBody {
    pub id: u64,
    pub node_bodies: Vec<RigidBodyHandle>,
    pub node_colliders: Vec<ColliderHandle>,
    pub bone_joints: Vec<ImpulseJointHandle>,
    pub muscle_joints: Vec<MuscleJoint>,
}

/// Contact filter keyed on collider user_data (creature id, 0 = world).
///
/// Bodies of different creatures pass through each other so a whole
/// population can be evaluated in one arena; unconnected bodies of the same
/// creature still collide (prevents self-intersection folding).
struct CreatureFilter;

impl PhysicsHooks for CreatureFilter {
    fn filter_contact_pair(&self, context: &PairFilterContext) -> Option<SolverFlags> {
        let a = context.colliders[context.collider1].user_data;
        let b = context.colliders[context.collider2].user_data;
        if a != WORLD_TAG && b != WORLD_TAG && a != b {
            return None;
        }
        Some(SolverFlags::COMPUTE_IMPULSES)
    }
}

/// Manages the rapier2d physics world for one simulation run
pub struct PhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    gravity: Vector<f32>,
    settings: WorldSettings,
    creatures: AHashMap<u64, CreatureBody>,
}

impl PhysicsWorld {
    pub fn new(settings: &WorldSettings) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: 1.0 / 60.0,
            ..Default::default()
        };

        let mut collider_set = ColliderSet::new();

        // Static ground plane: wide enough that no walker reaches the edge
        let ground_half_width = 50_000.0;
        let ground_half_height = 50.0;
        let ground = ColliderBuilder::cuboid(ground_half_width, ground_half_height)
            .translation(vector![0.0, settings.ground_height - ground_half_height])
            .friction(settings.ground_friction)
            .restitution(0.0)
            .user_data(WORLD_TAG)
            .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
            .build();
        collider_set.insert(ground);

        log::debug!(
            "Physics: created ground plane at y={} (width {})",
            settings.ground_height,
            ground_half_width * 2.0
        );

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set,
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            gravity: vector![0.0, -settings.gravity],
            settings: settings.clone(),
            creatures: AHashMap::new(),
        }
    }

    /// Instantiate a creature's physics composite from its morphology.
    ///
    /// `id` must be nonzero and unique per live creature; it tags every
    /// collider for the contact filter. Node positions are offset by `spawn`.
    pub fn spawn_creature(
        &mut self,
        id: u64,
        morphology: &Morphology,
        spawn: Vec2,
    ) -> CreatureBody {
        debug_assert!(id != 0, "creature id 0 is reserved for world geometry");

        let mut node_bodies = Vec::with_capacity(morphology.nodes.len());
        let mut node_colliders = Vec::with_capacity(morphology.nodes.len());

        for node in &morphology.nodes {
            let pos = spawn + node.position;
            let builder = if node.fixed {
                RigidBodyBuilder::fixed()
            } else {
                RigidBodyBuilder::dynamic()
            };
            let body = builder.translation(vector![pos.x, pos.y]).build();
            let body_handle = self.rigid_body_set.insert(body);

            let collider = ColliderBuilder::ball(node.radius)
                .density(self.settings.node_density)
                .friction(self.settings.node_friction)
                .restitution(0.0)
                .user_data(id as u128)
                .active_hooks(ActiveHooks::FILTER_CONTACT_PAIRS)
                .build();
            let collider_handle = self.collider_set.insert_with_parent(
                collider,
                body_handle,
                &mut self.rigid_body_set,
            );

            node_bodies.push(body_handle);
            node_colliders.push(collider_handle);
        }

        let mut bone_joints = Vec::new();
        let mut muscle_joints = Vec::new();

        for link in &morphology.links {
            let rest_length = morphology.rest_length(link);
            let axis = link_axis(morphology, link.a, link.b);

            let joint = match link.kind {
                // Rigid rod: perpendicular translation locked, length pinned
                // by equal limits, relative rotation left free
                LinkKind::Bone => GenericJointBuilder::new(JointAxesMask::Y)
                    .local_axis1(axis)
                    .local_axis2(axis)
                    .local_anchor1(point![0.0, 0.0])
                    .local_anchor2(point![0.0, 0.0])
                    .limits(JointAxis::X, [rest_length, rest_length])
                    .contacts_enabled(false)
                    .build(),
                // Actuated rod: position motor drives the length along the
                // joint axis, limits keep it from collapsing or exploding
                LinkKind::Muscle => GenericJointBuilder::new(JointAxesMask::Y)
                    .local_axis1(axis)
                    .local_axis2(axis)
                    .local_anchor1(point![0.0, 0.0])
                    .local_anchor2(point![0.0, 0.0])
                    .limits(JointAxis::X, [rest_length * 0.1, rest_length * 2.0])
                    .motor_position(
                        JointAxis::X,
                        rest_length,
                        MUSCLE_STIFFNESS,
                        MUSCLE_DAMPING,
                    )
                    .contacts_enabled(false)
                    .build(),
            };

            let handle = self.impulse_joint_set.insert(
                node_bodies[link.a],
                node_bodies[link.b],
                joint,
                true,
            );
            match link.kind {
                LinkKind::Bone => bone_joints.push(handle),
                LinkKind::Muscle => muscle_joints.push(MuscleJoint {
                    handle,
                    rest_length,
                }),
            }
        }

        log::debug!(
            "Physics: spawned creature {} ({} nodes, {} bones, {} muscles)",
            id,
            node_bodies.len(),
            bone_joints.len(),
            muscle_joints.len()
        );

        let body = CreatureBody {
            id,
            node_bodies,
            node_colliders,
            bone_joints,
            muscle_joints,
        };
        self.creatures.insert(id, body.clone());
        body
    }

    /// Update a muscle's position-motor target length
    pub fn set_muscle_target(&mut self, muscle: &MuscleJoint, target_length: f32) {
        if let Some(joint) = self.impulse_joint_set.get_mut(muscle.handle) {
            joint.data.set_motor_position(
                JointAxis::X,
                target_length,
                MUSCLE_STIFFNESS,
                MUSCLE_DAMPING,
            );
        }
    }

    /// Body center position
    pub fn body_position(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.rigid_body_set
            .get(handle)
            .map(|b| Vec2::new(b.translation().x, b.translation().y))
    }

    /// Body linear velocity
    pub fn body_linvel(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        self.rigid_body_set
            .get(handle)
            .map(|b| Vec2::new(b.linvel().x, b.linvel().y))
    }

    /// Body angular velocity in radians per second
    pub fn body_angvel(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.rigid_body_set.get(handle).map(|b| b.angvel())
    }

    /// Advance the simulation by one fixed step
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        let hooks = CreatureFilter;
        let event_handler = ();

        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &hooks,
            &event_handler,
        );
    }

    /// Release all bodies, colliders and joints of one creature
    pub fn remove_creature(&mut self, id: u64) {
        let Some(body) = self.creatures.remove(&id) else {
            return;
        };
        for handle in body.node_bodies {
            // Attached colliders and joints are removed with the body
            self.rigid_body_set.remove(
                handle,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        log::debug!("Physics: removed creature {}", id);
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    pub fn ground_height(&self) -> f32 {
        self.settings.ground_height
    }
}

/// Joint-frame x axis along the initial link direction (bodies spawn with
/// identity rotation, so plan space and local space coincide)
fn link_axis(morphology: &Morphology, a: usize, b: usize) -> UnitVector<f32> {
    let dir = morphology.nodes[b].position - morphology.nodes[a].position;
    let dir = if dir.length_squared() > 1e-12 {
        dir.normalize()
    } else {
        Vec2::X
    };
    UnitVector::new_normalize(vector![dir.x, dir.y])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldSettings;

    #[test]
    fn test_spawn_creates_expected_handles() {
        let mut world = PhysicsWorld::new(&WorldSettings::default());
        let morphology = Morphology::test_hopper();
        let body = world.spawn_creature(1, &morphology, Vec2::new(0.0, 60.0));

        assert_eq!(body.node_bodies.len(), 3);
        assert_eq!(body.bone_joints.len(), 2);
        assert_eq!(body.muscle_joints.len(), 1);
        assert_eq!(world.creature_count(), 1);
    }

    #[test]
    fn test_spawned_creature_falls_under_gravity() {
        let mut world = PhysicsWorld::new(&WorldSettings::default());
        let morphology = Morphology::test_hopper();
        let body = world.spawn_creature(1, &morphology, Vec2::new(0.0, 200.0));

        let before = world.body_position(body.node_bodies[0]).unwrap();
        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }
        let after = world.body_position(body.node_bodies[0]).unwrap();
        assert!(after.y < before.y);
    }

    #[test]
    fn test_ground_stops_falling() {
        let settings = WorldSettings::default();
        let mut world = PhysicsWorld::new(&settings);
        let morphology = Morphology::test_hopper();
        let body = world.spawn_creature(1, &morphology, Vec2::new(0.0, 40.0));

        for _ in 0..600 {
            world.step(1.0 / 60.0);
        }
        // Lowest node rests on or above the ground surface
        for (&handle, node) in body.node_bodies.iter().zip(&morphology.nodes) {
            let pos = world.body_position(handle).unwrap();
            assert!(
                pos.y + node.radius > settings.ground_height - 1.0,
                "node sank through ground: y={}",
                pos.y
            );
        }
    }

    #[test]
    fn test_remove_creature_clears_state() {
        let mut world = PhysicsWorld::new(&WorldSettings::default());
        let morphology = Morphology::test_hopper();
        let body = world.spawn_creature(1, &morphology, Vec2::new(0.0, 60.0));

        world.remove_creature(1);
        assert_eq!(world.creature_count(), 0);
        assert!(world.body_position(body.node_bodies[0]).is_none());

        // Stepping after removal must not panic
        world.step(1.0 / 60.0);
    }

    #[test]
    fn test_queries_on_unknown_handle_return_none() {
        let mut world = PhysicsWorld::new(&WorldSettings::default());
        let morphology = Morphology::test_hopper();
        let body = world.spawn_creature(7, &morphology, Vec2::ZERO);
        world.remove_creature(7);
        assert!(world.body_linvel(body.node_bodies[0]).is_none());
        assert!(world.body_angvel(body.node_bodies[0]).is_none());
    }
}
