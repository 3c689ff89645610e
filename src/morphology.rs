//! Creature morphology: node layout and typed links
//!
//! A morphology is the fixed body plan shared by every creature in one run.
//! The external designer supplies it; this module validates it and derives the
//! controller's input/output dimensionality from it.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::EvogaitError;
use crate::genome::NetworkIo;

/// Sensor features per body node (rel position, velocity, ground contact)
pub const FEATURES_PER_NODE: usize = 5;
/// Global sensor features appended after the per-node block
pub const GLOBAL_FEATURES: usize = 4;

/// One body node: a circular rigid body in the plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodePlan {
    pub position: Vec2,
    pub radius: f32,
    /// Fixed nodes are pinned in place (kinematic anchors)
    pub fixed: bool,
}

impl NodePlan {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            radius,
            fixed: false,
        }
    }
}

/// Link type between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    /// Rigid fixed-length connection
    Bone,
    /// Actuated connection whose target length the controller drives
    Muscle,
}

/// A link between two node indices
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkPlan {
    pub a: usize,
    pub b: usize,
    pub kind: LinkKind,
}

impl LinkPlan {
    pub fn bone(a: usize, b: usize) -> Self {
        Self {
            a,
            b,
            kind: LinkKind::Bone,
        }
    }

    pub fn muscle(a: usize, b: usize) -> Self {
        Self {
            a,
            b,
            kind: LinkKind::Muscle,
        }
    }
}

/// Fixed node/bone/muscle topology shared by all creatures in one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Morphology {
    pub nodes: Vec<NodePlan>,
    pub links: Vec<LinkPlan>,
}

impl Morphology {
    /// Check the plan is simulable: at least 2 nodes, 1 bone, 1 muscle,
    /// all link indices in range, no self-links.
    pub fn validate(&self) -> Result<(), EvogaitError> {
        if self.nodes.len() < 2 {
            return Err(EvogaitError::InvalidMorphology(format!(
                "need at least 2 nodes, got {}",
                self.nodes.len()
            )));
        }
        for (i, link) in self.links.iter().enumerate() {
            if link.a >= self.nodes.len() || link.b >= self.nodes.len() {
                return Err(EvogaitError::InvalidMorphology(format!(
                    "link {} references node out of range ({}, {})",
                    i, link.a, link.b
                )));
            }
            if link.a == link.b {
                return Err(EvogaitError::InvalidMorphology(format!(
                    "link {} connects node {} to itself",
                    i, link.a
                )));
            }
        }
        if self.bone_count() == 0 {
            return Err(EvogaitError::InvalidMorphology("no bones".into()));
        }
        if self.muscle_count() == 0 {
            return Err(EvogaitError::InvalidMorphology("no muscles".into()));
        }
        Ok(())
    }

    pub fn bone_count(&self) -> usize {
        self.links
            .iter()
            .filter(|l| l.kind == LinkKind::Bone)
            .count()
    }

    pub fn muscle_count(&self) -> usize {
        self.links
            .iter()
            .filter(|l| l.kind == LinkKind::Muscle)
            .count()
    }

    /// Muscles in declaration order; index order defines the output mapping
    pub fn muscles(&self) -> impl Iterator<Item = &LinkPlan> {
        self.links.iter().filter(|l| l.kind == LinkKind::Muscle)
    }

    pub fn bones(&self) -> impl Iterator<Item = &LinkPlan> {
        self.links.iter().filter(|l| l.kind == LinkKind::Bone)
    }

    /// Network input dimension: five features per node plus four globals
    pub fn input_count(&self) -> usize {
        self.nodes.len() * FEATURES_PER_NODE + GLOBAL_FEATURES
    }

    /// Network output dimension: one motor command per muscle
    pub fn output_count(&self) -> usize {
        self.muscle_count()
    }

    pub fn network_io(&self) -> NetworkIo {
        NetworkIo {
            inputs: self.input_count(),
            outputs: self.output_count(),
        }
    }

    /// Maximum pairwise node distance, used to span-normalize sensor positions
    pub fn max_extent(&self) -> f32 {
        let mut max = 0.0f32;
        for i in 0..self.nodes.len() {
            for j in (i + 1)..self.nodes.len() {
                max = max.max(self.nodes[i].position.distance(self.nodes[j].position));
            }
        }
        max.max(1.0)
    }

    /// Rest length of a link from the plan positions
    pub fn rest_length(&self, link: &LinkPlan) -> f32 {
        self.nodes[link.a]
            .position
            .distance(self.nodes[link.b].position)
    }

    /// Minimal one-legged hopper: body triangle over a foot, one muscle
    pub fn test_hopper() -> Self {
        Self {
            nodes: vec![
                NodePlan::new(0.0, 30.0, 6.0),
                NodePlan::new(20.0, 30.0, 6.0),
                NodePlan::new(10.0, 0.0, 5.0),
            ],
            links: vec![
                LinkPlan::bone(0, 1),
                LinkPlan::bone(0, 2),
                LinkPlan::muscle(1, 2),
            ],
        }
    }

    /// Two-legged walker: torso bar with two jointed legs
    pub fn test_walker() -> Self {
        Self {
            nodes: vec![
                NodePlan::new(0.0, 40.0, 7.0),
                NodePlan::new(30.0, 40.0, 7.0),
                NodePlan::new(0.0, 20.0, 5.0),
                NodePlan::new(30.0, 20.0, 5.0),
                NodePlan::new(5.0, 0.0, 5.0),
                NodePlan::new(25.0, 0.0, 5.0),
            ],
            links: vec![
                LinkPlan::bone(0, 1),
                LinkPlan::bone(0, 2),
                LinkPlan::bone(1, 3),
                LinkPlan::muscle(2, 4),
                LinkPlan::muscle(3, 5),
                LinkPlan::muscle(0, 3),
                LinkPlan::muscle(1, 2),
            ],
        }
    }
}
