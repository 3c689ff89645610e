//! Neuroevolution of articulated 2-D ragdoll walkers
//!
//! Populations of jointed creatures, each driven by a small feed-forward
//! network, evolve toward forward locomotion under rigid-body physics.
//! The crate is headless: a host owns the loop and calls
//! [`GenerationScheduler::step`] once per frame; rendering, UI and storage
//! stay outside, behind [`persistence::BrainStore`] and the returned
//! [`FrameResult`] telemetry.
//!
//! ```no_run
//! use evogait::{GenerationScheduler, Morphology, SimulationConfig};
//!
//! let mut scheduler = GenerationScheduler::new(SimulationConfig::default());
//! scheduler.start(&Morphology::test_walker()).unwrap();
//! loop {
//!     let frame = scheduler.step(1.0 / 60.0);
//!     if let Some(record) = frame.generation_ended {
//!         println!("gen {} best {:.2}m", record.generation, record.gen_best);
//!     }
//! }
//! ```

pub mod config;
pub mod creature;
pub mod error;
pub mod evolution;
pub mod genome;
pub mod morphology;
pub mod neural;
pub mod persistence;
pub mod physics;
pub mod scheduler;
pub mod scoring;

pub use config::{
    ActuationConfig, EnergyConfig, EpisodeSettings, EvolutionSettings, ScoringWeights,
    SimulationConfig, WorldSettings,
};
pub use creature::{CreatureController, FitnessStats};
pub use error::EvogaitError;
pub use evolution::{evolve, EvolveParams, ScoredGenome};
pub use genome::{Architecture, Genome, NetworkIo};
pub use morphology::{LinkKind, LinkPlan, Morphology, NodePlan};
pub use neural::NeuralController;
pub use persistence::{export_brain, import_brain, BrainExport, BrainStore, MemoryBrainStore};
pub use physics::PhysicsWorld;
pub use scheduler::{Champion, FrameResult, GenerationRecord, GenerationScheduler, RunState};
pub use scoring::score;
