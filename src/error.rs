//! Error taxonomy for the evolution core
//!
//! All variants are expected, recoverable conditions the host surfaces to its
//! operator; none of them should ever abort the step loop.

use thiserror::Error;

/// Errors produced by the evolution core
#[derive(Debug, Error)]
pub enum EvogaitError {
    /// Morphology is too sparse to simulate (checked before a run starts)
    #[error("invalid morphology: {0}")]
    InvalidMorphology(String),

    /// Genome weight buffer length does not match the network's required size
    #[error("weight count mismatch: expected {expected}, got {actual}")]
    WeightCountMismatch { expected: usize, actual: usize },

    /// Malformed or non-finite brain import payload
    #[error("invalid genome payload: {0}")]
    InvalidGenomePayload(String),

    /// Brain export could not be serialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
