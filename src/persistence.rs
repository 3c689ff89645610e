//! Brain export/import and the storage port
//!
//! Exported brains are versioned JSON documents. Import is lenient on
//! architecture (clamped into range) and strict on weight validity: any
//! non-numeric or non-finite dna entry rejects the whole payload before any
//! simulation state is touched. The core never talks to storage directly;
//! hosts implement `BrainStore` over whatever backend they have.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::EvogaitError;
use crate::genome::{Architecture, Genome};

/// Current export format version
pub const BRAIN_FORMAT_VERSION: u32 = 1;

/// Architecture clamp ranges applied on import (narrower than the evolution
/// ranges; imported brains come from unknown sources)
const IMPORT_HIDDEN_RANGE: (u32, u32) = (1, 3);
const IMPORT_NEURONS_RANGE: (u32, u32) = (4, 32);

/// Versioned, JSON-serializable brain record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrainExport {
    pub version: u32,
    pub created_at: String,
    pub generation: u32,
    pub distance: f32,
    pub fitness: f32,
    pub hidden_layers: u32,
    pub neurons_per_layer: u32,
    pub dna: Vec<f32>,
}

impl BrainExport {
    pub fn new(genome: &Genome, generation: u32, distance: f32, fitness: f32) -> Self {
        Self {
            version: BRAIN_FORMAT_VERSION,
            created_at: chrono::Utc::now().to_rfc3339(),
            generation,
            distance,
            fitness,
            hidden_layers: genome.architecture.hidden_layers,
            neurons_per_layer: genome.architecture.neurons_per_layer,
            dna: genome.weights.clone(),
        }
    }
}

/// Serialize a genome with its provenance to the JSON wire format
pub fn export_brain(
    genome: &Genome,
    generation: u32,
    distance: f32,
    fitness: f32,
) -> Result<String, EvogaitError> {
    let export = BrainExport::new(genome, generation, distance, fitness);
    Ok(serde_json::to_string(&export)?)
}

/// Lenient parse target: dna entries stay raw JSON values so numeric coercion
/// and finiteness are checked explicitly instead of panicking mid-deserialize
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportPayload {
    #[serde(default)]
    version: Option<u32>,
    hidden_layers: i64,
    neurons_per_layer: i64,
    dna: Vec<serde_json::Value>,
}

/// Parse a brain payload back into a genome.
///
/// Architecture fields are clamped into range; dna entries must all coerce to
/// finite numbers or the import fails with `InvalidGenomePayload`.
pub fn import_brain(json: &str) -> Result<Genome, EvogaitError> {
    let payload: ImportPayload = serde_json::from_str(json)
        .map_err(|e| EvogaitError::InvalidGenomePayload(e.to_string()))?;

    if let Some(version) = payload.version {
        if version > BRAIN_FORMAT_VERSION {
            return Err(EvogaitError::InvalidGenomePayload(format!(
                "unsupported format version {}",
                version
            )));
        }
    }
    if payload.dna.is_empty() {
        return Err(EvogaitError::InvalidGenomePayload("empty dna".into()));
    }

    let mut weights = Vec::with_capacity(payload.dna.len());
    for (i, value) in payload.dna.iter().enumerate() {
        let number = value.as_f64().ok_or_else(|| {
            EvogaitError::InvalidGenomePayload(format!("dna[{}] is not a number: {}", i, value))
        })?;
        let weight = number as f32;
        if !weight.is_finite() {
            return Err(EvogaitError::InvalidGenomePayload(format!(
                "dna[{}] is not finite",
                i
            )));
        }
        weights.push(weight);
    }

    let hidden = (payload.hidden_layers.max(0) as u32)
        .clamp(IMPORT_HIDDEN_RANGE.0, IMPORT_HIDDEN_RANGE.1);
    let neurons = (payload.neurons_per_layer.max(0) as u32)
        .clamp(IMPORT_NEURONS_RANGE.0, IMPORT_NEURONS_RANGE.1);
    if hidden as i64 != payload.hidden_layers || neurons as i64 != payload.neurons_per_layer {
        log::warn!(
            "Brain import: architecture clamped from ({}, {}) to ({}, {})",
            payload.hidden_layers,
            payload.neurons_per_layer,
            hidden,
            neurons
        );
    }

    Ok(Genome {
        weights,
        architecture: Architecture {
            hidden_layers: hidden,
            neurons_per_layer: neurons,
        },
    })
}

/// Storage port for saved brains. Hosts supply the backend; the in-memory
/// implementation backs tests and headless runs.
pub trait BrainStore {
    fn save(&mut self, name: &str, brain: &BrainExport) -> Result<(), EvogaitError>;
    fn load(&self, name: &str) -> Result<Option<BrainExport>, EvogaitError>;
    fn list(&self) -> Vec<String>;
    fn delete(&mut self, name: &str) -> bool;
}

/// Volatile store keyed by name
#[derive(Default)]
pub struct MemoryBrainStore {
    brains: AHashMap<String, BrainExport>,
}

impl MemoryBrainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BrainStore for MemoryBrainStore {
    fn save(&mut self, name: &str, brain: &BrainExport) -> Result<(), EvogaitError> {
        self.brains.insert(name.to_string(), brain.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<BrainExport>, EvogaitError> {
        Ok(self.brains.get(name).cloned())
    }

    fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.brains.keys().cloned().collect();
        names.sort();
        names
    }

    fn delete(&mut self, name: &str) -> bool {
        self.brains.remove(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::NetworkIo;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn sample_genome() -> Genome {
        let mut rng = Xoshiro256StarStar::seed_from_u64(9);
        Genome::random(
            Architecture {
                hidden_layers: 2,
                neurons_per_layer: 8,
            },
            NetworkIo {
                inputs: 19,
                outputs: 3,
            },
            &mut rng,
        )
    }

    #[test]
    fn test_export_import_round_trip() {
        let genome = sample_genome();
        let json = export_brain(&genome, 42, 3.5, 31.0).unwrap();
        let imported = import_brain(&json).unwrap();
        assert_eq!(imported.weights, genome.weights);
        assert_eq!(imported.architecture, genome.architecture);
    }

    #[test]
    fn test_export_carries_metadata() {
        let genome = sample_genome();
        let json = export_brain(&genome, 42, 3.5, 31.0).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["generation"], 42);
        assert_eq!(value["hiddenLayers"], 2);
        assert_eq!(value["neuronsPerLayer"], 8);
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn test_import_rejects_non_numeric_dna() {
        let json = r#"{"hiddenLayers":1,"neuronsPerLayer":8,"dna":[1,2,"x",4]}"#;
        assert!(matches!(
            import_brain(json),
            Err(EvogaitError::InvalidGenomePayload(_))
        ));
    }

    #[test]
    fn test_import_rejects_null_dna_entry() {
        let json = r#"{"hiddenLayers":1,"neuronsPerLayer":8,"dna":[1,null,3]}"#;
        assert!(import_brain(json).is_err());
    }

    #[test]
    fn test_import_rejects_malformed_json() {
        assert!(import_brain("not json at all").is_err());
        assert!(import_brain(r#"{"hiddenLayers":1}"#).is_err());
    }

    #[test]
    fn test_import_rejects_empty_dna() {
        let json = r#"{"hiddenLayers":1,"neuronsPerLayer":8,"dna":[]}"#;
        assert!(import_brain(json).is_err());
    }

    #[test]
    fn test_import_clamps_architecture() {
        let json = r#"{"hiddenLayers":9,"neuronsPerLayer":2,"dna":[0.1,0.2]}"#;
        let genome = import_brain(json).unwrap();
        assert_eq!(genome.architecture.hidden_layers, 3);
        assert_eq!(genome.architecture.neurons_per_layer, 4);

        let json = r#"{"hiddenLayers":0,"neuronsPerLayer":99,"dna":[0.1]}"#;
        let genome = import_brain(json).unwrap();
        assert_eq!(genome.architecture.hidden_layers, 1);
        assert_eq!(genome.architecture.neurons_per_layer, 32);
    }

    #[test]
    fn test_import_rejects_newer_version() {
        let json = r#"{"version":2,"hiddenLayers":1,"neuronsPerLayer":8,"dna":[0.1]}"#;
        assert!(import_brain(json).is_err());
    }

    #[test]
    fn test_memory_store_crud() {
        let mut store = MemoryBrainStore::new();
        let brain = BrainExport::new(&sample_genome(), 1, 2.0, 20.0);

        store.save("walker-a", &brain).unwrap();
        store.save("walker-b", &brain).unwrap();
        assert_eq!(store.list(), vec!["walker-a", "walker-b"]);
        assert!(store.load("walker-a").unwrap().is_some());
        assert!(store.load("missing").unwrap().is_none());
        assert!(store.delete("walker-a"));
        assert!(!store.delete("walker-a"));
        assert_eq!(store.list(), vec!["walker-b"]);
    }
}
