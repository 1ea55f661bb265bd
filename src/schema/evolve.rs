//! Evolution configuration with serde defaults and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::methods::{Activation, Mutation, Selection};

#[derive(Debug, Error, PartialEq)]
pub enum EvolveConfigError {
    #[error("input_size must be at least 1")]
    ZeroInputs,
    #[error("output_size must be at least 1")]
    ZeroOutputs,
    #[error("population_size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("elitism ({elitism}) plus provenance ({provenance}) exceeds population size ({population_size})")]
    EliteOverflow { elitism: usize, provenance: usize, population_size: usize },
    #[error("mutation_rate must be within [0, 1], got {0}")]
    MutationRateRange(f64),
    #[error("distance_threshold must be positive, got {0}")]
    NonPositiveThreshold(f64),
    #[error("survivor_rate must be within (0, 1], got {0}")]
    SurvivorRateRange(f64),
}

fn default_population_size() -> usize {
    50
}

fn default_iterations() -> usize {
    100
}

fn default_elitism() -> usize {
    2
}

fn default_mutation_rate() -> f64 {
    0.6
}

fn default_mutation_amount() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_mutations() -> Vec<Mutation> {
    Mutation::feedforward()
}

fn default_activations() -> Vec<Activation> {
    Activation::ALL.to_vec()
}

/// Settings shared by the flat and speciated population loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolveConfig {
    pub input_size: usize,
    pub output_size: usize,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Generations to run; 0 means until target fitness.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default)]
    pub target_fitness: Option<f64>,
    /// Top genomes copied unchanged into the next generation.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Slots refilled each generation with copies of the seed template.
    #[serde(default)]
    pub provenance: usize,
    /// Probability that a non-elite genome mutates at all.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Operators applied when a genome does mutate.
    #[serde(default = "default_mutation_amount")]
    pub mutation_amount: usize,
    /// Treat parents as equally fit during crossover.
    #[serde(default = "default_true")]
    pub equal_crossover: bool,
    /// Reset network state before dataset scoring, for recurrent genomes.
    #[serde(default)]
    pub clear_on_evaluate: bool,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default = "default_mutations")]
    pub mutations: Vec<Mutation>,
    #[serde(default = "default_activations")]
    pub activations: Vec<Activation>,
    #[serde(default)]
    pub max_nodes: Option<usize>,
    #[serde(default)]
    pub max_connections: Option<usize>,
    #[serde(default)]
    pub max_gates: Option<usize>,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl EvolveConfig {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        EvolveConfig {
            input_size,
            output_size,
            population_size: default_population_size(),
            iterations: default_iterations(),
            target_fitness: None,
            elitism: default_elitism(),
            provenance: 0,
            mutation_rate: default_mutation_rate(),
            mutation_amount: default_mutation_amount(),
            equal_crossover: true,
            clear_on_evaluate: false,
            selection: Selection::default(),
            mutations: default_mutations(),
            activations: default_activations(),
            max_nodes: None,
            max_connections: None,
            max_gates: None,
            random_seed: None,
        }
    }

    pub fn validate(&self) -> Result<(), EvolveConfigError> {
        if self.input_size == 0 {
            return Err(EvolveConfigError::ZeroInputs);
        }
        if self.output_size == 0 {
            return Err(EvolveConfigError::ZeroOutputs);
        }
        if self.population_size < 2 {
            return Err(EvolveConfigError::PopulationTooSmall(self.population_size));
        }
        if self.elitism + self.provenance > self.population_size {
            return Err(EvolveConfigError::EliteOverflow {
                elitism: self.elitism,
                provenance: self.provenance,
                population_size: self.population_size,
            });
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(EvolveConfigError::MutationRateRange(self.mutation_rate));
        }
        Ok(())
    }
}

fn default_coefficient() -> f64 {
    1.0
}

fn default_distance_threshold() -> f64 {
    2.0
}

fn default_survivor_rate() -> f64 {
    0.5
}

fn default_stagnation_limit() -> usize {
    15
}

/// Speciation parameters for the NEAT loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciationConfig {
    /// Excess gene coefficient.
    #[serde(default = "default_coefficient")]
    pub c1: f64,
    /// Disjoint gene coefficient.
    #[serde(default = "default_coefficient")]
    pub c2: f64,
    /// Weight difference coefficient.
    #[serde(default = "default_coefficient")]
    pub c3: f64,
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    /// Fraction of each species kept after culling.
    #[serde(default = "default_survivor_rate")]
    pub survivor_rate: f64,
    /// Generations a species may go without improving.
    #[serde(default = "default_stagnation_limit")]
    pub species_stagnation_limit: usize,
    /// Generations the whole population may go without improving.
    #[serde(default = "default_stagnation_limit")]
    pub population_stagnation_limit: usize,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        SpeciationConfig {
            c1: 1.0,
            c2: 1.0,
            c3: 1.0,
            distance_threshold: default_distance_threshold(),
            survivor_rate: default_survivor_rate(),
            species_stagnation_limit: default_stagnation_limit(),
            population_stagnation_limit: default_stagnation_limit(),
        }
    }
}

impl SpeciationConfig {
    pub fn validate(&self) -> Result<(), EvolveConfigError> {
        if self.distance_threshold <= 0.0 {
            return Err(EvolveConfigError::NonPositiveThreshold(self.distance_threshold));
        }
        if !(self.survivor_rate > 0.0 && self.survivor_rate <= 1.0) {
            return Err(EvolveConfigError::SurvivorRateRange(self.survivor_rate));
        }
        Ok(())
    }
}

/// Full configuration of the speciated loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatConfig {
    #[serde(flatten)]
    pub base: EvolveConfig,
    #[serde(default)]
    pub speciation: SpeciationConfig,
}

impl NeatConfig {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        NeatConfig {
            base: EvolveConfig::new(input_size, output_size),
            speciation: SpeciationConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), EvolveConfigError> {
        self.base.validate()?;
        self.speciation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(EvolveConfig::new(2, 1).validate(), Ok(()));
        assert_eq!(NeatConfig::new(2, 1).validate(), Ok(()));
    }

    #[test]
    fn elite_overflow_is_rejected() {
        let mut config = EvolveConfig::new(2, 1);
        config.population_size = 10;
        config.elitism = 8;
        config.provenance = 3;
        assert_eq!(
            config.validate(),
            Err(EvolveConfigError::EliteOverflow {
                elitism: 8,
                provenance: 3,
                population_size: 10
            })
        );
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert_eq!(EvolveConfig::new(0, 1).validate(), Err(EvolveConfigError::ZeroInputs));
        assert_eq!(EvolveConfig::new(1, 0).validate(), Err(EvolveConfigError::ZeroOutputs));
    }

    #[test]
    fn mutation_rate_bounds() {
        let mut config = EvolveConfig::new(2, 1);
        config.mutation_rate = 1.5;
        assert_eq!(config.validate(), Err(EvolveConfigError::MutationRateRange(1.5)));
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let config: EvolveConfig =
            serde_json::from_str(r#"{"input_size": 3, "output_size": 2}"#).unwrap();
        assert_eq!(config.population_size, 50);
        assert_eq!(config.elitism, 2);
        assert_eq!(config.mutations.len(), 8);
        assert!(config.equal_crossover);
    }

    #[test]
    fn neat_json_roundtrip() {
        let config = NeatConfig::new(4, 2);
        let json = serde_json::to_string(&config).unwrap();
        let back: NeatConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base.input_size, 4);
        assert_eq!(back.speciation.distance_threshold, 2.0);
    }

    #[test]
    fn speciation_bounds() {
        let mut speciation = SpeciationConfig::default();
        speciation.survivor_rate = 0.0;
        assert_eq!(
            speciation.validate(),
            Err(EvolveConfigError::SurvivorRateRange(0.0))
        );
    }
}
