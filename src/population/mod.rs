//! Evolutionary loops over network genomes.
//!
//! Two drivers are provided: [`Population`], a flat generational loop with
//! elitism and provenance slots, and [`NeatPopulation`], which speciates the
//! population by compatibility distance and reproduces species in proportion
//! to their shared fitness.
//!
//! Scoring is two-phase: [`Population::begin_scoring`] evaluates every
//! genome (in parallel for dataset scoring) and returns a [`PendingScores`]
//! batch, [`Population::apply_scores`] commits it. Callers that score
//! externally can skip both and write `network.score` themselves.

mod flat;
mod neat;
mod species;

pub use flat::Population;
pub use neat::NeatPopulation;
pub use species::Species;

use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use thiserror::Error;

use crate::graph::{Network, NetworkError, TrainError};
use crate::methods::{Loss, SelectionError};
use crate::schema::{EvolveConfigError, Sample};

#[derive(Debug, Error)]
pub enum EvolveError {
    #[error("no fitness function or dataset configured")]
    MissingFitnessSource,
    #[error("cannot breed: {0} genomes are unscored")]
    UnscoredGenomes(usize),
    #[error("evolve requires a positive iteration count or a target fitness")]
    NoStoppingCondition,
    #[error("every species died out")]
    NoSpecies,
    #[error(transparent)]
    Config(#[from] EvolveConfigError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Train(#[from] TrainError),
}

/// Scores produced by [`Population::begin_scoring`], not yet written to the
/// genomes.
#[derive(Debug)]
pub struct PendingScores {
    pub(crate) scores: Vec<f64>,
}

impl PendingScores {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }
}

/// Where fitness comes from.
pub(crate) enum FitnessSource {
    /// Arbitrary scoring function, higher is better.
    Function(Box<dyn Fn(&mut Network) -> f64 + Send + Sync>),
    /// Negated mean loss over a dataset.
    Dataset { samples: Vec<Sample>, loss: Loss },
}

pub(crate) fn seed_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Evaluate every genome against the fitness source. Dataset scoring runs in
/// parallel with one derived RNG per genome so results do not depend on
/// thread scheduling.
pub(crate) fn compute_scores(
    networks: &mut [Network],
    source: &FitnessSource,
    clear: bool,
    rng: &mut StdRng,
) -> Result<Vec<f64>, EvolveError> {
    match source {
        FitnessSource::Function(fitness) => Ok(networks
            .par_iter_mut()
            .map(|net| {
                if clear {
                    net.clear();
                }
                fitness(net)
            })
            .collect()),
        FitnessSource::Dataset { samples, loss } => {
            let seeds: Vec<u64> = networks.iter().map(|_| rng.next_u64()).collect();
            networks
                .par_iter_mut()
                .zip(seeds)
                .map(|(net, seed)| {
                    let mut child_rng = StdRng::seed_from_u64(seed);
                    if clear {
                        net.clear();
                    }
                    let loss_value = net.test(samples, *loss, 0.0, &mut child_rng)?;
                    Ok(-loss_value)
                })
                .collect()
        }
    }
}
