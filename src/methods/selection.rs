//! Parent selection strategies.
//!
//! All strategies operate on a score slice sorted in descending order and
//! return an index into it. Sorting is the caller's responsibility; the
//! population loops keep their genomes sorted between scoring and breeding.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("cannot select from an empty pool")]
    EmptyPool,
    #[error("tournament size {size} exceeds pool size {pool}")]
    TournamentTooLarge { size: usize, pool: usize },
}

/// Strategy for picking breeding parents from a scored population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Selection {
    /// Roulette-wheel selection. Negative scores are shifted so the worst
    /// genome has weight zero.
    FitnessProportionate,
    /// Rank-skewed selection: `floor(r^power * len)` over the sorted pool.
    Power { power: f64 },
    /// Pick `size` at random, then walk them best-first accepting each with
    /// `probability`.
    Tournament { size: usize, probability: f64 },
}

impl Selection {
    pub fn power() -> Self {
        Selection::Power { power: 4.0 }
    }

    pub fn tournament() -> Self {
        Selection::Tournament { size: 5, probability: 0.5 }
    }

    /// Select an index into `scores`, which must be sorted descending.
    pub fn select(&self, scores: &[f64], rng: &mut StdRng) -> Result<usize, SelectionError> {
        if scores.is_empty() {
            return Err(SelectionError::EmptyPool);
        }
        match *self {
            Selection::FitnessProportionate => {
                let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
                let shift = if min < 0.0 { -min } else { 0.0 };
                let total: f64 = scores.iter().map(|s| s + shift).sum();
                if total <= 0.0 {
                    return Ok(rng.gen_range(0..scores.len()));
                }
                let mut spin = rng.gen_range(0.0..total);
                for (i, s) in scores.iter().enumerate() {
                    spin -= s + shift;
                    if spin < 0.0 {
                        return Ok(i);
                    }
                }
                Ok(scores.len() - 1)
            }
            Selection::Power { power } => {
                let r: f64 = rng.gen_range(0.0..1.0);
                Ok(((r.powf(power)) * scores.len() as f64) as usize)
            }
            Selection::Tournament { size, probability } => {
                if size > scores.len() {
                    return Err(SelectionError::TournamentTooLarge {
                        size,
                        pool: scores.len(),
                    });
                }
                let mut picks: Vec<usize> =
                    (0..size).map(|_| rng.gen_range(0..scores.len())).collect();
                // lower index = higher score in a descending pool
                picks.sort_unstable();
                for (nth, &idx) in picks.iter().enumerate() {
                    if nth == size - 1 || rng.gen_bool(probability) {
                        return Ok(idx);
                    }
                }
                unreachable!("tournament always yields its last contender")
            }
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Selection::FitnessProportionate
    }
}
