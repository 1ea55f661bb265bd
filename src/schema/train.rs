//! Options and records for supervised training.

use serde::{Deserialize, Serialize};

use crate::methods::{Loss, RatePolicy};

/// One input/target pair of a training or scoring dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
}

/// Options for a single forward pass.
#[derive(Debug, Clone, Copy)]
pub struct ActivateOptions {
    /// Maintain eligibility and extended traces. Disable for inference.
    pub trace: bool,
    /// Probability of masking a plain hidden node for this pass.
    pub dropout_rate: f64,
}

impl Default for ActivateOptions {
    fn default() -> Self {
        ActivateOptions { trace: true, dropout_rate: 0.0 }
    }
}

impl ActivateOptions {
    /// Inference: no trace bookkeeping, no dropout.
    pub fn inference() -> Self {
        ActivateOptions { trace: false, dropout_rate: 0.0 }
    }
}

/// Options for a single backward pass.
#[derive(Debug, Clone, Copy)]
pub struct PropagateOptions {
    pub rate: f64,
    pub momentum: f64,
    /// Apply accumulated deltas now. When false, deltas accumulate for a
    /// later batch-boundary update.
    pub update: bool,
}

impl Default for PropagateOptions {
    fn default() -> Self {
        PropagateOptions { rate: 0.3, momentum: 0.0, update: true }
    }
}

fn default_iterations() -> usize {
    0
}

fn default_rate_policy() -> RatePolicy {
    RatePolicy::default()
}

fn default_batch_size() -> usize {
    0
}

/// Options for [`Network::train`](crate::graph::Network::train).
///
/// `iterations == 0` means unbounded and `target_error == 0` means no error
/// target; at least one of the two must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOptions {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default)]
    pub target_error: f64,
    #[serde(default = "default_rate_policy")]
    pub rate_policy: RatePolicy,
    #[serde(default)]
    pub momentum: f64,
    /// Samples per weight update; 0 means full batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dropout: f64,
    #[serde(default)]
    pub loss: Loss,
    #[serde(default)]
    pub shuffle: bool,
    /// Reset network state between iterations, for recurrent genomes.
    #[serde(default)]
    pub clear: bool,
    /// Fraction of the dataset held out; error is then measured on it.
    #[serde(default)]
    pub cross_validate_fraction: f64,
    /// Log progress every N iterations; 0 disables.
    #[serde(default)]
    pub log_every: usize,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        TrainOptions {
            iterations: 0,
            target_error: 0.0,
            rate_policy: RatePolicy::default(),
            momentum: 0.0,
            batch_size: 0,
            dropout: 0.0,
            loss: Loss::default(),
            shuffle: false,
            clear: false,
            cross_validate_fraction: 0.0,
            log_every: 0,
            random_seed: None,
        }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    /// Iterations actually performed.
    pub iterations: usize,
    /// Final loss (held-out loss when cross-validating).
    pub error: f64,
}
