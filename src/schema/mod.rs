//! Schema module - configuration and wire types for networks and evolution.

pub mod evolve;
pub mod genome;
pub mod train;

pub use evolve::{EvolveConfig, EvolveConfigError, NeatConfig, SpeciationConfig};
pub use genome::{ConnectionJson, NetworkJson, NodeJson};
pub use train::{ActivateOptions, PropagateOptions, Sample, TrainOptions, TrainReport};
