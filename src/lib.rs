//! Evograph - neuroevolution of gated recurrent network graphs.
//!
//! This crate implements an evolvable neural network genome: a directed
//! graph whose topology, weights, biases, activation functions, gates and
//! recurrent connections all mutate. Genomes activate like networks (with
//! eligibility traces for backpropagation through time), breed by positional
//! crossover, and measure compatibility distance for speciation.
//!
//! # Architecture
//!
//! - `graph`: the genome itself (nodes, connections, activation, training)
//! - `methods`: strategy catalogs (squash, loss, rates, selection, mutation)
//! - `population`: flat and speciated evolutionary loops
//! - `schema`: serializable configuration and the genome wire format
//!
//! # Example
//!
//! ```rust,no_run
//! use evograph::{
//!     methods::Loss,
//!     population::NeatPopulation,
//!     schema::{NeatConfig, Sample},
//! };
//!
//! let mut config = NeatConfig::new(2, 1);
//! config.base.population_size = 100;
//! config.base.iterations = 200;
//!
//! let dataset = vec![
//!     Sample { input: vec![0.0, 0.0], output: vec![0.0] },
//!     Sample { input: vec![0.0, 1.0], output: vec![1.0] },
//!     Sample { input: vec![1.0, 0.0], output: vec![1.0] },
//!     Sample { input: vec![1.0, 1.0], output: vec![0.0] },
//! ];
//!
//! let mut population = NeatPopulation::new(config).unwrap();
//! population.set_dataset(dataset, Loss::Mse);
//! let best = population.evolve().unwrap();
//!
//! println!("best fitness: {:?}", best.score);
//! println!("{}", serde_json::to_string(&best.to_json()).unwrap());
//! ```

pub mod graph;
pub mod methods;
pub mod population;
pub mod schema;

// Re-export commonly used types
pub use graph::{IdAllocator, Network, NetworkError, TrainError};
pub use methods::{Activation, Loss, Mutation, MutationContext, RatePolicy, Selection};
pub use population::{EvolveError, NeatPopulation, PendingScores, Population};
pub use schema::{EvolveConfig, NeatConfig, Sample, TrainOptions};
