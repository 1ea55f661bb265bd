//! The genome graph.
//!
//! A [`Network`] is a mutable directed graph of [`Node`]s joined by weighted,
//! optionally gated [`Connection`]s. It supports forward activation with
//! eligibility traces, backpropagation, structural mutation, crossover and
//! compatibility distance, which makes the same object both a neural network
//! and an evolvable genome.

mod connection;
mod network;
mod node;

pub use connection::{Connection, innovation_id};
pub use network::{Network, NetworkError, TrainError};
pub use node::{Node, NodeKind, PoolKind};

/// Hands out stable node identifiers.
///
/// Identifiers survive cloning, so genomes derived from a shared template
/// stay aligned for crossover and distance. One allocator per population;
/// standalone networks can create their own.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator { next: 0 }
    }

    /// Resume allocation after `next`, e.g. when adopting deserialized genomes.
    pub fn starting_at(next: u64) -> Self {
        IdAllocator { next }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
