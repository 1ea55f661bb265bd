//! Wire format for genome serialization.
//!
//! Nodes are addressed positionally; self-connections appear as entries with
//! `from_index == to_index`. Node ids are not part of the format, a
//! deserialized genome gets fresh ones.

use serde::{Deserialize, Serialize};

use crate::graph::NodeKind;
use crate::methods::Activation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkJson {
    pub input_size: usize,
    pub output_size: usize,
    pub nodes: Vec<NodeJson>,
    pub connections: Vec<ConnectionJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeJson {
    pub bias: f64,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub squash: Activation,
    pub mask: f64,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionJson {
    pub from_index: usize,
    pub to_index: usize,
    #[serde(default)]
    pub gate_index: Option<usize>,
    pub weight: f64,
}
