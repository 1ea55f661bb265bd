use serde::{Deserialize, Serialize};

use crate::methods::Activation;

/// Aggregation used by pool nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Max,
    Average,
    Min,
}

/// Role of a node in the graph.
///
/// The hidden family covers everything that is neither input nor output;
/// structural mutations treat them all as removable, but the special kinds
/// reject parametric mutation and gating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Hidden,
    Output,
    /// Fixed bias of 1, identity squash, parameters frozen.
    Constant,
    /// Passes its single input through, zeroed with probability `probability`
    /// during traced activation and rescaled by 1/(1-p) otherwise.
    Dropout { probability: f64 },
    /// Emits the mean of its inputs plus gaussian noise.
    Noise { mean: f64, deviation: f64 },
    /// Aggregates incoming contributions; max/min variants learn by
    /// winner-take-all passthrough rather than gradients.
    Pool { kind: PoolKind },
    /// Squashes its single input, nothing else.
    ActivationOnly,
}

impl NodeKind {
    pub fn is_input(self) -> bool {
        matches!(self, NodeKind::Input)
    }

    pub fn is_output(self) -> bool {
        matches!(self, NodeKind::Output)
    }

    /// Anything that lives between inputs and outputs.
    pub fn is_hidden(self) -> bool {
        !self.is_input() && !self.is_output()
    }

    /// Constant, dropout, noise, pool and activation-only nodes keep their
    /// parameters fixed and never act as gaters.
    pub fn is_frozen(self) -> bool {
        !matches!(self, NodeKind::Input | NodeKind::Hidden | NodeKind::Output)
    }

    pub fn allows_bias_mutation(self) -> bool {
        matches!(self, NodeKind::Hidden | NodeKind::Output)
    }

    pub fn allows_activation_mutation(self) -> bool {
        matches!(self, NodeKind::Hidden | NodeKind::Output)
    }

    /// Whether a node of this kind may gate connections.
    pub fn can_gate(self) -> bool {
        matches!(self, NodeKind::Hidden | NodeKind::Output)
    }

    /// Kinds that require exactly one incoming connection.
    pub fn required_fan_in(self) -> Option<usize> {
        match self {
            NodeKind::Dropout { .. } | NodeKind::ActivationOnly => Some(1),
            _ => None,
        }
    }
}

/// A node of the graph. Dynamic state (activation, traces, error terms)
/// lives next to the genome parameters (bias, squash) because activation
/// and backpropagation are stateful over time steps.
///
/// `incoming`/`outgoing`/`gated` hold slots into the owning network's
/// connection arena; `self_conn` is always allocated and a weight of zero
/// means the self-connection is disabled.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: u64,
    pub kind: NodeKind,
    pub bias: f64,
    pub squash: Activation,
    pub activation: f64,
    pub state: f64,
    pub old_state: f64,
    pub derivative: f64,
    /// Dropout mask, 1 unless training with dropout.
    pub mask: f64,
    pub error_responsibility: f64,
    pub error_projected: f64,
    pub error_gated: f64,
    pub delta_bias_total: f64,
    pub delta_bias_prev: f64,
    pub incoming: Vec<usize>,
    pub outgoing: Vec<usize>,
    pub gated: Vec<usize>,
    pub self_conn: usize,
    /// Whether the node was zeroed this step (dropout kind only).
    pub dropped: bool,
    /// Winning source of the last max/min pool step.
    pub receiving_from: Option<u64>,
}

impl Node {
    pub fn new(id: u64, kind: NodeKind, bias: f64, squash: Activation) -> Self {
        let (bias, squash) = match kind {
            NodeKind::Input => (0.0, squash),
            NodeKind::Constant => (1.0, Activation::Identity),
            _ => (bias, squash),
        };
        Node {
            id,
            kind,
            bias,
            squash,
            activation: 0.0,
            state: 0.0,
            old_state: 0.0,
            derivative: 0.0,
            mask: 1.0,
            error_responsibility: 0.0,
            error_projected: 0.0,
            error_gated: 0.0,
            delta_bias_total: 0.0,
            delta_bias_prev: 0.0,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            gated: Vec::new(),
            self_conn: usize::MAX,
            dropped: false,
            receiving_from: None,
        }
    }

    /// Reset dynamic state, keeping genome parameters and topology.
    pub fn clear(&mut self) {
        self.activation = 0.0;
        self.state = 0.0;
        self.old_state = 0.0;
        self.derivative = 0.0;
        self.error_responsibility = 0.0;
        self.error_projected = 0.0;
        self.error_gated = 0.0;
        self.dropped = false;
        self.receiving_from = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_nodes_pin_bias_and_squash() {
        let n = Node::new(0, NodeKind::Constant, 0.7, Activation::Tanh);
        assert_eq!(n.bias, 1.0);
        assert_eq!(n.squash, Activation::Identity);
    }

    #[test]
    fn input_nodes_have_zero_bias() {
        let n = Node::new(0, NodeKind::Input, 0.9, Activation::Logistic);
        assert_eq!(n.bias, 0.0);
    }

    #[test]
    fn frozen_kinds_reject_mutation_and_gating() {
        for kind in [
            NodeKind::Constant,
            NodeKind::Dropout { probability: 0.5 },
            NodeKind::Noise { mean: 0.0, deviation: 1.0 },
            NodeKind::Pool { kind: PoolKind::Max },
            NodeKind::ActivationOnly,
        ] {
            assert!(kind.is_hidden());
            assert!(!kind.allows_bias_mutation());
            assert!(!kind.allows_activation_mutation());
            assert!(!kind.can_gate());
        }
        assert!(NodeKind::Hidden.can_gate());
        assert!(NodeKind::Output.can_gate());
        assert!(!NodeKind::Input.can_gate());
    }

    #[test]
    fn fan_in_requirements() {
        assert_eq!(NodeKind::Dropout { probability: 0.2 }.required_fan_in(), Some(1));
        assert_eq!(NodeKind::ActivationOnly.required_fan_in(), Some(1));
        assert_eq!(NodeKind::Hidden.required_fan_in(), None);
    }
}
