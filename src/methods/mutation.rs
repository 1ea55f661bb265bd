//! Structural and parametric mutation operators.
//!
//! Every operator is a silent no-op when its candidate set is empty or a
//! growth cap would be exceeded, so population loops can fire operators
//! blindly. Errors only surface for graph invariant violations, which the
//! candidate filters are written to avoid.

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::graph::{IdAllocator, Network, NetworkError, Node, NodeKind};

use super::activation::Activation;

fn default_true() -> bool {
    true
}

fn default_min() -> f64 {
    -1.0
}

fn default_max() -> f64 {
    1.0
}

/// Shared state threaded through mutation: randomness, id allocation,
/// growth caps and the activation pool operators may draw from.
pub struct MutationContext<'a> {
    pub rng: &'a mut StdRng,
    pub ids: &'a mut IdAllocator,
    pub max_nodes: usize,
    pub max_connections: usize,
    pub max_gates: usize,
    pub activations: &'a [Activation],
}

impl<'a> MutationContext<'a> {
    pub fn new(rng: &'a mut StdRng, ids: &'a mut IdAllocator) -> Self {
        MutationContext {
            rng,
            ids,
            max_nodes: usize::MAX,
            max_connections: usize::MAX,
            max_gates: usize::MAX,
            activations: &Activation::ALL,
        }
    }
}

/// A mutation operator over a network genome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    /// Splice a fresh hidden node into an existing connection.
    AddNode,
    /// Remove a random hidden node, bridging its neighbors.
    SubNode {
        #[serde(default = "default_true")]
        keep_gates: bool,
    },
    /// Add a forward connection between two previously unconnected nodes.
    AddConnection,
    /// Remove a forward connection that leaves both endpoints connected.
    SubConnection,
    /// Perturb a random connection weight by a uniform draw.
    ModWeight {
        #[serde(default = "default_min")]
        min: f64,
        #[serde(default = "default_max")]
        max: f64,
    },
    /// Perturb a random node bias by a uniform draw.
    ModBias {
        #[serde(default = "default_min")]
        min: f64,
        #[serde(default = "default_max")]
        max: f64,
    },
    /// Reassign a random node's squash function.
    ModActivation {
        #[serde(default = "default_true")]
        mutate_output: bool,
    },
    /// Gate a random ungated connection with a random eligible node.
    AddGate,
    /// Remove a random gate.
    SubGate,
    /// Enable a random node's self-connection with a random weight.
    AddSelfConnection,
    /// Disable a random active self-connection.
    SubSelfConnection,
    /// Add a backward (recurrent) connection.
    AddBackConnection,
    /// Remove a backward connection that leaves both endpoints connected.
    SubBackConnection,
    /// Swap bias and squash between two random nodes.
    SwapNodes {
        #[serde(default)]
        mutate_output: bool,
    },
}

impl Mutation {
    /// Every operator with default parameters.
    pub fn all() -> Vec<Mutation> {
        vec![
            Mutation::AddNode,
            Mutation::SubNode { keep_gates: true },
            Mutation::AddConnection,
            Mutation::SubConnection,
            Mutation::ModWeight { min: -1.0, max: 1.0 },
            Mutation::ModBias { min: -1.0, max: 1.0 },
            Mutation::ModActivation { mutate_output: true },
            Mutation::AddGate,
            Mutation::SubGate,
            Mutation::AddSelfConnection,
            Mutation::SubSelfConnection,
            Mutation::AddBackConnection,
            Mutation::SubBackConnection,
            Mutation::SwapNodes { mutate_output: false },
        ]
    }

    /// Operators that keep the genome feed-forward.
    pub fn feedforward() -> Vec<Mutation> {
        vec![
            Mutation::AddNode,
            Mutation::SubNode { keep_gates: true },
            Mutation::AddConnection,
            Mutation::SubConnection,
            Mutation::ModWeight { min: -1.0, max: 1.0 },
            Mutation::ModBias { min: -1.0, max: 1.0 },
            Mutation::ModActivation { mutate_output: true },
            Mutation::SwapNodes { mutate_output: false },
        ]
    }

    /// Parametric operators only.
    pub fn no_structure() -> Vec<Mutation> {
        vec![
            Mutation::ModWeight { min: -1.0, max: 1.0 },
            Mutation::ModBias { min: -1.0, max: 1.0 },
            Mutation::ModActivation { mutate_output: true },
        ]
    }

    /// Structural operators only.
    pub fn only_structure() -> Vec<Mutation> {
        vec![
            Mutation::AddNode,
            Mutation::SubNode { keep_gates: true },
            Mutation::AddConnection,
            Mutation::SubConnection,
            Mutation::AddGate,
            Mutation::SubGate,
            Mutation::AddSelfConnection,
            Mutation::SubSelfConnection,
            Mutation::AddBackConnection,
            Mutation::SubBackConnection,
            Mutation::SwapNodes { mutate_output: false },
        ]
    }

    /// Apply this operator to `net`.
    pub fn mutate(&self, net: &mut Network, ctx: &mut MutationContext) -> Result<(), NetworkError> {
        match *self {
            Mutation::AddNode => add_node(net, ctx),
            Mutation::SubNode { keep_gates } => sub_node(net, ctx, keep_gates),
            Mutation::AddConnection => add_connection(net, ctx, false),
            Mutation::AddBackConnection => add_connection(net, ctx, true),
            Mutation::SubConnection => sub_connection(net, ctx, false),
            Mutation::SubBackConnection => sub_connection(net, ctx, true),
            Mutation::ModWeight { min, max } => mod_weight(net, ctx, min, max),
            Mutation::ModBias { min, max } => mod_bias(net, ctx, min, max),
            Mutation::ModActivation { mutate_output } => mod_activation(net, ctx, mutate_output),
            Mutation::AddGate => add_gate(net, ctx),
            Mutation::SubGate => sub_gate(net, ctx),
            Mutation::AddSelfConnection => add_self_connection(net, ctx),
            Mutation::SubSelfConnection => sub_self_connection(net, ctx),
            Mutation::SwapNodes { mutate_output } => swap_nodes(net, ctx, mutate_output),
        }
    }
}

fn add_node(net: &mut Network, ctx: &mut MutationContext) -> Result<(), NetworkError> {
    if net.node_count() >= ctx.max_nodes || net.connections.is_empty() {
        return Ok(());
    }
    let slot = net.connections[ctx.rng.gen_range(0..net.connections.len())];
    let (from_id, to_id, gater) = {
        let c = net.conn(slot);
        (c.from, c.to, c.gater)
    };
    let from_pos = net.positions[&from_id];
    let to_pos = net.positions[&to_id];
    net.disconnect(from_pos, to_pos)?;

    let squash = ctx.activations[ctx.rng.gen_range(0..ctx.activations.len())];
    let bias = ctx.rng.gen_range(-1.0..1.0);
    let node = Node::new(ctx.ids.next_id(), NodeKind::Hidden, bias, squash);
    // keep activation order: never ahead of the inputs, right after `from`
    let insert_at = net.input_size().max(from_pos + 1).min(net.node_count() - net.output_size());
    net.insert_node_at(insert_at, node);

    let from_pos = net.positions[&from_id];
    let to_pos = net.positions[&to_id];
    let first = net.connect(from_pos, insert_at, ctx.rng.gen_range(-1.0..1.0))?;
    let second = net.connect(insert_at, to_pos, ctx.rng.gen_range(-1.0..1.0))?;
    if let Some(gater_id) = gater {
        let gpos = net.positions[&gater_id];
        let target = if ctx.rng.gen_bool(0.5) { first } else { second };
        net.add_gate(gpos, target)?;
    }
    Ok(())
}

fn sub_node(net: &mut Network, ctx: &mut MutationContext, keep_gates: bool) -> Result<(), NetworkError> {
    let candidates: Vec<usize> = (0..net.node_count())
        .filter(|&pos| net.nodes()[pos].kind.is_hidden())
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }
    let pos = candidates[ctx.rng.gen_range(0..candidates.len())];
    net.remove_node(pos, keep_gates, ctx.rng)
}

fn add_connection(net: &mut Network, ctx: &mut MutationContext, backward: bool) -> Result<(), NetworkError> {
    if net.connection_count() >= ctx.max_connections {
        return Ok(());
    }
    let n = net.node_count();
    let input = net.input_size();
    let output = net.output_size();
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    if backward {
        for from in input..n {
            for to in input..from {
                if !net.is_projecting(from, to) {
                    candidates.push((from, to));
                }
            }
        }
    } else {
        for from in 0..n.saturating_sub(output) {
            for to in (from + 1).max(input)..n {
                if !net.is_projecting(from, to) {
                    candidates.push((from, to));
                }
            }
        }
    }
    if candidates.is_empty() {
        return Ok(());
    }
    let (from, to) = candidates[ctx.rng.gen_range(0..candidates.len())];
    net.connect(from, to, ctx.rng.gen_range(-1.0..1.0))?;
    Ok(())
}

fn sub_connection(net: &mut Network, ctx: &mut MutationContext, backward: bool) -> Result<(), NetworkError> {
    // only edges whose removal leaves both endpoints otherwise connected
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for &slot in &net.connections {
        let c = net.conn(slot);
        let from = net.positions[&c.from];
        let to = net.positions[&c.to];
        let direction_ok = if backward { from > to } else { to > from };
        if direction_ok
            && net.nodes()[from].outgoing.len() > 1
            && net.nodes()[to].incoming.len() > 1
        {
            candidates.push((from, to));
        }
    }
    if candidates.is_empty() {
        return Ok(());
    }
    let (from, to) = candidates[ctx.rng.gen_range(0..candidates.len())];
    net.disconnect(from, to)
}

fn mod_weight(net: &mut Network, ctx: &mut MutationContext, min: f64, max: f64) -> Result<(), NetworkError> {
    let mut slots: Vec<usize> = net.connections.clone();
    for node in net.nodes() {
        if net.conn(node.self_conn).weight != 0.0 {
            slots.push(node.self_conn);
        }
    }
    if slots.is_empty() {
        return Ok(());
    }
    let slot = slots[ctx.rng.gen_range(0..slots.len())];
    net.conn_mut(slot).weight += ctx.rng.gen_range(min..max);
    Ok(())
}

fn mod_bias(net: &mut Network, ctx: &mut MutationContext, min: f64, max: f64) -> Result<(), NetworkError> {
    let candidates: Vec<usize> = (0..net.node_count())
        .filter(|&pos| net.nodes()[pos].kind.allows_bias_mutation())
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }
    let pos = candidates[ctx.rng.gen_range(0..candidates.len())];
    net.nodes[pos].bias += ctx.rng.gen_range(min..max);
    Ok(())
}

fn mod_activation(net: &mut Network, ctx: &mut MutationContext, mutate_output: bool) -> Result<(), NetworkError> {
    let candidates: Vec<usize> = (0..net.node_count())
        .filter(|&pos| {
            let kind = net.nodes()[pos].kind;
            kind.allows_activation_mutation() && (mutate_output || !kind.is_output())
        })
        .collect();
    if candidates.is_empty() || ctx.activations.is_empty() {
        return Ok(());
    }
    let pos = candidates[ctx.rng.gen_range(0..candidates.len())];
    net.nodes[pos].squash = ctx.activations[ctx.rng.gen_range(0..ctx.activations.len())];
    Ok(())
}

fn add_gate(net: &mut Network, ctx: &mut MutationContext) -> Result<(), NetworkError> {
    if net.gate_count() >= ctx.max_gates {
        return Ok(());
    }
    let mut slots: Vec<usize> = net
        .connections
        .iter()
        .copied()
        .filter(|&slot| net.conn(slot).gater.is_none())
        .collect();
    for node in net.nodes() {
        let c = net.conn(node.self_conn);
        if c.weight != 0.0 && c.gater.is_none() {
            slots.push(node.self_conn);
        }
    }
    let gaters: Vec<usize> = (0..net.node_count())
        .filter(|&pos| net.nodes()[pos].kind.can_gate())
        .collect();
    if slots.is_empty() || gaters.is_empty() {
        return Ok(());
    }
    let slot = slots[ctx.rng.gen_range(0..slots.len())];
    let gater = gaters[ctx.rng.gen_range(0..gaters.len())];
    net.add_gate(gater, slot)
}

fn sub_gate(net: &mut Network, ctx: &mut MutationContext) -> Result<(), NetworkError> {
    if net.gates.is_empty() {
        return Ok(());
    }
    let slot = net.gates[ctx.rng.gen_range(0..net.gates.len())];
    net.remove_gate(slot)
}

fn add_self_connection(net: &mut Network, ctx: &mut MutationContext) -> Result<(), NetworkError> {
    if net.connection_count() >= ctx.max_connections {
        return Ok(());
    }
    let candidates: Vec<usize> = (net.input_size()..net.node_count())
        .filter(|&pos| !net.is_projecting(pos, pos))
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }
    let pos = candidates[ctx.rng.gen_range(0..candidates.len())];
    let mut weight = 0.0;
    while weight == 0.0 {
        weight = ctx.rng.gen_range(-1.0..1.0);
    }
    net.connect(pos, pos, weight)?;
    Ok(())
}

fn sub_self_connection(net: &mut Network, ctx: &mut MutationContext) -> Result<(), NetworkError> {
    let candidates: Vec<usize> = (net.input_size()..net.node_count())
        .filter(|&pos| net.is_projecting(pos, pos))
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }
    let pos = candidates[ctx.rng.gen_range(0..candidates.len())];
    net.disconnect(pos, pos)
}

fn swap_nodes(net: &mut Network, ctx: &mut MutationContext, mutate_output: bool) -> Result<(), NetworkError> {
    let candidates: Vec<usize> = (0..net.node_count())
        .filter(|&pos| {
            let kind = net.nodes()[pos].kind;
            kind.allows_activation_mutation() && (mutate_output || !kind.is_output())
        })
        .collect();
    if candidates.len() < 2 {
        return Ok(());
    }
    let a = candidates[ctx.rng.gen_range(0..candidates.len())];
    let mut b = a;
    while b == a {
        b = candidates[ctx.rng.gen_range(0..candidates.len())];
    }
    let (bias_a, squash_a) = (net.nodes[a].bias, net.nodes[a].squash);
    net.nodes[a].bias = net.nodes[b].bias;
    net.nodes[a].squash = net.nodes[b].squash;
    net.nodes[b].bias = bias_a;
    net.nodes[b].squash = squash_a;
    Ok(())
}
