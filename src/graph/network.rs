use std::collections::{BTreeMap, HashMap, HashSet};

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{SeedableRng, distributions::Distribution};
use rand_distr::StandardNormal;
use thiserror::Error;

use crate::methods::{Activation, Loss};
use crate::schema::genome::{ConnectionJson, NetworkJson, NodeJson};
use crate::schema::train::{ActivateOptions, PropagateOptions, Sample, TrainOptions, TrainReport};

use super::connection::{Connection, innovation_id};
use super::node::{Node, NodeKind, PoolKind};
use super::IdAllocator;

#[derive(Debug, Error, PartialEq)]
pub enum NetworkError {
    #[error("expected {expected} inputs, got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
    #[error("expected {expected} targets, got {got}")]
    OutputSizeMismatch { expected: usize, got: usize },
    #[error("node index {0} out of range")]
    NodeOutOfRange(usize),
    #[error("nodes {from} and {to} are already connected")]
    AlreadyConnected { from: usize, to: usize },
    #[error("no connection from node {from} to node {to}")]
    NoSuchConnection { from: usize, to: usize },
    #[error("connection is not gated")]
    GateNotRegistered,
    #[error("this node kind cannot gate connections")]
    CannotGate,
    #[error("only hidden nodes can be removed")]
    NotAHiddenNode,
    #[error("{kind} node requires exactly {expected} incoming connection(s), found {got}")]
    FanIn { kind: &'static str, expected: usize, got: usize },
    #[error("parents have incompatible input/output sizes")]
    CrossoverSizeMismatch,
    #[error("connection references node index {0} out of range")]
    BadNodeIndex(usize),
}

#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("training requires a positive iteration count or error target")]
    NoStoppingCondition,
    #[error("dataset is empty")]
    EmptyDataset,
    #[error("sample {index} does not match network shape {inputs} in / {outputs} out")]
    DatasetShape { index: usize, inputs: usize, outputs: usize },
    #[error("loss became non-finite at iteration {iteration}")]
    NonFiniteLoss { iteration: usize },
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// A directed-graph genome that doubles as an executable network.
///
/// Nodes are kept in activation order: inputs first, hidden nodes in the
/// middle, outputs last. Connections live in a slab arena; nodes reference
/// them by slot so cloning a network is a plain deep copy with no pointer
/// fixups, which is what population loops rely on.
#[derive(Debug, Clone)]
pub struct Network {
    pub(crate) input_size: usize,
    pub(crate) output_size: usize,
    pub(crate) nodes: Vec<Node>,
    pub(crate) conns: Vec<Option<Connection>>,
    pub(crate) free: Vec<usize>,
    /// Live non-self connection slots, in creation order.
    pub(crate) connections: Vec<usize>,
    /// Gated connection slots, self-connections included.
    pub(crate) gates: Vec<usize>,
    /// Node id to position, rebuilt after structural changes.
    pub(crate) positions: HashMap<u64, usize>,
    pub score: Option<f64>,
    pub(crate) adjusted_fitness: Option<f64>,
}

impl Network {
    /// Build a minimal genome: inputs fully connected to outputs, weights
    /// scaled by sqrt(2 / fan-in).
    pub fn new(
        input_size: usize,
        output_size: usize,
        ids: &mut IdAllocator,
        rng: &mut StdRng,
    ) -> Self {
        let mut net = Network::bare(input_size, output_size);
        for _ in 0..input_size {
            net.push_node(Node::new(ids.next_id(), NodeKind::Input, 0.0, Activation::Logistic));
        }
        for _ in 0..output_size {
            let bias = rng.gen_range(-1.0..1.0);
            net.push_node(Node::new(ids.next_id(), NodeKind::Output, bias, Activation::Logistic));
        }
        net.reindex();
        let scale = input_size as f64 * (2.0 / input_size.max(1) as f64).sqrt();
        for i in 0..input_size {
            for j in 0..output_size {
                let weight = (rng.gen_range(0.0..1.0) - 0.5) * scale;
                // fresh graph, cannot collide
                let _ = net.connect(i, input_size + j, weight);
            }
        }
        net
    }

    fn bare(input_size: usize, output_size: usize) -> Self {
        Network {
            input_size,
            output_size,
            nodes: Vec::new(),
            conns: Vec::new(),
            free: Vec::new(),
            connections: Vec::new(),
            gates: Vec::new(),
            positions: HashMap::new(),
            score: None,
            adjusted_fitness: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live non-self connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn conn(&self, slot: usize) -> &Connection {
        self.conns[slot].as_ref().expect("live connection slot")
    }

    pub(crate) fn conn_mut(&mut self, slot: usize) -> &mut Connection {
        self.conns[slot].as_mut().expect("live connection slot")
    }

    fn alloc_conn(&mut self, conn: Connection) -> usize {
        if let Some(slot) = self.free.pop() {
            self.conns[slot] = Some(conn);
            slot
        } else {
            self.conns.push(Some(conn));
            self.conns.len() - 1
        }
    }

    /// Append a node, allocating its (disabled) self-connection.
    pub(crate) fn push_node(&mut self, mut node: Node) {
        let slot = self.alloc_conn(Connection::new(node.id, node.id, 0.0));
        node.self_conn = slot;
        self.nodes.push(node);
    }

    /// Insert a node at `pos` and rebuild the position index.
    pub(crate) fn insert_node_at(&mut self, pos: usize, mut node: Node) {
        let slot = self.alloc_conn(Connection::new(node.id, node.id, 0.0));
        node.self_conn = slot;
        self.nodes.insert(pos, node);
        self.reindex();
    }

    pub(crate) fn reindex(&mut self) {
        self.positions.clear();
        for (pos, node) in self.nodes.iter().enumerate() {
            self.positions.insert(node.id, pos);
        }
    }

    fn position(&self, id: u64) -> usize {
        self.positions[&id]
    }

    // ---- structure -------------------------------------------------------

    /// Connect node `from` to node `to`. `from == to` enables the
    /// self-connection. Returns the connection slot.
    pub fn connect(&mut self, from: usize, to: usize, weight: f64) -> Result<usize, NetworkError> {
        let n = self.nodes.len();
        if from >= n || to >= n {
            return Err(NetworkError::NodeOutOfRange(from.max(to)));
        }
        if from == to {
            let slot = self.nodes[from].self_conn;
            if self.conn(slot).weight != 0.0 {
                return Err(NetworkError::AlreadyConnected { from, to });
            }
            self.conn_mut(slot).weight = weight;
            return Ok(slot);
        }
        if self.is_projecting(from, to) {
            return Err(NetworkError::AlreadyConnected { from, to });
        }
        let from_id = self.nodes[from].id;
        let to_id = self.nodes[to].id;
        let slot = self.alloc_conn(Connection::new(from_id, to_id, weight));
        self.nodes[from].outgoing.push(slot);
        self.nodes[to].incoming.push(slot);
        self.connections.push(slot);
        Ok(slot)
    }

    /// Remove the connection from `from` to `to`. Self-connections are
    /// disabled rather than deallocated.
    pub fn disconnect(&mut self, from: usize, to: usize) -> Result<(), NetworkError> {
        let n = self.nodes.len();
        if from >= n || to >= n {
            return Err(NetworkError::NodeOutOfRange(from.max(to)));
        }
        if from == to {
            let slot = self.nodes[from].self_conn;
            if self.conn(slot).weight == 0.0 {
                return Err(NetworkError::NoSuchConnection { from, to });
            }
            if self.conn(slot).gater.is_some() {
                self.remove_gate(slot)?;
            }
            let c = self.conn_mut(slot);
            c.weight = 0.0;
            c.clear_traces();
            return Ok(());
        }
        let to_id = self.nodes[to].id;
        let slot = self.nodes[from]
            .outgoing
            .iter()
            .copied()
            .find(|&s| self.conn(s).to == to_id)
            .ok_or(NetworkError::NoSuchConnection { from, to })?;
        if self.conn(slot).gater.is_some() {
            self.remove_gate(slot)?;
        }
        self.nodes[from].outgoing.retain(|&s| s != slot);
        self.nodes[to].incoming.retain(|&s| s != slot);
        self.connections.retain(|&s| s != slot);
        self.conns[slot] = None;
        self.free.push(slot);
        Ok(())
    }

    /// Let the node at `gater` gate the connection in `slot`. Gating an
    /// already-gated connection is ignored with a warning.
    pub fn add_gate(&mut self, gater: usize, slot: usize) -> Result<(), NetworkError> {
        if gater >= self.nodes.len() {
            return Err(NetworkError::NodeOutOfRange(gater));
        }
        if !self.nodes[gater].kind.can_gate() {
            return Err(NetworkError::CannotGate);
        }
        if self.conn(slot).gater.is_some() {
            log::warn!("connection already gated, ignoring");
            return Ok(());
        }
        let id = self.nodes[gater].id;
        self.conn_mut(slot).gater = Some(id);
        self.nodes[gater].gated.push(slot);
        self.gates.push(slot);
        Ok(())
    }

    /// Detach the gater from the connection in `slot`, restoring gain 1.
    pub fn remove_gate(&mut self, slot: usize) -> Result<(), NetworkError> {
        let idx = self
            .gates
            .iter()
            .position(|&s| s == slot)
            .ok_or(NetworkError::GateNotRegistered)?;
        self.gates.swap_remove(idx);
        if let Some(gater_id) = self.conn(slot).gater {
            let gpos = self.position(gater_id);
            self.nodes[gpos].gated.retain(|&s| s != slot);
        }
        let c = self.conn_mut(slot);
        c.gater = None;
        c.gain = 1.0;
        Ok(())
    }

    /// Remove a hidden node, bridging its sources to its sinks. When
    /// `keep_gates` is set, gaters of the removed edges are re-homed onto
    /// random bridge connections.
    pub fn remove_node(
        &mut self,
        pos: usize,
        keep_gates: bool,
        rng: &mut StdRng,
    ) -> Result<(), NetworkError> {
        if pos >= self.nodes.len() {
            return Err(NetworkError::NodeOutOfRange(pos));
        }
        if !self.nodes[pos].kind.is_hidden() {
            return Err(NetworkError::NotAHiddenNode);
        }
        let id = self.nodes[pos].id;
        if self.conn(self.nodes[pos].self_conn).weight != 0.0 {
            self.disconnect(pos, pos)?;
        }

        let mut gaters: Vec<u64> = Vec::new();
        let incoming: Vec<u64> = self.nodes[pos]
            .incoming
            .iter()
            .map(|&s| self.conn(s).from)
            .collect();
        for from_id in &incoming {
            let from_pos = self.position(*from_id);
            if keep_gates {
                if let Some(g) = self.conn_of(from_pos, pos).and_then(|s| self.conn(s).gater) {
                    if g != id {
                        gaters.push(g);
                    }
                }
            }
            self.disconnect(from_pos, pos)?;
        }
        let outgoing: Vec<u64> = self.nodes[pos]
            .outgoing
            .iter()
            .map(|&s| self.conn(s).to)
            .collect();
        for to_id in &outgoing {
            let to_pos = self.position(*to_id);
            if keep_gates {
                if let Some(g) = self.conn_of(pos, to_pos).and_then(|s| self.conn(s).gater) {
                    if g != id {
                        gaters.push(g);
                    }
                }
            }
            self.disconnect(pos, to_pos)?;
        }

        let mut bridged: Vec<usize> = Vec::new();
        for from_id in &incoming {
            for to_id in &outgoing {
                let from_pos = self.position(*from_id);
                let to_pos = self.position(*to_id);
                if from_pos != to_pos && !self.is_projecting(from_pos, to_pos) {
                    let weight = rng.gen_range(-1.0..1.0);
                    bridged.push(self.connect(from_pos, to_pos, weight)?);
                }
            }
        }
        // one surviving gater per bridge, assigned at random
        for gater_id in gaters {
            if bridged.is_empty() {
                break;
            }
            let idx = rng.gen_range(0..bridged.len());
            let slot = bridged.swap_remove(idx);
            let gpos = self.position(gater_id);
            self.add_gate(gpos, slot)?;
        }

        for slot in self.nodes[pos].gated.clone() {
            self.remove_gate(slot)?;
        }
        let self_slot = self.nodes[pos].self_conn;
        self.conns[self_slot] = None;
        self.free.push(self_slot);
        self.nodes.remove(pos);
        self.reindex();
        Ok(())
    }

    fn conn_of(&self, from: usize, to: usize) -> Option<usize> {
        let to_id = self.nodes[to].id;
        self.nodes[from]
            .outgoing
            .iter()
            .copied()
            .find(|&s| self.conn(s).to == to_id)
    }

    /// Whether `from` projects to `to` (self-connections count when active).
    pub fn is_projecting(&self, from: usize, to: usize) -> bool {
        if from == to {
            return self.conn(self.nodes[from].self_conn).weight != 0.0;
        }
        self.conn_of(from, to).is_some()
    }

    // ---- activation ------------------------------------------------------

    /// One forward step. Inputs take the given values, the rest of the graph
    /// activates in positional order; returns the output activations.
    pub fn activate(
        &mut self,
        input: &[f64],
        opts: &ActivateOptions,
        rng: &mut StdRng,
    ) -> Result<Vec<f64>, NetworkError> {
        if input.len() != self.input_size {
            return Err(NetworkError::InputSizeMismatch {
                expected: self.input_size,
                got: input.len(),
            });
        }
        let n = self.nodes.len();
        for pos in 0..self.input_size {
            self.nodes[pos].activation = input[pos];
        }
        for pos in self.input_size..n {
            let kind = self.nodes[pos].kind;
            if opts.trace
                && opts.dropout_rate > 0.0
                && kind == NodeKind::Hidden
                && pos < n - self.output_size
            {
                self.nodes[pos].mask = if rng.gen_bool(opts.dropout_rate) { 0.0 } else { 1.0 };
            }
            match kind {
                NodeKind::Input => {}
                NodeKind::Hidden | NodeKind::Output | NodeKind::Constant => {
                    self.activate_standard(pos, opts.trace);
                }
                NodeKind::Noise { mean, deviation } => {
                    self.activate_noise(pos, mean, deviation, opts.trace, rng);
                }
                NodeKind::Dropout { probability } => {
                    self.activate_dropout(pos, probability, opts.trace, rng)?;
                }
                NodeKind::Pool { kind } => self.activate_pool(pos, kind, opts.trace),
                NodeKind::ActivationOnly => self.activate_single(pos, opts.trace)?,
            }
        }
        Ok(self.nodes[n - self.output_size..]
            .iter()
            .map(|node| node.activation)
            .collect())
    }

    fn activate_standard(&mut self, pos: usize, trace: bool) {
        let id = self.nodes[pos].id;
        let self_slot = self.nodes[pos].self_conn;
        let (self_gain, self_weight) = {
            let c = self.conn(self_slot);
            (c.gain, c.weight)
        };
        let old = self.nodes[pos].state;
        if trace {
            self.nodes[pos].old_state = old;
        }

        let mut state = self_gain * self_weight * old + self.nodes[pos].bias;
        let incoming = self.nodes[pos].incoming.clone();
        for &slot in &incoming {
            let c = self.conn(slot);
            let from_act = self.nodes[self.position(c.from)].activation;
            state += from_act * c.weight * c.gain;
        }
        let activation = {
            let node = &mut self.nodes[pos];
            node.state = state;
            node.activation = node.squash.calc(state, false) * node.mask;
            if trace {
                node.derivative = node.squash.calc(state, true);
            }
            node.activation
        };

        // fresh activation drives every connection this node gates
        let gated = self.nodes[pos].gated.clone();
        for &slot in &gated {
            self.conn_mut(slot).gain = activation;
        }

        if !trace {
            return;
        }

        // per gated downstream node: summed influence plus the downstream
        // node's previous state when this node gates its self-connection
        let mut influences: Vec<(u64, f64)> = Vec::new();
        for &slot in &gated {
            let (from, to, weight) = {
                let c = self.conn(slot);
                (c.from, c.to, c.weight)
            };
            let contribution = self.nodes[self.position(from)].activation * weight;
            match influences.iter_mut().find(|(nid, _)| *nid == to) {
                Some((_, value)) => *value += contribution,
                None => {
                    let to_pos = self.position(to);
                    let base = if self.conn(self.nodes[to_pos].self_conn).gater == Some(id) {
                        self.nodes[to_pos].old_state
                    } else {
                        0.0
                    };
                    influences.push((to, base + contribution));
                }
            }
        }
        let influence_meta: Vec<(u64, f64, f64)> = influences
            .iter()
            .map(|&(to, influence)| {
                let c = self.conn(self.nodes[self.position(to)].self_conn);
                (to, influence, c.gain * c.weight)
            })
            .collect();

        let derivative = self.nodes[pos].derivative;
        for &slot in &incoming {
            let from = self.conn(slot).from;
            let from_act = self.nodes[self.position(from)].activation;
            let c = self.conn_mut(slot);
            c.eligibility = self_gain * self_weight * c.eligibility + from_act * c.gain;
            let eligibility = c.eligibility;
            for &(to, influence, decay) in &influence_meta {
                match c.x_trace.iter_mut().find(|(nid, _)| *nid == to) {
                    Some((_, value)) => {
                        *value = decay * *value + derivative * eligibility * influence;
                    }
                    None => c.x_trace.push((to, derivative * eligibility * influence)),
                }
            }
        }
    }

    /// Weighted incoming contributions as (source id, value) pairs.
    fn weighted_inputs(&self, pos: usize) -> Vec<(u64, f64)> {
        self.nodes[pos]
            .incoming
            .iter()
            .map(|&slot| {
                let c = self.conn(slot);
                let act = self.nodes[self.position(c.from)].activation;
                (c.from, act * c.weight * c.gain)
            })
            .collect()
    }

    fn finish_variant(&mut self, pos: usize, state: f64, trace: bool) {
        let node = &mut self.nodes[pos];
        if trace {
            node.old_state = node.state;
        }
        node.state = state;
        node.activation = node.squash.calc(state, false) * node.mask;
        if trace {
            node.derivative = node.squash.calc(state, true);
        }
    }

    fn activate_noise(&mut self, pos: usize, mean: f64, deviation: f64, trace: bool, rng: &mut StdRng) {
        let inputs = self.weighted_inputs(pos);
        let base = if inputs.is_empty() {
            0.0
        } else {
            inputs.iter().map(|(_, v)| v).sum::<f64>() / inputs.len() as f64
        };
        let noise: f64 = StandardNormal.sample(rng);
        self.finish_variant(pos, base + mean + deviation * noise, trace);
    }

    fn activate_dropout(
        &mut self,
        pos: usize,
        probability: f64,
        trace: bool,
        rng: &mut StdRng,
    ) -> Result<(), NetworkError> {
        let inputs = self.weighted_inputs(pos);
        if inputs.len() != 1 {
            return Err(NetworkError::FanIn { kind: "dropout", expected: 1, got: inputs.len() });
        }
        let value = inputs[0].1;
        let state = if trace && rng.gen_bool(probability) {
            self.nodes[pos].dropped = true;
            0.0
        } else if trace {
            self.nodes[pos].dropped = false;
            value / (1.0 - probability)
        } else {
            self.nodes[pos].dropped = false;
            value
        };
        self.finish_variant(pos, state, trace);
        Ok(())
    }

    fn activate_pool(&mut self, pos: usize, kind: PoolKind, trace: bool) {
        let inputs = self.weighted_inputs(pos);
        let (state, winner) = if inputs.is_empty() {
            (0.0, None)
        } else {
            match kind {
                PoolKind::Average => {
                    let sum: f64 = inputs.iter().map(|(_, v)| v).sum();
                    (sum / inputs.len() as f64, None)
                }
                PoolKind::Max => {
                    let best = inputs
                        .iter()
                        .fold(inputs[0], |acc, &x| if x.1 > acc.1 { x } else { acc });
                    (best.1, Some(best.0))
                }
                PoolKind::Min => {
                    let best = inputs
                        .iter()
                        .fold(inputs[0], |acc, &x| if x.1 < acc.1 { x } else { acc });
                    (best.1, Some(best.0))
                }
            }
        };
        self.nodes[pos].receiving_from = winner;
        self.finish_variant(pos, state, trace);
    }

    fn activate_single(&mut self, pos: usize, trace: bool) -> Result<(), NetworkError> {
        let inputs = self.weighted_inputs(pos);
        if inputs.len() != 1 {
            return Err(NetworkError::FanIn {
                kind: "activation-only",
                expected: 1,
                got: inputs.len(),
            });
        }
        self.finish_variant(pos, inputs[0].1, trace);
        Ok(())
    }

    // ---- backpropagation -------------------------------------------------

    /// One backward step. Requires a traced forward pass beforehand.
    pub fn propagate(&mut self, target: &[f64], opts: &PropagateOptions) -> Result<(), NetworkError> {
        if target.len() != self.output_size {
            return Err(NetworkError::OutputSizeMismatch {
                expected: self.output_size,
                got: target.len(),
            });
        }
        let n = self.nodes.len();
        for i in (0..self.output_size).rev() {
            self.propagate_node(n - self.output_size + i, Some(target[i]), opts);
        }
        for pos in (self.input_size..n - self.output_size).rev() {
            self.propagate_node(pos, None, opts);
        }
        Ok(())
    }

    fn propagate_node(&mut self, pos: usize, target: Option<f64>, opts: &PropagateOptions) {
        match self.nodes[pos].kind {
            NodeKind::Input => {}
            NodeKind::Hidden | NodeKind::Output | NodeKind::Constant => {
                self.propagate_standard(pos, target, opts);
            }
            NodeKind::Noise { .. } | NodeKind::ActivationOnly => {
                self.propagate_plain(pos, opts, 1.0, true);
            }
            NodeKind::Pool { kind: PoolKind::Average } => {
                self.propagate_plain(pos, opts, 1.0, true);
            }
            NodeKind::Pool { .. } => self.propagate_winner(pos),
            NodeKind::Dropout { probability } => {
                let scale = 1.0 / (1.0 - probability);
                let frozen = self.nodes[pos].dropped;
                self.propagate_plain(pos, opts, scale, !frozen);
            }
        }
    }

    fn projected_error(&self, pos: usize) -> f64 {
        let mut sum = 0.0;
        for &slot in &self.nodes[pos].outgoing {
            let c = self.conn(slot);
            sum += self.nodes[self.position(c.to)].error_responsibility * c.weight * c.gain;
        }
        self.nodes[pos].derivative * sum
    }

    fn propagate_standard(&mut self, pos: usize, target: Option<f64>, opts: &PropagateOptions) {
        let id = self.nodes[pos].id;
        let kind = self.nodes[pos].kind;

        let (responsibility, projected) = if let Some(t) = target {
            let error = t - self.nodes[pos].activation;
            (error, error)
        } else {
            let projected = self.projected_error(pos);
            let mut gated_sum = 0.0;
            for &slot in &self.nodes[pos].gated {
                let c = self.conn(slot);
                let to_pos = self.position(c.to);
                let mut influence =
                    c.weight * self.nodes[self.position(c.from)].activation;
                if self.conn(self.nodes[to_pos].self_conn).gater == Some(id) {
                    influence += self.nodes[to_pos].old_state;
                }
                gated_sum += self.nodes[to_pos].error_responsibility * influence;
            }
            let gated = self.nodes[pos].derivative * gated_sum;
            (projected + gated, projected)
        };
        {
            let node = &mut self.nodes[pos];
            node.error_responsibility = responsibility;
            node.error_projected = projected;
            node.error_gated = responsibility - projected;
        }

        let mask = self.nodes[pos].mask;
        let incoming = self.nodes[pos].incoming.clone();
        for slot in incoming {
            let gradient = {
                let c = self.conn(slot);
                let mut g = projected * c.eligibility;
                for &(nid, value) in &c.x_trace {
                    if let Some(&p) = self.positions.get(&nid) {
                        g += self.nodes[p].error_responsibility * value;
                    }
                }
                g
            };
            let c = self.conn_mut(slot);
            c.delta_weight_total += opts.rate * gradient * mask;
            if opts.update {
                c.delta_weight_total += opts.momentum * c.delta_weight_prev;
                c.weight += c.delta_weight_total;
                c.delta_weight_prev = c.delta_weight_total;
                c.delta_weight_total = 0.0;
            }
        }

        if matches!(kind, NodeKind::Hidden | NodeKind::Output) {
            let node = &mut self.nodes[pos];
            node.delta_bias_total += opts.rate * responsibility;
            if opts.update {
                node.delta_bias_total += opts.momentum * node.delta_bias_prev;
                node.bias += node.delta_bias_total;
                node.delta_bias_prev = node.delta_bias_total;
                node.delta_bias_total = 0.0;
            }
        }
    }

    /// Gradient path for variant nodes: projected error only, plain
    /// `responsibility * input` weight gradients, no bias update.
    fn propagate_plain(&mut self, pos: usize, opts: &PropagateOptions, scale: f64, learn: bool) {
        let responsibility = self.projected_error(pos) * scale;
        {
            let node = &mut self.nodes[pos];
            node.error_responsibility = responsibility;
            node.error_projected = responsibility;
            node.error_gated = 0.0;
        }
        if !learn {
            return;
        }
        let mask = self.nodes[pos].mask;
        let incoming = self.nodes[pos].incoming.clone();
        for slot in incoming {
            let from_act = {
                let c = self.conn(slot);
                self.nodes[self.position(c.from)].activation
            };
            let c = self.conn_mut(slot);
            c.delta_weight_total += opts.rate * responsibility * from_act * mask;
            if opts.update {
                c.delta_weight_total += opts.momentum * c.delta_weight_prev;
                c.weight += c.delta_weight_total;
                c.delta_weight_prev = c.delta_weight_total;
                c.delta_weight_total = 0.0;
            }
        }
    }

    /// Max/min pools learn by passthrough: the winning edge gets weight and
    /// gain 1, the rest 0.
    fn propagate_winner(&mut self, pos: usize) {
        let responsibility = self.projected_error(pos);
        let winner = self.nodes[pos].receiving_from;
        {
            let node = &mut self.nodes[pos];
            node.error_responsibility = responsibility;
            node.error_projected = responsibility;
            node.error_gated = 0.0;
        }
        let incoming = self.nodes[pos].incoming.clone();
        for slot in incoming {
            let c = self.conn_mut(slot);
            let w = if Some(c.from) == winner { 1.0 } else { 0.0 };
            c.weight = w;
            c.gain = w;
        }
    }

    /// Reset all dynamic state: activations, traces, error terms.
    pub fn clear(&mut self) {
        for node in &mut self.nodes {
            node.clear();
        }
        for conn in self.conns.iter_mut().flatten() {
            conn.clear_traces();
        }
    }

    // ---- training --------------------------------------------------------

    fn check_shapes(&self, dataset: &[Sample]) -> Result<(), TrainError> {
        for (index, sample) in dataset.iter().enumerate() {
            if sample.input.len() != self.input_size || sample.output.len() != self.output_size {
                return Err(TrainError::DatasetShape {
                    index,
                    inputs: self.input_size,
                    outputs: self.output_size,
                });
            }
        }
        Ok(())
    }

    /// Backpropagation training loop over `dataset`.
    pub fn train(&mut self, dataset: &[Sample], opts: &TrainOptions) -> Result<TrainReport, TrainError> {
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        self.check_shapes(dataset)?;
        if opts.iterations == 0 && opts.target_error <= 0.0 {
            return Err(TrainError::NoStoppingCondition);
        }
        let mut rng = match opts.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (train_set, held_out) = if opts.cross_validate_fraction > 0.0 {
            let keep = ((1.0 - opts.cross_validate_fraction) * dataset.len() as f64).ceil() as usize;
            dataset.split_at(keep.clamp(1, dataset.len()))
        } else {
            (dataset, &dataset[..0])
        };
        let batch = if opts.batch_size == 0 { train_set.len() } else { opts.batch_size };
        let mut order: Vec<usize> = (0..train_set.len()).collect();

        let mut iteration = 0;
        let error = loop {
            iteration += 1;
            let rate = opts.rate_policy.calc(iteration);
            if opts.shuffle {
                order.shuffle(&mut rng);
            }
            let mut sum = 0.0;
            let last = train_set.len() - 1;
            for (i, &idx) in order.iter().enumerate() {
                let sample = &train_set[idx];
                let output = self.activate(
                    &sample.input,
                    &ActivateOptions { trace: true, dropout_rate: opts.dropout },
                    &mut rng,
                )?;
                self.propagate(
                    &sample.output,
                    &PropagateOptions {
                        rate,
                        momentum: opts.momentum,
                        update: (i + 1) % batch == 0 || i == last,
                    },
                )?;
                sum += opts.loss.calc(&sample.output, &output);
            }
            let mut error = sum / train_set.len() as f64;
            if !held_out.is_empty() {
                error = self.test(held_out, opts.loss, opts.dropout, &mut rng)?;
            }
            if !error.is_finite() {
                return Err(TrainError::NonFiniteLoss { iteration });
            }
            if opts.log_every > 0 && iteration % opts.log_every == 0 {
                log::info!("iteration {iteration} error {error:.6} rate {rate:.6}");
            }
            if opts.clear {
                self.clear();
            }
            let converged = opts.target_error > 0.0 && error <= opts.target_error;
            if converged || (opts.iterations > 0 && iteration >= opts.iterations) {
                break error;
            }
        };
        for node in &mut self.nodes {
            node.mask = 1.0;
        }
        Ok(TrainReport { iterations: iteration, error })
    }

    /// Mean loss over `dataset` without touching traces. With dropout,
    /// hidden activations are scaled by the keep probability.
    pub fn test(
        &mut self,
        dataset: &[Sample],
        loss: Loss,
        dropout: f64,
        rng: &mut StdRng,
    ) -> Result<f64, TrainError> {
        if dataset.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        self.check_shapes(dataset)?;
        if dropout > 0.0 {
            for node in &mut self.nodes {
                if node.kind == NodeKind::Hidden {
                    node.mask = 1.0 - dropout;
                }
            }
        }
        let mut sum = 0.0;
        for sample in dataset {
            let output = self.activate(&sample.input, &ActivateOptions::inference(), rng)?;
            sum += loss.calc(&sample.output, &output);
        }
        if dropout > 0.0 {
            for node in &mut self.nodes {
                node.mask = 1.0;
            }
        }
        Ok(sum / dataset.len() as f64)
    }

    // ---- crossover and distance -----------------------------------------

    fn gene_table(&self) -> BTreeMap<u64, (usize, usize, f64, Option<usize>)> {
        let mut table = BTreeMap::new();
        for &slot in &self.connections {
            let c = self.conn(slot);
            let from = self.position(c.from);
            let to = self.position(c.to);
            let gate = c.gater.map(|g| self.position(g));
            table.insert(innovation_id(from as u64, to as u64), (from, to, c.weight, gate));
        }
        for (pos, node) in self.nodes.iter().enumerate() {
            let c = self.conn(node.self_conn);
            if c.weight != 0.0 {
                let gate = c.gater.map(|g| self.position(g));
                table.insert(innovation_id(pos as u64, pos as u64), (pos, pos, c.weight, gate));
            }
        }
        table
    }

    /// Breed two genomes of matching shape. With `equal` (or tied scores)
    /// the child size is drawn between the parents' sizes and both parents'
    /// disjoint genes are inherited; otherwise the fitter parent dictates
    /// size and contributes its disjoint genes.
    pub fn crossover(
        a: &Network,
        b: &Network,
        equal: bool,
        ids: &mut IdAllocator,
        rng: &mut StdRng,
    ) -> Result<Network, NetworkError> {
        if a.input_size != b.input_size || a.output_size != b.output_size {
            return Err(NetworkError::CrossoverSizeMismatch);
        }
        let (score_a, score_b) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        let tie = equal || a.score == b.score;
        let size = if tie {
            let lo = a.nodes.len().min(b.nodes.len());
            let hi = a.nodes.len().max(b.nodes.len());
            rng.gen_range(lo..=hi)
        } else if score_a > score_b {
            a.nodes.len()
        } else {
            b.nodes.len()
        };
        let input_size = a.input_size;
        let output_size = a.output_size;

        let mut child = Network::bare(input_size, output_size);
        let mut used: HashSet<u64> = HashSet::new();
        for i in 0..size {
            // positions past the shorter parent always draw from the longer
            let parent = if i >= a.nodes.len() {
                b
            } else if i >= b.nodes.len() {
                a
            } else if rng.gen_bool(0.5) {
                a
            } else {
                b
            };
            let source = if i < input_size {
                &parent.nodes[i]
            } else if i >= size - output_size {
                let out = i - (size - output_size);
                &parent.nodes[parent.nodes.len() - output_size + out]
            } else {
                &parent.nodes[rng.gen_range(0..parent.nodes.len())]
            };
            let kind = if i < input_size {
                NodeKind::Input
            } else if i >= size - output_size {
                NodeKind::Output
            } else if source.kind.is_hidden() {
                source.kind
            } else {
                NodeKind::Hidden
            };
            let id = if used.insert(source.id) { source.id } else { ids.next_id() };
            child.push_node(Node::new(id, kind, source.bias, source.squash));
        }
        child.reindex();

        let table_a = a.gene_table();
        let table_b = b.gene_table();
        let mut genes: Vec<(usize, usize, f64, Option<usize>)> = Vec::new();
        for (key, gene_a) in &table_a {
            match table_b.get(key) {
                Some(gene_b) => genes.push(if rng.gen_bool(0.5) { *gene_a } else { *gene_b }),
                None if tie || score_a > score_b => genes.push(*gene_a),
                None => {}
            }
        }
        for (key, gene_b) in &table_b {
            if !table_a.contains_key(key) && (tie || score_b > score_a) {
                genes.push(*gene_b);
            }
        }

        for (from, to, weight, gate) in genes {
            if from >= size || to >= size {
                continue;
            }
            let slot = child.connect(from, to, weight)?;
            if let Some(g) = gate {
                if g < size && child.nodes[g].kind.can_gate() {
                    child.add_gate(g, slot)?;
                }
            }
        }
        Ok(child)
    }

    fn id_gene_map(&self) -> BTreeMap<u64, f64> {
        let mut map = BTreeMap::new();
        for &slot in &self.connections {
            let c = self.conn(slot);
            map.insert(c.innovation(), c.weight);
        }
        for node in &self.nodes {
            let c = self.conn(node.self_conn);
            if c.weight != 0.0 {
                map.insert(c.innovation(), c.weight);
            }
        }
        map
    }

    /// NEAT compatibility distance: excess and disjoint genes normalized by
    /// the larger gene count, plus mean weight difference of matching genes.
    pub fn distance(&self, other: &Network, c1: f64, c2: f64, c3: f64) -> f64 {
        let mine = self.id_gene_map();
        let theirs = other.id_gene_map();
        let my_max = mine.keys().next_back().copied().unwrap_or(0);
        let their_max = theirs.keys().next_back().copied().unwrap_or(0);

        let mut excess = 0usize;
        let mut disjoint = 0usize;
        let mut matching = 0usize;
        let mut weight_diff = 0.0;
        for (key, weight) in &mine {
            match theirs.get(key) {
                Some(other_weight) => {
                    matching += 1;
                    weight_diff += (weight - other_weight).abs();
                }
                None if *key > their_max => excess += 1,
                None => disjoint += 1,
            }
        }
        for key in theirs.keys() {
            if !mine.contains_key(key) {
                if *key > my_max {
                    excess += 1;
                } else {
                    disjoint += 1;
                }
            }
        }
        let n = mine.len().max(theirs.len()).max(1) as f64;
        let avg = if matching > 0 { weight_diff / matching as f64 } else { 0.0 };
        c1 * excess as f64 / n + c2 * disjoint as f64 / n + c3 * avg
    }

    // ---- serialization ---------------------------------------------------

    pub fn to_json(&self) -> NetworkJson {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| NodeJson {
                bias: node.bias,
                kind: node.kind,
                squash: node.squash,
                mask: node.mask,
                index,
            })
            .collect();
        let mut connections: Vec<ConnectionJson> = self
            .connections
            .iter()
            .map(|&slot| {
                let c = self.conn(slot);
                ConnectionJson {
                    from_index: self.position(c.from),
                    to_index: self.position(c.to),
                    gate_index: c.gater.map(|g| self.position(g)),
                    weight: c.weight,
                }
            })
            .collect();
        for (pos, node) in self.nodes.iter().enumerate() {
            let c = self.conn(node.self_conn);
            if c.weight != 0.0 {
                connections.push(ConnectionJson {
                    from_index: pos,
                    to_index: pos,
                    gate_index: c.gater.map(|g| self.position(g)),
                    weight: c.weight,
                });
            }
        }
        NetworkJson {
            input_size: self.input_size,
            output_size: self.output_size,
            nodes,
            connections,
        }
    }

    /// Rebuild a network from its wire form. Node ids restart at zero.
    pub fn from_json(json: &NetworkJson) -> Result<Network, NetworkError> {
        let n = json.nodes.len();
        if n < json.input_size + json.output_size {
            return Err(NetworkError::BadNodeIndex(n));
        }
        let mut ids = IdAllocator::new();
        let mut net = Network::bare(json.input_size, json.output_size);
        for node_json in &json.nodes {
            let mut node = Node::new(ids.next_id(), node_json.kind, node_json.bias, node_json.squash);
            node.mask = node_json.mask;
            net.push_node(node);
        }
        net.reindex();
        for conn_json in &json.connections {
            if conn_json.from_index >= n || conn_json.to_index >= n {
                return Err(NetworkError::BadNodeIndex(conn_json.from_index.max(conn_json.to_index)));
            }
            let slot = net.connect(conn_json.from_index, conn_json.to_index, conn_json.weight)?;
            if let Some(gate) = conn_json.gate_index {
                if gate >= n {
                    return Err(NetworkError::BadNodeIndex(gate));
                }
                net.add_gate(gate, slot)?;
            }
        }
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::Loss;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn simple(inputs: usize, outputs: usize) -> (Network, IdAllocator, StdRng) {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let net = Network::new(inputs, outputs, &mut ids, &mut r);
        (net, ids, r)
    }

    #[test]
    fn new_network_is_fully_connected() {
        let (net, _, _) = simple(3, 2);
        assert_eq!(net.node_count(), 5);
        assert_eq!(net.connection_count(), 6);
        assert_eq!(net.gate_count(), 0);
    }

    #[test]
    fn activate_checks_input_size() {
        let (mut net, _, mut r) = simple(2, 1);
        let err = net.activate(&[1.0], &ActivateOptions::default(), &mut r).unwrap_err();
        assert_eq!(err, NetworkError::InputSizeMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn identity_chain_multiplies_by_weight() {
        // one input feeding one output through weight w with identity squash
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::bare(1, 1);
        net.push_node(Node::new(ids.next_id(), NodeKind::Input, 0.0, Activation::Identity));
        let mut out = Node::new(ids.next_id(), NodeKind::Output, 0.0, Activation::Identity);
        out.bias = 0.0;
        net.push_node(out);
        net.reindex();
        net.connect(0, 1, 0.75).unwrap();
        let output = net.activate(&[2.0], &ActivateOptions::default(), &mut r).unwrap();
        assert!((output[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn connect_twice_is_rejected() {
        let (mut net, _, _) = simple(1, 1);
        assert_eq!(
            net.connect(0, 1, 0.5).unwrap_err(),
            NetworkError::AlreadyConnected { from: 0, to: 1 }
        );
    }

    #[test]
    fn disconnect_removes_projection() {
        let (mut net, _, _) = simple(2, 1);
        assert!(net.is_projecting(0, 2));
        net.disconnect(0, 2).unwrap();
        assert!(!net.is_projecting(0, 2));
        assert_eq!(net.connection_count(), 1);
        assert_eq!(
            net.disconnect(0, 2).unwrap_err(),
            NetworkError::NoSuchConnection { from: 0, to: 2 }
        );
    }

    #[test]
    fn self_connection_toggles_via_weight() {
        let (mut net, _, _) = simple(1, 1);
        assert!(!net.is_projecting(1, 1));
        net.connect(1, 1, 0.3).unwrap();
        assert!(net.is_projecting(1, 1));
        net.disconnect(1, 1).unwrap();
        assert!(!net.is_projecting(1, 1));
        // arena keeps the slot allocated either way
        assert_eq!(net.connection_count(), 1);
    }

    #[test]
    fn gate_roundtrip() {
        let (mut net, _, _) = simple(2, 1);
        let slot = net.conn_of(0, 2).unwrap();
        net.add_gate(2, slot).unwrap();
        assert_eq!(net.gate_count(), 1);
        assert_eq!(net.conn(slot).gater, Some(net.nodes[2].id));
        net.remove_gate(slot).unwrap();
        assert_eq!(net.gate_count(), 0);
        assert_eq!(net.conn(slot).gain, 1.0);
        assert_eq!(net.remove_gate(slot).unwrap_err(), NetworkError::GateNotRegistered);
    }

    #[test]
    fn input_nodes_cannot_gate() {
        let (mut net, _, _) = simple(2, 1);
        let slot = net.conn_of(0, 2).unwrap();
        assert_eq!(net.add_gate(0, slot).unwrap_err(), NetworkError::CannotGate);
    }

    #[test]
    fn gated_connection_uses_gater_activation() {
        // input -> output gated by a hidden node with no inputs: the gain of
        // the gated edge must equal the gater's activation
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::bare(1, 1);
        net.push_node(Node::new(ids.next_id(), NodeKind::Input, 0.0, Activation::Identity));
        let mut gater = Node::new(ids.next_id(), NodeKind::Hidden, 0.5, Activation::Identity);
        gater.bias = 0.5;
        net.push_node(gater);
        let mut out = Node::new(ids.next_id(), NodeKind::Output, 0.0, Activation::Identity);
        out.bias = 0.0;
        net.push_node(out);
        net.reindex();
        let slot = net.connect(0, 2, 1.0).unwrap();
        net.add_gate(1, slot).unwrap();
        let output = net.activate(&[2.0], &ActivateOptions::default(), &mut r).unwrap();
        // gater activation = 0.5, so output = 2.0 * 1.0 * 0.5
        assert!((output[0] - 1.0).abs() < 1e-12);
        assert!((net.conn(slot).gain - 0.5).abs() < 1e-12);
    }

    #[test]
    fn remove_node_bridges_and_shrinks() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::new(2, 1, &mut ids, &mut r);
        // splice a hidden node manually between input 0 and the output
        net.disconnect(0, 2).unwrap();
        let hidden = Node::new(ids.next_id(), NodeKind::Hidden, 0.1, Activation::Logistic);
        net.insert_node_at(2, hidden);
        net.connect(0, 2, 0.4).unwrap();
        net.connect(2, 3, 0.6).unwrap();
        assert_eq!(net.node_count(), 4);

        net.remove_node(2, true, &mut r).unwrap();
        assert_eq!(net.node_count(), 3);
        assert!(net.is_projecting(0, 2), "bridge connection restored");
    }

    #[test]
    fn remove_node_rejects_io_nodes() {
        let (mut net, _, mut r) = simple(1, 1);
        assert_eq!(net.remove_node(0, true, &mut r).unwrap_err(), NetworkError::NotAHiddenNode);
        assert_eq!(net.remove_node(1, true, &mut r).unwrap_err(), NetworkError::NotAHiddenNode);
    }

    #[test]
    fn clear_resets_traces() {
        let (mut net, _, mut r) = simple(2, 1);
        net.activate(&[1.0, -0.5], &ActivateOptions::default(), &mut r).unwrap();
        net.clear();
        for node in net.nodes() {
            assert_eq!(node.activation, 0.0);
            assert_eq!(node.state, 0.0);
        }
        for &slot in &net.connections {
            assert_eq!(net.conn(slot).eligibility, 0.0);
        }
    }

    #[test]
    fn train_without_stopping_condition_fails() {
        let (mut net, _, _) = simple(2, 1);
        let data = vec![Sample { input: vec![0.0, 0.0], output: vec![0.0] }];
        let opts = TrainOptions::default();
        assert_eq!(net.train(&data, &opts).unwrap_err(), TrainError::NoStoppingCondition);
    }

    #[test]
    fn train_checks_dataset_shape() {
        let (mut net, _, _) = simple(2, 1);
        let data = vec![Sample { input: vec![0.0], output: vec![0.0] }];
        let opts = TrainOptions { iterations: 1, ..Default::default() };
        assert!(matches!(
            net.train(&data, &opts).unwrap_err(),
            TrainError::DatasetShape { index: 0, .. }
        ));
    }

    #[test]
    fn training_reduces_loss() {
        let mut ids = IdAllocator::new();
        let mut r = StdRng::seed_from_u64(3);
        let mut net = Network::new(2, 1, &mut ids, &mut r);
        let data = vec![
            Sample { input: vec![0.0, 0.0], output: vec![0.0] },
            Sample { input: vec![1.0, 1.0], output: vec![1.0] },
        ];
        let before = net.test(&data, Loss::Mse, 0.0, &mut r).unwrap();
        let report = net
            .train(
                &data,
                &TrainOptions { iterations: 100, random_seed: Some(9), ..Default::default() },
            )
            .unwrap();
        assert_eq!(report.iterations, 100);
        assert!(report.error < before, "error {} not below {}", report.error, before);
    }

    #[test]
    fn crossover_of_identical_parents_keeps_shape() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut a = Network::new(2, 2, &mut ids, &mut r);
        a.score = Some(1.0);
        let mut b = a.clone();
        b.score = Some(1.0);
        let child = Network::crossover(&a, &b, false, &mut ids, &mut r).unwrap();
        assert_eq!(child.node_count(), a.node_count());
        assert_eq!(child.connection_count(), a.connection_count());
        // matching genes come from either parent but parents are identical
        for (key, weight) in child.id_gene_map() {
            let _ = key;
            assert!(a.id_gene_map().values().any(|w| (w - weight).abs() < 1e-12));
        }
    }

    #[test]
    fn crossover_draws_tail_positions_from_the_larger_parent() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let a = Network::new(2, 1, &mut ids, &mut r);
        let mut b = a.clone();
        let hidden = Node::new(ids.next_id(), NodeKind::Hidden, 0.0, Activation::Logistic);
        b.insert_node_at(2, hidden);
        b.connect(0, 2, 0.5).unwrap();
        b.connect(2, 3, 0.5).unwrap();
        // marker biases tell the node's parent of origin apart
        for node in &mut b.nodes {
            node.bias = 5.0;
        }
        let mut fit_a = a;
        for node in &mut fit_a.nodes {
            node.bias = -5.0;
        }
        fit_a.score = Some(1.0);
        b.score = Some(2.0);
        for seed in 0..20 {
            let mut r = StdRng::seed_from_u64(seed);
            let child = Network::crossover(&fit_a, &b, false, &mut ids, &mut r).unwrap();
            assert_eq!(child.node_count(), 4);
            // position 3 is past fit_a's three nodes, so only b can donate
            assert_eq!(child.nodes[3].bias, 5.0);
        }
    }

    #[test]
    fn crossover_rejects_shape_mismatch() {
        let (a, mut ids, mut r) = simple(2, 1);
        let b = Network::new(3, 1, &mut ids, &mut r);
        assert_eq!(
            Network::crossover(&a, &b, false, &mut ids, &mut r).unwrap_err(),
            NetworkError::CrossoverSizeMismatch
        );
    }

    #[test]
    fn distance_is_zero_for_clones_and_grows_with_disjoint_genes() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let net = Network::new(2, 1, &mut ids, &mut r);
        let clone = net.clone();
        assert_eq!(net.distance(&clone, 1.0, 1.0, 1.0), 0.0);

        let mut far = net.clone();
        // splice a node to create disjoint genes
        far.disconnect(0, 2).unwrap();
        far.insert_node_at(2, Node::new(ids.next_id(), NodeKind::Hidden, 0.0, Activation::Logistic));
        far.connect(0, 2, 0.5).unwrap();
        far.connect(2, 3, 0.5).unwrap();
        let d1 = net.distance(&far, 1.0, 1.0, 1.0);
        assert!(d1 > 0.0);

        // perturbing a matching weight adds the c3 term on top
        let mut farther = far.clone();
        let slot = farther.conn_of(1, 3).unwrap();
        farther.conn_mut(slot).weight += 1.0;
        let d2 = net.distance(&farther, 1.0, 1.0, 1.0);
        assert!(d2 > d1, "distance {d2} not above {d1}");
    }

    #[test]
    fn json_roundtrip_preserves_behavior() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::new(2, 1, &mut ids, &mut r);
        // enrich the genome: hidden node, self connection, gate
        net.disconnect(0, 2).unwrap();
        net.insert_node_at(2, Node::new(ids.next_id(), NodeKind::Hidden, 0.2, Activation::Tanh));
        net.connect(0, 2, 0.4).unwrap();
        let slot = net.connect(2, 3, 0.6).unwrap();
        net.connect(2, 2, 0.3).unwrap();
        net.add_gate(2, slot).unwrap();

        let json = net.to_json();
        let mut restored = Network::from_json(&json).unwrap();
        assert_eq!(restored.node_count(), net.node_count());
        assert_eq!(restored.connection_count(), net.connection_count());
        assert_eq!(restored.gate_count(), net.gate_count());

        let mut r1 = StdRng::seed_from_u64(5);
        let mut r2 = StdRng::seed_from_u64(5);
        for step in 0..5 {
            let x = step as f64 / 5.0;
            let a = net.activate(&[x, 1.0 - x], &ActivateOptions::inference(), &mut r1).unwrap();
            let b = restored.activate(&[x, 1.0 - x], &ActivateOptions::inference(), &mut r2).unwrap();
            assert!((a[0] - b[0]).abs() < 1e-12, "step {step}: {} vs {}", a[0], b[0]);
        }
    }

    #[test]
    fn json_rejects_bad_indexes() {
        let (net, _, _) = simple(1, 1);
        let mut json = net.to_json();
        json.connections.push(ConnectionJson {
            from_index: 0,
            to_index: 99,
            gate_index: None,
            weight: 1.0,
        });
        assert_eq!(Network::from_json(&json).unwrap_err(), NetworkError::BadNodeIndex(99));
    }

    #[test]
    fn dropout_node_requires_single_input() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::new(2, 1, &mut ids, &mut r);
        net.insert_node_at(
            2,
            Node::new(ids.next_id(), NodeKind::Dropout { probability: 0.5 }, 0.0, Activation::Identity),
        );
        net.connect(0, 2, 1.0).unwrap();
        net.connect(1, 2, 1.0).unwrap();
        net.connect(2, 3, 1.0).unwrap();
        let err = net.activate(&[1.0, 1.0], &ActivateOptions::default(), &mut r).unwrap_err();
        assert_eq!(err, NetworkError::FanIn { kind: "dropout", expected: 1, got: 2 });
    }

    #[test]
    fn max_pool_picks_largest_contribution() {
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::bare(2, 1);
        net.push_node(Node::new(ids.next_id(), NodeKind::Input, 0.0, Activation::Identity));
        net.push_node(Node::new(ids.next_id(), NodeKind::Input, 0.0, Activation::Identity));
        net.push_node(Node::new(
            ids.next_id(),
            NodeKind::Pool { kind: PoolKind::Max },
            0.0,
            Activation::Identity,
        ));
        let mut out = Node::new(ids.next_id(), NodeKind::Output, 0.0, Activation::Identity);
        out.bias = 0.0;
        net.push_node(out);
        net.reindex();
        net.connect(0, 2, 1.0).unwrap();
        net.connect(1, 2, 1.0).unwrap();
        net.connect(2, 3, 1.0).unwrap();
        let output = net.activate(&[0.2, 0.9], &ActivateOptions::default(), &mut r).unwrap();
        assert!((output[0] - 0.9).abs() < 1e-12);
        assert_eq!(net.nodes[2].receiving_from, Some(net.nodes[1].id));
    }

    #[test]
    fn recurrent_self_connection_carries_state() {
        // identity output with an active self connection accumulates input
        let mut ids = IdAllocator::new();
        let mut r = rng();
        let mut net = Network::bare(1, 1);
        net.push_node(Node::new(ids.next_id(), NodeKind::Input, 0.0, Activation::Identity));
        let mut out = Node::new(ids.next_id(), NodeKind::Output, 0.0, Activation::Identity);
        out.bias = 0.0;
        net.push_node(out);
        net.reindex();
        net.connect(0, 1, 1.0).unwrap();
        net.connect(1, 1, 1.0).unwrap();
        let opts = ActivateOptions::default();
        let first = net.activate(&[1.0], &opts, &mut r).unwrap()[0];
        let second = net.activate(&[1.0], &opts, &mut r).unwrap()[0];
        assert!((first - 1.0).abs() < 1e-12);
        assert!((second - 2.0).abs() < 1e-12);
    }
}
