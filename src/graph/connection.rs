/// Pair two identifiers into a single innovation id.
///
/// Cantor's triangular pairing: injective over (a, b), so a connection's
/// endpoints uniquely determine its innovation id and matching genes across
/// genomes can be found by id equality alone.
pub fn innovation_id(a: u64, b: u64) -> u64 {
    (a + b) * (a + b + 1) / 2 + b
}

/// A weighted edge between two nodes, addressed by stable node ids.
///
/// `gain` is 1 for ungated connections; while a gater is attached, the
/// gater's activation is written into `gain` on every step it fires.
/// `eligibility` and `x_trace` carry the recurrent credit-assignment state
/// used by backpropagation through time.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub from: u64,
    pub to: u64,
    pub weight: f64,
    pub gain: f64,
    pub gater: Option<u64>,
    pub eligibility: f64,
    pub delta_weight_total: f64,
    pub delta_weight_prev: f64,
    /// Extended trace per gated downstream node: (node id, trace value).
    pub x_trace: Vec<(u64, f64)>,
}

impl Connection {
    pub fn new(from: u64, to: u64, weight: f64) -> Self {
        Connection {
            from,
            to,
            weight,
            gain: 1.0,
            gater: None,
            eligibility: 0.0,
            delta_weight_total: 0.0,
            delta_weight_prev: 0.0,
            x_trace: Vec::new(),
        }
    }

    pub fn is_self(&self) -> bool {
        self.from == self.to
    }

    /// Innovation id of this connection's endpoints.
    pub fn innovation(&self) -> u64 {
        innovation_id(self.from, self.to)
    }

    /// Drop accumulated trace state, keeping weight, gain and gater.
    pub fn clear_traces(&mut self) {
        self.eligibility = 0.0;
        self.x_trace.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_is_order_sensitive() {
        assert_ne!(innovation_id(1, 2), innovation_id(2, 1));
    }

    #[test]
    fn pairing_known_values() {
        assert_eq!(innovation_id(0, 0), 0);
        assert_eq!(innovation_id(1, 0), 1);
        assert_eq!(innovation_id(0, 1), 2);
        assert_eq!(innovation_id(1, 1), 4);
    }

    #[test]
    fn new_connection_is_ungated() {
        let c = Connection::new(3, 7, 0.5);
        assert_eq!(c.gain, 1.0);
        assert_eq!(c.gater, None);
        assert!(!c.is_self());
        assert!(Connection::new(4, 4, 0.1).is_self());
    }

    proptest::proptest! {
        #[test]
        fn pairing_is_injective(a in 0u64..10_000, b in 0u64..10_000,
                                c in 0u64..10_000, d in 0u64..10_000) {
            proptest::prop_assume!((a, b) != (c, d));
            proptest::prop_assert_ne!(innovation_id(a, b), innovation_id(c, d));
        }
    }
}
