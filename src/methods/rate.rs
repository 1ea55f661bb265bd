//! Learning-rate schedules for [`Network::train`](crate::graph::Network::train).

use serde::{Deserialize, Serialize};

/// Learning-rate policy. Each variant maps (base rate, iteration) to the
/// effective rate for that iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RatePolicy {
    /// Constant rate.
    Fixed { rate: f64 },
    /// Rate multiplied by `gamma` every `step_size` iterations.
    Step { rate: f64, gamma: f64, step_size: usize },
    /// Rate multiplied by `gamma` every iteration.
    Exponential { rate: f64, gamma: f64 },
    /// `rate * (1 + gamma * iteration)^-power`.
    Inverse { rate: f64, gamma: f64, power: f64 },
}

impl RatePolicy {
    pub fn fixed(rate: f64) -> Self {
        RatePolicy::Fixed { rate }
    }

    pub fn step(rate: f64) -> Self {
        RatePolicy::Step { rate, gamma: 0.9, step_size: 100 }
    }

    pub fn exponential(rate: f64) -> Self {
        RatePolicy::Exponential { rate, gamma: 0.999 }
    }

    pub fn inverse(rate: f64) -> Self {
        RatePolicy::Inverse { rate, gamma: 0.001, power: 2.0 }
    }

    /// Effective rate at `iteration` (zero-based).
    pub fn calc(&self, iteration: usize) -> f64 {
        match *self {
            RatePolicy::Fixed { rate } => rate,
            RatePolicy::Step { rate, gamma, step_size } => {
                rate * gamma.powi((iteration / step_size.max(1)) as i32)
            }
            RatePolicy::Exponential { rate, gamma } => rate * gamma.powi(iteration as i32),
            RatePolicy::Inverse { rate, gamma, power } => {
                rate * (1.0 + gamma * iteration as f64).powf(-power)
            }
        }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        RatePolicy::fixed(0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_never_changes() {
        let p = RatePolicy::fixed(0.3);
        assert_eq!(p.calc(0), 0.3);
        assert_eq!(p.calc(10_000), 0.3);
    }

    #[test]
    fn step_drops_at_boundaries() {
        let p = RatePolicy::step(1.0);
        assert_eq!(p.calc(99), 1.0);
        assert!((p.calc(100) - 0.9).abs() < 1e-12);
        assert!((p.calc(250) - 0.81).abs() < 1e-12);
    }

    #[test]
    fn schedules_are_nonincreasing() {
        for p in [
            RatePolicy::step(0.5),
            RatePolicy::exponential(0.5),
            RatePolicy::inverse(0.5),
        ] {
            let mut prev = p.calc(0);
            for i in 1..500 {
                let r = p.calc(i);
                assert!(r <= prev + 1e-15, "{p:?} increased at {i}");
                prev = r;
            }
        }
    }
}
