//! Loss functions over an output/target pair, averaged per sample.

use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-15;

/// Loss function used by training and dataset-driven fitness scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Mean squared error.
    Mse,
    /// Mean bias error. Signed, so positive and negative errors cancel.
    Mbe,
    /// Binary mismatch rate after rounding to the nearest half.
    Binary,
    /// Mean absolute error.
    Mae,
    /// Mean absolute percentage error.
    Mape,
    /// Weighted absolute percentage error.
    Wape,
    /// Mean squared logarithmic error.
    Msle,
    /// Hinge loss for -1/+1 targets.
    Hinge,
}

impl Loss {
    /// Mean loss of `output` against `target`. Slices must be equal length;
    /// the caller guarantees that.
    pub fn calc(self, target: &[f64], output: &[f64]) -> f64 {
        debug_assert_eq!(target.len(), output.len());
        let n = target.len() as f64;
        match self {
            Loss::Mse => {
                let sum: f64 = target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| (t - o).powi(2))
                    .sum();
                sum / n
            }
            Loss::Mbe => {
                let sum: f64 = target.iter().zip(output).map(|(t, o)| t - o).sum();
                sum / n
            }
            Loss::Binary => {
                let misses = target
                    .iter()
                    .zip(output)
                    .filter(|(t, o)| (*t * 2.0).round() != (**o * 2.0).round())
                    .count();
                misses as f64 / n
            }
            Loss::Mae => {
                let sum: f64 = target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| (t - o).abs())
                    .sum();
                sum / n
            }
            Loss::Mape => {
                let sum: f64 = target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| ((o - t) / t.abs().max(EPS)).abs())
                    .sum();
                sum / n
            }
            Loss::Wape => {
                let num: f64 = target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| (t - o).abs())
                    .sum();
                let den: f64 = target.iter().sum();
                num / den.abs().max(EPS)
            }
            Loss::Msle => {
                let sum: f64 = target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| {
                        (t.max(EPS).ln() - o.max(EPS).ln()).powi(2)
                    })
                    .sum();
                sum / n
            }
            Loss::Hinge => {
                let sum: f64 = target
                    .iter()
                    .zip(output)
                    .map(|(t, o)| (1.0 - t * o).max(0.0))
                    .sum();
                sum / n
            }
        }
    }
}

impl Default for Loss {
    fn default() -> Self {
        Loss::Mse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_of_exact_match_is_zero() {
        assert_eq!(Loss::Mse.calc(&[0.5, 0.25], &[0.5, 0.25]), 0.0);
    }

    #[test]
    fn mse_averages_squared_error() {
        let loss = Loss::Mse.calc(&[1.0, 0.0], &[0.0, 0.0]);
        assert!((loss - 0.5).abs() < 1e-12);
    }

    #[test]
    fn binary_counts_rounded_mismatches() {
        let loss = Loss::Binary.calc(&[1.0, 0.0, 1.0], &[0.9, 0.1, 0.1]);
        assert!((loss - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn hinge_is_zero_past_margin() {
        assert_eq!(Loss::Hinge.calc(&[1.0], &[2.0]), 0.0);
        assert!((Loss::Hinge.calc(&[1.0], &[0.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn wape_stays_finite_for_zero_sum_targets() {
        assert!(Loss::Wape.calc(&[0.0, 0.0], &[0.1, 0.2]).is_finite());
        assert!(Loss::Wape.calc(&[1.0, -1.0], &[0.5, 0.5]).is_finite());
        // regular case is untouched: sum |t - o| / sum t
        let loss = Loss::Wape.calc(&[2.0, 2.0], &[1.0, 2.0]);
        assert!((loss - 0.25).abs() < 1e-12);
    }

    #[test]
    fn mbe_is_signed() {
        assert!(Loss::Mbe.calc(&[0.0], &[1.0]) < 0.0);
        assert!(Loss::Mbe.calc(&[1.0], &[0.0]) > 0.0);
    }
}
