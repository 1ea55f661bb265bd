//! Squash functions applied to node state.
//!
//! Each variant computes either the function value or its derivative with
//! respect to the pre-activation state, selected by the `derivative` flag.
//! The derivative path is what backpropagation consumes.

use serde::{Deserialize, Serialize};

const SELU_ALPHA: f64 = 1.673_263_242_354_377_2;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

/// Activation function assigned to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Logistic,
    Tanh,
    Identity,
    Step,
    Relu,
    SoftSign,
    Sinusoid,
    Gaussian,
    BentIdentity,
    Bipolar,
    BipolarSigmoid,
    HardTanh,
    Absolute,
    Inverse,
    Selu,
    Mish,
}

impl Activation {
    /// Every activation a mutation operator may pick from by default.
    pub const ALL: [Activation; 16] = [
        Activation::Logistic,
        Activation::Tanh,
        Activation::Identity,
        Activation::Step,
        Activation::Relu,
        Activation::SoftSign,
        Activation::Sinusoid,
        Activation::Gaussian,
        Activation::BentIdentity,
        Activation::Bipolar,
        Activation::BipolarSigmoid,
        Activation::HardTanh,
        Activation::Absolute,
        Activation::Inverse,
        Activation::Selu,
        Activation::Mish,
    ];

    /// Evaluate the function (or its derivative) at `x`.
    pub fn calc(self, x: f64, derivative: bool) -> f64 {
        match self {
            Activation::Logistic => {
                let fx = 1.0 / (1.0 + (-x).exp());
                if derivative { fx * (1.0 - fx) } else { fx }
            }
            Activation::Tanh => {
                if derivative {
                    1.0 - x.tanh().powi(2)
                } else {
                    x.tanh()
                }
            }
            Activation::Identity => {
                if derivative { 1.0 } else { x }
            }
            Activation::Step => {
                if derivative {
                    0.0
                } else if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Relu => {
                if derivative {
                    if x > 0.0 { 1.0 } else { 0.0 }
                } else {
                    x.max(0.0)
                }
            }
            Activation::SoftSign => {
                let d = 1.0 + x.abs();
                if derivative { 1.0 / (d * d) } else { x / d }
            }
            Activation::Sinusoid => {
                if derivative { x.cos() } else { x.sin() }
            }
            Activation::Gaussian => {
                let fx = (-(x * x)).exp();
                if derivative { -2.0 * x * fx } else { fx }
            }
            Activation::BentIdentity => {
                let d = (x * x + 1.0).sqrt();
                if derivative {
                    x / (2.0 * d) + 1.0
                } else {
                    (d - 1.0) / 2.0 + x
                }
            }
            Activation::Bipolar => {
                if derivative {
                    0.0
                } else if x > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            Activation::BipolarSigmoid => {
                let fx = 2.0 / (1.0 + (-x).exp()) - 1.0;
                if derivative {
                    0.5 * (1.0 + fx) * (1.0 - fx)
                } else {
                    fx
                }
            }
            Activation::HardTanh => {
                if derivative {
                    if x > -1.0 && x < 1.0 { 1.0 } else { 0.0 }
                } else {
                    x.clamp(-1.0, 1.0)
                }
            }
            Activation::Absolute => {
                if derivative {
                    if x < 0.0 { -1.0 } else { 1.0 }
                } else {
                    x.abs()
                }
            }
            Activation::Inverse => {
                if derivative { -1.0 } else { 1.0 - x }
            }
            Activation::Selu => {
                let fx = if x > 0.0 { x } else { SELU_ALPHA * x.exp() - SELU_ALPHA };
                if derivative {
                    if x > 0.0 {
                        SELU_SCALE
                    } else {
                        (fx + SELU_ALPHA) * SELU_SCALE
                    }
                } else {
                    fx * SELU_SCALE
                }
            }
            Activation::Mish => {
                let ex = x.exp();
                if derivative {
                    let w = 4.0 * (x + 1.0)
                        + 4.0 * ex * ex
                        + ex * ex * ex
                        + ex * (4.0 * x + 6.0);
                    let d = 2.0 * ex + ex * ex + 2.0;
                    ex * w / (d * d)
                } else {
                    x * (1.0 + ex).ln().tanh()
                }
            }
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Logistic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logistic_midpoint() {
        assert!((Activation::Logistic.calc(0.0, false) - 0.5).abs() < 1e-12);
        assert!((Activation::Logistic.calc(0.0, true) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn identity_passes_through() {
        assert_eq!(Activation::Identity.calc(3.7, false), 3.7);
        assert_eq!(Activation::Identity.calc(3.7, true), 1.0);
    }

    #[test]
    fn relu_clips_negative() {
        assert_eq!(Activation::Relu.calc(-2.0, false), 0.0);
        assert_eq!(Activation::Relu.calc(-2.0, true), 0.0);
        assert_eq!(Activation::Relu.calc(2.0, false), 2.0);
    }

    #[test]
    fn hard_tanh_saturates() {
        assert_eq!(Activation::HardTanh.calc(5.0, false), 1.0);
        assert_eq!(Activation::HardTanh.calc(-5.0, false), -1.0);
        assert_eq!(Activation::HardTanh.calc(0.3, true), 1.0);
        assert_eq!(Activation::HardTanh.calc(2.0, true), 0.0);
    }

    #[test]
    fn serde_names_are_stable() {
        let json = serde_json::to_string(&Activation::BentIdentity).unwrap();
        assert_eq!(json, "\"bent_identity\"");
        let back: Activation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Activation::BentIdentity);
    }

    #[test]
    fn soft_sign_derivative_is_positive_everywhere() {
        // 1 / (1 + |x|)^2, monotone increasing squash
        for &x in &[-3.0, -1.5, 0.0, 0.7, 2.0] {
            assert!(Activation::SoftSign.calc(x, true) > 0.0);
        }
        assert!((Activation::SoftSign.calc(-1.5, true) - 0.16).abs() < 1e-12);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let h = 1e-6;
        for act in [
            Activation::Logistic,
            Activation::Tanh,
            Activation::SoftSign,
            Activation::Gaussian,
            Activation::BentIdentity,
            Activation::Selu,
            Activation::Mish,
        ] {
            for &x in &[-1.5, -0.2, 0.4, 2.0] {
                let numeric = (act.calc(x + h, false) - act.calc(x - h, false)) / (2.0 * h);
                let analytic = act.calc(x, true);
                assert!(
                    (numeric - analytic).abs() < 1e-4,
                    "{act:?} at {x}: numeric {numeric} vs analytic {analytic}"
                );
            }
        }
    }
}
