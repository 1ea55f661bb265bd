//! Strategy catalogs: activation squashes, loss functions, learning-rate
//! schedules, parent selection and mutation operators.

pub mod activation;
pub mod loss;
pub mod mutation;
pub mod rate;
pub mod selection;

pub use activation::Activation;
pub use loss::Loss;
pub use mutation::{Mutation, MutationContext};
pub use rate::RatePolicy;
pub use selection::{Selection, SelectionError};
