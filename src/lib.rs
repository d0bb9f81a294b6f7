//! Three classic models trained directly on `burn` tensors: a factorization
//! machine, a restricted Boltzmann machine and a hand-written LSTM.

pub mod dataset;
pub mod error;
pub mod fm;
pub mod lstm;
pub mod rbm;
pub mod util;

pub use error::{Error, Result};
