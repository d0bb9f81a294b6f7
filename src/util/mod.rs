//! Helpers shared by the three trainers: activations, Bernoulli sampling,
//! parameter initializers, cyclic mini-batching and image tiling.

pub mod batch;
pub mod init;
pub mod tile;

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;

use crate::error::{Error, Result};

pub use burn::tensor::activation::sigmoid;

/// `ln(1 + e^x)` without overflow for large `x`.
pub fn softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_min(0.0) + x.abs().neg().exp().log1p()
}

/// Draws one Bernoulli sample per element, `1.0` with the given probability.
///
/// Uniform draws come from `rng`, not from the backend seed, so a seeded
/// `rng` makes the result reproducible on every backend.
pub fn sample_binomial<B: Backend, const D: usize, R: Rng>(
    proba: Tensor<B, D>,
    rng: &mut R,
) -> Tensor<B, D> {
    let dims = proba.dims();
    let count: usize = dims.iter().product();
    let draws: Vec<f32> = (0..count).map(|_| rng.random::<f32>()).collect();
    let uniform = Tensor::<B, D>::from_data(TensorData::new(draws, dims), &proba.device());

    proba.greater(uniform).float()
}

/// Reads a float tensor back to the host.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
}

/// Reads a single-element tensor back as `f32`.
pub fn scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// Wipes and recreates an artifact directory.
pub fn create_artifact_dir(artifact_dir: &Path) -> Result<()> {
    // Remove existing artifacts so every run starts clean
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir).map_err(|e| Error::io(artifact_dir, e))
}
