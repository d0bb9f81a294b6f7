//! Sample grids from a fitted RBM: real digits, their Gibbs reconstructions,
//! and a free-running chain started from noise.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{gibbs_v, sample_h_given_v, sample_v_given_h, RbmParams};
use crate::dataset::{mnist, FeatureTable};
use crate::error::{self, Error};
use crate::util::{self, tile::tile_raster_images, tile::GrayImage};

#[derive(Config, Debug)]
pub struct VisualizeConfig {
    /// Grid is `grid_side × grid_side` images.
    #[config(default = 10)]
    pub grid_side: usize,
    /// Blank pixels between neighbouring images.
    #[config(default = 0)]
    pub spacing: usize,
    /// Gibbs sweeps applied to the real test digits.
    #[config(default = 1)]
    pub reconstruct_steps: usize,
    /// Sweeps between two snapshots of the free-running chain.
    #[config(default = 100)]
    pub probe_steps: usize,
    /// Validation digits used for reconstruction error during fitting.
    #[config(default = 1000)]
    pub validation_samples: usize,
    #[config(default = 1)]
    pub seed: u64,
}

/// Free-running chain from `seed`, recording the visible state before every
/// block of `interval` sweeps. Returns `num_snapshots` states, the first one
/// being `seed` itself.
pub fn generate<B: Backend, R: Rng>(
    params: &RbmParams<B>,
    seed: Tensor<B, 2>,
    num_snapshots: usize,
    interval: usize,
    rng: &mut R,
) -> Vec<Tensor<B, 2>> {
    let mut snapshots = Vec::with_capacity(num_snapshots);
    let mut v = seed;
    for i in 0..num_snapshots {
        snapshots.push(v.clone());
        if i + 1 == num_snapshots {
            break;
        }
        for _ in 0..interval {
            let h = sample_h_given_v(v, params.w.clone(), params.c.clone(), rng);
            v = sample_v_given_h(h, params.w.clone(), params.b.clone(), rng);
        }
    }
    snapshots
}

/// Real digits and their `steps`-sweep Gibbs reconstructions.
pub fn reconstruct<B: Backend, R: Rng>(
    params: &RbmParams<B>,
    digits: Tensor<B, 2>,
    steps: usize,
    rng: &mut R,
) -> Tensor<B, 2> {
    gibbs_v(digits, params, steps, rng)
}

fn tile(rows: Vec<f32>, config: &VisualizeConfig) -> GrayImage {
    tile_raster_images(
        &rows,
        (mnist::IMAGE_SIDE, mnist::IMAGE_SIDE),
        (config.grid_side, config.grid_side),
        (config.spacing, config.spacing),
    )
}

/// Writes `real.pgm`, `gibbs_{k}.pgm` and `free_run.pgm` into `out_dir`.
pub fn render<B: Backend>(
    config: &VisualizeConfig,
    params: &RbmParams<B>,
    test: &FeatureTable,
    out_dir: &Path,
    device: &B::Device,
) -> error::Result<()> {
    if config.grid_side == 0 {
        return Err(Error::Config("grid_side must be at least 1".to_string()));
    }
    let count = (config.grid_side * config.grid_side).min(test.num_rows());
    let digits = test.slice_rows(0..count);
    tile(digits.values().to_vec(), config).save_pgm(&out_dir.join("real.pgm"))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let reconstructed = reconstruct(
        params,
        digits.to_tensor::<B>(device),
        config.reconstruct_steps,
        &mut rng,
    );
    tile(util::tensor_to_vec(reconstructed), config)
        .save_pgm(&out_dir.join(format!("gibbs_{}.pgm", config.reconstruct_steps)))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise: Vec<f32> = (0..mnist::IMAGE_PIXELS)
        .map(|_| if rng.random::<f32>() > 0.5 { 1.0 } else { 0.0 })
        .collect();
    let seed = Tensor::<B, 2>::from_data(TensorData::new(noise, [1, mnist::IMAGE_PIXELS]), device);
    let snapshots = generate(
        params,
        seed,
        config.grid_side * config.grid_side,
        config.probe_steps,
        &mut rng,
    );
    let rows = util::tensor_to_vec(Tensor::cat(snapshots, 0));
    tile(rows, config).save_pgm(&out_dir.join("free_run.pgm"))?;

    tracing::info!(dir = %out_dir.display(), "Rendered RBM sample grids");
    Ok(())
}
