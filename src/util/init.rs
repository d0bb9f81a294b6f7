//! Host-side parameter initializers driven by a seeded `rand` generator.

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Normal samples re-drawn until they fall within two standard deviations.
pub fn truncated_normal<R: Rng>(count: usize, std: f32, rng: &mut R) -> Vec<f32> {
    let normal = match Normal::new(0.0f32, std) {
        Ok(normal) => normal,
        Err(_) => return vec![0.0; count],
    };
    (0..count)
        .map(|_| loop {
            let value = normal.sample(rng);
            if value.abs() <= 2.0 * std {
                break value;
            }
        })
        .collect()
}

pub fn uniform<R: Rng>(count: usize, low: f32, high: f32, rng: &mut R) -> Vec<f32> {
    if low >= high {
        return vec![low; count];
    }
    (0..count).map(|_| rng.random_range(low..high)).collect()
}

/// Uniform in `±sqrt(3 / fan_in)` where `fan_in` is the product of all but
/// the last dimension. Keeps the output scale roughly constant for linear
/// layers applied on the right.
pub fn uniform_unit_scaling<R: Rng, const D: usize>(dims: [usize; D], rng: &mut R) -> Vec<f32> {
    let count: usize = dims.iter().product();
    let fan_in: usize = dims[..D - 1].iter().product::<usize>().max(1);
    let limit = (3.0 / fan_in as f32).sqrt();
    uniform(count, -limit, limit, rng)
}

pub fn param<B: Backend, const D: usize>(
    values: Vec<f32>,
    dims: [usize; D],
    device: &B::Device,
) -> Param<Tensor<B, D>> {
    Param::from_tensor(Tensor::from_data(TensorData::new(values, dims), device))
}

pub fn zeros_param<B: Backend, const D: usize>(
    dims: [usize; D],
    device: &B::Device,
) -> Param<Tensor<B, D>> {
    Param::from_tensor(Tensor::zeros(dims, device))
}
