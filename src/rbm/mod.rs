//! Binary restricted Boltzmann machine with block Gibbs sampling.
//!
//! Learning minimizes the contrastive-divergence surrogate
//! `mean F(v_data) - mean F(v_model)`, where `F` is the free energy and
//! `v_model` comes from a short Gibbs chain started at the data.

pub mod train;
pub mod visualize;

use burn::module::Param;
use burn::prelude::*;
use rand::Rng;

use crate::util::{init, sample_binomial, sigmoid, softplus};

#[derive(Config, Debug)]
pub struct RbmModelConfig {
    pub n_visible: usize,
    pub n_hidden: usize,
}

#[derive(Module, Debug)]
pub struct Rbm<B: Backend> {
    /// Couplings, shape `[n_visible, n_hidden]`.
    w: Param<Tensor<B, 2>>,
    /// Visible bias.
    b: Param<Tensor<B, 1>>,
    /// Hidden bias.
    c: Param<Tensor<B, 1>>,
}

/// Detached snapshot of learned RBM parameters.
#[derive(Clone, Debug)]
pub struct RbmParams<B: Backend> {
    pub w: Tensor<B, 2>,
    pub b: Tensor<B, 1>,
    pub c: Tensor<B, 1>,
}

impl RbmModelConfig {
    /// `W` uniform in `±4·sqrt(6 / (n_hidden + n_visible))`, zero biases.
    pub fn init<B: Backend, R: Rng>(&self, device: &B::Device, rng: &mut R) -> Rbm<B> {
        let limit = 4.0 * (6.0 / (self.n_hidden + self.n_visible) as f32).sqrt();
        let w = init::uniform(self.n_visible * self.n_hidden, -limit, limit, rng);

        Rbm {
            w: init::param(w, [self.n_visible, self.n_hidden], device),
            b: init::zeros_param([self.n_visible], device),
            c: init::zeros_param([self.n_hidden], device),
        }
    }
}

impl<B: Backend> Rbm<B> {
    pub fn from_params(params: RbmParams<B>) -> Self {
        Self {
            w: Param::from_tensor(params.w),
            b: Param::from_tensor(params.b),
            c: Param::from_tensor(params.c),
        }
    }

    pub fn params(&self) -> RbmParams<B> {
        RbmParams {
            w: self.w.val(),
            b: self.b.val(),
            c: self.c.val(),
        }
    }

    pub fn n_visible(&self) -> usize {
        self.w.dims()[0]
    }

    pub fn n_hidden(&self) -> usize {
        self.w.dims()[1]
    }

    pub fn free_energy(&self, v: Tensor<B, 2>) -> Tensor<B, 1> {
        free_energy(v, self.w.val(), self.b.val(), self.c.val())
    }

    /// `mean F(positive) - mean F(negative)`, shape `[1]`.
    pub fn contrastive_divergence(&self, positive: Tensor<B, 2>, negative: Tensor<B, 2>) -> Tensor<B, 1> {
        self.free_energy(positive).mean() - self.free_energy(negative).mean()
    }
}

/// `F(v) = -v·b - Σ_j log(1 + exp(c_j + (vW)_j))` for each row of `v`.
pub fn free_energy<B: Backend>(
    v: Tensor<B, 2>,
    w: Tensor<B, 2>,
    b: Tensor<B, 1>,
    c: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [n, _] = v.dims();
    let visible_term = v.clone().matmul(b.unsqueeze_dim::<2>(1)).reshape([n]);
    let hidden_term = softplus(v.matmul(w) + c.unsqueeze::<2>())
        .sum_dim(1)
        .reshape([n]);

    visible_term.neg() - hidden_term
}

/// `h ~ Bernoulli(σ(vW + c))`.
pub fn sample_h_given_v<B: Backend, R: Rng>(
    v: Tensor<B, 2>,
    w: Tensor<B, 2>,
    c: Tensor<B, 1>,
    rng: &mut R,
) -> Tensor<B, 2> {
    let proba = sigmoid(v.matmul(w) + c.unsqueeze::<2>());
    sample_binomial(proba, rng)
}

/// `v ~ Bernoulli(σ(hWᵗ + b))`.
pub fn sample_v_given_h<B: Backend, R: Rng>(
    h: Tensor<B, 2>,
    w: Tensor<B, 2>,
    b: Tensor<B, 1>,
    rng: &mut R,
) -> Tensor<B, 2> {
    let proba = sigmoid(h.matmul(w.transpose()) + b.unsqueeze::<2>());
    sample_binomial(proba, rng)
}

/// Runs `k` full visible→hidden→visible sweeps starting from `v0`.
pub fn gibbs_v<B: Backend, R: Rng>(
    v0: Tensor<B, 2>,
    params: &RbmParams<B>,
    k: usize,
    rng: &mut R,
) -> Tensor<B, 2> {
    let mut v = v0;
    for _ in 0..k {
        let h = sample_h_given_v(v, params.w.clone(), params.c.clone(), rng);
        v = sample_v_given_h(h, params.w.clone(), params.b.clone(), rng);
    }
    v
}
