//! Degree-2 factorization machine for ±1 binary classification.
//!
//! ```text
//! y = w0 + Xw + (X ⊗ X) vec(VVᵗ)
//! ```
//!
//! The pairwise term is evaluated in its factored form `Σ_f (x·V_f)²`, which
//! equals `xᵗVVᵗx` without materializing the `d²` outer-product features.

pub mod train;

use burn::module::Param;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{self, Error};
use crate::util::{self, init};

#[derive(Config, Debug)]
pub struct FactorizationMachineConfig {
    pub input_dim: usize,
    #[config(default = 10)]
    pub latent_dim: usize,
    #[config(default = 0)]
    pub seed_w: u64,
    #[config(default = 1)]
    pub seed_v: u64,
}

#[derive(Module, Debug)]
pub struct FactorizationMachine<B: Backend> {
    /// Global bias, shape `[1]`.
    w0: Param<Tensor<B, 1>>,
    /// Linear weights, shape `[d, 1]`.
    w: Param<Tensor<B, 2>>,
    /// Latent factors, shape `[d, k]`.
    v: Param<Tensor<B, 2>>,
}

impl FactorizationMachineConfig {
    /// Zero bias; `w` and `V` from a normal truncated at two standard
    /// deviations, `σ = 1/√d`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FactorizationMachine<B> {
        let std = 1.0 / (self.input_dim as f32).sqrt();
        let w = init::truncated_normal(
            self.input_dim,
            std,
            &mut StdRng::seed_from_u64(self.seed_w),
        );
        let v = init::truncated_normal(
            self.input_dim * self.latent_dim,
            std,
            &mut StdRng::seed_from_u64(self.seed_v),
        );

        FactorizationMachine {
            w0: init::zeros_param([1], device),
            w: init::param(w, [self.input_dim, 1], device),
            v: init::param(v, [self.input_dim, self.latent_dim], device),
        }
    }
}

impl<B: Backend> FactorizationMachine<B> {
    /// Builds a model from explicit weights; `v` is row-major `[d, k]`.
    pub fn from_weights(
        w0: f32,
        w: Vec<f32>,
        v: Vec<f32>,
        latent_dim: usize,
        device: &B::Device,
    ) -> error::Result<Self> {
        let input_dim = w.len();
        if v.len() != input_dim * latent_dim {
            return Err(Error::ShapeMismatch {
                expected: format!("{input_dim}x{latent_dim} latent factors"),
                actual: format!("{} values", v.len()),
            });
        }
        Ok(Self {
            w0: init::param(vec![w0], [1], device),
            w: init::param(w, [input_dim, 1], device),
            v: init::param(v, [input_dim, latent_dim], device),
        })
    }

    /// Margins for a batch `[n, d]`, shape `[n]`. The sign is the class.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = x.dims();
        let linear = x.clone().matmul(self.w.val());
        let pairwise = x.matmul(self.v.val()).powi_scalar(2).sum_dim(1);
        let bias = self.w0.val().unsqueeze::<2>();

        (linear + pairwise + bias).reshape([batch])
    }

    /// Same margins computed literally as `w0 + Xw + pairwise_features(X)·vec(VVᵗ)`.
    pub fn forward_expanded(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, dim] = x.dims();
        let v = self.v.val();
        let vvt = v.clone().matmul(v.transpose()).reshape([dim * dim, 1]);
        let linear = x.clone().matmul(self.w.val());
        let pairwise = pairwise_features(x).matmul(vvt);
        let bias = self.w0.val().unsqueeze::<2>();

        (linear + pairwise + bias).reshape([batch])
    }

    /// `(Σ w², Σ V²)`, each shape `[1]`.
    pub fn regularization(&self) -> (Tensor<B, 1>, Tensor<B, 1>) {
        (
            self.w.val().powi_scalar(2).sum(),
            self.v.val().powi_scalar(2).sum(),
        )
    }

    /// Negative log-likelihood plus L2 penalties.
    pub fn loss(
        &self,
        x: Tensor<B, 2>,
        labels: Tensor<B, 1>,
        penalty_w: f64,
        penalty_v: f64,
    ) -> FmLoss<B> {
        let margins = self.forward(x);
        let nll = nll(margins.clone(), labels);
        let (reg_w, reg_v) = self.regularization();
        let total = nll.clone() + reg_w.clone().mul_scalar(penalty_w) + reg_v.clone().mul_scalar(penalty_v);

        FmLoss {
            total,
            nll,
            reg_w,
            reg_v,
            margins,
        }
    }
}

/// Loss terms of one batch, kept apart for logging.
#[derive(Clone, Debug)]
pub struct FmLoss<B: Backend> {
    pub total: Tensor<B, 1>,
    pub nll: Tensor<B, 1>,
    pub reg_w: Tensor<B, 1>,
    pub reg_v: Tensor<B, 1>,
    pub margins: Tensor<B, 1>,
}

/// Row `r` is `vec(x_r x_rᵗ)`, shape `[n, d²]`.
pub fn pairwise_features<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, dim] = x.dims();
    let outer = x.clone().unsqueeze_dim::<3>(2) * x.unsqueeze_dim::<3>(1);
    outer.reshape([batch, dim * dim])
}

/// `-mean(log σ(y·label))`, evaluated as `mean(softplus(-y·label))`.
pub fn nll<B: Backend>(margins: Tensor<B, 1>, labels: Tensor<B, 1>) -> Tensor<B, 1> {
    util::softplus((margins * labels).neg()).mean()
}

/// Fraction of rows with `y·label > 0`.
pub fn accuracy<B: Backend>(margins: Tensor<B, 1>, labels: Tensor<B, 1>) -> f32 {
    util::scalar((margins * labels).greater_elem(0.0).float().mean())
}
