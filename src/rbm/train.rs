use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::visualize::{self, VisualizeConfig};
use super::{gibbs_v, Rbm, RbmModelConfig, RbmParams};
use crate::dataset::{mnist, FeatureTable};
use crate::error::{self, Error};
use crate::util::{self, batch::CyclicBatches};

#[derive(Config)]
pub struct RbmConfig {
    pub model: RbmModelConfig,
    #[config(default = "AdamConfig::new()")]
    pub optimizer: AdamConfig,
    /// Gibbs sweeps used to draw each negative sample.
    #[config(default = 1)]
    pub gibbs_steps: usize,
    #[config(default = 50)]
    pub batch_size: usize,
    /// Optimizer steps; each step consumes one mini-batch.
    #[config(default = 10000)]
    pub num_epochs: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = 50)]
    pub probe_epochs: usize,
    #[config(default = 3)]
    pub seed: u64,
}

impl RbmConfig {
    /// Hyperparameters used for the MNIST run.
    pub fn mnist_default() -> Self {
        Self::new(RbmModelConfig::new(mnist::IMAGE_PIXELS, 500))
            .with_learning_rate(1e-2)
            .with_gibbs_steps(10)
            .with_batch_size(100)
            .with_num_epochs(500)
            .with_probe_epochs(50)
    }
}

/// Mean per-row L1 distance between `v` and its one-sweep reconstruction.
pub fn reconstruction_mae<B: Backend, R: Rng>(
    v: Tensor<B, 2>,
    params: &RbmParams<B>,
    rng: &mut R,
) -> f32 {
    let [n, _] = v.dims();
    let reconstructed = gibbs_v(v.clone(), params, 1, rng);
    util::scalar((reconstructed - v).abs().sum()) / n as f32
}

fn check_width(table: &FeatureTable, n_visible: usize, name: &str) -> error::Result<()> {
    if table.num_cols() != n_visible {
        return Err(Error::ShapeMismatch {
            expected: format!("{n_visible} visible units"),
            actual: format!("{} columns in {name} data", table.num_cols()),
        });
    }
    Ok(())
}

/// Fits an RBM by contrastive divergence and returns the learned parameters.
///
/// Every entry of `visible` must be exactly `0.0` or `1.0`; anything else is
/// rejected before a model is even initialized.
pub fn fit<B: AutodiffBackend>(
    config: &RbmConfig,
    visible: &FeatureTable,
    validation: Option<&FeatureTable>,
    device: &B::Device,
) -> error::Result<RbmParams<B::InnerBackend>> {
    if let Some((row, col, value)) = visible.find_non_binary() {
        return Err(Error::NonBinaryInput { row, col, value });
    }
    check_width(visible, config.model.n_visible, "training")?;
    if let Some(validation) = validation {
        if validation.num_rows() == 0 {
            return Err(Error::EmptyDataset("validation"));
        }
        check_width(validation, config.model.n_visible, "validation")?;
    }

    match validation {
        Some(validation) => tracing::info!(
            "{} training samples, {} validation samples, R^{}",
            visible.num_rows(),
            validation.num_rows(),
            visible.num_cols()
        ),
        None => tracing::info!(
            "{} training samples, R^{}",
            visible.num_rows(),
            visible.num_cols()
        ),
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut model: Rbm<B> = config.model.init(device, &mut rng);
    let mut optim = config.optimizer.init();
    let mut batches = CyclicBatches::new(visible.num_rows(), config.batch_size, rng.random())?;
    let validation = validation.map(|table| table.to_tensor::<B::InnerBackend>(device));

    for step in 0..config.num_epochs {
        let indices = batches.next_batch();
        let batch = visible.batch_tensor::<B::InnerBackend>(&indices, device);
        let params = model.valid().params();
        let negative = gibbs_v(batch.clone(), &params, config.gibbs_steps, &mut rng);

        let loss = model.contrastive_divergence(
            Tensor::from_inner(batch),
            Tensor::from_inner(negative),
        );

        if config.probe_epochs > 0 && step % config.probe_epochs == 0 {
            let loss_value = util::scalar(loss.clone());
            match &validation {
                Some(validation) => {
                    let mae = reconstruction_mae(validation.clone(), &params, &mut rng);
                    tracing::info!(
                        step,
                        loss = format!("{loss_value:.4}"),
                        validation_reconstruct_mae = format!("{mae:.4}"),
                        "Probe"
                    );
                }
                None => tracing::info!(step, loss = format!("{loss_value:.4}"), "Probe"),
            }
        }

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(config.learning_rate, model, grads);
    }

    Ok(model.valid().params())
}

pub fn save_params<B: Backend>(params: RbmParams<B>, path: &Path) -> error::Result<()> {
    Rbm::from_params(params)
        .save_file(path.to_path_buf(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| Error::Record(e.to_string()))
}

pub fn load_params<B: Backend>(
    config: &RbmModelConfig,
    path: &Path,
    device: &B::Device,
) -> error::Result<RbmParams<B>> {
    let model = config
        .init::<B, _>(device, &mut StdRng::seed_from_u64(0))
        .load_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| Error::Record(format!("{}: {e}", path.display())))?;
    Ok(model.params())
}

/// Fits on binarized MNIST, saves the parameters and renders sample grids.
pub fn run<B: AutodiffBackend>(
    config: &RbmConfig,
    visualize_config: &VisualizeConfig,
    artifact_dir: &Path,
    device: &B::Device,
) -> error::Result<RbmParams<B::InnerBackend>> {
    util::create_artifact_dir(artifact_dir)?;
    let config_path = artifact_dir.join("config.json");
    config
        .save(&config_path)
        .map_err(|e| Error::io(&config_path, e))?;

    let data = mnist::load();
    let train = mnist::binarize(&data.train)?;
    let validation = mnist::binarize(&mnist::sample(
        &data.validation,
        visualize_config.validation_samples,
        visualize_config.seed,
    ))?;

    let params = fit::<B>(config, &train, Some(&validation), device)?;
    save_params(params.clone(), &artifact_dir.join("rbm"))?;

    let test = mnist::binarize(&data.test)?;
    visualize::render::<B::InnerBackend>(visualize_config, &params, &test, artifact_dir, device)?;
    Ok(params)
}
