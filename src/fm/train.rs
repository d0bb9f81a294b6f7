//! Mini-batch Adam training for the factorization machine, with periodic
//! validation-loss probes and a held-out test evaluation.

use std::path::Path;

use burn::data::dataset::vision::MnistItem;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::{accuracy, nll, FactorizationMachine, FactorizationMachineConfig};
use crate::dataset::{mnist, LabeledTable, Splits};
use crate::error::{self, Error};
use crate::util::{self, batch::CyclicBatches};

#[derive(Config)]
pub struct FmTrainingConfig {
    pub model: FactorizationMachineConfig,
    #[config(default = "AdamConfig::new()")]
    pub optimizer: AdamConfig,
    #[config(default = 1e-2)]
    pub learning_rate: f64,
    #[config(default = 1e-2)]
    pub penalty_w: f64,
    #[config(default = 1e-2)]
    pub penalty_v: f64,
    #[config(default = 50)]
    pub batch_size: usize,
    /// Optimizer steps; each step consumes one mini-batch.
    #[config(default = 500)]
    pub num_epochs: usize,
    #[config(default = 5)]
    pub probe_epochs: usize,
    #[config(default = 2)]
    pub negative_digit: u8,
    #[config(default = 5)]
    pub positive_digit: u8,
    #[config(default = 42)]
    pub seed: u64,
}

impl FmTrainingConfig {
    pub fn mnist_default() -> Self {
        Self::new(FactorizationMachineConfig::new(mnist::IMAGE_PIXELS))
    }
}

/// One validation probe: samples seen so far and mean validation NLL.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationPoint {
    pub step: usize,
    pub validation_loss: f32,
}

#[derive(Debug)]
pub struct FmTrainingOutput<B: AutodiffBackend> {
    pub model: FactorizationMachine<B>,
    pub validation_losses: Vec<ValidationPoint>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FmReport {
    pub validation_losses: Vec<ValidationPoint>,
    pub test_accuracy: f32,
}

/// Mean NLL over the complete `batch_size` batches of `table`.
pub fn validation_loss<B: Backend>(
    model: &FactorizationMachine<B>,
    table: &LabeledTable,
    batch_size: usize,
    device: &B::Device,
) -> error::Result<f32> {
    let num_batches = if batch_size == 0 { 0 } else { table.len() / batch_size };
    if num_batches == 0 {
        return Err(Error::EmptyDataset("validation"));
    }

    let mut total = 0.0;
    for k in 0..num_batches {
        let indices: Vec<usize> = (k * batch_size..(k + 1) * batch_size).collect();
        let (x, labels) = table.batch::<B>(&indices, device);
        total += util::scalar(nll(model.forward(x), labels));
    }
    Ok(total / num_batches as f32)
}

/// Accuracy over the complete `batch_size` batches of `table`; trailing rows
/// that do not fill a batch are ignored.
pub fn evaluate_accuracy<B: Backend>(
    model: &FactorizationMachine<B>,
    table: &LabeledTable,
    batch_size: usize,
    device: &B::Device,
) -> error::Result<f32> {
    let num_batches = if batch_size == 0 { 0 } else { table.len() / batch_size };
    if num_batches == 0 {
        return Err(Error::EmptyDataset("test"));
    }

    let mut predictions = Vec::with_capacity(num_batches * batch_size);
    for k in 0..num_batches {
        let indices: Vec<usize> = (k * batch_size..(k + 1) * batch_size).collect();
        let (x, _) = table.batch::<B>(&indices, device);
        predictions.extend(util::tensor_to_vec(model.forward(x)));
    }

    let correct = predictions
        .iter()
        .zip(&table.labels)
        .filter(|(y, label)| *y * *label > 0.0)
        .count();
    Ok(correct as f32 / predictions.len() as f32)
}

pub fn train<B: AutodiffBackend>(
    config: &FmTrainingConfig,
    train: &LabeledTable,
    validation: &LabeledTable,
    device: &B::Device,
) -> error::Result<FmTrainingOutput<B>> {
    if train.features.num_cols() != config.model.input_dim {
        return Err(Error::ShapeMismatch {
            expected: format!("{} input features", config.model.input_dim),
            actual: format!("{} input features", train.features.num_cols()),
        });
    }

    let mut model = config.model.init::<B>(device);
    let mut optim = config.optimizer.init();
    let mut batches = CyclicBatches::new(train.len(), config.batch_size, config.seed)?;
    let mut validation_losses = Vec::new();

    let (_, reg_v) = model.regularization();
    tracing::info!(
        v_abs_sum = util::scalar(model.v.val().abs().sum()),
        reg_v = util::scalar(reg_v),
        "Initialized factorization machine"
    );

    for step in 0..config.num_epochs {
        let indices = batches.next_batch();
        let (x, labels) = train.batch::<B>(&indices, device);
        let loss = model.loss(x, labels.clone(), config.penalty_w, config.penalty_v);

        if config.probe_epochs > 0 && step % config.probe_epochs == 0 {
            let batch_accuracy = accuracy(loss.margins.clone(), labels);
            tracing::info!(
                step,
                accuracy = format!("{:.2}%", batch_accuracy * 100.0),
                reg_v = format!("{:.3}", util::scalar(loss.reg_v.clone())),
                reg_w = format!("{:.3}", util::scalar(loss.reg_w.clone())),
                nll = format!("{:.3}", util::scalar(loss.nll.clone())),
                "Probe"
            );

            let validation_loss = validation_loss(&model.valid(), validation, config.batch_size, device)?;
            tracing::info!(step, validation_loss = format!("{validation_loss:.4}"), "Validation");
            validation_losses.push(ValidationPoint {
                step: step * config.batch_size,
                validation_loss,
            });
        }

        let grads = GradientsParams::from_grads(loss.total.backward(), &model);
        model = optim.step(config.learning_rate, model, grads);
    }

    Ok(FmTrainingOutput {
        model,
        validation_losses,
    })
}

pub fn save_validation_losses(path: &Path, points: &[ValidationPoint]) -> error::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush().map_err(|e| Error::io(path, e))
}

pub fn load_validation_losses(path: &Path) -> error::Result<Vec<ValidationPoint>> {
    let mut reader = csv::Reader::from_path(path)?;
    let points = reader
        .deserialize::<ValidationPoint>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(points)
}

/// Trains on already-split tables, writes artifacts and scores the test split.
pub fn run_on<B: AutodiffBackend>(
    config: &FmTrainingConfig,
    splits: &Splits<LabeledTable>,
    artifact_dir: &Path,
    device: &B::Device,
) -> error::Result<FmReport> {
    util::create_artifact_dir(artifact_dir)?;
    let config_path = artifact_dir.join("config.json");
    config
        .save(&config_path)
        .map_err(|e| Error::io(&config_path, e))?;

    for (name, table) in [
        ("training", &splits.train),
        ("validation", &splits.validation),
        ("test", &splits.test),
    ] {
        tracing::info!(
            positives = table.count_label(1.0),
            negatives = table.count_label(-1.0),
            "{name} set"
        );
    }

    let output = train::<B>(config, &splits.train, &splits.validation, device)?;
    save_validation_losses(&artifact_dir.join("validation_loss.csv"), &output.validation_losses)?;

    let model = output.model.valid();
    let test_accuracy = evaluate_accuracy(&model, &splits.test, config.batch_size, device)?;
    tracing::info!(accuracy = format!("{:.2}%", test_accuracy * 100.0), "Accuracy on test set");

    model
        .save_file(artifact_dir.join("model"), &CompactRecorder::new())
        .map_err(|e| Error::Record(e.to_string()))?;

    Ok(FmReport {
        validation_losses: output.validation_losses,
        test_accuracy,
    })
}

/// MNIST digits `negative_digit` vs `positive_digit`.
pub fn run<B: AutodiffBackend>(
    config: &FmTrainingConfig,
    artifact_dir: &Path,
    device: &B::Device,
) -> error::Result<FmReport> {
    let mnist = mnist::load();
    let select = |items: &[MnistItem]| {
        mnist::binary_digits(items, config.negative_digit, config.positive_digit)
    };
    let splits = Splits {
        train: select(&mnist.train)?,
        validation: select(&mnist.validation)?,
        test: select(&mnist.test)?,
    };
    run_on::<B>(config, &splits, artifact_dir, device)
}
