use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::{ManualLstm, ManualLstmConfig};
use crate::dataset::sequence::{self, SequenceConfig, SequenceExample};
use crate::error::{self, Error};
use crate::util;

#[derive(Config)]
pub struct LstmTrainingConfig {
    pub model: ManualLstmConfig,
    pub sequences: SequenceConfig,
    #[config(default = "AdamConfig::new()")]
    pub optimizer: AdamConfig,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = 10)]
    pub num_epochs: usize,
}

impl LstmTrainingConfig {
    /// One-hot inputs and outputs over the vocabulary, hidden width twice
    /// the vocabulary size.
    pub fn for_sequences(sequences: SequenceConfig) -> Self {
        let vocab = sequences.vocab_size;
        Self::new(ManualLstmConfig::new(vocab, 2 * vocab, vocab), sequences)
    }
}

/// Metadata stored next to each epoch's parameter record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochCheckpoint {
    pub epoch: usize,
    /// Mean validation loss measured at the start of the epoch.
    pub validation_loss: f32,
}

pub struct LstmTrainingOutput<B: AutodiffBackend> {
    pub model: ManualLstm<B::InnerBackend>,
    pub checkpoints: Vec<EpochCheckpoint>,
}

fn record_path(artifact_dir: &Path, epoch: usize) -> PathBuf {
    artifact_dir.join(format!("lstm_epoch{epoch}"))
}

fn metadata_path(artifact_dir: &Path, epoch: usize) -> PathBuf {
    artifact_dir.join(format!("lstm_epoch{epoch}.json"))
}

/// Mean of the per-sequence losses, without any update.
pub fn validation_loss<B: Backend>(
    model: &ManualLstm<B>,
    examples: &[SequenceExample],
    vocab_size: usize,
    device: &B::Device,
) -> error::Result<f32> {
    if examples.is_empty() {
        return Err(Error::EmptyDataset("validation sequences"));
    }
    let total: f32 = examples
        .iter()
        .map(|example| util::scalar(model.sequence_loss(&example.to_tensors(vocab_size, device))))
        .sum();
    Ok(total / examples.len() as f32)
}

fn check_vocab(model: &ManualLstmConfig, vocab_size: usize) -> error::Result<()> {
    if model.input_size != vocab_size || model.output_size != vocab_size {
        return Err(Error::ShapeMismatch {
            expected: format!("input and output width {vocab_size}"),
            actual: format!("input {} / output {}", model.input_size, model.output_size),
        });
    }
    Ok(())
}

/// Per epoch: measure validation loss, take one Adam step per training
/// sequence in order, then checkpoint the parameters as `lstm_epoch{n}`
/// (numbered from 1) with a JSON sidecar.
pub fn train<B: AutodiffBackend>(
    config: &LstmTrainingConfig,
    train: &[SequenceExample],
    valid: &[SequenceExample],
    artifact_dir: &Path,
    device: &B::Device,
) -> error::Result<LstmTrainingOutput<B>> {
    let vocab_size = config.sequences.vocab_size;
    check_vocab(&config.model, vocab_size)?;
    if train.is_empty() {
        return Err(Error::EmptyDataset("training sequences"));
    }
    tracing::info!(
        train = train.len(),
        valid = valid.len(),
        hidden = config.model.hidden_size,
        "Training LSTM"
    );

    let mut model: ManualLstm<B> = config.model.init(device);
    let mut optim = config.optimizer.init();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let mut checkpoints = Vec::with_capacity(config.num_epochs);

    for epoch in 0..config.num_epochs {
        let loss = validation_loss(&model.valid(), valid, vocab_size, device)?;
        tracing::info!(epoch, validation_loss = format!("{loss:.4}"), "Validation");

        for example in train {
            let tensors = example.to_tensors::<B>(vocab_size, device);
            let loss = model.sequence_loss(&tensors);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);
        }

        let checkpoint = EpochCheckpoint {
            epoch: epoch + 1,
            validation_loss: loss,
        };
        model
            .valid()
            .save_file(record_path(artifact_dir, checkpoint.epoch), &recorder)
            .map_err(|e| Error::Record(e.to_string()))?;
        let path = metadata_path(artifact_dir, checkpoint.epoch);
        let file = std::fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::to_writer_pretty(file, &checkpoint)?;
        checkpoints.push(checkpoint);
    }

    Ok(LstmTrainingOutput {
        model: model.valid(),
        checkpoints,
    })
}

/// Restores the parameters and metadata written at the end of `epoch`.
pub fn load_checkpoint<B: Backend>(
    config: &ManualLstmConfig,
    artifact_dir: &Path,
    epoch: usize,
    device: &B::Device,
) -> error::Result<(ManualLstm<B>, EpochCheckpoint)> {
    let record = record_path(artifact_dir, epoch);
    let model = config
        .init::<B>(device)
        .load_file(
            record.clone(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| Error::Record(format!("{}: {e}", record.display())))?;

    let path = metadata_path(artifact_dir, epoch);
    let file = std::fs::File::open(&path).map_err(|e| Error::io(&path, e))?;
    let checkpoint = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok((model, checkpoint))
}

/// Loads the token sequences, trains and checkpoints into `artifact_dir`.
pub fn run<B: AutodiffBackend>(
    config: &LstmTrainingConfig,
    sequences_path: &Path,
    artifact_dir: &Path,
    device: &B::Device,
) -> error::Result<Vec<EpochCheckpoint>> {
    util::create_artifact_dir(artifact_dir)?;
    let config_path = artifact_dir.join("config.json");
    config
        .save(&config_path)
        .map_err(|e| Error::io(&config_path, e))?;

    let (train_set, valid_set) = sequence::load_splits(sequences_path, &config.sequences)?;
    let output = train::<B>(config, &train_set, &valid_set, artifact_dir, device)?;
    Ok(output.checkpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sequence::prepare_sequences;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn tiny_config(num_epochs: usize) -> LstmTrainingConfig {
        let sequences = SequenceConfig::new()
            .with_vocab_size(8)
            .with_eos(6)
            .with_padding(7)
            .with_seq_size(8)
            .with_min_len(2);
        let mut config = LstmTrainingConfig::for_sequences(sequences)
            .with_num_epochs(num_epochs)
            .with_learning_rate(1e-2);
        config.model.hidden_size = 6;
        config
    }

    fn tiny_examples(config: &LstmTrainingConfig) -> Vec<SequenceExample> {
        let raw = vec![vec![0, 1, 2, 3], vec![1, 2, 3, 4, 5], vec![0, 1, 2, 3, 4]];
        prepare_sequences(&raw, &config.sequences).unwrap()
    }

    #[test]
    fn default_hidden_width_is_twice_vocab() {
        let config = LstmTrainingConfig::for_sequences(SequenceConfig::new());
        assert_eq!(config.model.input_size, 102);
        assert_eq!(config.model.hidden_size, 204);
        assert_eq!(config.num_epochs, 10);
    }

    #[test]
    fn each_epoch_writes_numbered_checkpoint() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(2);
        let examples = tiny_examples(&config);

        let output =
            train::<TestAutodiffBackend>(&config, &examples, &examples[..1], dir.path(), &device).unwrap();

        assert_eq!(output.checkpoints.len(), 2);
        assert_eq!(output.checkpoints[1].epoch, 2);
        for epoch in [1, 2] {
            assert!(dir.path().join(format!("lstm_epoch{epoch}.json")).exists());
        }
        assert!(!dir.path().join("lstm_epoch0.json").exists());
    }

    #[test]
    fn validation_loss_falls_while_fitting_training_set() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(6);
        let examples = tiny_examples(&config);

        let output = train::<TestAutodiffBackend>(&config, &examples, &examples, dir.path(), &device).unwrap();
        let first = output.checkpoints[0].validation_loss;
        let last = output.checkpoints[5].validation_loss;
        assert!(last < first, "validation loss went from {first} to {last}");
    }

    #[test]
    fn checkpoint_restores_parameters_and_metadata() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(1);
        let examples = tiny_examples(&config);

        let output = train::<TestAutodiffBackend>(&config, &examples, &examples, dir.path(), &device).unwrap();
        let (restored, checkpoint) =
            load_checkpoint::<TestBackend>(&config.model, dir.path(), 1, &device).unwrap();

        assert_eq!(checkpoint, output.checkpoints[0]);
        let probe = examples[0].to_tensors::<TestBackend>(8, &device).inputs;
        assert_eq!(
            util::tensor_to_vec(restored.forward(probe.clone())),
            util::tensor_to_vec(output.model.forward(probe))
        );
    }

    #[test]
    fn empty_validation_set_is_an_error() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let config = tiny_config(1);
        let examples = tiny_examples(&config);

        let result = train::<TestAutodiffBackend>(&config, &examples, &[], dir.path(), &device);
        assert!(matches!(result, Err(Error::EmptyDataset(_))));
    }

    #[test]
    fn vocabulary_width_must_match_model() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut config = tiny_config(1);
        config.model.output_size = 5;

        let result = train::<TestAutodiffBackend>(&config, &[], &[], dir.path(), &device);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
