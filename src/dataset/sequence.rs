//! Token sequences for the next-token LSTM: loading, filtering, padding and
//! step-weight masks.

use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{self, Error};

#[derive(Config, Debug)]
pub struct SequenceConfig {
    /// Distinct tokens, end-of-sequence and padding markers included.
    #[config(default = 102)]
    pub vocab_size: usize,
    #[config(default = 100)]
    pub eos: usize,
    #[config(default = 101)]
    pub padding: usize,
    /// Padded width; one fewer recurrent steps are unrolled.
    #[config(default = 15)]
    pub seq_size: usize,
    /// Sequences this short or shorter are dropped.
    #[config(default = 5)]
    pub min_len: usize,
    /// Keep every n-th raw sequence.
    #[config(default = 2)]
    pub subsample_stride: usize,
    #[config(default = 0.9)]
    pub train_ratio: f64,
    #[config(default = 0)]
    pub seed: u64,
}

impl SequenceConfig {
    pub fn num_steps(&self) -> usize {
        self.seq_size.saturating_sub(1)
    }

    /// EOS and padding must be distinct tokens inside the vocabulary.
    pub fn validate(&self) -> error::Result<()> {
        for (name, token) in [("eos", self.eos), ("padding", self.padding)] {
            if token >= self.vocab_size {
                return Err(Error::Config(format!(
                    "{name} token {token} is outside a vocabulary of {}",
                    self.vocab_size
                )));
            }
        }
        if self.eos == self.padding {
            return Err(Error::Config(format!(
                "eos and padding share token {}",
                self.eos
            )));
        }
        Ok(())
    }
}

/// One padded sequence ready for the recurrence.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceExample {
    /// Tokens fed at each step.
    pub inputs: Vec<usize>,
    /// Token expected after each step.
    pub targets: Vec<usize>,
    /// `1.0` where the target is part of the real sequence.
    pub weights: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct SequenceTensors<B: Backend> {
    pub inputs: Tensor<B, 2>,  // [num_steps, vocab]
    pub targets: Tensor<B, 2>, // [num_steps, vocab]
    pub weights: Tensor<B, 1>, // [num_steps]
}

impl SequenceExample {
    pub fn to_tensors<B: Backend>(&self, vocab_size: usize, device: &B::Device) -> SequenceTensors<B> {
        SequenceTensors {
            inputs: one_hot(&self.inputs, vocab_size, device),
            targets: one_hot(&self.targets, vocab_size, device),
            weights: Tensor::from_data(
                TensorData::new(self.weights.clone(), [self.weights.len()]),
                device,
            ),
        }
    }
}

pub fn one_hot<B: Backend>(tokens: &[usize], vocab_size: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; tokens.len() * vocab_size];
    for (row, &token) in tokens.iter().enumerate() {
        values[row * vocab_size + token] = 1.0;
    }
    Tensor::from_data(TensorData::new(values, [tokens.len(), vocab_size]), device)
}

/// Reads a JSON array of integer arrays.
pub fn load_sequences(path: &Path) -> error::Result<Vec<Vec<usize>>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let sequences = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(sequences)
}

/// Appends EOS and pads to `seq_size`. Returns the padded tokens and the
/// length including EOS, or `None` when the sequence is filtered out.
pub fn pad_sequence(raw: &[usize], config: &SequenceConfig) -> Option<(Vec<usize>, usize)> {
    let len = raw.len();
    if len >= config.seq_size || len <= config.min_len {
        return None;
    }
    let mut padded = Vec::with_capacity(config.seq_size);
    padded.extend_from_slice(raw);
    padded.push(config.eos);
    padded.resize(config.seq_size, config.padding);
    Some((padded, len + 1))
}

/// Turns raw token sequences into shifted input/target pairs with masks.
pub fn prepare_sequences(raw: &[Vec<usize>], config: &SequenceConfig) -> error::Result<Vec<SequenceExample>> {
    config.validate()?;
    let num_steps = config.num_steps();
    let mut examples = Vec::new();

    for sequence in raw {
        if let Some(&token) = sequence.iter().find(|&&t| t >= config.vocab_size) {
            return Err(Error::ShapeMismatch {
                expected: format!("tokens below {}", config.vocab_size),
                actual: format!("token {token}"),
            });
        }
        let Some((padded, len_with_eos)) = pad_sequence(sequence, config) else {
            continue;
        };

        let mut weights = vec![0.0f32; num_steps];
        weights[..len_with_eos - 1].fill(1.0);
        examples.push(SequenceExample {
            inputs: padded[..num_steps].to_vec(),
            targets: padded[1..].to_vec(),
            weights,
        });
    }

    tracing::info!(
        raw = raw.len(),
        kept = examples.len(),
        "Prepared token sequences"
    );
    Ok(examples)
}

/// Shuffles once with the configured seed and splits into train / validation.
pub fn split_sequences(
    mut examples: Vec<SequenceExample>,
    config: &SequenceConfig,
) -> (Vec<SequenceExample>, Vec<SequenceExample>) {
    examples.shuffle(&mut StdRng::seed_from_u64(config.seed));
    let split_point = (config.train_ratio * examples.len() as f64) as usize;
    let valid = examples.split_off(split_point.min(examples.len()));
    (examples, valid)
}

/// Loads, subsamples, prepares and splits a sequence file.
pub fn load_splits(
    path: &Path,
    config: &SequenceConfig,
) -> error::Result<(Vec<SequenceExample>, Vec<SequenceExample>)> {
    let raw = load_sequences(path)?;
    tracing::info!(samples = raw.len(), "Loaded raw token sequences");
    let raw: Vec<Vec<usize>> = raw
        .into_iter()
        .step_by(config.subsample_stride.max(1))
        .collect();
    let (train, valid) = split_sequences(prepare_sequences(&raw, config)?, config);
    tracing::info!(train = train.len(), valid = valid.len(), "Split token sequences");
    Ok((train, valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn config() -> SequenceConfig {
        SequenceConfig::new()
    }

    #[test]
    fn padding_mask_marks_exactly_true_length() {
        let config = config();
        let raw = vec![vec![3, 1, 4, 1, 5, 9, 2]];
        let examples = prepare_sequences(&raw, &config).unwrap();
        let example = &examples[0];

        assert_eq!(example.weights.len(), config.num_steps());
        assert_eq!(example.weights.iter().filter(|&&w| w == 1.0).count(), 7);
        assert_eq!(example.weights.iter().filter(|&&w| w == 0.0).count(), 14 - 7);
        assert!(example.weights[..7].iter().all(|&w| w == 1.0));
    }

    #[test]
    fn targets_are_inputs_shifted_by_one() {
        let config = config();
        let examples = prepare_sequences(&[vec![7, 8, 9, 10, 11, 12]], &config).unwrap();
        let example = &examples[0];

        assert_eq!(&example.inputs[..7], &[7, 8, 9, 10, 11, 12, 100]);
        assert_eq!(&example.targets[..7], &[8, 9, 10, 11, 12, 100, 101]);
        assert_eq!(example.targets[13], 101);
    }

    #[test]
    fn short_and_long_sequences_are_dropped() {
        let config = config();
        let raw = vec![vec![1; 5], vec![1; 15], vec![1; 20], vec![1; 6], vec![1; 14]];
        let examples = prepare_sequences(&raw, &config).unwrap();
        assert_eq!(examples.len(), 2);
        // Longest kept sequence fills every step: EOS lands on the last slot.
        assert!(examples[1].weights.iter().all(|&w| w == 1.0));
        assert_eq!(*examples[1].targets.last().unwrap(), 100);
    }

    #[test]
    fn out_of_vocabulary_token_is_an_error() {
        let err = prepare_sequences(&[vec![1, 2, 3, 4, 5, 102]], &config()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn markers_outside_vocabulary_are_rejected() {
        let raw = vec![vec![0, 1, 2, 3]];
        let base = || SequenceConfig::new().with_vocab_size(8).with_seq_size(8).with_min_len(2);

        for config in [
            base().with_eos(8).with_padding(7),
            base().with_eos(6).with_padding(9),
            base().with_eos(7).with_padding(7),
        ] {
            let err = prepare_sequences(&raw, &config).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{err}");
        }

        let examples = prepare_sequences(&raw, &base().with_eos(6).with_padding(7)).unwrap();
        let tensors = examples[0].to_tensors::<TestBackend>(8, &Default::default());
        let row_sums = tensors.inputs.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        assert!(row_sums.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn split_is_deterministic_and_complete() {
        let config = config();
        let raw: Vec<Vec<usize>> = (0..20).map(|i| vec![i; 8]).collect();
        let examples = prepare_sequences(&raw, &config).unwrap();

        let (train_a, valid_a) = split_sequences(examples.clone(), &config);
        let (train_b, valid_b) = split_sequences(examples, &config);
        assert_eq!(train_a.len(), 18);
        assert_eq!(valid_a.len(), 2);
        assert_eq!(train_a, train_b);
        assert_eq!(valid_a, valid_b);
    }

    #[test]
    fn load_splits_subsamples_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq.json");
        let raw: Vec<Vec<usize>> = (0..40).map(|i| vec![i % 100; 9]).collect();
        std::fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

        let (train, valid) = load_splits(&path, &config()).unwrap();
        assert_eq!(train.len() + valid.len(), 20);
    }

    #[test]
    fn tensors_are_one_hot() {
        let device = Default::default();
        let config = config();
        let examples = prepare_sequences(&[vec![0, 1, 2, 3, 4, 5]], &config).unwrap();
        let tensors = examples[0].to_tensors::<TestBackend>(config.vocab_size, &device);

        assert_eq!(tensors.inputs.dims(), [14, 102]);
        let row_sums = tensors.targets.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        assert!(row_sums.iter().all(|&s| s == 1.0));
        let weights = tensors.weights.sum().into_scalar();
        assert_eq!(weights, 6.0);
    }
}
