//! Hand-written LSTM cell unrolled over a fixed number of steps and trained as
//! a next-token predictor.
//!
//! Each gate reads the concatenation `z = [h; x]`:
//!
//! ```text
//! f  = σ(Wf z + bf)        i = σ(Wi z + bi)        o = σ(Wo z + bo)
//! ĉ  = tanh(Wc z + bc)
//! c' = f ⊙ c + i ⊙ ĉ       h' = o ⊙ tanh(c')
//! logits = Wout h' + bout
//! ```

pub mod train;

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::{log_softmax, sigmoid, softmax};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::sequence::SequenceTensors;
use crate::util::init;

#[derive(Config, Debug)]
pub struct ManualLstmConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    #[config(default = 0)]
    pub seed: u64,
}

/// Gate matrices are `[hidden, hidden + input]` and act on column vectors;
/// the row-vector state is multiplied by their transpose.
#[derive(Module, Debug)]
pub struct ManualLstm<B: Backend> {
    wf: Param<Tensor<B, 2>>,
    bf: Param<Tensor<B, 1>>,
    wi: Param<Tensor<B, 2>>,
    bi: Param<Tensor<B, 1>>,
    wo: Param<Tensor<B, 2>>,
    bo: Param<Tensor<B, 1>>,
    wc: Param<Tensor<B, 2>>,
    bc: Param<Tensor<B, 1>>,
    wout: Param<Tensor<B, 2>>,
    bout: Param<Tensor<B, 1>>,
}

/// Recurrent state, both tensors shape `[1, hidden]`.
#[derive(Clone, Debug)]
pub struct LstmState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell: Tensor<B, 2>,
}

impl<B: Backend> LstmState<B> {
    pub fn zeros(hidden_size: usize, device: &B::Device) -> Self {
        Self {
            hidden: Tensor::zeros([1, hidden_size], device),
            cell: Tensor::zeros([1, hidden_size], device),
        }
    }
}

impl ManualLstmConfig {
    /// Gate and output weights use uniform unit scaling, biases start at zero.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ManualLstm<B> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let gate_dims = [self.hidden_size, self.hidden_size + self.input_size];
        let output_dims = [self.output_size, self.hidden_size];
        let mut gate = || init::param(init::uniform_unit_scaling(gate_dims, &mut rng), gate_dims, device);
        let (wf, wi, wo, wc) = (gate(), gate(), gate(), gate());
        let wout = init::param(init::uniform_unit_scaling(output_dims, &mut rng), output_dims, device);

        ManualLstm {
            wf,
            bf: init::zeros_param([self.hidden_size], device),
            wi,
            bi: init::zeros_param([self.hidden_size], device),
            wo,
            bo: init::zeros_param([self.hidden_size], device),
            wc,
            bc: init::zeros_param([self.hidden_size], device),
            wout,
            bout: init::zeros_param([self.output_size], device),
        }
    }
}

fn affine<B: Backend>(z: Tensor<B, 2>, w: &Param<Tensor<B, 2>>, b: &Param<Tensor<B, 1>>) -> Tensor<B, 2> {
    z.matmul(w.val().transpose()) + b.val().unsqueeze::<2>()
}

impl<B: Backend> ManualLstm<B> {
    pub fn hidden_size(&self) -> usize {
        self.wf.dims()[0]
    }

    pub fn input_size(&self) -> usize {
        self.wf.dims()[1] - self.hidden_size()
    }

    pub fn output_size(&self) -> usize {
        self.wout.dims()[0]
    }

    /// One recurrence step on `x` of shape `[1, input]`. Returns the next
    /// state and the unnormalized output scores `[1, output]`.
    pub fn step(&self, state: LstmState<B>, x: Tensor<B, 2>) -> (LstmState<B>, Tensor<B, 2>) {
        let z = Tensor::cat(vec![state.hidden, x], 1);

        let forget = sigmoid(affine(z.clone(), &self.wf, &self.bf));
        let input = sigmoid(affine(z.clone(), &self.wi, &self.bi));
        let output = sigmoid(affine(z.clone(), &self.wo, &self.bo));
        let candidate = affine(z, &self.wc, &self.bc).tanh();

        let cell = forget * state.cell + input * candidate;
        let hidden = output * cell.clone().tanh();
        let logits = affine(hidden.clone(), &self.wout, &self.bout);

        (LstmState { hidden, cell }, logits)
    }

    /// Unrolls over every row of `inputs` (`[steps, input]`) from a zero
    /// state and returns the logits of each step, `[steps, output]`.
    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let [steps, input_size] = inputs.dims();
        let mut state = LstmState::zeros(self.hidden_size(), &inputs.device());
        let mut logits = Vec::with_capacity(steps);

        for t in 0..steps {
            let x = inputs.clone().slice([t..t + 1, 0..input_size]);
            let (next, scores) = self.step(state, x);
            state = next;
            logits.push(scores);
        }

        Tensor::cat(logits, 0)
    }

    /// Next-token distribution at every step.
    pub fn predict(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward(inputs), 1)
    }

    /// Masked cross-entropy: `Σ_t -(log p_t · y_t)·w_t / Σ_t w_t`, shape `[1]`.
    pub fn sequence_loss(&self, example: &SequenceTensors<B>) -> Tensor<B, 1> {
        let [steps, _] = example.targets.dims();
        let log_proba = log_softmax(self.forward(example.inputs.clone()), 1);
        let cross_entropy = (log_proba * example.targets.clone())
            .sum_dim(1)
            .reshape([steps])
            .neg();

        (cross_entropy * example.weights.clone()).sum() / example.weights.clone().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sequence::one_hot;
    use crate::util::tensor_to_vec;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn zero_model(input: usize, hidden: usize, output: usize) -> ManualLstm<TestBackend> {
        let device = NdArrayDevice::default();
        let gate = || init::zeros_param([hidden, hidden + input], &device);
        let bias = || init::zeros_param([hidden], &device);
        ManualLstm {
            wf: gate(),
            bf: bias(),
            wi: gate(),
            bi: bias(),
            wo: gate(),
            bo: bias(),
            wc: gate(),
            bc: bias(),
            wout: init::zeros_param([output, hidden], &device),
            bout: init::zeros_param([output], &device),
        }
    }

    #[test]
    fn zero_weights_halve_previous_cell() {
        let device = Default::default();
        let model = zero_model(3, 2, 4);
        let state = LstmState {
            hidden: Tensor::zeros([1, 2], &device),
            cell: Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0]], &device),
        };
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0, 0.0]], &device);

        let (next, logits) = model.step(state, x);

        // gates are σ(0) = 0.5, candidate tanh(0) = 0
        let cell = tensor_to_vec(next.cell);
        let hidden = tensor_to_vec(next.hidden);
        for ((c, h), expected) in cell.iter().zip(&hidden).zip([0.5f32, -1.0]) {
            assert!((c - expected).abs() < 1e-6, "{c} vs {expected}");
            assert!((h - 0.5 * expected.tanh()).abs() < 1e-6);
        }
        assert_eq!(tensor_to_vec(logits), vec![0.0; 4]);
    }

    #[test]
    fn zero_model_predicts_uniform_distribution() {
        let device = Default::default();
        let model = zero_model(5, 3, 5);
        let proba = tensor_to_vec(model.predict(one_hot::<TestBackend>(&[0, 1, 2], 5, &device)));
        assert!(proba.iter().all(|p| (p - 0.2).abs() < 1e-6));
    }

    #[test]
    fn forward_yields_one_row_per_step() {
        let device = Default::default();
        let model = ManualLstmConfig::new(6, 4, 6).init::<TestBackend>(&device);
        let logits = model.forward(one_hot(&[0, 3, 5, 1, 2], 6, &device));

        assert_eq!(logits.dims(), [5, 6]);
        assert_eq!((model.input_size(), model.hidden_size(), model.output_size()), (6, 4, 6));
    }

    #[test]
    fn init_respects_unit_scaling_bound() {
        let device = Default::default();
        let model = ManualLstmConfig::new(10, 8, 10).init::<TestBackend>(&device);
        let gate_limit = (3.0f32 / 8.0).sqrt();
        let output_limit = (3.0f32 / 10.0).sqrt();

        assert!(tensor_to_vec(model.wc.val()).iter().all(|w| w.abs() <= gate_limit));
        assert!(tensor_to_vec(model.wout.val()).iter().all(|w| w.abs() <= output_limit));
        assert!(tensor_to_vec(model.bf.val()).iter().all(|&b| b == 0.0));
    }

    #[test]
    fn masked_steps_do_not_contribute_to_loss() {
        let device = Default::default();
        let model = ManualLstmConfig::new(4, 3, 4).init::<TestBackend>(&device);
        let inputs = one_hot::<TestBackend>(&[0, 1, 2], 4, &device);
        let weights = |w: Vec<f32>| Tensor::from_data(TensorData::new(w, [3]), &device);

        let loss_for = |last_target: usize, w: Vec<f32>| {
            let example = SequenceTensors {
                inputs: inputs.clone(),
                targets: one_hot(&[1, 2, last_target], 4, &device),
                weights: weights(w),
            };
            tensor_to_vec(model.sequence_loss(&example))[0]
        };

        let masked_a = loss_for(3, vec![1.0, 1.0, 0.0]);
        let masked_b = loss_for(0, vec![1.0, 1.0, 0.0]);
        assert!((masked_a - masked_b).abs() < 1e-6);
        assert!(masked_a > 0.0);
    }

    #[test]
    fn zero_model_loss_is_log_vocab() {
        let device = Default::default();
        let model = zero_model(4, 2, 4);
        let example = SequenceTensors {
            inputs: one_hot::<TestBackend>(&[0, 1], 4, &device),
            targets: one_hot(&[1, 3], 4, &device),
            weights: Tensor::from_floats([1.0, 1.0], &device),
        };
        let loss = tensor_to_vec(model.sequence_loss(&example))[0];
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
    }
}
