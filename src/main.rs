#![recursion_limit = "256"] // ✅ 크레이트 전체에 적용

use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::backend::Autodiff;
use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use burn_classics::dataset::sequence::SequenceConfig;
use burn_classics::fm::train::FmTrainingConfig;
use burn_classics::lstm::train::LstmTrainingConfig;
use burn_classics::rbm::train::RbmConfig;
use burn_classics::rbm::visualize::VisualizeConfig;
use burn_classics::{fm, lstm, rbm};

/// Trains a factorization machine, an RBM or a manual LSTM.
#[derive(Parser)]
#[command(name = "burn-classics", version, about)]
struct Cli {
    /// Tensor backend to train on.
    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    backend: BackendKind,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Wgpu,
    Ndarray,
}

#[derive(Subcommand)]
enum Command {
    /// Factorization machine on MNIST digits 2 vs 5.
    Fm {
        /// JSON training config; defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "./models/fm")]
        artifact_dir: PathBuf,
    },
    /// Restricted Boltzmann machine on binarized MNIST.
    Rbm {
        #[arg(long)]
        config: Option<PathBuf>,
        /// JSON config for the sample grids.
        #[arg(long)]
        visualize_config: Option<PathBuf>,
        #[arg(long, default_value = "./models/rbm")]
        artifact_dir: PathBuf,
    },
    /// Next-token LSTM on a JSON file of token sequences.
    Lstm {
        #[arg(long)]
        sequences: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "./models/lstm")]
        artifact_dir: PathBuf,
    },
}

fn load_config<C: Config>(path: Option<&Path>, default: impl FnOnce() -> C) -> anyhow::Result<C> {
    match path {
        Some(path) => C::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display())),
        None => Ok(default()),
    }
}

fn run<B: AutodiffBackend>(command: Command, device: B::Device) -> anyhow::Result<()> {
    match command {
        Command::Fm {
            config,
            artifact_dir,
        } => {
            let config = load_config(config.as_deref(), FmTrainingConfig::mnist_default)?;
            let report = fm::train::run::<B>(&config, &artifact_dir, &device)
                .context("factorization machine training failed")?;
            tracing::info!(
                accuracy = report.test_accuracy,
                probes = report.validation_losses.len(),
                "Done"
            );
        }
        Command::Rbm {
            config,
            visualize_config,
            artifact_dir,
        } => {
            let config = load_config(config.as_deref(), RbmConfig::mnist_default)?;
            let visualize_config = load_config(visualize_config.as_deref(), VisualizeConfig::new)?;
            rbm::train::run::<B>(&config, &visualize_config, &artifact_dir, &device)
                .context("RBM training failed")?;
        }
        Command::Lstm {
            sequences,
            config,
            artifact_dir,
        } => {
            let config = load_config(config.as_deref(), || {
                LstmTrainingConfig::for_sequences(SequenceConfig::new())
            })?;
            let checkpoints = lstm::train::run::<B>(&config, &sequences, &artifact_dir, &device)
                .context("LSTM training failed")?;
            if let Some(last) = checkpoints.last() {
                tracing::info!(epoch = last.epoch, validation_loss = last.validation_loss, "Done");
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.backend {
        BackendKind::Wgpu => run::<Autodiff<Wgpu<f32>>>(cli.command, WgpuDevice::default()),
        BackendKind::Ndarray => run::<Autodiff<NdArray<f32>>>(cli.command, NdArrayDevice::default()),
    }
}
