//! Fit a U-Time model in a project directory.
//!
//! Usage:
//! ```bash
//! cargo run --release --bin ut-train -- --project-dir runs/demo --n-epochs 5
//! ```
//!
//! Hyperparameters are read from `<project-dir>/hparams.toml` unless
//! `--hparams` is given. Training data comes from the synthetic signal
//! generator, shaped by `build.batch_shape`.

use anyhow::{bail, Context, Result};
use burn::backend::Autodiff;
use burn::tensor::backend::AutodiffBackend;
use burn_ndarray::NdArray;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use utime::{
    data::{Dataset, SyntheticSignals},
    hparams::HParams,
    logging::{log_file_path, setup_logging_with_file},
    model::{
        load_weights, save_weights, train_model, CheckpointDir, Precision, UTime,
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fit a U-Time model on a project")]
struct Args {
    /// Project directory holding hyperparameters, logs and weights
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Hyperparameter file (defaults to <project-dir>/hparams.toml)
    #[arg(long)]
    hparams: Option<PathBuf>,

    /// Override the number of epochs
    #[arg(long)]
    n_epochs: Option<usize>,

    /// Initialize the model from these weights
    #[arg(long)]
    initialize_from: Option<PathBuf>,

    /// Resume from the checkpoint of a previous session
    #[arg(long)]
    continue_training: bool,

    /// Remove the previous session before training
    #[arg(long)]
    overwrite: bool,

    /// Train and validate on a single window each
    #[arg(long)]
    just_one: bool,

    /// Do not validate during training
    #[arg(long)]
    no_val: bool,

    /// Merge the validation windows into the training set (implies --no-val)
    #[arg(long)]
    train_on_val: bool,

    /// Windows visited per training epoch
    #[arg(long)]
    max_train_samples_per_epoch: Option<usize>,

    /// Windows visited per validation pass
    #[arg(long)]
    val_samples_per_epoch: Option<usize>,

    /// File name of the final weights under <project-dir>/model
    #[arg(long, default_value = "model_weights.mpk")]
    final_weights_file_name: String,

    /// Prefix of the log file under <project-dir>/logs
    #[arg(long, default_value = "")]
    log_file_prefix: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Rejects contradictory or out-of-range options before any work happens.
fn assert_args(mut args: Args) -> Result<Args> {
    if args.continue_training && args.initialize_from.is_some() {
        bail!("--continue-training and --initialize-from are mutually exclusive");
    }
    if args.max_train_samples_per_epoch == Some(0) {
        bail!("--max-train-samples-per-epoch must be >= 1");
    }
    if args.val_samples_per_epoch == Some(0) {
        bail!("--val-samples-per-epoch must be >= 1");
    }
    if args.n_epochs == Some(0) {
        bail!("--n-epochs must be >= 1");
    }
    if args.train_on_val {
        args.no_val = true;
    }
    Ok(args)
}

fn main() -> Result<()> {
    let args = assert_args(Args::parse())?;

    let checkpoints = CheckpointDir::new(&args.project_dir);
    setup_logging_with_file(
        &args.log_level,
        &log_file_path(&args.project_dir.join("logs"), &args.log_file_prefix),
    )?;
    prepare_session(&args, &checkpoints)?;

    let hparams_path = args
        .hparams
        .clone()
        .unwrap_or_else(|| args.project_dir.join("hparams.toml"));
    let mut hparams = HParams::load(&hparams_path)?;
    if let Some(n_epochs) = args.n_epochs {
        hparams = hparams.with_n_epochs(n_epochs);
    }
    hparams.save_effective(&args.project_dir)?;
    info!("Loaded hyperparameters from {}", hparams_path.display());

    match hparams.build.precision {
        Precision::Float32 => run::<Autodiff<NdArray<f32>>>(&args, &hparams, &checkpoints),
        Precision::Float64 => run::<Autodiff<NdArray<f64>>>(&args, &hparams, &checkpoints),
    }
}

/// Refuses to clobber a previous session unless asked to. `--overwrite`
/// is ignored when continuing, so the checkpoint survives.
fn prepare_session(args: &Args, checkpoints: &CheckpointDir) -> Result<()> {
    if !checkpoints.has_previous_session() {
        return Ok(());
    }
    if args.continue_training {
        if args.overwrite {
            warn!("--overwrite has no effect with --continue-training");
        }
        return Ok(());
    }
    if !args.overwrite {
        bail!(
            "a previous session exists at {}; pass --overwrite or --continue-training",
            checkpoints.root().display()
        );
    }
    checkpoints.remove_previous_session()
}

fn datasets(args: &Args, hparams: &HParams) -> (Dataset, Option<Dataset>) {
    let build = &hparams.build;
    let shape = build.batch_shape;
    let mut generator = SyntheticSignals::new(
        shape.channels,
        shape.samples,
        build.data_per_period,
        build.n_classes,
        hparams.data.noise,
        hparams.data.seed,
    );

    let (n_train, n_val) = if args.just_one {
        (1, 1)
    } else {
        (hparams.data.train_windows, hparams.data.val_windows)
    };
    let batch_size = hparams.fit.batch_size;
    let mut train =
        Dataset::new(generator.generate(n_train), batch_size).with_seed(hparams.fit.seed);
    let mut val = Dataset::new(generator.generate(n_val), batch_size).without_shuffle();

    if let Some(n) = args.max_train_samples_per_epoch {
        train = train.with_epoch_size(n);
    }
    if let Some(n) = args.val_samples_per_epoch {
        val = val.with_epoch_size(n);
    }

    if args.train_on_val {
        info!("Merging {} validation windows into the training set", val.len());
        train = train.merge(val);
        return (train, None);
    }
    if args.no_val || val.is_empty() {
        return (train, None);
    }
    (train, Some(val))
}

fn run<B: AutodiffBackend>(
    args: &Args,
    hparams: &HParams,
    checkpoints: &CheckpointDir,
) -> Result<()> {
    let device = B::Device::default();
    let (mut train, mut val) = datasets(args, hparams);
    info!(
        "Training on {} windows ({} per epoch), validating on {}",
        train.len(),
        train.epoch_len(),
        val.as_ref().map_or(0, |v| v.epoch_len())
    );

    let mut model = UTime::<B>::new(&hparams.build, &device).context("building model")?;
    if let Some(path) = &args.initialize_from {
        model = load_weights(model, path, &device)?;
    } else if args.continue_training {
        match checkpoints.existing_checkpoint() {
            Some(path) => model = load_weights(model, &path, &device)?,
            None => warn!(
                "no checkpoint found under {}; starting from scratch",
                checkpoints.root().display()
            ),
        }
    }

    let (model, result) = train_model(
        model,
        &mut train,
        val.as_mut(),
        &hparams.fit,
        Some(checkpoints),
        &device,
    )?;

    let final_path = checkpoints.final_weights(&args.final_weights_file_name);
    save_weights(&model, &final_path)?;
    report(&final_path, result.best_epoch, result.best_accuracy, result.stopped_early);
    Ok(())
}

fn report(final_path: &Path, best_epoch: usize, best_accuracy: f32, stopped_early: bool) {
    println!("\n=== Training finished ===");
    println!("Best epoch:    {}", best_epoch + 1);
    println!("Best accuracy: {:.4}", best_accuracy);
    if stopped_early {
        println!("Stopped early");
    }
    println!("Final weights: {}", final_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args> {
        let argv = std::iter::once("ut-train").chain(extra.iter().copied());
        assert_args(Args::parse_from(argv))
    }

    #[test]
    fn test_exclusive_initialization() {
        assert!(parse(&["--continue-training", "--initialize-from", "w.mpk"]).is_err());
        assert!(parse(&["--continue-training"]).is_ok());
    }

    #[test]
    fn test_sample_counts_must_be_positive() {
        assert!(parse(&["--max-train-samples-per-epoch", "0"]).is_err());
        assert!(parse(&["--val-samples-per-epoch", "0"]).is_err());
        assert!(parse(&["--val-samples-per-epoch", "1"]).is_ok());
    }

    #[test]
    fn test_train_on_val_disables_validation() {
        let args = parse(&["--train-on-val"]).unwrap();
        assert!(args.no_val);

        let hparams = HParams::default();
        let (train, val) = datasets(&args, &hparams);
        assert!(val.is_none());
        assert_eq!(
            train.len(),
            hparams.data.train_windows + hparams.data.val_windows
        );
    }

    fn session_with_checkpoint() -> (tempfile::TempDir, CheckpointDir) {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointDir::new(dir.path());
        std::fs::create_dir_all(checkpoints.root()).unwrap();
        std::fs::write(checkpoints.checkpoint().with_extension("mpk"), b"weights").unwrap();
        (dir, checkpoints)
    }

    #[test]
    fn test_continue_training_keeps_checkpoint_despite_overwrite() {
        let (dir, checkpoints) = session_with_checkpoint();
        let project = dir.path().to_str().unwrap();
        let args = parse(&["--project-dir", project, "--overwrite", "--continue-training"]).unwrap();

        prepare_session(&args, &checkpoints).unwrap();
        assert!(checkpoints.existing_checkpoint().is_some());
    }

    #[test]
    fn test_overwrite_removes_previous_session() {
        let (dir, checkpoints) = session_with_checkpoint();
        let project = dir.path().to_str().unwrap();

        let args = parse(&["--project-dir", project]).unwrap();
        assert!(prepare_session(&args, &checkpoints).is_err());
        assert!(checkpoints.has_previous_session());

        let args = parse(&["--project-dir", project, "--overwrite"]).unwrap();
        prepare_session(&args, &checkpoints).unwrap();
        assert!(!checkpoints.has_previous_session());
    }

    #[test]
    fn test_just_one() {
        let args = parse(&["--just-one"]).unwrap();
        let (train, val) = datasets(&args, &HParams::default());
        assert_eq!(train.len(), 1);
        assert_eq!(val.map(|v| v.len()), Some(1));
    }
}
