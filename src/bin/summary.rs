//! Print the realized architecture for a hyperparameter file.
//!
//! Usage:
//! ```bash
//! cargo run --bin ut-summary -- --hparams config/hparams.toml
//! ```

use anyhow::{Context, Result};
use burn::module::Module;
use burn::tensor::{backend::Backend, Tensor};
use burn_ndarray::NdArray;
use clap::Parser;
use std::path::PathBuf;
use utime::{
    hparams::HParams,
    logging::setup_logging,
    model::{Precision, UTime, UTimeConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Show the U-Time architecture for a hyperparameter file")]
struct Args {
    /// Hyperparameter file
    #[arg(long, default_value = "hparams.toml")]
    hparams: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level)?;

    let hparams = HParams::load(&args.hparams)?;
    match hparams.build.precision {
        Precision::Float32 => summarize::<NdArray<f32>>(&hparams.build),
        Precision::Float64 => summarize::<NdArray<f64>>(&hparams.build),
    }
}

/// `(stage, channels, samples)` for every encoder residual.
fn encoder_stages(config: &UTimeConfig) -> Vec<(usize, usize, usize)> {
    let filters = config.encoder().filters();
    let mut samples = config.batch_shape.samples;
    config
        .pools
        .as_slice()
        .iter()
        .enumerate()
        .map(|(stage, &pool)| {
            let entry = (stage, filters.as_slice()[stage], samples);
            samples /= pool;
            entry
        })
        .collect()
}

fn summarize<B: Backend>(config: &UTimeConfig) -> Result<()> {
    let device = B::Device::default();
    let model = UTime::<B>::new(config, &device).context("building model")?;
    let [batch, channels, samples] = config.batch_shape.dims();

    println!("\n=== U-Time ===");
    println!("Input:            [{batch}, {channels}, {samples}]");
    println!("Classes:          {}", config.n_classes);
    println!("Data per period:  {}", config.data_per_period);
    println!("Kernel/dilation:  {}/{}", config.kernel_size, config.dilation);
    println!("Pools:            {:?}", config.pools.as_slice());
    println!("Filters:          {:?}", model.filters().as_slice());
    println!();

    println!("Encoder:");
    for (stage, width, len) in encoder_stages(config) {
        println!("  stage {stage}: residual [{batch}, {width}, {len}]");
    }
    let encoded = config.encoder();
    println!(
        "  encoded:  [{batch}, {}, {}]",
        encoded.filters().encoded(),
        encoded.encoded_len(samples)
    );
    println!(
        "Bottleneck:       {} -> {}",
        config.bottleneck().in_channels,
        config.bottleneck().out_channels
    );

    let decoder = config.decoder();
    println!("Decoder:");
    for stage in 0..config.depth {
        let up = decoder.up_block(stage);
        println!(
            "  stage {stage}: {} -> {} (skip {} from encoder stage {})",
            up.in_channels,
            up.out_channels,
            up.skip_channels,
            decoder.encoder_stage(stage)
        );
    }

    let x = Tensor::<B, 3>::zeros([batch, channels, samples], &device);
    let output = model.forward_with_dense(x)?;
    println!("Dense output:     {:?}", output.dense.dims());
    println!("Segment output:   {:?}", output.segments.dims());
    println!();
    println!("Parameters:       {}", model.num_params());
    Ok(())
}
