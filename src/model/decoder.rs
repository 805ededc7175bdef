//! U-Time decoder
//!
//! Mirrors the encoder: each up block halves the channel width and restores
//! the resolution of the encoder stage it is paired with.

use super::blocks::UpBlock;
use super::config::DecoderConfig;
use super::skip::SkipList;
use crate::error::{ensure_dim, Result, UTimeError};
use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use tracing::debug;

/// Up path of the network, one [`UpBlock`] per encoder stage.
#[derive(Module, Debug)]
pub struct UTimeDecoder<B: Backend> {
    blocks: Vec<UpBlock<B>>,
    /// Encoder stage consumed by each block, in decoding order.
    sources: Vec<usize>,
    /// Upsampling factor of each block, in decoding order.
    factors: Vec<usize>,
    in_channels: usize,
    out_channels: usize,
}

impl<B: Backend> UTimeDecoder<B> {
    /// Validates `config` and builds `config.depth` up blocks.
    pub fn new(config: &DecoderConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let blocks = (0..config.depth)
            .map(|stage| UpBlock::new(&config.up_block(stage), device))
            .collect::<Result<Vec<_>>>()?;
        let sources = (0..config.depth)
            .map(|stage| config.encoder_stage(stage))
            .collect();

        Ok(Self {
            blocks,
            sources,
            factors: config.upsampling_factors().as_slice().to_vec(),
            in_channels: config.in_channels,
            out_channels: config.out_channels(),
        })
    }

    /// Number of up blocks.
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// Width of the restored map.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// `x`: bottleneck map `[batch, in, t]`; `skips`: encoder residuals in
    /// production order. Returns `[batch, out, t_0]` where `t_0` is the time
    /// length of encoder stage 0's residual.
    ///
    /// Each skip must have the block's skip width and be exactly `factor`
    /// times longer than the map it joins.
    pub fn forward(&self, x: Tensor<B, 3>, mut skips: SkipList<B>) -> Result<Tensor<B, 3>> {
        const COMPONENT: &str = "UTimeDecoder";
        let [_, channels, _] = x.dims();
        ensure_dim(COMPONENT, "input channels", self.in_channels, channels)?;
        ensure_dim(COMPONENT, "skip count", self.blocks.len(), skips.len())?;

        let mut x = x;
        let stages = self.blocks.iter().zip(&self.sources).zip(&self.factors);
        for ((block, &source), &factor) in stages {
            let skip = skips.take(source)?;
            let [_, _, len] = x.dims();
            let [_, skip_channels, skip_len] = skip.dims();
            ensure_dim(COMPONENT, "skip channels", block.skip_channels(), skip_channels)?;
            let expected_len = len.saturating_mul(factor);
            if skip_len != expected_len {
                return Err(UTimeError::shape(
                    COMPONENT,
                    format!("skip time length for encoder stage {source}"),
                    expected_len,
                    skip_len,
                ));
            }
            x = block.forward(x, skip)?;
            debug!(encoder_stage = source, out = ?x.dims(), "decoder stage");
        }
        Ok(x)
    }
}
