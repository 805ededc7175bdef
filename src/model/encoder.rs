//! U-Time encoder
//!
//! A stack of down blocks, each doubling the channel width and pooling the
//! time axis by its level's factor.

use super::blocks::DownBlock;
use super::config::{DownBlockConfig, EncoderConfig, FilterSchedule};
use super::skip::SkipList;
use crate::error::{ensure_dim, Result};
use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};
use tracing::debug;

/// Encoded feature map plus the residual of every stage.
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// Output of the deepest stage after pooling.
    pub encoded: Tensor<B, 3>,
    /// Pre-pooling residuals, keyed by stage.
    pub skips: SkipList<B>,
}

/// Down path of the network.
#[derive(Module, Debug)]
pub struct UTimeEncoder<B: Backend> {
    blocks: Vec<DownBlock<B>>,
    in_channels: usize,
    init_filters: usize,
}

impl<B: Backend> UTimeEncoder<B> {
    /// Validates `config` and builds one down block per pool factor.
    pub fn new(config: &EncoderConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let filters = config.filters();

        let mut in_channels = config.in_channels;
        let mut blocks = Vec::with_capacity(config.depth);
        for (stage, &pool_size) in config.pools.as_slice().iter().enumerate() {
            let out_channels = filters.as_slice()[stage];
            let block_config = DownBlockConfig::new(in_channels, out_channels, pool_size)
                .with_kernel(config.kernel_size, config.dilation);
            blocks.push(DownBlock::new(&block_config, device)?);
            in_channels = out_channels;
        }

        Ok(Self {
            blocks,
            in_channels: config.in_channels,
            init_filters: filters.as_slice()[0],
        })
    }

    /// Realized channel widths: one per stage, then the encoded width.
    pub fn filters(&self) -> FilterSchedule {
        FilterSchedule::doubling(self.init_filters, self.blocks.len())
    }

    /// Number of down blocks.
    pub fn depth(&self) -> usize {
        self.blocks.len()
    }

    /// Pool factor of each stage, finest first.
    pub fn pools(&self) -> Vec<usize> {
        self.blocks.iter().map(DownBlock::pool_size).collect()
    }

    /// `x`: `[batch, in, time]`. The encoded map is
    /// `[batch, filters.encoded(), time / prod(pools)]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Result<EncoderOutput<B>> {
        let [_, channels, _] = x.dims();
        ensure_dim("UTimeEncoder", "input channels", self.in_channels, channels)?;

        let mut skips = SkipList::with_depth(self.blocks.len());
        let mut x = x;
        for (stage, block) in self.blocks.iter().enumerate() {
            let out = block.forward(x);
            debug!(
                stage,
                residual = ?out.residual.dims(),
                pooled = ?out.pooled.dims(),
                "encoder stage"
            );
            skips.push(out.residual);
            x = out.pooled;
        }

        Ok(EncoderOutput { encoded: x, skips })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f64>;

    const BATCH_SIZE: usize = 10;
    const IN_CH: usize = 32;
    const N_PERIODS: usize = 100;

    #[test]
    fn test_encoder_shapes() {
        let device = Default::default();
        let encoder =
            UTimeEncoder::<TestBackend>::new(&EncoderConfig::new(IN_CH, 2, vec![4, 5]), &device)
                .unwrap();

        let x = Tensor::random(
            [BATCH_SIZE, IN_CH, N_PERIODS],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let out = encoder.forward(x).unwrap();

        assert_eq!(out.encoded.dims(), [BATCH_SIZE, IN_CH * 4, 5]);
        assert_eq!(out.skips.len(), 2);
        assert_eq!(
            out.skips.shapes(),
            vec![[BATCH_SIZE, 64, N_PERIODS], [BATCH_SIZE, 128, N_PERIODS / 4]]
        );
        assert_eq!(encoder.filters().len(), 3);
        assert_eq!(encoder.filters().as_slice(), &[IN_CH * 2, IN_CH * 4, IN_CH * 4]);
        assert_eq!(encoder.pools(), vec![4, 5]);
    }

    #[test]
    fn test_encoder_rejects_wrong_channels() {
        let device = Default::default();
        let encoder =
            UTimeEncoder::<TestBackend>::new(&EncoderConfig::new(4, 1, vec![2]), &device).unwrap();
        let err = encoder
            .forward(Tensor::zeros([1, 3, 8], &device))
            .unwrap_err();
        assert!(err.to_string().contains("input channels"));
    }

    #[test]
    fn test_encoder_rejects_pool_length_mismatch() {
        let device = Default::default();
        let result =
            UTimeEncoder::<TestBackend>::new(&EncoderConfig::new(4, 3, vec![2, 2]), &device);
        assert!(result.unwrap_err().is_configuration());
    }
}
