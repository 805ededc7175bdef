//! Convolutional building blocks shared by the encoder and decoder.
//!
//! All tensors are `[batch, channels, time]`.

use super::config::{ConvBlockConfig, DownBlockConfig, UpBlockConfig};
use crate::error::{ensure_dim, Result, UTimeError};
use burn::{
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{MaxPool1d, MaxPool1dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig1d, Relu,
    },
    tensor::{backend::Backend, Int, Tensor, TensorData},
};

/// Convolution -> batch norm -> ReLU, time length preserved.
#[derive(Module, Debug)]
pub struct SingleConvBlock<B: Backend> {
    conv: Conv1d<B>,
    norm: BatchNorm<B, 1>,
    activation: Relu,
}

impl<B: Backend> SingleConvBlock<B> {
    pub fn new(config: &ConvBlockConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let conv = Conv1dConfig::new(config.in_channels, config.out_channels, config.kernel_size)
            .with_dilation(config.dilation)
            .with_padding(PaddingConfig1d::Explicit(config.same_padding()))
            .init(device);
        let norm = BatchNormConfig::new(config.out_channels).init(device);

        Ok(Self {
            conv,
            norm,
            activation: Relu::new(),
        })
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// Two single blocks: `in -> out`, then `out -> out`.
#[derive(Module, Debug)]
pub struct DoubleConvBlock<B: Backend> {
    expand: SingleConvBlock<B>,
    refine: SingleConvBlock<B>,
}

impl<B: Backend> DoubleConvBlock<B> {
    pub fn new(config: &ConvBlockConfig, device: &B::Device) -> Result<Self> {
        let expand = SingleConvBlock::new(config, device)?;
        let refine_config = ConvBlockConfig {
            in_channels: config.out_channels,
            ..config.clone()
        };
        let refine = SingleConvBlock::new(&refine_config, device)?;
        Ok(Self { expand, refine })
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.refine.forward(self.expand.forward(x))
    }
}

/// Output of a [`DownBlock`].
#[derive(Debug, Clone)]
pub struct DownOutput<B: Backend> {
    /// `[batch, out, time / pool_size]`
    pub pooled: Tensor<B, 3>,
    /// `[batch, out, time]`, kept for the skip connection.
    pub residual: Tensor<B, 3>,
}

/// Double convolution followed by non-overlapping max pooling.
///
/// Pooling drops trailing samples when `time` is not a multiple of
/// `pool_size`, so the pooled length is `floor(time / pool_size)`.
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    conv: DoubleConvBlock<B>,
    pool: MaxPool1d,
    pool_size: usize,
}

impl<B: Backend> DownBlock<B> {
    pub fn new(config: &DownBlockConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let conv = DoubleConvBlock::new(&config.conv, device)?;
        let pool = MaxPool1dConfig::new(config.pool_size)
            .with_stride(config.pool_size)
            .init();
        Ok(Self {
            conv,
            pool,
            pool_size: config.pool_size,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> DownOutput<B> {
        let residual = self.conv.forward(x);
        let pooled = if self.pool_size == 1 {
            residual.clone()
        } else {
            self.pool.forward(residual.clone())
        };
        DownOutput { pooled, residual }
    }
}

/// Nearest-neighbour resampling of the time axis to exactly `target` samples.
///
/// Output sample `i` is source sample `floor(i * len / target)`. This is the
/// only resampling rule used in the network.
pub fn upsample_nearest<B: Backend>(x: Tensor<B, 3>, target: usize) -> Tensor<B, 3> {
    let [_, _, len] = x.dims();
    if len == target {
        return x;
    }
    let device = x.device();
    let index: Vec<i64> = (0..target).map(|i| (i * len / target) as i64).collect();
    let index = Tensor::<B, 1, Int>::from_data(TensorData::new(index, [target]), &device);
    x.select(2, index)
}

/// Decoder stage: brings a coarse map up to its skip's resolution and fuses
/// the two.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    project: SingleConvBlock<B>,
    conv: DoubleConvBlock<B>,
    in_channels: usize,
    skip_channels: usize,
}

impl<B: Backend> UpBlock<B> {
    pub fn new(config: &UpBlockConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let project = SingleConvBlock::new(
            &ConvBlockConfig::new(config.in_channels, config.projected_channels())
                .with_kernel(config.kernel_size, config.dilation),
            device,
        )?;
        let conv = DoubleConvBlock::new(
            &ConvBlockConfig::new(
                config.projected_channels() + config.skip_channels,
                config.out_channels,
            )
            .with_kernel(config.kernel_size, config.dilation),
            device,
        )?;
        Ok(Self {
            project,
            conv,
            in_channels: config.in_channels,
            skip_channels: config.skip_channels,
        })
    }

    pub fn skip_channels(&self) -> usize {
        self.skip_channels
    }

    /// `x1`: `[batch, in, t1]`, `x2` (skip): `[batch, in / 2, t2]` with
    /// `t2 >= t1`. Returns `[batch, out, t2]`.
    pub fn forward(&self, x1: Tensor<B, 3>, x2: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        const COMPONENT: &str = "UpBlock";
        let [batch, channels, len] = x1.dims();
        let [skip_batch, skip_channels, skip_len] = x2.dims();
        ensure_dim(COMPONENT, "input channels", self.in_channels, channels)?;
        ensure_dim(COMPONENT, "skip channels", self.skip_channels, skip_channels)?;
        ensure_dim(COMPONENT, "skip batch size", batch, skip_batch)?;
        if skip_len < len {
            return Err(UTimeError::shape(
                COMPONENT,
                "skip time length",
                format!(">= {len}"),
                skip_len,
            ));
        }

        let up = upsample_nearest(x1, skip_len);
        let up = self.project.forward(up);
        let merged = Tensor::cat(vec![up, x2], 1);
        Ok(self.conv.forward(merged))
    }
}
