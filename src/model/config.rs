//! Model configuration
//!
//! Every component is built from one of the immutable config structs below.
//! `validate` is called by every `init`, so an invalid combination never
//! reaches a forward pass.

use crate::error::{Result, UTimeError};
use burn::tensor::{backend::Backend, DType, Element};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_KERNEL_SIZE: usize = 5;
pub const DEFAULT_DILATION: usize = 2;
pub const DEFAULT_DEPTH: usize = 2;
pub const DEFAULT_POOLS: [usize; 2] = [4, 5];
pub const DEFAULT_DATA_PER_PERIOD: usize = 10;

fn check_positive(component: &'static str, name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(UTimeError::config(component, format!("{name} must be > 0")));
    }
    Ok(())
}

fn check_kernel(component: &'static str, kernel_size: usize, dilation: usize) -> Result<()> {
    check_positive(component, "kernel_size", kernel_size)?;
    check_positive(component, "dilation", dilation)?;
    if kernel_size % 2 == 0 {
        return Err(UTimeError::config(
            component,
            format!("kernel_size must be odd to preserve time length, got {kernel_size}"),
        ));
    }
    Ok(())
}

/// Per-level temporal pooling factors, ordered from the finest level down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolSchedule(Vec<usize>);

impl PoolSchedule {
    pub fn new(pools: Vec<usize>) -> Self {
        Self(pools)
    }

    pub fn validate(&self, component: &'static str, depth: usize) -> Result<()> {
        if self.0.len() != depth {
            return Err(UTimeError::config(
                component,
                format!(
                    "pool schedule has {} entries but depth is {depth}",
                    self.0.len()
                ),
            ));
        }
        if let Some(level) = self.0.iter().position(|&p| p == 0) {
            return Err(UTimeError::config(
                component,
                format!("pool factor at level {level} must be > 0"),
            ));
        }
        if self.checked_product().is_none() {
            return Err(UTimeError::config(
                component,
                format!("total pooling factor of {:?} overflows", self.0),
            ));
        }
        Ok(())
    }

    /// Total temporal downsampling of the encoder, saturating on overflow.
    pub fn product(&self) -> usize {
        self.0.iter().fold(1usize, |acc, &p| acc.saturating_mul(p))
    }

    /// Total temporal downsampling, `None` on overflow.
    pub fn checked_product(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &p| acc.checked_mul(p))
    }

    /// Schedule walked from the coarsest level up, as the decoder uses it.
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().copied().collect())
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for PoolSchedule {
    fn default() -> Self {
        Self(DEFAULT_POOLS.to_vec())
    }
}

impl From<Vec<usize>> for PoolSchedule {
    fn from(pools: Vec<usize>) -> Self {
        Self(pools)
    }
}

/// Channel widths realized by the encoder: one per stage, followed by the
/// width of the encoded (pooled) output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSchedule(Vec<usize>);

impl FilterSchedule {
    /// `init_filters * 2^i` for every stage, saturating on overflow. Use
    /// [`FilterSchedule::checked_doubling`] to detect the overflow.
    pub fn doubling(init_filters: usize, depth: usize) -> Self {
        let mut widths: Vec<usize> = (0..depth)
            .map(|i| init_filters.saturating_mul(doubling_factor(i).unwrap_or(usize::MAX)))
            .collect();
        let encoded = widths.last().copied().unwrap_or(init_filters);
        widths.push(encoded);
        Self(widths)
    }

    /// Same as [`FilterSchedule::doubling`], `None` when a width overflows.
    pub fn checked_doubling(init_filters: usize, depth: usize) -> Option<Self> {
        let mut widths = (0..depth)
            .map(|i| doubling_factor(i).and_then(|f| init_filters.checked_mul(f)))
            .collect::<Option<Vec<usize>>>()?;
        let encoded = widths.last().copied().unwrap_or(init_filters);
        widths.push(encoded);
        Some(Self(widths))
    }

    /// Width of encoder stage `stage`.
    pub fn stage(&self, stage: usize) -> Option<usize> {
        if stage + 1 < self.0.len() {
            Some(self.0[stage])
        } else {
            None
        }
    }

    /// Width of the encoded feature map handed to the bottleneck.
    pub fn encoded(&self) -> usize {
        self.0.last().copied().unwrap_or(0)
    }

    /// Widths of the skip feature maps in production order.
    pub fn skip_widths(&self) -> &[usize] {
        &self.0[..self.0.len().saturating_sub(1)]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `2^i`, `None` when it does not fit in `usize`.
fn doubling_factor(i: usize) -> Option<usize> {
    u32::try_from(i).ok().and_then(|i| 1usize.checked_shl(i))
}

/// Shape of one input batch, `(batch, channels, samples)`.
///
/// Accepts the legacy 4-axis `[batch, channels, 1, samples]` layout when
/// deserialized and normalizes it to three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct BatchShape {
    pub batch_size: usize,
    pub channels: usize,
    pub samples: usize,
}

impl BatchShape {
    pub fn new(batch_size: usize, channels: usize, samples: usize) -> Self {
        Self {
            batch_size,
            channels,
            samples,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.batch_size, self.channels, self.samples]
    }
}

impl Default for BatchShape {
    fn default() -> Self {
        Self::new(10, 6, 100)
    }
}

impl TryFrom<Vec<usize>> for BatchShape {
    type Error = UTimeError;

    fn try_from(dims: Vec<usize>) -> Result<Self> {
        match dims.as_slice() {
            [b, c, t] => Ok(Self::new(*b, *c, *t)),
            [b, c, 1, t] => Ok(Self::new(*b, *c, *t)),
            [_, _, s, _] => Err(UTimeError::config(
                "BatchShape",
                format!("legacy 4-axis batch shape needs a singleton axis 2, got {s}"),
            )),
            other => Err(UTimeError::config(
                "BatchShape",
                format!("batch shape needs 3 or 4 axes, got {}", other.len()),
            )),
        }
    }
}

impl From<BatchShape> for Vec<usize> {
    fn from(shape: BatchShape) -> Self {
        shape.dims().to_vec()
    }
}

impl fmt::Display for BatchShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.batch_size, self.channels, self.samples)
    }
}

/// Numeric precision requested by the hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Float32,
    Float64,
}

impl Precision {
    /// Precision actually used by backend `B`, if it is one of ours.
    pub fn of_backend<B: Backend>() -> Option<Self> {
        match <B::FloatElem as Element>::dtype() {
            DType::F32 => Some(Self::Float32),
            DType::F64 => Some(Self::Float64),
            _ => None,
        }
    }
}

/// Activation applied by the dense classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenseActivation {
    #[default]
    Tanh,
    Identity,
}

/// Convolution -> batch norm -> ReLU, shared by single and double blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvBlockConfig {
    /// Input feature maps
    pub in_channels: usize,
    /// Output feature maps
    pub out_channels: usize,
    /// Convolution kernel size, odd
    pub kernel_size: usize,
    /// Spacing between kernel taps
    pub dilation: usize,
}

impl ConvBlockConfig {
    /// Block with the default kernel size and dilation.
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size: DEFAULT_KERNEL_SIZE,
            dilation: DEFAULT_DILATION,
        }
    }

    #[must_use]
    pub fn with_kernel(mut self, kernel_size: usize, dilation: usize) -> Self {
        self.kernel_size = kernel_size;
        self.dilation = dilation;
        self
    }

    /// Symmetric padding that keeps the time axis length unchanged.
    pub fn same_padding(&self) -> usize {
        self.dilation * (self.kernel_size - 1) / 2
    }

    /// Rejects zero widths and even kernels.
    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "ConvBlock";
        check_positive(COMPONENT, "in_channels", self.in_channels)?;
        check_positive(COMPONENT, "out_channels", self.out_channels)?;
        check_kernel(COMPONENT, self.kernel_size, self.dilation)
    }
}

/// Double convolution followed by max pooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownBlockConfig {
    /// Both convolutions share this config, the second one mapping
    /// `out_channels` onto itself
    pub conv: ConvBlockConfig,
    /// Max-pool kernel and stride
    pub pool_size: usize,
}

impl DownBlockConfig {
    pub fn new(in_channels: usize, out_channels: usize, pool_size: usize) -> Self {
        Self {
            conv: ConvBlockConfig::new(in_channels, out_channels),
            pool_size,
        }
    }

    #[must_use]
    pub fn with_kernel(mut self, kernel_size: usize, dilation: usize) -> Self {
        self.conv = self.conv.with_kernel(kernel_size, dilation);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.conv.validate()?;
        check_positive("DownBlock", "pool_size", self.pool_size)
    }
}

/// Upsample, project, concatenate with the skip, double convolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpBlockConfig {
    /// Width of the map coming up from the coarser level
    pub in_channels: usize,
    /// Width of the encoder residual concatenated after projection
    pub skip_channels: usize,
    /// Width after the double convolution
    pub out_channels: usize,
    /// Convolution kernel size, odd
    pub kernel_size: usize,
    /// Spacing between kernel taps
    pub dilation: usize,
}

impl UpBlockConfig {
    /// Block whose skip input carries half of `in_channels`.
    pub fn new(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            skip_channels: in_channels / 2,
            out_channels,
            kernel_size: DEFAULT_KERNEL_SIZE,
            dilation: DEFAULT_DILATION,
        }
    }

    #[must_use]
    pub fn with_skip_channels(mut self, skip_channels: usize) -> Self {
        self.skip_channels = skip_channels;
        self
    }

    #[must_use]
    pub fn with_kernel(mut self, kernel_size: usize, dilation: usize) -> Self {
        self.kernel_size = kernel_size;
        self.dilation = dilation;
        self
    }

    /// Width of the upsampled decoder map after projection.
    pub fn projected_channels(&self) -> usize {
        self.in_channels / 2
    }

    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "UpBlock";
        check_positive(COMPONENT, "in_channels", self.in_channels)?;
        check_positive(COMPONENT, "skip_channels", self.skip_channels)?;
        check_positive(COMPONENT, "out_channels", self.out_channels)?;
        check_kernel(COMPONENT, self.kernel_size, self.dilation)?;
        if self.in_channels % 2 != 0 {
            return Err(UTimeError::config(
                COMPONENT,
                format!("in_channels must be even, got {}", self.in_channels),
            ));
        }
        if self.skip_channels != self.projected_channels() {
            return Err(UTimeError::config(
                COMPONENT,
                format!(
                    "skip_channels must be in_channels / 2 = {}, got {}",
                    self.projected_channels(),
                    self.skip_channels
                ),
            ));
        }
        Ok(())
    }
}

/// Stack of down blocks. Stage `i` is `init_filters * 2^i` wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Channels of the raw input
    pub in_channels: usize,
    /// Number of down blocks
    pub depth: usize,
    /// Pool factor per stage, finest first
    pub pools: PoolSchedule,
    /// Convolution kernel size, odd
    pub kernel_size: usize,
    /// Spacing between kernel taps
    pub dilation: usize,
    /// Width of the first stage. Defaults to twice the input channels.
    pub init_filters: Option<usize>,
}

impl EncoderConfig {
    /// Encoder with the default kernel and `init_filters = 2 * in_channels`.
    pub fn new(in_channels: usize, depth: usize, pools: impl Into<PoolSchedule>) -> Self {
        Self {
            in_channels,
            depth,
            pools: pools.into(),
            kernel_size: DEFAULT_KERNEL_SIZE,
            dilation: DEFAULT_DILATION,
            init_filters: None,
        }
    }

    #[must_use]
    pub fn with_kernel(mut self, kernel_size: usize, dilation: usize) -> Self {
        self.kernel_size = kernel_size;
        self.dilation = dilation;
        self
    }

    #[must_use]
    pub fn with_init_filters(mut self, init_filters: Option<usize>) -> Self {
        self.init_filters = init_filters;
        self
    }

    /// Realized stage widths followed by the encoded width.
    pub fn filters(&self) -> FilterSchedule {
        let init = self
            .init_filters
            .unwrap_or_else(|| self.in_channels.saturating_mul(2));
        FilterSchedule::doubling(init, self.depth)
    }

    /// Filter schedule, `None` when a width (or the bottleneck's doubled
    /// width) overflows.
    fn checked_filters(&self) -> Option<FilterSchedule> {
        let init = match self.init_filters {
            Some(init) => init,
            None => self.in_channels.checked_mul(2)?,
        };
        let filters = FilterSchedule::checked_doubling(init, self.depth)?;
        filters.encoded().checked_mul(2)?;
        Some(filters)
    }

    /// Time length of the encoded map for an input of `samples`.
    pub fn encoded_len(&self, samples: usize) -> usize {
        self.pools
            .as_slice()
            .iter()
            .fold(samples, |len, &pool| len / pool)
    }

    /// Rejects zero sizes, even kernels, a pool schedule that does not
    /// match `depth`, and widths that overflow.
    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "UTimeEncoder";
        check_positive(COMPONENT, "in_channels", self.in_channels)?;
        check_positive(COMPONENT, "depth", self.depth)?;
        if let Some(init) = self.init_filters {
            check_positive(COMPONENT, "init_filters", init)?;
        }
        check_kernel(COMPONENT, self.kernel_size, self.dilation)?;
        self.pools.validate(COMPONENT, self.depth)?;
        if self.checked_filters().is_none() {
            return Err(UTimeError::config(
                COMPONENT,
                format!("channel widths overflow at depth {}", self.depth),
            ));
        }
        Ok(())
    }
}

/// Stack of up blocks, each halving the width it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Width of the bottleneck output
    pub in_channels: usize,
    /// Number of up blocks, equal to the encoder depth
    pub depth: usize,
    /// Pool schedule in encoder order; the decoder walks it in reverse.
    pub pools: PoolSchedule,
    /// Convolution kernel size, odd
    pub kernel_size: usize,
    /// Spacing between kernel taps
    pub dilation: usize,
}

impl DecoderConfig {
    /// Decoder with the default kernel size and dilation.
    pub fn new(in_channels: usize, depth: usize, pools: impl Into<PoolSchedule>) -> Self {
        Self {
            in_channels,
            depth,
            pools: pools.into(),
            kernel_size: DEFAULT_KERNEL_SIZE,
            dilation: DEFAULT_DILATION,
        }
    }

    #[must_use]
    pub fn with_kernel(mut self, kernel_size: usize, dilation: usize) -> Self {
        self.kernel_size = kernel_size;
        self.dilation = dilation;
        self
    }

    /// Input width of decoder stage `stage`.
    pub fn stage_in_channels(&self, stage: usize) -> usize {
        self.in_channels >> stage
    }

    /// Skip width expected by decoder stage `stage`.
    pub fn skip_channels(&self, stage: usize) -> usize {
        self.in_channels >> (stage + 1)
    }

    /// Encoder stage whose residual feeds decoder stage `stage`.
    pub fn encoder_stage(&self, stage: usize) -> usize {
        self.depth - 1 - stage
    }

    /// Upsampling factor of each stage, in decoding order.
    pub fn upsampling_factors(&self) -> PoolSchedule {
        self.pools.reversed()
    }

    /// Width of the full-resolution map handed to the dense classifier.
    pub fn out_channels(&self) -> usize {
        self.in_channels >> self.depth
    }

    /// Config of the up block at decoder stage `stage`.
    pub fn up_block(&self, stage: usize) -> UpBlockConfig {
        let in_channels = self.stage_in_channels(stage);
        UpBlockConfig::new(in_channels, in_channels / 2)
            .with_skip_channels(self.skip_channels(stage))
            .with_kernel(self.kernel_size, self.dilation)
    }

    /// Also requires `in_channels` to survive `depth` halvings exactly.
    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "UTimeDecoder";
        check_positive(COMPONENT, "in_channels", self.in_channels)?;
        check_positive(COMPONENT, "depth", self.depth)?;
        check_kernel(COMPONENT, self.kernel_size, self.dilation)?;
        self.pools.validate(COMPONENT, self.depth)?;
        let divisor = doubling_factor(self.depth)
            .filter(|d| *d <= self.in_channels)
            .ok_or_else(|| {
                UTimeError::config(
                    COMPONENT,
                    format!(
                        "in_channels {} cannot be halved {} times",
                        self.in_channels, self.depth
                    ),
                )
            })?;
        if self.in_channels % divisor != 0 {
            return Err(UTimeError::config(
                COMPONENT,
                format!(
                    "in_channels {} must be divisible by 2^depth = {divisor}",
                    self.in_channels
                ),
            ));
        }
        Ok(())
    }
}

/// Pointwise projection of decoder features onto class scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseClassifierConfig {
    /// Decoder output width
    pub in_channels: usize,
    /// Number of output classes
    pub n_classes: usize,
    /// Applied to the per-sample scores
    pub activation: DenseActivation,
}

impl DenseClassifierConfig {
    pub fn new(in_channels: usize, n_classes: usize) -> Self {
        Self {
            in_channels,
            n_classes,
            activation: DenseActivation::default(),
        }
    }

    #[must_use]
    pub fn with_activation(mut self, activation: DenseActivation) -> Self {
        self.activation = activation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("DenseClassifier", "in_channels", self.in_channels)?;
        check_positive("DenseClassifier", "n_classes", self.n_classes)
    }
}

/// Averages per-sample scores over each segment, then mixes classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentClassifierConfig {
    /// Number of output classes
    pub n_classes: usize,
    /// Samples per segment
    pub data_per_period: usize,
}

impl SegmentClassifierConfig {
    pub fn new(n_classes: usize, data_per_period: usize) -> Self {
        Self {
            n_classes,
            data_per_period,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_positive("SegmentClassifier", "n_classes", self.n_classes)?;
        check_positive("SegmentClassifier", "data_per_period", self.data_per_period)
    }
}

/// Top-level network configuration, read once from the hyperparameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTimeConfig {
    /// Number of segment classes (sleep stages)
    pub n_classes: usize,
    /// Expected input shape; `samples` fixes the window length
    pub batch_shape: BatchShape,
    /// Number of encoder and decoder levels
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Pool factor per level, one entry per `depth`
    #[serde(default)]
    pub pools: PoolSchedule,
    /// Samples per output segment
    #[serde(default = "default_data_per_period")]
    pub data_per_period: usize,
    /// Convolution kernel size, odd
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
    /// Spacing between kernel taps
    #[serde(default = "default_dilation")]
    pub dilation: usize,
    /// Width of the first encoder stage, `2 * channels` when unset
    #[serde(default)]
    pub init_filters: Option<usize>,
    /// Activation of the dense classifier
    #[serde(default)]
    pub dense_activation: DenseActivation,
    /// Requested float precision; the backend has the final say
    #[serde(default)]
    pub precision: Precision,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_data_per_period() -> usize {
    DEFAULT_DATA_PER_PERIOD
}

fn default_kernel_size() -> usize {
    DEFAULT_KERNEL_SIZE
}

fn default_dilation() -> usize {
    DEFAULT_DILATION
}

impl Default for UTimeConfig {
    fn default() -> Self {
        Self::new(5, BatchShape::default())
    }
}

impl UTimeConfig {
    /// Defaults for everything but the class count and input shape.
    pub fn new(n_classes: usize, batch_shape: BatchShape) -> Self {
        Self {
            n_classes,
            batch_shape,
            depth: DEFAULT_DEPTH,
            pools: PoolSchedule::default(),
            data_per_period: DEFAULT_DATA_PER_PERIOD,
            kernel_size: DEFAULT_KERNEL_SIZE,
            dilation: DEFAULT_DILATION,
            init_filters: None,
            dense_activation: DenseActivation::default(),
            precision: Precision::default(),
        }
    }

    /// Sets the depth together with its pool schedule.
    #[must_use]
    pub fn with_depth(mut self, depth: usize, pools: impl Into<PoolSchedule>) -> Self {
        self.depth = depth;
        self.pools = pools.into();
        self
    }

    #[must_use]
    pub fn with_data_per_period(mut self, data_per_period: usize) -> Self {
        self.data_per_period = data_per_period;
        self
    }

    #[must_use]
    pub fn with_kernel(mut self, kernel_size: usize, dilation: usize) -> Self {
        self.kernel_size = kernel_size;
        self.dilation = dilation;
        self
    }

    #[must_use]
    pub fn with_init_filters(mut self, init_filters: usize) -> Self {
        self.init_filters = Some(init_filters);
        self
    }

    #[must_use]
    pub fn with_dense_activation(mut self, activation: DenseActivation) -> Self {
        self.dense_activation = activation;
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Channels of the input signal.
    pub fn in_channels(&self) -> usize {
        self.batch_shape.channels
    }

    /// Number of segments per input window.
    pub fn n_periods(&self) -> usize {
        self.batch_shape.samples / self.data_per_period
    }

    /// Encoder config derived from the shared fields.
    pub fn encoder(&self) -> EncoderConfig {
        EncoderConfig::new(self.in_channels(), self.depth, self.pools.clone())
            .with_kernel(self.kernel_size, self.dilation)
            .with_init_filters(self.init_filters)
    }

    /// Bottleneck doubling the encoded width.
    pub fn bottleneck(&self) -> ConvBlockConfig {
        let encoded = self.encoder().filters().encoded();
        ConvBlockConfig::new(encoded, encoded.saturating_mul(2))
            .with_kernel(self.kernel_size, self.dilation)
    }

    /// Decoder fed by the bottleneck, mirroring the encoder pools.
    pub fn decoder(&self) -> DecoderConfig {
        DecoderConfig::new(self.bottleneck().out_channels, self.depth, self.pools.clone())
            .with_kernel(self.kernel_size, self.dilation)
    }

    /// Dense head on top of the decoder output.
    pub fn dense_classifier(&self) -> DenseClassifierConfig {
        DenseClassifierConfig::new(self.decoder().out_channels(), self.n_classes)
            .with_activation(self.dense_activation)
    }

    /// Segment head pooling `data_per_period` samples per label.
    pub fn segment_classifier(&self) -> SegmentClassifierConfig {
        SegmentClassifierConfig::new(self.n_classes, self.data_per_period)
    }

    /// Checks every component config and the cross-component invariants.
    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "UTime";
        check_positive(COMPONENT, "n_classes", self.n_classes)?;
        check_positive(COMPONENT, "batch_size", self.batch_shape.batch_size)?;
        check_positive(COMPONENT, "input channels", self.batch_shape.channels)?;
        check_positive(COMPONENT, "samples", self.batch_shape.samples)?;

        let encoder = self.encoder();
        encoder.validate()?;
        let decoder = self.decoder();
        decoder.validate()?;
        self.dense_classifier().validate()?;
        self.segment_classifier().validate()?;

        let samples = self.batch_shape.samples;
        let total_pool = self.pools.product();
        if samples % total_pool != 0 {
            return Err(UTimeError::config(
                COMPONENT,
                format!(
                    "{samples} samples are not divisible by the total pooling factor {total_pool} of {:?}",
                    self.pools.as_slice()
                ),
            ));
        }
        if samples % self.data_per_period != 0 {
            return Err(UTimeError::config(
                COMPONENT,
                format!(
                    "{samples} samples are not divisible by data_per_period {}",
                    self.data_per_period
                ),
            ));
        }

        check_skip_pairing(&encoder, &decoder)
    }
}

/// Every decoder stage must consume an encoder residual of the width and
/// resolution it restores.
pub(crate) fn check_skip_pairing(encoder: &EncoderConfig, decoder: &DecoderConfig) -> Result<()> {
    const COMPONENT: &str = "UTime";
    if encoder.depth != decoder.depth {
        return Err(UTimeError::config(
            COMPONENT,
            format!(
                "encoder depth {} differs from decoder depth {}",
                encoder.depth, decoder.depth
            ),
        ));
    }
    if decoder.upsampling_factors() != encoder.pools.reversed() {
        return Err(UTimeError::config(
            COMPONENT,
            format!(
                "decoder upsampling {:?} does not mirror encoder pools {:?}",
                decoder.upsampling_factors().as_slice(),
                encoder.pools.as_slice()
            ),
        ));
    }
    let filters = encoder.filters();
    for stage in 0..decoder.depth {
        let source = decoder.encoder_stage(stage);
        let produced = filters.stage(source).unwrap_or(0);
        let expected = decoder.skip_channels(stage);
        if produced != expected {
            return Err(UTimeError::config(
                COMPONENT,
                format!(
                    "decoder stage {stage} expects a {expected}-channel skip from encoder stage {source}, which produces {produced}"
                ),
            ));
        }
    }
    Ok(())
}
