//! # U-Time model
//!
//! Fully convolutional encoder-decoder for segment classification of
//! multi-channel time series, built on the Burn framework.

mod blocks;
mod checkpoint;
mod classifier;
mod config;
mod decoder;
mod encoder;
mod skip;
mod training;
mod utime;

pub use blocks::{upsample_nearest, DoubleConvBlock, DownBlock, DownOutput, SingleConvBlock, UpBlock};
pub use checkpoint::{
    load_weights, save_weights, weights_from_bytes, weights_to_bytes, CheckpointDir,
    WEIGHTS_EXTENSION,
};
pub use classifier::{DenseClassifier, SegmentClassifier};
pub use config::{
    BatchShape, ConvBlockConfig, DecoderConfig, DenseActivation, DenseClassifierConfig,
    DownBlockConfig, EncoderConfig, FilterSchedule, PoolSchedule, Precision,
    SegmentClassifierConfig, UTimeConfig, UpBlockConfig, DEFAULT_DATA_PER_PERIOD,
    DEFAULT_DEPTH, DEFAULT_DILATION, DEFAULT_KERNEL_SIZE, DEFAULT_POOLS,
};
pub use decoder::UTimeDecoder;
pub use encoder::{EncoderOutput, UTimeEncoder};
pub use skip::{Skip, SkipList};
pub use training::{
    cross_entropy_loss, evaluate_model, train_model, EvaluationMetrics, TrainingConfig,
    TrainingResult,
};
pub use utime::{UTime, UTimeOutput};
