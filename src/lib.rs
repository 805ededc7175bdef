//! # U-Time
//!
//! Fully convolutional encoder-decoder that labels every fixed-length
//! segment of a multi-channel time series, such as 30 s sleep stages in a
//! polysomnography recording.
//!
//! ## Modules
//!
//! - `model` - network components, training and checkpoints
//! - `data` - labelled windows, batching and synthetic signals
//! - `hparams` - hyperparameters loaded from TOML
//! - `error` - configuration and shape errors
//! - `logging` - tracing setup for the binaries

pub mod data;
pub mod error;
pub mod hparams;
pub mod logging;
pub mod model;

// Re-export commonly used types
pub use data::{Batch, Dataset, Sample, SyntheticSignals};
pub use error::{Result, UTimeError};
pub use hparams::HParams;
pub use model::{BatchShape, TrainingConfig, UTime, UTimeConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
