//! # Data
//!
//! Labelled windows, mini-batching and a synthetic signal source. Reading
//! recordings from disk is left to callers.

mod dataset;
mod sample;
mod synthetic;

pub use dataset::{Batch, Dataset};
pub use sample::Sample;
pub use synthetic::{SyntheticConfig, SyntheticSignals};
