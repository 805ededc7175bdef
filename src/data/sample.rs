//! One labelled window of a multi-channel recording.

use ndarray::Array2;

/// A window of `samples` time steps over `channels` signals, with one class
/// label per segment of `data_per_period` samples.
#[derive(Debug, Clone)]
pub struct Sample {
    /// `[channels, samples]`
    pub signal: Array2<f32>,
    /// One label per segment.
    pub labels: Vec<usize>,
}

impl Sample {
    pub fn new(signal: Array2<f32>, labels: Vec<usize>) -> Self {
        Self { signal, labels }
    }

    /// `(channels, samples)`
    pub fn shape(&self) -> (usize, usize) {
        let shape = self.signal.shape();
        (shape[0], shape[1])
    }

    pub fn num_channels(&self) -> usize {
        self.signal.shape()[0]
    }

    pub fn num_samples(&self) -> usize {
        self.signal.shape()[1]
    }

    pub fn num_periods(&self) -> usize {
        self.labels.len()
    }
}
