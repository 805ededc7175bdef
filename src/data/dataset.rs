//! In-memory dataset with shuffled mini-batches.

use super::sample::Sample;
use ndarray::{s, Array2, Array3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Mini-batch of equally shaped windows.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch_size, channels, samples]`
    pub signals: Array3<f32>,
    /// `[batch_size, periods]`
    pub labels: Array2<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.nrows() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<Sample>,
    batch_size: usize,
    shuffle: bool,
    /// Windows drawn per epoch; all of them when `None`.
    epoch_size: Option<usize>,
    current_index: usize,
    indices: Vec<usize>,
    rng: StdRng,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>, batch_size: usize) -> Self {
        let indices: Vec<usize> = (0..samples.len()).collect();
        Self {
            samples,
            batch_size: batch_size.max(1),
            shuffle: true,
            epoch_size: None,
            current_index: 0,
            indices,
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Caps the number of windows visited per epoch.
    pub fn with_epoch_size(mut self, windows: usize) -> Self {
        self.epoch_size = Some(windows.max(1));
        self
    }

    /// Keeps only the first `n` windows.
    pub fn truncate(mut self, n: usize) -> Self {
        self.samples.truncate(n);
        self.indices = (0..self.samples.len()).collect();
        self.current_index = 0;
        self
    }

    /// Appends every window of `other`.
    pub fn merge(mut self, other: Dataset) -> Self {
        self.samples.extend(other.samples);
        self.indices = (0..self.samples.len()).collect();
        self.current_index = 0;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Windows visited in one epoch.
    pub fn epoch_len(&self) -> usize {
        self.epoch_size
            .map_or(self.samples.len(), |n| n.min(self.samples.len()))
    }

    pub fn num_batches(&self) -> usize {
        self.epoch_len().div_ceil(self.batch_size)
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    pub fn next_batch(&mut self) -> Option<Batch> {
        let end = self.epoch_len();
        if self.current_index >= end {
            return None;
        }

        let end_idx = (self.current_index + self.batch_size).min(end);
        let batch_indices = &self.indices[self.current_index..end_idx];
        let batch = self.collate(batch_indices);
        self.current_index = end_idx;
        Some(batch)
    }

    fn collate(&self, indices: &[usize]) -> Batch {
        let first = &self.samples[indices[0]];
        let (channels, samples) = first.shape();
        let periods = first.num_periods();

        let mut signals = Array3::zeros((indices.len(), channels, samples));
        let mut labels = Array2::zeros((indices.len(), periods));
        for (row, &idx) in indices.iter().enumerate() {
            let sample = &self.samples[idx];
            signals.slice_mut(s![row, .., ..]).assign(&sample.signal);
            for (period, &label) in sample.labels.iter().enumerate() {
                labels[[row, period]] = label;
            }
        }

        Batch { signals, labels }
    }

    /// Segment counts per class.
    pub fn class_distribution(&self, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; n_classes];
        for label in self.samples.iter().flat_map(|s| s.labels.iter()) {
            if *label < n_classes {
                counts[*label] += 1;
            }
        }
        counts
    }

    /// Inverse-frequency class weights, 1.0 for absent classes.
    pub fn class_weights(&self, n_classes: usize) -> Vec<f32> {
        let dist = self.class_distribution(n_classes);
        let total: usize = dist.iter().sum();

        dist.iter()
            .map(|&count| {
                if count > 0 {
                    total as f32 / (n_classes as f32 * count as f32)
                } else {
                    1.0
                }
            })
            .collect()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Iterator for Dataset {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
