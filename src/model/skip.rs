//! Skip connections keyed by encoder stage.

use crate::error::{Result, UTimeError};
use burn::tensor::{backend::Backend, Tensor};

/// Residual feature map produced by one encoder stage.
#[derive(Debug, Clone)]
pub struct Skip<B: Backend> {
    pub stage: usize,
    pub tensor: Tensor<B, 3>,
}

/// Encoder residuals in production order (stage 0 first).
#[derive(Debug, Clone)]
pub struct SkipList<B: Backend> {
    skips: Vec<Option<Skip<B>>>,
}

impl<B: Backend> SkipList<B> {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            skips: Vec::with_capacity(depth),
        }
    }

    /// Builds a list from tensors given in production order.
    pub fn from_tensors(tensors: Vec<Tensor<B, 3>>) -> Self {
        let skips = tensors
            .into_iter()
            .enumerate()
            .map(|(stage, tensor)| Some(Skip { stage, tensor }))
            .collect();
        Self { skips }
    }

    /// Appends the residual of the next encoder stage.
    pub fn push(&mut self, tensor: Tensor<B, 3>) {
        let stage = self.skips.len();
        self.skips.push(Some(Skip { stage, tensor }));
    }

    pub fn len(&self) -> usize {
        self.skips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skips.is_empty()
    }

    pub fn get(&self, stage: usize) -> Option<&Tensor<B, 3>> {
        self.skips
            .get(stage)
            .and_then(Option::as_ref)
            .map(|skip| &skip.tensor)
    }

    /// Shapes of the skips still held, in production order.
    pub fn shapes(&self) -> Vec<[usize; 3]> {
        self.skips
            .iter()
            .flatten()
            .map(|skip| skip.tensor.dims())
            .collect()
    }

    /// Removes and returns the residual of encoder stage `stage`.
    pub fn take(&mut self, stage: usize) -> Result<Tensor<B, 3>> {
        let count = self.skips.len();
        let slot = self.skips.get_mut(stage).ok_or_else(|| {
            UTimeError::shape("SkipList", "skip count", format!("> {stage}"), count)
        })?;
        slot.take()
            .map(|skip| skip.tensor)
            .ok_or_else(|| {
                UTimeError::shape(
                    "SkipList",
                    format!("skip for encoder stage {stage}"),
                    "present",
                    "already consumed",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_skips_are_keyed_by_stage() {
        let device = Default::default();
        let mut skips = SkipList::<TestBackend>::with_depth(2);
        skips.push(Tensor::zeros([1, 4, 20], &device));
        skips.push(Tensor::zeros([1, 8, 5], &device));
        assert_eq!(skips.len(), 2);
        assert_eq!(skips.shapes(), vec![[1, 4, 20], [1, 8, 5]]);

        assert_eq!(skips.take(1).unwrap().dims(), [1, 8, 5]);
        assert!(skips.take(1).unwrap_err().is_shape_mismatch());
        assert_eq!(skips.take(0).unwrap().dims(), [1, 4, 20]);
        assert!(skips.take(2).is_err());
    }
}
