//! Classification heads: per-sample (dense) and per-segment.

use super::config::{DenseActivation, DenseClassifierConfig, SegmentClassifierConfig};
use crate::error::{ensure_dim, Result, UTimeError};
use burn::{
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{AvgPool1d, AvgPool1dConfig},
    },
    tensor::{activation, backend::Backend, Tensor},
};

/// 1x1 convolution mapping decoder channels to one score per class at every
/// sample.
#[derive(Module, Debug)]
pub struct DenseClassifier<B: Backend> {
    conv: Conv1d<B>,
    in_channels: usize,
    tanh: bool,
}

impl<B: Backend> DenseClassifier<B> {
    pub fn new(config: &DenseClassifierConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let conv = Conv1dConfig::new(config.in_channels, config.n_classes, 1).init(device);
        Ok(Self {
            conv,
            in_channels: config.in_channels,
            tanh: config.activation == DenseActivation::Tanh,
        })
    }

    /// `[batch, in, time]` -> `[batch, n_classes, time]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [_, channels, _] = x.dims();
        ensure_dim("DenseClassifier", "input channels", self.in_channels, channels)?;
        let x = self.conv.forward(x);
        Ok(if self.tanh { activation::tanh(x) } else { x })
    }
}

/// Averages dense scores over non-overlapping windows of `data_per_period`
/// samples, then mixes classes with a 1x1 convolution. Emits logits.
#[derive(Module, Debug)]
pub struct SegmentClassifier<B: Backend> {
    pool: AvgPool1d,
    conv: Conv1d<B>,
    n_classes: usize,
    data_per_period: usize,
}

impl<B: Backend> SegmentClassifier<B> {
    pub fn new(config: &SegmentClassifierConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let pool = AvgPool1dConfig::new(config.data_per_period)
            .with_stride(config.data_per_period)
            .init();
        let conv = Conv1dConfig::new(config.n_classes, config.n_classes, 1).init(device);
        Ok(Self {
            pool,
            conv,
            n_classes: config.n_classes,
            data_per_period: config.data_per_period,
        })
    }

    pub fn data_per_period(&self) -> usize {
        self.data_per_period
    }

    /// `[batch, n_classes, time]` -> `[batch, n_classes, time / data_per_period]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        const COMPONENT: &str = "SegmentClassifier";
        let [_, channels, len] = x.dims();
        ensure_dim(COMPONENT, "input channels", self.n_classes, channels)?;
        if len % self.data_per_period != 0 {
            return Err(UTimeError::shape(
                COMPONENT,
                "time length",
                format!("a multiple of {}", self.data_per_period),
                len,
            ));
        }
        let x = if self.data_per_period == 1 {
            x
        } else {
            self.pool.forward(x)
        };
        Ok(self.conv.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f64>;

    const BATCH_SIZE: usize = 10;
    const IN_CH: usize = 32;
    const N_PERIODS: usize = 100;
    const N_CLASSES: usize = 10;

    fn random_input(shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::random(shape, Distribution::Uniform(-1.0, 1.0), &Default::default())
    }

    #[test]
    fn test_dense_classifier_keeps_resolution() {
        let device = Default::default();
        let net = DenseClassifier::<TestBackend>::new(
            &DenseClassifierConfig::new(IN_CH, N_CLASSES),
            &device,
        )
        .unwrap();
        let y = net.forward(random_input([BATCH_SIZE, IN_CH, N_PERIODS])).unwrap();
        assert_eq!(y.dims(), [BATCH_SIZE, N_CLASSES, N_PERIODS]);

        let values: Vec<f64> = y.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_dense_classifier_has_no_temporal_mixing() {
        let device = Default::default();
        let net = DenseClassifier::<TestBackend>::new(
            &DenseClassifierConfig::new(2, 3).with_activation(DenseActivation::Identity),
            &device,
        )
        .unwrap();

        let base = random_input([1, 2, 8]);
        let mut perturbed: Vec<f64> = base.clone().into_data().to_vec().unwrap();
        // Change sample 5 of channel 0 only.
        perturbed[5] += 3.0;
        let perturbed =
            Tensor::<TestBackend, 3>::from_data(TensorData::new(perturbed, [1, 2, 8]), &device);

        let a: Vec<f64> = net.forward(base).unwrap().into_data().to_vec().unwrap();
        let b: Vec<f64> = net.forward(perturbed).unwrap().into_data().to_vec().unwrap();
        for class in 0..3 {
            for t in 0..8 {
                let i = class * 8 + t;
                if t != 5 {
                    assert!((a[i] - b[i]).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_segment_classifier_window_sizes() {
        let device = Default::default();
        for data_per_period in [1, 4, 10, 25, 100] {
            let net = SegmentClassifier::<TestBackend>::new(
                &SegmentClassifierConfig::new(N_CLASSES, data_per_period),
                &device,
            )
            .unwrap();
            let y = net
                .forward(random_input([BATCH_SIZE, N_CLASSES, N_PERIODS]))
                .unwrap();
            assert_eq!(
                y.dims(),
                [BATCH_SIZE, N_CLASSES, N_PERIODS / data_per_period]
            );
        }
    }

    #[test]
    fn test_segment_classifier_rejects_indivisible_length() {
        let device = Default::default();
        let net = SegmentClassifier::<TestBackend>::new(
            &SegmentClassifierConfig::new(N_CLASSES, 30),
            &device,
        )
        .unwrap();
        let err = net
            .forward(random_input([2, N_CLASSES, N_PERIODS]))
            .unwrap_err();
        assert!(err.to_string().contains("a multiple of 30"));

        let err = net
            .forward(random_input([2, N_CLASSES + 1, 90]))
            .unwrap_err();
        assert!(err.to_string().contains("input channels"));
    }

    #[test]
    fn test_segment_classifier_rejects_zero_window() {
        let device = Default::default();
        let result = SegmentClassifier::<TestBackend>::new(
            &SegmentClassifierConfig::new(N_CLASSES, 0),
            &device,
        );
        assert!(result.unwrap_err().is_configuration());
    }
}
