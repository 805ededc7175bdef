//! U-Time network
//!
//! Encoder -> bottleneck -> decoder -> dense classifier -> segment
//! classifier. The encoder/decoder pairing and every temporal divisibility
//! requirement are checked when the model is built.

use super::blocks::DoubleConvBlock;
use super::classifier::{DenseClassifier, SegmentClassifier};
use super::config::{check_skip_pairing, FilterSchedule, Precision, UTimeConfig};
use super::decoder::UTimeDecoder;
use super::encoder::UTimeEncoder;
use crate::error::{ensure_dim, Result, UTimeError};
use burn::{
    module::Module,
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
};
use tracing::{debug, info, warn};

/// Segment logits plus the dense scores they were aggregated from.
#[derive(Debug, Clone)]
pub struct UTimeOutput<B: Backend> {
    /// `[batch, n_classes, n_periods]`
    pub segments: Tensor<B, 3>,
    /// `[batch, n_classes, samples]`
    pub dense: Tensor<B, 3>,
}

#[derive(Module, Debug)]
pub struct UTime<B: Backend> {
    encoder: UTimeEncoder<B>,
    bottleneck: DoubleConvBlock<B>,
    decoder: UTimeDecoder<B>,
    dense: DenseClassifier<B>,
    segment: SegmentClassifier<B>,
    in_channels: usize,
    n_classes: usize,
    /// Input lengths must be a multiple of this.
    length_multiple: usize,
}

impl<B: Backend> UTime<B> {
    pub fn new(config: &UTimeConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        match Precision::of_backend::<B>() {
            Some(actual) if actual != config.precision => warn!(
                requested = ?config.precision,
                ?actual,
                "requested precision differs from the backend float type; using the backend's"
            ),
            None => warn!(
                requested = ?config.precision,
                "backend float type is neither f32 nor f64; using the backend's"
            ),
            _ => {}
        }

        let encoder_config = config.encoder();
        let decoder_config = config.decoder();
        check_skip_pairing(&encoder_config, &decoder_config)?;

        let encoder = UTimeEncoder::new(&encoder_config, device)?;
        let bottleneck = DoubleConvBlock::new(&config.bottleneck(), device)?;
        let decoder = UTimeDecoder::new(&decoder_config, device)?;
        let dense = DenseClassifier::new(&config.dense_classifier(), device)?;
        let segment = SegmentClassifier::new(&config.segment_classifier(), device)?;

        let length_multiple = lcm(config.pools.product(), config.data_per_period);

        let model = Self {
            encoder,
            bottleneck,
            decoder,
            dense,
            segment,
            in_channels: config.in_channels(),
            n_classes: config.n_classes,
            length_multiple,
        };

        info!(
            batch_shape = %config.batch_shape,
            depth = config.depth,
            pools = ?config.pools.as_slice(),
            filters = ?model.filters().as_slice(),
            n_classes = config.n_classes,
            data_per_period = config.data_per_period,
            params = model.num_params(),
            "built U-Time"
        );

        Ok(model)
    }

    pub fn filters(&self) -> FilterSchedule {
        self.encoder.filters()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn data_per_period(&self) -> usize {
        self.segment.data_per_period()
    }

    /// Checks `[batch, channels, samples]` against the construction-time
    /// contract.
    pub fn check_input(&self, x: &Tensor<B, 3>) -> Result<()> {
        let [_, channels, samples] = x.dims();
        ensure_dim("UTime", "input channels", self.in_channels, channels)?;
        if samples == 0 || samples % self.length_multiple != 0 {
            return Err(UTimeError::shape(
                "UTime",
                "input time length",
                format!("a positive multiple of {}", self.length_multiple),
                samples,
            ));
        }
        Ok(())
    }

    /// Runs the whole network and keeps the dense scores for auxiliary
    /// supervision.
    pub fn forward_with_dense(&self, x: Tensor<B, 3>) -> Result<UTimeOutput<B>> {
        self.check_input(&x)?;

        let encoded = self.encoder.forward(x)?;
        let bottom = self.bottleneck.forward(encoded.encoded);
        debug!(bottleneck = ?bottom.dims(), "bottleneck");
        let decoded = self.decoder.forward(bottom, encoded.skips)?;
        let dense = self.dense.forward(decoded)?;
        let segments = self.segment.forward(dense.clone())?;

        Ok(UTimeOutput { segments, dense })
    }

    /// `[batch, in_channels, samples]` -> `[batch, n_classes, samples / data_per_period]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        Ok(self.forward_with_dense(x)?.segments)
    }

    /// Class probabilities per segment.
    pub fn predict_proba(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        Ok(softmax(self.forward(x)?, 1))
    }

    /// Most likely class per segment, `[batch, n_periods]`.
    pub fn predict(&self, x: Tensor<B, 3>) -> Result<Tensor<B, 2, Int>> {
        let logits = self.forward(x)?;
        let [batch, _, periods] = logits.dims();
        Ok(logits.argmax(1).reshape([batch, periods]))
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::BatchShape;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f64>;

    const BATCH_SIZE: usize = 10;
    const N_PERIODS: usize = 100;

    fn config() -> UTimeConfig {
        UTimeConfig::new(10, BatchShape::new(BATCH_SIZE, 6, N_PERIODS))
            .with_precision(Precision::Float64)
    }

    #[test]
    fn test_default_model_forward() {
        let device = Default::default();
        let model = UTime::<TestBackend>::new(&config(), &device).unwrap();

        let x = Tensor::random(
            [BATCH_SIZE, 6, N_PERIODS],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let out = model.forward_with_dense(x).unwrap();
        assert_eq!(out.segments.dims(), [BATCH_SIZE, 10, N_PERIODS / 10]);
        assert_eq!(out.dense.dims(), [BATCH_SIZE, 10, N_PERIODS]);
    }

    #[test]
    fn test_model_accepts_other_multiples() {
        let device = Default::default();
        let model = UTime::<TestBackend>::new(&config(), &device).unwrap();
        let y = model.forward(Tensor::zeros([2, 6, 200], &device)).unwrap();
        assert_eq!(y.dims(), [2, 10, 20]);
    }

    #[test]
    fn test_model_rejects_bad_input() {
        let device = Default::default();
        let model = UTime::<TestBackend>::new(&config(), &device).unwrap();

        let err = model.forward(Tensor::zeros([2, 6, 90], &device)).unwrap_err();
        assert!(err.to_string().contains("multiple of 20"));

        let err = model.forward(Tensor::zeros([2, 5, 100], &device)).unwrap_err();
        assert!(err.to_string().contains("input channels"));
    }

    #[test]
    fn test_predictions() {
        let device = Default::default();
        let model = UTime::<TestBackend>::new(&config(), &device).unwrap();
        let x = Tensor::random([3, 6, N_PERIODS], Distribution::Default, &device);

        let proba = model.predict_proba(x.clone()).unwrap();
        let sums: Vec<f64> = proba.sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-9));

        let classes = model.predict(x).unwrap();
        assert_eq!(classes.dims(), [3, 10]);
        let classes: Vec<i64> = classes.into_data().to_vec().unwrap();
        assert!(classes.iter().all(|&c| (0..10).contains(&c)));
    }

    #[test]
    fn test_construction_rejects_deep_schedules() {
        let device = Default::default();
        let config = config().with_depth(3, vec![4, 5, 2]);
        let err = UTime::<TestBackend>::new(&config, &device).unwrap_err();
        assert!(err.is_configuration());
    }

    /// Collects formatted log lines.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_precision_mismatch_warns_and_uses_backend_precision() {
        type SingleBackend = NdArray<f32>;
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let device = Default::default();
        let model = tracing::subscriber::with_default(subscriber, || {
            UTime::<SingleBackend>::new(&config(), &device)
        })
        .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("requested precision differs"));
        assert_eq!(
            Precision::of_backend::<SingleBackend>(),
            Some(Precision::Float32)
        );

        let y = model
            .forward(Tensor::zeros([2, 6, N_PERIODS], &device))
            .unwrap();
        let values: Vec<f32> = y.into_data().to_vec().unwrap();
        assert_eq!(values.len(), 2 * 10 * 10);
    }

    #[test]
    fn test_matching_precision_is_silent() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .finish();

        let device = Default::default();
        tracing::subscriber::with_default(subscriber, || {
            UTime::<TestBackend>::new(&config(), &device)
        })
        .unwrap();
        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lcm() {
        assert_eq!(lcm(20, 10), 20);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(1, 7), 7);
    }
}
