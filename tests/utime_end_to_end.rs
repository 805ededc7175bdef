//! End-to-end checks through the public API.

use burn::module::Module;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use utime::hparams::HParams;
use utime::model::{
    weights_from_bytes, weights_to_bytes, BatchShape, Precision, UTime, UTimeConfig,
};

type TestBackend = NdArray<f64>;

fn reference_config() -> UTimeConfig {
    UTimeConfig::new(10, BatchShape::new(10, 6, 100)).with_precision(Precision::Float64)
}

#[test]
fn test_default_model_builds_and_classifies_segments() {
    let device = Default::default();
    let model = UTime::<TestBackend>::new(&reference_config(), &device).unwrap();
    assert_eq!(model.n_classes(), 10);

    let x = Tensor::<TestBackend, 3>::random([10, 6, 100], Distribution::Default, &device);
    let output = model.forward_with_dense(x).unwrap();
    assert_eq!(output.dense.dims(), [10, 10, 100]);
    assert_eq!(output.segments.dims(), [10, 10, 10]);
}

#[test]
fn test_legacy_batch_shape_from_toml() {
    let text = r#"
[build]
n_classes = 10
batch_shape = [10, 6, 1, 100]
precision = "float64"
"#;
    let hparams = HParams::from_toml_str(text).unwrap();
    assert_eq!(hparams.build, reference_config());
}

#[test]
fn test_shipped_hyperparameters_are_valid() {
    let hparams = HParams::from_toml_str(include_str!("../config/hparams.toml")).unwrap();
    assert_eq!(hparams.build.n_periods(), 10);
}

#[test]
fn test_identical_configs_share_weights() {
    let device = Default::default();
    let a = UTime::<TestBackend>::new(&reference_config(), &device).unwrap();
    let b = UTime::<TestBackend>::new(&reference_config(), &device).unwrap();
    assert_eq!(a.num_params(), b.num_params());

    let bytes = weights_to_bytes(&a).unwrap();
    let b = weights_from_bytes(b, bytes, &device).unwrap();

    let x = Tensor::<TestBackend, 3>::random([2, 6, 100], Distribution::Default, &device);
    let ya: Vec<f64> = a.forward(x.clone()).unwrap().into_data().to_vec().unwrap();
    let yb: Vec<f64> = b.forward(x).unwrap().into_data().to_vec().unwrap();
    assert_eq!(ya, yb);
}

#[test]
fn test_forward_is_repeatable() {
    let device = Default::default();
    let model = UTime::<TestBackend>::new(&reference_config(), &device).unwrap();
    let x = Tensor::<TestBackend, 3>::random([3, 6, 100], Distribution::Default, &device);

    let first: Vec<f64> = model.forward(x.clone()).unwrap().into_data().to_vec().unwrap();
    let second: Vec<f64> = model.forward(x).unwrap().into_data().to_vec().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_predictions_are_distributions_and_labels() {
    let device = Default::default();
    let model = UTime::<TestBackend>::new(&reference_config(), &device).unwrap();
    let x = Tensor::<TestBackend, 3>::random([2, 6, 100], Distribution::Default, &device);

    let proba = model.predict_proba(x.clone()).unwrap();
    let sums: Vec<f64> = proba.sum_dim(1).into_data().to_vec().unwrap();
    assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-9));

    let labels = model.predict(x).unwrap();
    assert_eq!(labels.dims(), [2, 10]);
    let labels: Vec<i64> = labels.into_data().convert::<i64>().to_vec().unwrap();
    assert!(labels.iter().all(|&l| (0..10).contains(&l)));
}

#[test]
fn test_input_of_wrong_length_is_rejected() {
    let device = Default::default();
    let model = UTime::<TestBackend>::new(&reference_config(), &device).unwrap();
    let x = Tensor::<TestBackend, 3>::zeros([1, 6, 90], &device);
    assert!(model.forward(x).unwrap_err().is_shape_mismatch());

    let bad = UTimeConfig::new(10, BatchShape::new(10, 6, 110));
    assert!(UTime::<TestBackend>::new(&bad, &device)
        .unwrap_err()
        .is_configuration());
}
