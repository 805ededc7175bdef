//! Training and evaluation
//!
//! Class-weighted cross-entropy on segment logits, Adam, early stopping on
//! the monitored accuracy, best-epoch checkpointing.

use super::checkpoint::{save_weights, CheckpointDir};
use super::utime::UTime;
use crate::data::{Batch, Dataset};
use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Epochs without improvement before stopping.
    pub patience: usize,
    /// Minimum accuracy gain that counts as an improvement.
    pub min_delta: f64,
    pub use_class_weights: bool,
    /// Log every N batches.
    pub log_interval: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_epochs: 20,
            batch_size: 12,
            learning_rate: 5e-6,
            patience: 10,
            min_delta: 0.0,
            use_class_weights: true,
            log_interval: 10,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Few short epochs, for smoke runs.
    pub fn quick() -> Self {
        Self {
            n_epochs: 3,
            batch_size: 4,
            learning_rate: 1e-3,
            patience: 2,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.n_epochs >= 1, "n_epochs must be >= 1");
        anyhow::ensure!(self.batch_size >= 1, "batch_size must be >= 1");
        anyhow::ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "learning_rate must be a positive number"
        );
        anyhow::ensure!(self.log_interval >= 1, "log_interval must be >= 1");
        Ok(())
    }
}

/// Per-epoch history.
#[derive(Debug, Clone, Default)]
pub struct TrainingResult {
    pub train_losses: Vec<f32>,
    pub val_losses: Vec<f32>,
    pub train_accuracies: Vec<f32>,
    pub val_accuracies: Vec<f32>,
    pub best_epoch: usize,
    pub best_accuracy: f32,
    pub stopped_early: bool,
}

/// Segment-level metrics.
#[derive(Debug, Clone)]
pub struct EvaluationMetrics {
    pub accuracy: f32,
    pub precision: Vec<f32>,
    pub recall: Vec<f32>,
    pub f1: Vec<f32>,
    /// `confusion_matrix[actual][predicted]`
    pub confusion_matrix: Vec<Vec<usize>>,
    pub loss: f32,
}

impl EvaluationMetrics {
    pub fn from_confusion(confusion_matrix: Vec<Vec<usize>>, loss: f32) -> Self {
        let n_classes = confusion_matrix.len();
        let mut precision = vec![0.0f32; n_classes];
        let mut recall = vec![0.0f32; n_classes];
        let mut f1 = vec![0.0f32; n_classes];

        for c in 0..n_classes {
            let tp = confusion_matrix[c][c] as f32;
            let fp = (0..n_classes)
                .map(|i| confusion_matrix[i][c] as f32)
                .sum::<f32>()
                - tp;
            let fn_ = confusion_matrix[c].iter().map(|&v| v as f32).sum::<f32>() - tp;

            precision[c] = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
            recall[c] = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
            f1[c] = if precision[c] + recall[c] > 0.0 {
                2.0 * precision[c] * recall[c] / (precision[c] + recall[c])
            } else {
                0.0
            };
        }

        let total: usize = confusion_matrix.iter().flat_map(|row| row.iter()).sum();
        let correct: usize = (0..n_classes).map(|i| confusion_matrix[i][i]).sum();
        let accuracy = if total > 0 {
            correct as f32 / total as f32
        } else {
            0.0
        };

        Self {
            accuracy,
            precision,
            recall,
            f1,
            confusion_matrix,
            loss,
        }
    }

    pub fn macro_f1(&self) -> f32 {
        if self.f1.is_empty() {
            0.0
        } else {
            self.f1.iter().sum::<f32>() / self.f1.len() as f32
        }
    }
}

/// Trains `model` on `train`, monitoring `val` (or the training accuracy
/// when there is no validation split). The best model is written to
/// `checkpoints` when given.
pub fn train_model<B: AutodiffBackend>(
    model: UTime<B>,
    train: &mut Dataset,
    mut val: Option<&mut Dataset>,
    config: &TrainingConfig,
    checkpoints: Option<&CheckpointDir>,
    device: &B::Device,
) -> Result<(UTime<B>, TrainingResult)> {
    config.validate()?;
    anyhow::ensure!(!train.is_empty(), "training set is empty");

    let n_classes = model.n_classes();
    info!("Starting training for {} epochs", config.n_epochs);
    info!(
        "Train windows: {}, Val windows: {}",
        train.epoch_len(),
        val.as_ref().map_or(0, |v| v.epoch_len())
    );

    let mut model = model;
    let mut optimizer = AdamConfig::new().init();
    let mut result = TrainingResult::default();

    let class_weights = if config.use_class_weights {
        train.class_weights(n_classes)
    } else {
        vec![1.0; n_classes]
    };
    info!("Class weights: {:?}", class_weights);

    let mut patience_counter = 0;

    for epoch in 0..config.n_epochs {
        train.reset();
        let mut loss_sum = 0.0;
        let mut correct = 0;
        let mut total = 0;
        let mut batch_count = 0;

        while let Some(batch) = train.next_batch() {
            let (signals, labels) = batch_to_tensors::<B>(&batch, device);

            let logits = model.forward(signals)?;
            let loss = cross_entropy_loss(logits.clone(), labels.clone(), &class_weights, device);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);

            correct += count_correct(logits, labels);
            total += batch.labels.len();
            loss_sum += loss.into_scalar().elem::<f32>();
            batch_count += 1;

            if batch_count % config.log_interval == 0 {
                debug!(
                    "Epoch {} Batch {}: loss={:.4}",
                    epoch + 1,
                    batch_count,
                    loss_sum / batch_count as f32
                );
            }
        }

        let train_loss = loss_sum / batch_count.max(1) as f32;
        let train_acc = correct as f32 / total.max(1) as f32;
        result.train_losses.push(train_loss);
        result.train_accuracies.push(train_acc);

        let monitored = match val.as_deref_mut() {
            Some(val) => {
                let metrics = evaluate_model(&model.valid(), val, device)?;
                result.val_losses.push(metrics.loss);
                result.val_accuracies.push(metrics.accuracy);
                info!(
                    "Epoch {}/{}: train_loss={:.4}, train_acc={:.4}, val_loss={:.4}, val_acc={:.4}, val_macro_f1={:.4}",
                    epoch + 1,
                    config.n_epochs,
                    train_loss,
                    train_acc,
                    metrics.loss,
                    metrics.accuracy,
                    metrics.macro_f1()
                );
                metrics.accuracy
            }
            None => {
                info!(
                    "Epoch {}/{}: train_loss={:.4}, train_acc={:.4}",
                    epoch + 1,
                    config.n_epochs,
                    train_loss,
                    train_acc
                );
                train_acc
            }
        };

        if epoch == 0 || monitored > result.best_accuracy + config.min_delta as f32 {
            result.best_accuracy = monitored;
            result.best_epoch = epoch;
            patience_counter = 0;

            if let Some(checkpoints) = checkpoints {
                debug!("New best model at epoch {}", epoch + 1);
                save_weights(&model, &checkpoints.checkpoint())?;
            }
        } else {
            patience_counter += 1;
            if patience_counter >= config.patience {
                warn!("Early stopping at epoch {}", epoch + 1);
                result.stopped_early = true;
                break;
            }
        }
    }

    info!(
        "Training completed. Best accuracy: {:.4} at epoch {}",
        result.best_accuracy,
        result.best_epoch + 1
    );

    Ok((model, result))
}

/// Evaluates `model` on every window of `dataset`.
pub fn evaluate_model<B: Backend>(
    model: &UTime<B>,
    dataset: &mut Dataset,
    device: &B::Device,
) -> Result<EvaluationMetrics> {
    let n_classes = model.n_classes();
    let uniform = vec![1.0; n_classes];
    let mut confusion_matrix = vec![vec![0usize; n_classes]; n_classes];
    let mut total_loss = 0.0;
    let mut batch_count = 0;

    dataset.reset();
    while let Some(batch) = dataset.next_batch() {
        let (signals, labels) = batch_to_tensors::<B>(&batch, device);
        let logits = model.forward(signals)?;

        let loss = cross_entropy_loss(logits.clone(), labels, &uniform, device);
        total_loss += loss.into_scalar().elem::<f32>();

        let predictions = flatten_segments(logits).argmax(1);
        let predicted: Vec<i64> = predictions
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|err| anyhow::anyhow!("reading predictions: {err:?}"))?;

        for (pred, &actual) in predicted.iter().zip(batch.labels.iter()) {
            if let Ok(pred) = usize::try_from(*pred) {
                if pred < n_classes && actual < n_classes {
                    confusion_matrix[actual][pred] += 1;
                }
            }
        }
        batch_count += 1;
    }

    let loss = if batch_count > 0 {
        total_loss / batch_count as f32
    } else {
        0.0
    };
    Ok(EvaluationMetrics::from_confusion(confusion_matrix, loss))
}

/// Signals `[batch, channels, samples]` and flattened labels
/// `[batch * periods]`.
fn batch_to_tensors<B: Backend>(batch: &Batch, device: &B::Device) -> (Tensor<B, 3>, Tensor<B, 1, Int>) {
    let shape = batch.signals.shape();
    let data: Vec<f32> = batch.signals.iter().copied().collect();
    let signals = Tensor::from_data(
        TensorData::new(data, [shape[0], shape[1], shape[2]]),
        device,
    );

    let labels: Vec<i64> = batch.labels.iter().map(|&l| l as i64).collect();
    let n = labels.len();
    let labels = Tensor::from_data(TensorData::new(labels, [n]), device);
    (signals, labels)
}

/// `[batch, classes, periods]` -> `[batch * periods, classes]`, row-major in
/// `(batch, period)` to line up with the flattened labels.
fn flatten_segments<B: Backend>(logits: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, classes, periods] = logits.dims();
    logits.swap_dims(1, 2).reshape([batch * periods, classes])
}

fn count_correct<B: Backend>(logits: Tensor<B, 3>, labels: Tensor<B, 1, Int>) -> usize {
    let logits = flatten_segments(logits);
    let [n, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([n]);
    let correct = predictions
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    correct.max(0) as usize
}

/// Weighted cross-entropy over every segment of the batch.
pub fn cross_entropy_loss<B: Backend>(
    logits: Tensor<B, 3>,
    labels: Tensor<B, 1, Int>,
    class_weights: &[f32],
    device: &B::Device,
) -> Tensor<B, 1> {
    let logits = flatten_segments(logits);
    let [n, _] = logits.dims();

    let log_probs = log_softmax(logits, 1);
    let selected = log_probs
        .gather(1, labels.clone().reshape([n, 1]))
        .reshape([n]);

    let weights = Tensor::<B, 1>::from_data(
        TensorData::new(class_weights.to_vec(), [class_weights.len()]),
        device,
    );
    let sample_weights = weights.select(0, labels);

    selected.neg().mul(sample_weights).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticSignals;
    use crate::model::{BatchShape, UTimeConfig};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn small_config() -> UTimeConfig {
        UTimeConfig::new(3, BatchShape::new(4, 2, 40))
            .with_depth(2, vec![2, 2])
            .with_kernel(3, 1)
            .with_init_filters(4)
    }

    fn dataset(n: usize, seed: u64) -> Dataset {
        let samples = SyntheticSignals::new(2, 40, 10, 3, 0.1, seed).generate(n);
        Dataset::new(samples, 4).with_seed(seed)
    }

    #[test]
    fn test_metrics_from_confusion() {
        let metrics =
            EvaluationMetrics::from_confusion(vec![vec![5, 0, 0], vec![1, 3, 1], vec![0, 0, 0]], 0.5);
        assert!((metrics.accuracy - 0.8).abs() < 1e-6);
        assert!((metrics.precision[0] - 5.0 / 6.0).abs() < 1e-6);
        assert!((metrics.recall[1] - 0.6).abs() < 1e-6);
        assert_eq!(metrics.f1[2], 0.0);
        assert!(metrics.macro_f1() > 0.0);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::zeros([2, 4, 3], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1, 2, 3, 0, 1], [6]),
            &device,
        );
        let loss = cross_entropy_loss(logits, labels, &[1.0; 4], &device);
        let loss = loss.into_scalar().elem::<f32>();
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_flatten_segments_matches_label_order() {
        let device = Default::default();
        // batch 1, classes 2, periods 3: class 1 wins in period 1 only.
        let logits = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 1.0, 0.0, 1.0, 0.0], [1, 2, 3]),
            &device,
        );
        let labels = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![0i64, 1, 0], [3]),
            &device,
        );
        assert_eq!(count_correct(logits, labels), 3);
    }

    #[test]
    fn test_training_runs_and_records_history() {
        let device = Default::default();
        let model = UTime::<TestAutodiffBackend>::new(&small_config(), &device).unwrap();
        let mut train = dataset(8, 1);
        let mut val = dataset(4, 2);
        let config = TrainingConfig::quick().with_n_epochs(2);

        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointDir::new(dir.path());
        let (_model, result) = train_model(
            model,
            &mut train,
            Some(&mut val),
            &config,
            Some(&checkpoints),
            &device,
        )
        .unwrap();

        assert_eq!(result.train_losses.len(), 2);
        assert_eq!(result.val_accuracies.len(), 2);
        assert!(result.train_losses.iter().all(|l| l.is_finite()));
        assert!(checkpoints.existing_checkpoint().is_some());
    }

    #[test]
    fn test_evaluate_counts_every_segment() {
        let device = Default::default();
        let model = UTime::<TestBackend>::new(&small_config(), &device).unwrap();
        let mut data = dataset(5, 3);
        let metrics = evaluate_model(&model, &mut data, &device).unwrap();
        let total: usize = metrics.confusion_matrix.iter().flatten().sum();
        assert_eq!(total, 5 * 4);
        assert!(metrics.loss.is_finite());
    }
}
