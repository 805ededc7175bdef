//! Saving and loading model weights by parameter name.

use super::utime::UTime;
use anyhow::{anyhow, Context, Result};
use burn::{
    module::Module,
    record::{DoublePrecisionSettings, NamedMpkBytesRecorder, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension appended by the file recorder.
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Floats are stored as f64, lossless for both f32 and f64 backends.
type Settings = DoublePrecisionSettings;

fn file_recorder() -> NamedMpkFileRecorder<Settings> {
    NamedMpkFileRecorder::<Settings>::new()
}

/// Writes `model`'s weights to `path` (extension added by the recorder).
pub fn save_weights<B: Backend>(model: &UTime<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    model
        .clone()
        .save_file(path.to_path_buf(), &file_recorder())
        .map_err(|err| anyhow!("saving weights to {}: {err:?}", path.display()))?;
    info!("Saved weights to {}", path.display());
    Ok(())
}

/// Loads weights saved by [`save_weights`] into a model built from the same
/// configuration.
pub fn load_weights<B: Backend>(model: UTime<B>, path: &Path, device: &B::Device) -> Result<UTime<B>> {
    let model = model
        .load_file(path.to_path_buf(), &file_recorder(), device)
        .map_err(|err| anyhow!("loading weights from {}: {err:?}", path.display()))?;
    info!("Loaded weights from {}", path.display());
    Ok(model)
}

/// Serializes weights to an in-memory buffer.
pub fn weights_to_bytes<B: Backend>(model: &UTime<B>) -> Result<Vec<u8>> {
    NamedMpkBytesRecorder::<Settings>::default()
        .record(model.clone().into_record(), ())
        .map_err(|err| anyhow!("serializing weights: {err:?}"))
}

pub fn weights_from_bytes<B: Backend>(
    model: UTime<B>,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<UTime<B>> {
    let record = NamedMpkBytesRecorder::<Settings>::default()
        .load(bytes, device)
        .map_err(|err| anyhow!("deserializing weights: {err:?}"))?;
    Ok(model.load_record(record))
}

/// `<project>/model`: best-epoch checkpoint and final weights.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    root: PathBuf,
}

impl CheckpointDir {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            root: project_dir.join("model"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.root.join("checkpoint")
    }

    pub fn final_weights(&self, file_name: &str) -> PathBuf {
        let name = file_name
            .strip_suffix(&format!(".{WEIGHTS_EXTENSION}"))
            .unwrap_or(file_name);
        self.root.join(name)
    }

    /// Path of the checkpoint file when one exists.
    pub fn existing_checkpoint(&self) -> Option<PathBuf> {
        let path = self.checkpoint();
        path.with_extension(WEIGHTS_EXTENSION)
            .exists()
            .then_some(path)
    }

    pub fn has_previous_session(&self) -> bool {
        self.root.exists()
    }

    pub fn remove_previous_session(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("removing {}", self.root.display()))?;
            info!("Removed previous session at {}", self.root.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchShape, Precision, UTimeConfig};
    use burn::tensor::{Distribution, Tensor};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn config() -> UTimeConfig {
        UTimeConfig::new(4, BatchShape::new(2, 3, 40)).with_depth(2, vec![2, 2])
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let checkpoints = CheckpointDir::new(dir.path());

        let a = UTime::<TestBackend>::new(&config(), &device).unwrap();
        assert!(checkpoints.existing_checkpoint().is_none());
        save_weights(&a, &checkpoints.checkpoint()).unwrap();
        assert!(checkpoints.existing_checkpoint().is_some());

        let b = UTime::<TestBackend>::new(&config(), &device).unwrap();
        let b = load_weights(b, &checkpoints.checkpoint(), &device).unwrap();

        let x = Tensor::<TestBackend, 3>::random([2, 3, 40], Distribution::Default, &device);
        let ya: Vec<f32> = a.forward(x.clone()).unwrap().into_data().to_vec().unwrap();
        let yb: Vec<f32> = b.forward(x).unwrap().into_data().to_vec().unwrap();
        assert_eq!(ya, yb);

        checkpoints.remove_previous_session().unwrap();
        assert!(!checkpoints.has_previous_session());
    }

    #[test]
    fn test_file_round_trip_keeps_double_precision() {
        type DoubleBackend = NdArray<f64>;
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let path = dir.path().join("weights");
        let config = config().with_precision(Precision::Float64);

        let a = UTime::<DoubleBackend>::new(&config, &device).unwrap();
        save_weights(&a, &path).unwrap();
        let b = UTime::<DoubleBackend>::new(&config, &device).unwrap();
        let b = load_weights(b, &path, &device).unwrap();

        let x = Tensor::<DoubleBackend, 3>::random([2, 3, 40], Distribution::Default, &device);
        let ya: Vec<f64> = a.forward(x.clone()).unwrap().into_data().to_vec().unwrap();
        let yb: Vec<f64> = b.forward(x).unwrap().into_data().to_vec().unwrap();
        assert_eq!(ya, yb);
    }

    #[test]
    fn test_final_weights_name() {
        let checkpoints = CheckpointDir::new(Path::new("/tmp/project"));
        assert_eq!(
            checkpoints.final_weights("model_weights.mpk"),
            PathBuf::from("/tmp/project/model/model_weights")
        );
        assert_eq!(
            checkpoints.final_weights("final"),
            PathBuf::from("/tmp/project/model/final")
        );
    }
}
