//! Hyperparameters
//!
//! Loaded once from TOML and never rewritten in place. Overrides build a new
//! value; the effective set is written next to the run for reproducibility.

use crate::data::SyntheticConfig;
use crate::model::{TrainingConfig, UTimeConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name of the hyperparameters a run actually used.
pub const EFFECTIVE_HPARAMS_FILE: &str = "hparams.effective.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HParams {
    /// Network construction.
    pub build: UTimeConfig,
    /// Fitting.
    #[serde(default)]
    pub fit: TrainingConfig,
    /// Synthetic data source used by the training binary.
    #[serde(default)]
    pub data: SyntheticConfig,
}

impl Default for HParams {
    fn default() -> Self {
        Self {
            build: UTimeConfig::default(),
            fit: TrainingConfig::default(),
            data: SyntheticConfig::default(),
        }
    }
}

impl HParams {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let hparams: Self = toml::from_str(text).context("parsing hyperparameters")?;
        hparams.validate()?;
        Ok(hparams)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading hyperparameters from {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing hyperparameters")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("writing hyperparameters to {}", path.display()))
    }

    /// Writes `hparams.effective.toml` into `project_dir`.
    pub fn save_effective(&self, project_dir: &Path) -> Result<()> {
        self.save(&project_dir.join(EFFECTIVE_HPARAMS_FILE))
    }

    #[must_use]
    pub fn with_n_epochs(&self, n_epochs: usize) -> Self {
        Self {
            fit: self.fit.clone().with_n_epochs(n_epochs),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.build.validate()?;
        self.fit.validate()
    }
}
