//! Tracing subscriber setup for the binaries.
//!
//! `RUST_LOG` takes precedence over the level passed in.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Logs to stderr.
pub fn setup_logging(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("installing tracing subscriber")
}

/// Log file for a run: `<dir>/<prefix>training.log`.
pub fn log_file_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{prefix}training.log"))
}

/// Logs to stderr and to `path`, truncating any previous file.
pub fn setup_logging_with_file(level: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("installing tracing subscriber")
}
