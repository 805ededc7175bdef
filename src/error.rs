//! Error types shared by every component of the network.

use thiserror::Error;

/// Errors raised while building or running a U-Time network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UTimeError {
    /// The component cannot be built from the given configuration.
    #[error("{component}: invalid configuration: {message}")]
    Configuration {
        component: &'static str,
        message: String,
    },

    /// A tensor handed to `forward` violates the component's shape contract.
    #[error("{component}: {dimension} mismatch, expected {expected}, got {actual}")]
    ShapeMismatch {
        component: &'static str,
        dimension: String,
        expected: String,
        actual: String,
    },
}

impl UTimeError {
    pub fn config(component: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            component,
            message: message.into(),
        }
    }

    pub fn shape(
        component: &'static str,
        dimension: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            component,
            dimension: dimension.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, UTimeError>;

/// Fails with a `ShapeMismatch` when `actual != expected`.
pub(crate) fn ensure_dim(
    component: &'static str,
    dimension: &str,
    expected: usize,
    actual: usize,
) -> Result<()> {
    if expected != actual {
        return Err(UTimeError::shape(component, dimension, expected, actual));
    }
    Ok(())
}
