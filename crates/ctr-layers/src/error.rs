//! Error types for the ctr-layers crate.
//!
//! Layers fail fast: shape violations are reported at build time whenever the
//! shape is statically known, and again at call time for dynamic shapes.

use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// An input violates a layer's rank, count or per-axis size precondition.
    #[error("{layer}: {message}")]
    InvalidShape {
        /// Name of the layer that rejected the input
        layer: &'static str,
        /// Which precondition failed, including the offending shape
        message: String,
    },

    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Layer was called before its weights were allocated.
    #[error("{layer} is not built: call build() with the input shapes first")]
    NotBuilt {
        /// Name of the unbuilt layer
        layer: &'static str,
    },

    /// Layer configuration could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LayerError {
    pub(crate) fn shape(layer: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidShape {
            layer,
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Returns true for rank, count and per-axis size violations.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::InvalidShape { .. } | Self::ShapeMismatch { .. })
    }
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LayerError::shape("FM", "expected rank 3, got (None, 4)");
        assert_eq!(err.to_string(), "FM: expected rank 3, got (None, 4)");
        assert!(err.is_shape_error());

        let err = LayerError::ShapeMismatch {
            expected: vec![4, 1],
            actual: vec![4, 2],
        };
        assert!(err.to_string().contains("Shape mismatch"));

        let err = LayerError::config("kernel_type must be mat, vec or num");
        assert!(err.to_string().contains("Configuration error"));
        assert!(!err.is_shape_error());

        let err = LayerError::NotBuilt { layer: "CrossNet" };
        assert!(err.to_string().contains("not built"));
    }
}
