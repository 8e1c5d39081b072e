//! Exported layer configurations.
//!
//! [`LayerConfig`] holds a layer's construction hyperparameters (never its
//! weights) in the Keras `{"class_name": ..., "config": {...}}` layout.
//! Rebuilding a layer from an exported config, building it on the same
//! shapes and loading the same weights reproduces its outputs.
//!
//! ```
//! use ctr_layers::config::LayerConfig;
//! use ctr_layers::dcn::CrossNetConfig;
//!
//! let config = LayerConfig::CrossNet(CrossNetConfig::new(2).with_seed(7));
//! let json = config.to_json().unwrap();
//! assert!(json.contains("\"class_name\":\"CrossNet\""));
//! assert_eq!(LayerConfig::from_json(&json).unwrap(), config);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::error::Category;

use crate::afm::{AFMConfig, AFMLayer};
use crate::dcn::{CrossNet, CrossNetConfig};
use crate::din::{LocalActivationUnit, LocalActivationUnitConfig};
use crate::error::{LayerError, LayerResult};
use crate::fm::{BiInteractionPooling, FM};
use crate::layer::Layer;
use crate::mlp::{MLPConfig, MLP};
use crate::prediction::{PredictionConfig, PredictionLayer};
use crate::product::{
    InnerProductConfig, InnerProductLayer, OutterProductConfig, OutterProductLayer,
};

/// Construction configuration of any layer in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name", content = "config")]
pub enum LayerConfig {
    /// [`FM`] has no hyperparameters
    FM,
    /// [`BiInteractionPooling`] has no hyperparameters
    BiInteractionPooling,
    /// [`InnerProductLayer`]
    InnerProductLayer(InnerProductConfig),
    /// [`OutterProductLayer`]
    OutterProductLayer(OutterProductConfig),
    /// [`CrossNet`]
    CrossNet(CrossNetConfig),
    /// [`MLP`]
    MLP(MLPConfig),
    /// [`AFMLayer`]
    AFMLayer(AFMConfig),
    /// [`LocalActivationUnit`]
    LocalActivationUnit(LocalActivationUnitConfig),
    /// [`PredictionLayer`]
    PredictionLayer(PredictionConfig),
}

impl LayerConfig {
    /// Returns the class name written to the `class_name` field.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::FM => "FM",
            Self::BiInteractionPooling => "BiInteractionPooling",
            Self::InnerProductLayer(_) => "InnerProductLayer",
            Self::OutterProductLayer(_) => "OutterProductLayer",
            Self::CrossNet(_) => "CrossNet",
            Self::MLP(_) => "MLP",
            Self::AFMLayer(_) => "AFMLayer",
            Self::LocalActivationUnit(_) => "LocalActivationUnit",
            Self::PredictionLayer(_) => "PredictionLayer",
        }
    }

    /// Validates the hyperparameters.
    pub fn validate(&self) -> LayerResult<()> {
        match self {
            Self::CrossNet(config) => config.validate(),
            Self::MLP(config) => config.validate(),
            Self::AFMLayer(config) => config.validate(),
            Self::LocalActivationUnit(config) => config.validate(),
            Self::FM
            | Self::BiInteractionPooling
            | Self::InnerProductLayer(_)
            | Self::OutterProductLayer(_)
            | Self::PredictionLayer(_) => Ok(()),
        }
    }

    /// Encodes the configuration as JSON.
    pub fn to_json(&self) -> LayerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes and validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Serialization`] for malformed JSON and
    /// [`LayerError::ConfigError`] for well-formed JSON that does not describe
    /// a valid layer: unknown class names, activation names or kernel types,
    /// missing fields and out-of-range values.
    pub fn from_json(json: &str) -> LayerResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|err| match err.classify() {
            Category::Data => LayerError::config(format!("invalid layer config: {}", err)),
            Category::Io | Category::Syntax | Category::Eof => LayerError::Serialization(err),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reconstructs an unbuilt layer.
    pub fn into_layer(self) -> LayerResult<Box<dyn Layer>> {
        Ok(match self {
            Self::FM => Box::new(FM::new()),
            Self::BiInteractionPooling => Box::new(BiInteractionPooling::new()),
            Self::InnerProductLayer(config) => Box::new(InnerProductLayer::from_config(config)),
            Self::OutterProductLayer(config) => Box::new(OutterProductLayer::from_config(config)),
            Self::CrossNet(config) => Box::new(CrossNet::from_config(config)?),
            Self::MLP(config) => Box::new(MLP::from_config(config)?),
            Self::AFMLayer(config) => Box::new(AFMLayer::from_config(config)?),
            Self::LocalActivationUnit(config) => {
                Box::new(LocalActivationUnit::from_config(config)?)
            }
            Self::PredictionLayer(config) => Box::new(PredictionLayer::from_config(config)),
        })
    }
}

/// Rejects negative or NaN regularization strengths.
pub(crate) fn check_non_negative(field: &str, value: f32) -> LayerResult<()> {
    if value < 0.0 || value.is_nan() {
        return Err(LayerError::config(format!(
            "{} must be non-negative, got {}",
            field, value
        )));
    }
    Ok(())
}

/// Keep probabilities must lie in `(0, 1]`.
pub(crate) fn check_keep_prob(keep_prob: f32) -> LayerResult<()> {
    if !(keep_prob > 0.0 && keep_prob <= 1.0) {
        return Err(LayerError::config(format!(
            "keep_prob must be in (0, 1], got {}",
            keep_prob
        )));
    }
    Ok(())
}
