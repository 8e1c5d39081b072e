//! Feature-interaction layers for click-through-rate prediction.
//!
//! This crate provides the building blocks of classic CTR architectures:
//!
//! - **FM / BiInteractionPooling**: pairwise interactions via the
//!   square-of-sum identity, in O(fields)
//! - **InnerProductLayer / OutterProductLayer**: explicit per-pair products
//!   from Product-based Neural Networks
//! - **CrossNet**: the cross network of Deep & Cross Network
//! - **MLP**: dense blocks with optional batch normalization and dropout
//! - **AFMLayer**: attention-weighted pairwise pooling
//! - **LocalActivationUnit**: the DIN relevance scorer
//! - **PredictionLayer**: global bias, output activation and reshape
//!
//! # Quick Start
//!
//! ```
//! use ctr_layers::prelude::*;
//!
//! // three fields of 4-dimensional embeddings, all ones
//! let embeddings = Tensor::ones(&[2, 3, 4]);
//!
//! let mut fm = FM::new();
//! let logits = fm.apply(&[embeddings]).unwrap();
//! assert_eq!(logits.to_vec(), vec![12.0, 12.0]);
//!
//! let mut output = PredictionLayer::new(ActivationKind::Sigmoid.into(), true);
//! let probs = output.apply(&[logits]).unwrap();
//! assert_eq!(probs.shape(), &[2, 1]);
//! ```
//!
//! # Layer Trait
//!
//! All layers implement [`Layer`]: `build` validates input shapes and
//! allocates weights, `call` runs inference, `call_train` runs the training
//! forward pass (seeded dropout, batch statistics), `compute_output_shape`
//! infers shapes without computing, and `get_config` exports a
//! [`LayerConfig`] that can rebuild the layer:
//!
//! ```
//! use ctr_layers::prelude::*;
//!
//! let mut cross = CrossNet::new(2, 0.0, 1024).unwrap();
//! let x = Tensor::ones(&[4, 8]);
//! let y = cross.apply(&[x.clone()]).unwrap();
//!
//! let json = cross.get_config().to_json().unwrap();
//! let mut rebuilt = LayerConfig::from_json(&json).unwrap().into_layer().unwrap();
//! rebuilt.build(&[Shape::batched(&[8])]).unwrap();
//! rebuilt.set_weights(&cross.get_weights()).unwrap();
//! assert_eq!(rebuilt.call(&[x]).unwrap(), y);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod afm;
pub mod config;
pub mod dcn;
pub mod dense;
pub mod din;
pub mod dropout;
pub mod error;
pub mod fm;
pub mod initializer;
pub mod layer;
pub mod mlp;
pub mod normalization;
pub mod pairs;
pub mod prediction;
pub mod product;
pub mod regularizer;
pub mod shape;
pub mod tensor;

// Re-export main types at crate level
pub use activation::{Activation, ActivationFn, ActivationKind};
pub use afm::{AFMConfig, AFMLayer};
pub use config::LayerConfig;
pub use dcn::{CrossNet, CrossNetConfig};
pub use dense::Dense;
pub use din::{LocalActivationUnit, LocalActivationUnitConfig};
pub use dropout::Dropout;
pub use error::{LayerError, LayerResult};
pub use fm::{BiInteractionPooling, FM};
pub use initializer::Initializer;
pub use layer::Layer;
pub use mlp::{MLPConfig, MLP};
pub use normalization::BatchNorm;
pub use prediction::{PredictionConfig, PredictionLayer};
pub use product::{
    InnerProductConfig, InnerProductLayer, KernelType, OutterProductConfig, OutterProductLayer,
};
pub use regularizer::Regularizer;
pub use shape::Shape;
pub use tensor::Tensor;

/// Prelude module for convenient imports.
///
/// ```
/// use ctr_layers::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activation::{Activation, ActivationKind};
    pub use crate::afm::{AFMConfig, AFMLayer};
    pub use crate::config::LayerConfig;
    pub use crate::dcn::{CrossNet, CrossNetConfig};
    pub use crate::din::{LocalActivationUnit, LocalActivationUnitConfig};
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::fm::{BiInteractionPooling, FM};
    pub use crate::layer::Layer;
    pub use crate::mlp::{MLPConfig, MLP};
    pub use crate::prediction::{PredictionConfig, PredictionLayer};
    pub use crate::product::{
        InnerProductConfig, InnerProductLayer, KernelType, OutterProductConfig, OutterProductLayer,
    };
    pub use crate::shape::Shape;
    pub use crate::tensor::Tensor;
}
