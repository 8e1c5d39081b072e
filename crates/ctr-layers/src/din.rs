//! Local activation unit of the Deep Interest Network.
//!
//! Scores every user-behavior key against a candidate query:
//!
//! 1. Repeat the `(batch, 1, d)` query along the `T` key positions
//! 2. Concatenate `[query, keys, query - keys, query * keys]` on the last axis
//! 3. Batch-normalize the `4d` features
//! 4. Pass them through an [`MLP`] and a linear projection to one score
//!
//! The output `(batch, T, 1)` holds one relevance score per key; pooling the
//! keys with those scores is left to the caller.
//!
//! # Example
//!
//! ```
//! use ctr_layers::din::LocalActivationUnitConfig;
//! use ctr_layers::layer::Layer;
//! use ctr_layers::tensor::Tensor;
//!
//! let mut unit = LocalActivationUnitConfig::new(vec![16, 8]).build().unwrap();
//! let query = Tensor::ones(&[4, 1, 8]);
//! let keys = Tensor::ones(&[4, 10, 8]);
//! let scores = unit.apply(&[query, keys]).unwrap();
//! assert_eq!(scores.shape(), &[4, 10, 1]);
//! ```
//!
//! # References
//!
//! - [Deep Interest Network for Click-Through Rate Prediction](https://arxiv.org/abs/1706.06978)

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::{Activation, ActivationKind};
use crate::config::LayerConfig;
use crate::dense::Dense;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{expect_rank, Layer};
use crate::mlp::{MLPConfig, MLP};
use crate::normalization::BatchNorm;
use crate::shape::Shape;
use crate::tensor::Tensor;

const LOCAL_ACTIVATION_UNIT: &str = "LocalActivationUnit";

/// Configuration for [`LocalActivationUnit`]; every field is passed through
/// to the inner MLP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalActivationUnitConfig {
    /// Hidden sizes of the attention MLP
    pub hidden_size: Vec<usize>,
    /// Activation of the attention MLP
    pub activation: Activation,
    /// L2 strength on the MLP kernels
    pub l2_reg: f32,
    /// Dropout keep probability inside the MLP
    pub keep_prob: f32,
    /// Batch-normalize inside the MLP
    pub use_bn: bool,
    /// Seed for the MLP and the scoring projection
    pub seed: u64,
}

impl Default for LocalActivationUnitConfig {
    fn default() -> Self {
        Self {
            hidden_size: vec![64, 16],
            activation: ActivationKind::Sigmoid.into(),
            l2_reg: 0.0,
            keep_prob: 1.0,
            use_bn: false,
            seed: 1024,
        }
    }
}

impl LocalActivationUnitConfig {
    /// Creates a configuration with the given attention hidden sizes.
    pub fn new(hidden_size: Vec<usize>) -> Self {
        Self {
            hidden_size,
            ..Self::default()
        }
    }

    /// Sets the MLP activation.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Sets the MLP kernel L2 strength.
    pub fn with_l2_reg(mut self, l2_reg: f32) -> Self {
        self.l2_reg = l2_reg;
        self
    }

    /// Sets the MLP dropout keep probability.
    pub fn with_keep_prob(mut self, keep_prob: f32) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    /// Enables batch normalization inside the MLP.
    pub fn with_bn(mut self, use_bn: bool) -> Self {
        self.use_bn = use_bn;
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The configuration of the inner MLP.
    pub fn mlp_config(&self) -> MLPConfig {
        MLPConfig {
            hidden_size: self.hidden_size.clone(),
            activation: self.activation.clone(),
            l2_reg: self.l2_reg,
            keep_prob: self.keep_prob,
            use_bn: self.use_bn,
            seed: self.seed,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        self.mlp_config().validate()
    }

    /// Builds an unbuilt unit after validating the configuration.
    pub fn build(self) -> LayerResult<LocalActivationUnit> {
        LocalActivationUnit::from_config(self)
    }
}

#[derive(Debug, Clone)]
struct Scorer {
    batch_norm: BatchNorm,
    dense: Dense,
    embedding_dim: usize,
}

/// DIN local activation unit.
///
/// Input: `[query (batch, 1, d), keys (batch, T, d)]`. Output: `(batch, T, 1)`.
#[derive(Debug, Clone)]
pub struct LocalActivationUnit {
    config: LocalActivationUnitConfig,
    mlp: MLP,
    scorer: Option<Scorer>,
}

/// Checks `[query, keys]` shapes and returns the embedding dimension.
fn validate_shapes(shapes: &[Shape]) -> LayerResult<usize> {
    let [query, keys] = shapes else {
        return Err(LayerError::shape(
            LOCAL_ACTIVATION_UNIT,
            format!("expected a list of 2 inputs, got {}", shapes.len()),
        ));
    };
    expect_rank(LOCAL_ACTIVATION_UNIT, query, 3)?;
    expect_rank(LOCAL_ACTIVATION_UNIT, keys, 3)?;
    if query.dim(1).is_some_and(|fields| fields != 1) {
        return Err(LayerError::shape(
            LOCAL_ACTIVATION_UNIT,
            format!("query must have shape (None, 1, embedding_dim), got {}", query),
        ));
    }
    match (query.last(), keys.last()) {
        (Some(q), Some(k)) if q == k => Ok(q),
        _ => Err(LayerError::shape(
            LOCAL_ACTIVATION_UNIT,
            format!(
                "query and keys must share a known embedding dim, got {} and {}",
                query, keys
            ),
        )),
    }
}

impl LocalActivationUnit {
    /// Creates an unbuilt unit from its configuration.
    pub fn from_config(config: LocalActivationUnitConfig) -> LayerResult<Self> {
        Ok(Self {
            mlp: MLP::from_config(config.mlp_config())?,
            config,
            scorer: None,
        })
    }

    fn scorer(&self) -> LayerResult<&Scorer> {
        self.scorer.as_ref().ok_or(LayerError::NotBuilt {
            layer: LOCAL_ACTIVATION_UNIT,
        })
    }

    /// Builds the `(batch, T, 4d)` attention input.
    fn attention_input(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let scorer = self.scorer()?;
        let shapes: Vec<Shape> = inputs.iter().map(|t| Shape::of(t.shape())).collect();
        let dim = validate_shapes(&shapes)?;
        if dim != scorer.embedding_dim {
            return Err(LayerError::shape(
                LOCAL_ACTIVATION_UNIT,
                format!(
                    "unit was built for embedding dim {}, got {}",
                    scorer.embedding_dim, dim
                ),
            ));
        }
        let (query, keys) = (&inputs[0], &inputs[1]);
        let queries = query.repeat(1, keys.shape()[1])?;
        Tensor::concat(
            &[
                queries.clone(),
                keys.clone(),
                queries.sub(keys)?,
                queries.mul(keys)?,
            ],
            2,
        )
    }
}

impl Layer for LocalActivationUnit {
    fn name(&self) -> &'static str {
        LOCAL_ACTIVATION_UNIT
    }

    fn is_built(&self) -> bool {
        self.scorer.is_some()
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let embedding_dim = validate_shapes(input_shapes)?;
        let features = 4 * embedding_dim;
        let keys = &input_shapes[1];
        self.mlp
            .build(&[Shape::new(vec![None, keys.dim(1), Some(features)])])?;
        let dense = Dense::new(
            self.mlp.output_dim(features),
            1,
            Initializer::GlorotUniform {
                seed: self.config.seed,
            },
        );
        self.scorer = Some(Scorer {
            batch_norm: BatchNorm::new(features),
            dense,
            embedding_dim,
        });
        debug!(
            layer = LOCAL_ACTIVATION_UNIT,
            query = %input_shapes[0],
            keys = %keys,
            hidden_size = ?self.config.hidden_size,
            "built"
        );
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let att_input = self.attention_input(inputs)?;
        let scorer = self.scorer()?;
        let normalized = scorer.batch_norm.forward(&att_input)?;
        let hidden = self.mlp.forward(&normalized)?;
        scorer.dense.forward(&hidden)
    }

    fn call_train(&mut self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let att_input = self.attention_input(inputs)?;
        let scorer = self.scorer.as_mut().ok_or(LayerError::NotBuilt {
            layer: LOCAL_ACTIVATION_UNIT,
        })?;
        let normalized = scorer.batch_norm.forward_train(&att_input)?;
        let hidden = self.mlp.forward_train(&normalized)?;
        scorer.dense.forward(&hidden)
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        validate_shapes(input_shapes)?;
        let keys = &input_shapes[1];
        Ok(Shape::new(vec![keys.dim(0), keys.dim(1), Some(1)]))
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::LocalActivationUnit(self.config.clone())
    }

    /// Input batch norm, then the MLP weights, then the scoring kernel and
    /// bias.
    fn weights(&self) -> Vec<&Tensor> {
        let Some(scorer) = &self.scorer else {
            return Vec::new();
        };
        let mut weights = scorer.batch_norm.weights();
        weights.extend(self.mlp.weights());
        weights.extend(scorer.dense.weights());
        weights
    }

    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        let Some(scorer) = &mut self.scorer else {
            return Vec::new();
        };
        let mut weights = scorer.batch_norm.weights_mut();
        weights.extend(self.mlp.weights_mut());
        weights.extend(scorer.dense.weights_mut());
        weights
    }

    fn regularization_loss(&self) -> f32 {
        self.mlp.regularization_loss()
    }
}
