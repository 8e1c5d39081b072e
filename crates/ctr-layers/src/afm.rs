//! Attentional Factorization Machine interaction layer.
//!
//! Every pair of `(batch, 1, d)` embeddings is turned into its element-wise
//! product. A one-layer attention network scores each product, the scores
//! are normalized with a softmax over the pair axis, and the products are
//! pooled with those weights. Dropout is applied to the pooled vector before
//! a final projection to one logit per row.
//!
//! # References
//!
//! - [Attentional Factorization Machines](https://arxiv.org/abs/1708.04617)

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::ActivationKind;
use crate::config::{check_keep_prob, check_non_negative, LayerConfig};
use crate::dense::Dense;
use crate::dropout::Dropout;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::pairs::{gather_pairs, num_pairs, validate_pair_inputs, validate_pair_shapes};
use crate::regularizer::Regularizer;
use crate::shape::Shape;
use crate::tensor::Tensor;

const AFM_LAYER: &str = "AFMLayer";

/// Configuration for [`AFMLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AFMConfig {
    /// Units of the attention network's hidden projection
    pub attention_factor: usize,
    /// L2 strength on the attention network's kernel
    pub l2_reg_w: f32,
    /// Keep probability of the dropout on the pooled vector
    pub keep_prob: f32,
    /// Seed for weight initialization and dropout
    pub seed: u64,
}

impl Default for AFMConfig {
    fn default() -> Self {
        Self {
            attention_factor: 4,
            l2_reg_w: 0.0,
            keep_prob: 1.0,
            seed: 1024,
        }
    }
}

impl AFMConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attention network width.
    pub fn with_attention_factor(mut self, attention_factor: usize) -> Self {
        self.attention_factor = attention_factor;
        self
    }

    /// Sets the attention kernel L2 strength.
    pub fn with_l2_reg_w(mut self, l2_reg_w: f32) -> Self {
        self.l2_reg_w = l2_reg_w;
        self
    }

    /// Sets the dropout keep probability.
    pub fn with_keep_prob(mut self, keep_prob: f32) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        if self.attention_factor == 0 {
            return Err(LayerError::config("attention_factor must be positive"));
        }
        check_non_negative("l2_reg_w", self.l2_reg_w)?;
        check_keep_prob(self.keep_prob)
    }

    /// Builds an unbuilt layer after validating the configuration.
    pub fn build(self) -> LayerResult<AFMLayer> {
        AFMLayer::from_config(self)
    }
}

#[derive(Debug, Clone)]
struct AttentionWeights {
    /// Hidden projection `(d, attention_factor)` with ReLU
    attention: Dense,
    /// Score projection `(attention_factor, 1)`
    projection_h: Tensor,
    /// Output projection `(d, 1)`
    projection_p: Tensor,
    embedding_dim: usize,
    pairs: usize,
}

/// Attentional FM layer.
///
/// Input: a list of `N >= 2` tensors shaped `(batch, 1, embedding_dim)`.
/// Output: `(batch, 1)`.
///
/// # Example
///
/// ```
/// use ctr_layers::afm::AFMConfig;
/// use ctr_layers::layer::Layer;
/// use ctr_layers::tensor::Tensor;
///
/// let mut afm = AFMConfig::new().with_attention_factor(8).build().unwrap();
/// let inputs = vec![Tensor::ones(&[2, 1, 4]); 3];
/// let output = afm.apply(&inputs).unwrap();
/// assert_eq!(output.shape(), &[2, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct AFMLayer {
    config: AFMConfig,
    dropout: Dropout,
    weights: Option<AttentionWeights>,
}

impl AFMLayer {
    /// Creates an unbuilt layer from its configuration.
    pub fn from_config(config: AFMConfig) -> LayerResult<Self> {
        config.validate()?;
        Ok(Self {
            dropout: Dropout::from_keep_prob(config.keep_prob, config.seed),
            config,
            weights: None,
        })
    }

    fn built_weights(&self) -> LayerResult<&AttentionWeights> {
        self.weights
            .as_ref()
            .ok_or(LayerError::NotBuilt { layer: AFM_LAYER })
    }

    /// Pools the pair products with their attention weights: `(batch, d)`.
    fn attention_pool(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let w = self.built_weights()?;
        validate_pair_inputs(AFM_LAYER, inputs, w.embedding_dim)?;
        if num_pairs(inputs.len()) != w.pairs {
            return Err(LayerError::shape(
                AFM_LAYER,
                format!(
                    "layer was built for {} pairs, got {} inputs",
                    w.pairs,
                    inputs.len()
                ),
            ));
        }

        let (p, q) = gather_pairs(inputs)?;
        // (batch, pairs, d)
        let bi_interaction = p.mul(&q)?;
        // (batch, pairs, attention_factor)
        let hidden = w.attention.forward(&bi_interaction)?;
        // (batch, pairs, 1)
        let scores = hidden.matmul(&w.projection_h)?.softmax(1)?;
        scores.mul(&bi_interaction)?.sum_axis(1, false)
    }

    fn project(&self, pooled: &Tensor) -> LayerResult<Tensor> {
        pooled.matmul(&self.built_weights()?.projection_p)
    }
}

impl Layer for AFMLayer {
    fn name(&self) -> &'static str {
        AFM_LAYER
    }

    fn is_built(&self) -> bool {
        self.weights.is_some()
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let embedding_dim = validate_pair_shapes(AFM_LAYER, input_shapes)?;
        let AFMConfig {
            attention_factor,
            l2_reg_w,
            seed,
            ..
        } = self.config;
        let projection = Initializer::GlorotNormal { seed };
        self.weights = Some(AttentionWeights {
            attention: Dense::new(
                embedding_dim,
                attention_factor,
                Initializer::GlorotUniform { seed },
            )
            .with_activation(ActivationKind::Relu.into())
            .with_regularizer(Regularizer::l2(l2_reg_w)),
            projection_h: projection.initialize(&[attention_factor, 1]),
            projection_p: projection.initialize(&[embedding_dim, 1]),
            embedding_dim,
            pairs: num_pairs(input_shapes.len()),
        });
        debug!(
            layer = AFM_LAYER,
            inputs = input_shapes.len(),
            embedding_dim,
            attention_factor,
            "built"
        );
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let pooled = self.attention_pool(inputs)?;
        self.project(&self.dropout.forward(&pooled))
    }

    fn call_train(&mut self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let pooled = self.attention_pool(inputs)?;
        let dropped = self.dropout.forward_train(&pooled);
        self.project(&dropped)
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        validate_pair_shapes(AFM_LAYER, input_shapes)?;
        Ok(Shape::new(vec![input_shapes[0].dim(0), Some(1)]))
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::AFMLayer(self.config.clone())
    }

    /// `projection_h`, `projection_p`, then the attention kernel and bias.
    fn weights(&self) -> Vec<&Tensor> {
        match &self.weights {
            Some(w) => {
                let mut weights = vec![&w.projection_h, &w.projection_p];
                weights.extend(w.attention.weights());
                weights
            }
            None => Vec::new(),
        }
    }

    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        match &mut self.weights {
            Some(w) => {
                let mut weights = vec![&mut w.projection_h, &mut w.projection_p];
                weights.extend(w.attention.weights_mut());
                weights
            }
            None => Vec::new(),
        }
    }

    fn regularization_loss(&self) -> f32 {
        self.weights
            .as_ref()
            .map_or(0.0, |w| w.attention.regularization_loss())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes(n: usize, dim: usize) -> Vec<Shape> {
        vec![Shape::batched(&[1, dim]); n]
    }

    #[test]
    fn test_weight_shapes() {
        let mut afm = AFMConfig::new().with_attention_factor(3).build().unwrap();
        afm.build(&shapes(4, 5)).unwrap();
        let w = afm.weights();
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].shape(), &[3, 1]);
        assert_eq!(w[1].shape(), &[5, 1]);
        assert_eq!(w[2].shape(), &[5, 3]);
        assert_eq!(w[3].shape(), &[3]);
    }

    #[test]
    fn test_uniform_scores_average_pairs() {
        let mut afm = AFMConfig::new().with_attention_factor(2).build().unwrap();
        afm.build(&shapes(3, 2)).unwrap();
        // zero score projection -> equal attention over the 3 pairs
        afm.set_weights(&[
            Tensor::zeros(&[2, 1]),
            Tensor::ones(&[2, 1]),
            Tensor::ones(&[2, 2]),
            Tensor::zeros(&[2]),
        ])
        .unwrap();
        let inputs = vec![
            Tensor::from_data(&[1, 1, 2], vec![1.0, 2.0]).unwrap(),
            Tensor::from_data(&[1, 1, 2], vec![3.0, -1.0]).unwrap(),
            Tensor::from_data(&[1, 1, 2], vec![0.5, 4.0]).unwrap(),
        ];
        // pair products sum to (5, 2); mean (5/3, 2/3); projection sums them
        let out = afm.call(&inputs).unwrap();
        assert_eq!(out.shape(), &[1, 1]);
        assert!((out.to_vec()[0] - 7.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_single_input_is_shape_error() {
        let mut afm = AFMConfig::new().build().unwrap();
        let err = afm.build(&shapes(1, 4)).unwrap_err();
        assert!(err.is_shape_error());
        assert!(afm
            .compute_output_shape(&shapes(1, 4))
            .unwrap_err()
            .is_shape_error());
    }

    #[test]
    fn test_training_dropout_changes_output_only_in_training() {
        let mut afm = AFMConfig::new().with_keep_prob(0.5).with_seed(3).build().unwrap();
        let inputs = vec![Tensor::ones(&[4, 1, 6]); 3];
        let inference = afm.apply(&inputs).unwrap();
        assert_eq!(afm.call(&inputs).unwrap(), inference);

        let mut replay = afm.clone();
        let train = afm.call_train(&inputs).unwrap();
        assert_eq!(replay.call_train(&inputs).unwrap(), train);
    }

    #[test]
    fn test_validation() {
        assert!(AFMConfig::new().with_attention_factor(0).build().is_err());
        assert!(AFMConfig::new().with_keep_prob(0.0).build().is_err());
        assert!(AFMConfig::new().with_l2_reg_w(-0.5).build().is_err());
    }

    #[test]
    fn test_regularization_covers_attention_kernel() {
        let mut afm = AFMConfig::new().with_l2_reg_w(0.5).build().unwrap();
        afm.build(&shapes(2, 3)).unwrap();
        let kernel = afm.weights()[2].clone();
        assert!((afm.regularization_loss() - 0.5 * kernel.square().sum()).abs() < 1e-6);
    }
}
