//! Multi-layer perceptron (MLP) block.
//!
//! The input is dropped out first, then each hidden layer applies
//! dense projection, optional batch normalization, activation and dropout.
//! Works on any input of rank >= 2; only the last axis is transformed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::{Activation, ActivationFn};
use crate::config::{check_keep_prob, check_non_negative, LayerConfig};
use crate::dense::Dense;
use crate::dropout::Dropout;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{ensure_built, single_input, Layer};
use crate::normalization::BatchNorm;
use crate::regularizer::Regularizer;
use crate::shape::Shape;
use crate::tensor::Tensor;

const MLP_NAME: &str = "MLP";

/// Configuration for building an MLP.
///
/// # Example
///
/// ```
/// use ctr_layers::activation::Activation;
/// use ctr_layers::mlp::MLPConfig;
///
/// let config = MLPConfig::new(vec![64, 32])
///     .with_activation(Activation::from_name("tanh").unwrap())
///     .with_keep_prob(0.9)
///     .with_bn(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Units of each hidden layer, in order
    pub hidden_size: Vec<usize>,
    /// Activation applied after every hidden layer
    pub activation: Activation,
    /// L2 strength on the dense kernels
    pub l2_reg: f32,
    /// Dropout keep probability
    pub keep_prob: f32,
    /// Batch-normalize before the activation
    pub use_bn: bool,
    /// Base seed; dense layer `i` is initialized from `seed + i`
    pub seed: u64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_size: Vec::new(),
            activation: Activation::default(),
            l2_reg: 0.0,
            keep_prob: 1.0,
            use_bn: false,
            seed: 1024,
        }
    }
}

impl MLPConfig {
    /// Creates a configuration with the given hidden sizes.
    pub fn new(hidden_size: Vec<usize>) -> Self {
        Self {
            hidden_size,
            ..Self::default()
        }
    }

    /// Sets the activation.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Sets the kernel L2 strength.
    pub fn with_l2_reg(mut self, l2_reg: f32) -> Self {
        self.l2_reg = l2_reg;
        self
    }

    /// Sets the dropout keep probability.
    pub fn with_keep_prob(mut self, keep_prob: f32) -> Self {
        self.keep_prob = keep_prob;
        self
    }

    /// Enables batch normalization before each activation.
    pub fn with_bn(mut self, use_bn: bool) -> Self {
        self.use_bn = use_bn;
        self
    }

    /// Sets the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        if let Some(i) = self.hidden_size.iter().position(|&units| units == 0) {
            return Err(LayerError::config(format!(
                "hidden layer {} has zero units",
                i
            )));
        }
        check_non_negative("l2_reg", self.l2_reg)?;
        check_keep_prob(self.keep_prob)
    }

    /// Builds an unbuilt MLP after validating the configuration.
    pub fn build(self) -> LayerResult<MLP> {
        MLP::from_config(self)
    }
}

/// One hidden layer: projection, optional batch norm, dropout.
#[derive(Debug, Clone)]
struct HiddenLayer {
    dense: Dense,
    batch_norm: Option<BatchNorm>,
    dropout: Dropout,
}

/// A multi-layer perceptron.
///
/// # Example
///
/// ```
/// use ctr_layers::layer::Layer;
/// use ctr_layers::mlp::MLPConfig;
/// use ctr_layers::tensor::Tensor;
///
/// let mut mlp = MLPConfig::new(vec![16, 8]).build().unwrap();
/// let output = mlp.apply(&[Tensor::ones(&[4, 32])]).unwrap();
/// assert_eq!(output.shape(), &[4, 8]);
/// ```
#[derive(Debug, Clone)]
pub struct MLP {
    config: MLPConfig,
    activation: ActivationFn,
    input_dropout: Dropout,
    layers: Vec<HiddenLayer>,
    input_dim: Option<usize>,
}

impl MLP {
    /// Creates an unbuilt MLP from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: MLPConfig) -> LayerResult<Self> {
        config.validate()?;
        Ok(Self {
            activation: config.activation.resolve(),
            input_dropout: Dropout::from_keep_prob(config.keep_prob, config.seed),
            config,
            layers: Vec::new(),
            input_dim: None,
        })
    }

    /// Returns the last-axis size of the output for an input of `input_dim`.
    pub fn output_dim(&self, input_dim: usize) -> usize {
        self.config.hidden_size.last().copied().unwrap_or(input_dim)
    }

    fn check_input(&self, input: &Tensor) -> LayerResult<()> {
        let expected = self.input_dim.unwrap_or_default();
        if input.ndim() < 2 || input.shape().last() != Some(&expected) {
            return Err(LayerError::shape(
                MLP_NAME,
                format!(
                    "expected rank >= 2 input with {} features, got {}",
                    expected,
                    Shape::of(input.shape())
                ),
            ));
        }
        Ok(())
    }

    /// Inference pass on a single tensor.
    pub fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        ensure_built(MLP_NAME, self.is_built())?;
        self.check_input(input)?;
        let mut x = self.input_dropout.forward(input);
        for layer in &self.layers {
            x = layer.dense.forward(&x)?;
            if let Some(bn) = &layer.batch_norm {
                x = bn.forward(&x)?;
            }
            x = self.activation.apply(&x);
            x = layer.dropout.forward(&x);
        }
        Ok(x)
    }

    /// Training pass on a single tensor.
    pub fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        ensure_built(MLP_NAME, self.is_built())?;
        self.check_input(input)?;
        let mut x = self.input_dropout.forward_train(input);
        for layer in &mut self.layers {
            x = layer.dense.forward(&x)?;
            if let Some(bn) = &mut layer.batch_norm {
                x = bn.forward_train(&x)?;
            }
            x = self.activation.apply(&x);
            x = layer.dropout.forward_train(&x);
        }
        Ok(x)
    }
}

fn expect_min_rank(shape: &Shape) -> LayerResult<()> {
    if shape.ndim() < 2 {
        return Err(LayerError::shape(
            MLP_NAME,
            format!("expected an input of rank >= 2, got {}", shape),
        ));
    }
    Ok(())
}

impl Layer for MLP {
    fn name(&self) -> &'static str {
        MLP_NAME
    }

    fn is_built(&self) -> bool {
        self.input_dim.is_some()
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let shape = single_input(MLP_NAME, input_shapes)?;
        expect_min_rank(shape)?;
        let input_dim = shape.last().ok_or_else(|| {
            LayerError::shape(MLP_NAME, format!("feature axis must be known, got {}", shape))
        })?;

        let config = &self.config;
        let regularizer = Regularizer::l2(config.l2_reg);
        let mut layers = Vec::with_capacity(config.hidden_size.len());
        let mut prev_dim = input_dim;
        for (i, &units) in config.hidden_size.iter().enumerate() {
            let seed = config.seed.wrapping_add(i as u64);
            layers.push(HiddenLayer {
                dense: Dense::new(prev_dim, units, Initializer::GlorotNormal { seed })
                    .with_regularizer(regularizer),
                batch_norm: config.use_bn.then(|| BatchNorm::new(units)),
                dropout: Dropout::from_keep_prob(config.keep_prob, seed.wrapping_add(1)),
            });
            prev_dim = units;
        }
        debug!(
            layer = MLP_NAME,
            input_shape = %shape,
            hidden_size = ?config.hidden_size,
            use_bn = config.use_bn,
            "built"
        );
        self.layers = layers;
        self.input_dim = Some(input_dim);
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        self.forward(single_input(MLP_NAME, inputs)?)
    }

    fn call_train(&mut self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        self.forward_train(single_input(MLP_NAME, inputs)?)
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        let shape = single_input(MLP_NAME, input_shapes)?;
        expect_min_rank(shape)?;
        Ok(match self.config.hidden_size.last() {
            Some(&units) => shape.with_last(units),
            None => shape.clone(),
        })
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::MLP(self.config.clone())
    }

    /// Per hidden layer: kernel, bias, then gamma, beta, moving mean and
    /// moving variance when batch normalization is enabled.
    fn weights(&self) -> Vec<&Tensor> {
        let mut weights = Vec::new();
        for layer in &self.layers {
            weights.extend(layer.dense.weights());
            if let Some(bn) = &layer.batch_norm {
                weights.extend(bn.weights());
            }
        }
        weights
    }

    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        let mut weights = Vec::new();
        for layer in &mut self.layers {
            weights.extend(layer.dense.weights_mut());
            if let Some(bn) = &mut layer.batch_norm {
                weights.extend(bn.weights_mut());
            }
        }
        weights
    }

    fn regularization_loss(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| l.dense.regularization_loss())
            .sum()
    }
}
