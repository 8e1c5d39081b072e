//! Output layer turning accumulated logits into predictions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activation::{Activation, ActivationFn, ActivationKind};
use crate::config::LayerConfig;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{ensure_built, single_input, Layer};
use crate::shape::Shape;
use crate::tensor::Tensor;

const PREDICTION_LAYER: &str = "PredictionLayer";

/// Configuration for [`PredictionLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Output activation
    pub activation: Activation,
    /// Add a learned global scalar bias before the activation
    pub use_bias: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            activation: ActivationKind::Sigmoid.into(),
            use_bias: true,
        }
    }
}

impl PredictionConfig {
    /// Creates the default configuration: sigmoid with a global bias.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output activation.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Sets whether a global bias is learned.
    pub fn with_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Builds an unbuilt layer.
    pub fn build(self) -> PredictionLayer {
        PredictionLayer::from_config(self)
    }
}

/// Adds an optional global bias, applies the activation and flattens the
/// result to `(-1, 1)`.
///
/// # Example
///
/// ```
/// use ctr_layers::layer::Layer;
/// use ctr_layers::prediction::PredictionConfig;
/// use ctr_layers::tensor::Tensor;
///
/// let mut layer = PredictionConfig::new().with_bias(false).build();
/// let out = layer.apply(&[Tensor::zeros(&[3, 1])]).unwrap();
/// assert_eq!(out.to_vec(), vec![0.5; 3]);
/// ```
#[derive(Debug, Clone)]
pub struct PredictionLayer {
    config: PredictionConfig,
    activation: ActivationFn,
    global_bias: Option<Tensor>,
    built: bool,
}

impl PredictionLayer {
    /// Creates a layer with the given activation and bias flag.
    pub fn new(activation: Activation, use_bias: bool) -> Self {
        Self::from_config(
            PredictionConfig::new()
                .with_activation(activation)
                .with_bias(use_bias),
        )
    }

    /// Creates an unbuilt layer from its configuration.
    pub fn from_config(config: PredictionConfig) -> Self {
        Self {
            activation: config.activation.resolve(),
            config,
            global_bias: None,
            built: false,
        }
    }
}

impl Layer for PredictionLayer {
    fn name(&self) -> &'static str {
        PREDICTION_LAYER
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let shape = single_input(PREDICTION_LAYER, input_shapes)?;
        if shape.ndim() == 0 {
            return Err(LayerError::shape(
                PREDICTION_LAYER,
                "expected an input with a batch axis, got a scalar",
            ));
        }
        self.global_bias = self
            .config
            .use_bias
            .then(|| Initializer::Zeros.initialize(&[1]));
        self.built = true;
        debug!(
            layer = PREDICTION_LAYER,
            input_shape = %shape,
            activation = self.config.activation.name(),
            use_bias = self.config.use_bias,
            "built"
        );
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        ensure_built(PREDICTION_LAYER, self.built)?;
        let input = single_input(PREDICTION_LAYER, inputs)?;
        let logits = match &self.global_bias {
            Some(bias) => input.add(bias)?,
            None => input.clone(),
        };
        let output = self.activation.apply(&logits);
        output.reshape(&[output.numel(), 1])
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        single_input(PREDICTION_LAYER, input_shapes)?;
        Ok(Shape::batched(&[1]))
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::PredictionLayer(self.config.clone())
    }

    fn weights(&self) -> Vec<&Tensor> {
        self.global_bias.iter().collect()
    }

    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        self.global_bias.iter_mut().collect()
    }
}
