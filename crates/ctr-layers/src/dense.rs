//! Dense (fully connected) projection.
//!
//! [`Dense`] computes `y = act(xW + b)` over the last axis of its input, so a
//! `[batch, fields, in]` tensor maps to `[batch, fields, out]`. It is the
//! building block of the MLP, the AFM attention network and the
//! LocalActivationUnit scorer.

use crate::activation::{Activation, ActivationFn};
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::regularizer::Regularizer;
use crate::tensor::Tensor;

const DENSE: &str = "Dense";

/// A dense (fully connected) projection.
///
/// # Example
///
/// ```
/// use ctr_layers::dense::Dense;
/// use ctr_layers::initializer::Initializer;
/// use ctr_layers::tensor::Tensor;
///
/// let layer = Dense::new(8, 3, Initializer::GlorotUniform { seed: 1 });
/// let output = layer.forward(&Tensor::ones(&[2, 5, 8])).unwrap();
/// assert_eq!(output.shape(), &[2, 5, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    kernel: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    kernel_regularizer: Regularizer,
    activation: Option<ActivationFn>,
    in_features: usize,
}

impl Dense {
    /// Creates a linear projection with a zero-initialized bias.
    pub fn new(in_features: usize, out_features: usize, kernel_init: Initializer) -> Self {
        Self {
            kernel: kernel_init.initialize(&[in_features, out_features]),
            bias: Tensor::zeros(&[out_features]),
            kernel_regularizer: Regularizer::None,
            activation: None,
            in_features,
        }
    }

    /// Sets the activation applied after the projection.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation.resolve());
        self
    }

    /// Sets the kernel regularizer.
    pub fn with_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = regularizer;
        self
    }

    /// Parameters in load order: kernel, then bias.
    pub fn weights(&self) -> Vec<&Tensor> {
        vec![&self.kernel, &self.bias]
    }

    /// Mutable parameters, in the same order as [`Dense::weights`].
    pub fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.kernel, &mut self.bias]
    }

    /// Returns the kernel penalty.
    pub fn regularization_loss(&self) -> f32 {
        self.kernel_regularizer.loss(&self.kernel)
    }

    /// Forward pass.
    pub fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        if input.shape().last() != Some(&self.in_features) {
            return Err(LayerError::shape(
                DENSE,
                format!(
                    "expected {} features on the last axis, got {:?}",
                    self.in_features,
                    input.shape()
                ),
            ));
        }
        let output = input.matmul(&self.kernel)?.add(&self.bias)?;
        Ok(match &self.activation {
            Some(f) => f.apply(&output),
            None => output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationKind;

    #[test]
    fn test_dense_forward_values() {
        let mut dense = Dense::new(2, 1, Initializer::Ones);
        *dense.weights_mut()[1] = Tensor::full(&[1], 0.5);
        let x = Tensor::from_data(&[2, 2], vec![1.0, 2.0, -3.0, 1.0]).unwrap();
        assert_eq!(dense.forward(&x).unwrap().to_vec(), vec![3.5, -1.5]);

        let relu = dense.with_activation(ActivationKind::Relu.into());
        assert_eq!(relu.forward(&x).unwrap().to_vec(), vec![3.5, 0.0]);
    }

    #[test]
    fn test_dense_weights_and_penalty() {
        let dense = Dense::new(3, 2, Initializer::Ones).with_regularizer(Regularizer::L2(0.1));
        assert_eq!(dense.weights().len(), 2);
        assert_eq!(dense.weights()[1].shape(), &[2]);
        // the bias carries no penalty
        assert!((dense.regularization_loss() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_dense_rejects_wrong_width() {
        let dense = Dense::new(3, 2, Initializer::Zeros);
        assert!(dense.forward(&Tensor::ones(&[2, 4])).unwrap_err().is_shape_error());
    }
}
