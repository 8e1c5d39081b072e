//! Batch normalization over the last axis.

use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};
use crate::tensor::Tensor;

const BATCH_NORM: &str = "BatchNormalization";

/// Batch Normalization layer.
///
/// Statistics are taken over every axis except the last, so a
/// `[batch, seq, features]` input is normalized per feature across both the
/// batch and sequence axes.
///
/// During training ([`BatchNorm::forward_train`]) the batch statistics are
/// used and folded into the moving averages; inference
/// ([`BatchNorm::forward`]) uses the moving averages.
///
/// # Example
///
/// ```
/// use ctr_layers::normalization::BatchNorm;
/// use ctr_layers::tensor::Tensor;
///
/// let bn = BatchNorm::new(4);
/// let out = bn.forward(&Tensor::zeros(&[2, 3, 4])).unwrap();
/// assert_eq!(out.shape(), &[2, 3, 4]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    /// Learnable scale parameter
    gamma: Tensor,
    /// Learnable shift parameter
    beta: Tensor,
    /// Running mean for inference
    moving_mean: Tensor,
    /// Running variance for inference
    moving_variance: Tensor,
    /// Momentum for the running statistics
    momentum: f32,
    /// Small constant for numerical stability
    epsilon: f32,
    num_features: usize,
}

impl BatchNorm {
    /// Creates a Batch Normalization layer with Keras defaults
    /// (momentum 0.99, epsilon 1e-3).
    pub fn new(num_features: usize) -> Self {
        Self::with_params(num_features, 0.99, 1e-3)
    }

    /// Creates a Batch Normalization layer with custom momentum and epsilon.
    pub fn with_params(num_features: usize, momentum: f32, epsilon: f32) -> Self {
        Self {
            gamma: Tensor::ones(&[num_features]),
            beta: Tensor::zeros(&[num_features]),
            moving_mean: Tensor::zeros(&[num_features]),
            moving_variance: Tensor::ones(&[num_features]),
            momentum,
            epsilon,
            num_features,
        }
    }

    /// Parameters in load order: gamma, beta, moving mean, moving variance.
    pub fn weights(&self) -> Vec<&Tensor> {
        vec![
            &self.gamma,
            &self.beta,
            &self.moving_mean,
            &self.moving_variance,
        ]
    }

    /// Mutable parameters, in the same order as [`BatchNorm::weights`].
    pub fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        vec![
            &mut self.gamma,
            &mut self.beta,
            &mut self.moving_mean,
            &mut self.moving_variance,
        ]
    }

    fn check_input(&self, input: &Tensor) -> LayerResult<()> {
        if input.ndim() < 2 || input.shape().last() != Some(&self.num_features) {
            return Err(LayerError::shape(
                BATCH_NORM,
                format!(
                    "expected input of rank >= 2 with {} features on the last axis, got {:?}",
                    self.num_features,
                    input.shape()
                ),
            ));
        }
        Ok(())
    }

    fn normalize(&self, input: &Tensor, mean: &Tensor, variance: &Tensor) -> LayerResult<Tensor> {
        let eps = self.epsilon;
        let denom = variance.map(|v| (v + eps).sqrt());
        input
            .sub(mean)?
            .div(&denom)?
            .mul(&self.gamma)?
            .add(&self.beta)
    }

    /// Inference pass using the moving statistics.
    pub fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.check_input(input)?;
        self.normalize(input, &self.moving_mean, &self.moving_variance)
    }

    /// Training pass using batch statistics; updates the moving averages.
    pub fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        self.check_input(input)?;
        let rows = input.numel() / self.num_features;
        if rows == 0 {
            return Ok(input.clone());
        }
        let flat = input.reshape(&[rows, self.num_features])?;
        let inv_rows = 1.0 / rows as f32;
        let mean = flat.sum_axis(0, false)?.scale(inv_rows);
        let variance = flat.sub(&mean)?.square().sum_axis(0, false)?.scale(inv_rows);

        let m = self.momentum;
        self.moving_mean = self.moving_mean.scale(m).add(&mean.scale(1.0 - m))?;
        self.moving_variance = self
            .moving_variance
            .scale(m)
            .add(&variance.scale(1.0 - m))?;

        self.normalize(input, &mean, &variance)
    }
}
