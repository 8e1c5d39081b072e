//! Weight penalties accumulated into the training loss.

use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Regularizer applied to a layer parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum Regularizer {
    /// No regularization.
    #[default]
    None,
    /// L2 regularization: `lambda * sum(w^2)`.
    L2(f32),
}

impl Regularizer {
    /// Builds an L2 regularizer, or `None` for a zero strength.
    pub fn l2(lambda: f32) -> Self {
        if lambda == 0.0 {
            Regularizer::None
        } else {
            Regularizer::L2(lambda)
        }
    }

    /// Returns the penalty for the given parameter tensor.
    pub fn loss(&self, param: &Tensor) -> f32 {
        match *self {
            Regularizer::None => 0.0,
            Regularizer::L2(lambda) => param.square().sum() * lambda,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_loss() {
        let w = Tensor::from_data(&[3], vec![1.0, -2.0, 3.0]).unwrap();
        assert_eq!(Regularizer::L2(0.5).loss(&w), 7.0);
        assert_eq!(Regularizer::None.loss(&w), 0.0);
        assert_eq!(Regularizer::l2(0.0), Regularizer::None);
    }
}
