//! Layer trait definition for CTR layers.
//!
//! Every layer in this crate implements [`Layer`], which splits its lifecycle
//! into a build step (validate input shapes, allocate weights), a forward
//! step and a shape-inference step, and exports its hyperparameters as a
//! [`LayerConfig`].

use crate::config::LayerConfig;
use crate::error::{LayerError, LayerResult};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// A CTR layer with an explicit build step and owned weights.
///
/// # Example
///
/// ```
/// use ctr_layers::fm::FM;
/// use ctr_layers::layer::Layer;
/// use ctr_layers::shape::Shape;
/// use ctr_layers::tensor::Tensor;
///
/// let mut fm = FM::new();
/// assert_eq!(
///     fm.compute_output_shape(&[Shape::batched(&[3, 4])]).unwrap(),
///     Shape::batched(&[1])
/// );
///
/// let output = fm.apply(&[Tensor::ones(&[2, 3, 4])]).unwrap();
/// assert_eq!(output.to_vec(), vec![12.0, 12.0]);
/// ```
pub trait Layer: Send + Sync {
    /// Returns the layer's class name, as written to exported configs.
    fn name(&self) -> &'static str;

    /// Returns whether [`Layer::build`] has succeeded.
    fn is_built(&self) -> bool;

    /// Validates the input shapes and allocates the layer's weights.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidShape`] if the shapes violate the layer's
    /// rank, count or per-axis size preconditions.
    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()>;

    /// Inference forward pass: dropout is disabled and batch normalization
    /// uses its moving statistics.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotBuilt`] for a weighted layer that has not been
    /// built, or a shape error if the inputs violate the layer's
    /// preconditions.
    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor>;

    /// Training forward pass: dropout draws a fresh seeded mask and batch
    /// normalization uses batch statistics, updating its moving averages.
    fn call_train(&mut self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        self.call(inputs)
    }

    /// Predicts the output shape without running the forward pass.
    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape>;

    /// Exports the construction hyperparameters (not the weights).
    fn get_config(&self) -> LayerConfig;

    /// Returns references to every weight owned by the layer, including those
    /// of nested blocks, in a fixed load order.
    fn weights(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Mutable references to the weights, in the same order as
    /// [`Layer::weights`].
    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Returns the sum of the L2 penalties owned by the layer.
    fn regularization_loss(&self) -> f32 {
        0.0
    }

    /// Returns copies of the layer's weights.
    fn get_weights(&self) -> Vec<Tensor> {
        self.weights().into_iter().cloned().collect()
    }

    /// Replaces the layer's weights.
    ///
    /// # Errors
    ///
    /// Fails if the number of tensors or any tensor's shape differs from the
    /// layer's current weights.
    fn set_weights(&mut self, weights: &[Tensor]) -> LayerResult<()> {
        let name = self.name();
        let mut slots = self.weights_mut();
        if slots.len() != weights.len() {
            return Err(LayerError::shape(
                name,
                format!(
                    "expected {} weight tensors, got {}",
                    slots.len(),
                    weights.len()
                ),
            ));
        }
        for (slot, weight) in slots.iter().zip(weights) {
            if slot.shape() != weight.shape() {
                return Err(LayerError::ShapeMismatch {
                    expected: slot.shape().to_vec(),
                    actual: weight.shape().to_vec(),
                });
            }
        }
        for (slot, weight) in slots.iter_mut().zip(weights) {
            **slot = weight.clone();
        }
        Ok(())
    }

    /// Builds from the concrete input shapes on first use, then runs
    /// [`Layer::call`].
    fn apply(&mut self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        if !self.is_built() {
            let shapes: Vec<Shape> = inputs.iter().map(|t| Shape::of(t.shape())).collect();
            self.build(&shapes)?;
        }
        self.call(inputs)
    }
}

/// Returns the only input of a single-input layer.
pub(crate) fn single_input<'a, T>(layer: &'static str, inputs: &'a [T]) -> LayerResult<&'a T> {
    match inputs {
        [input] => Ok(input),
        _ => Err(LayerError::shape(
            layer,
            format!("expected exactly 1 input, got {}", inputs.len()),
        )),
    }
}

/// Checks a shape's rank.
pub(crate) fn expect_rank(layer: &'static str, shape: &Shape, rank: usize) -> LayerResult<()> {
    if shape.ndim() != rank {
        return Err(LayerError::shape(
            layer,
            format!(
                "expected a rank {} input, got {} dimensions {}",
                rank,
                shape.ndim(),
                shape
            ),
        ));
    }
    Ok(())
}

/// Error for a weighted layer used before `build`.
pub(crate) fn ensure_built(layer: &'static str, built: bool) -> LayerResult<()> {
    if built {
        Ok(())
    } else {
        Err(LayerError::NotBuilt { layer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mock layer for testing
    struct MockLayer {
        weight: Option<Tensor>,
    }

    impl Layer for MockLayer {
        fn name(&self) -> &'static str {
            "MockLayer"
        }

        fn is_built(&self) -> bool {
            self.weight.is_some()
        }

        fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
            let shape = single_input(self.name(), input_shapes)?;
            expect_rank(self.name(), shape, 2)?;
            self.weight = Some(Tensor::ones(&[2]));
            Ok(())
        }

        fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
            ensure_built(self.name(), self.is_built())?;
            Ok(single_input(self.name(), inputs)?.clone())
        }

        fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
            Ok(single_input(self.name(), input_shapes)?.clone())
        }

        fn get_config(&self) -> LayerConfig {
            LayerConfig::FM
        }

        fn weights(&self) -> Vec<&Tensor> {
            self.weight.iter().collect()
        }

        fn weights_mut(&mut self) -> Vec<&mut Tensor> {
            self.weight.iter_mut().collect()
        }
    }

    #[test]
    fn test_call_before_build_fails() {
        let layer = MockLayer { weight: None };
        let err = layer.call(&[Tensor::zeros(&[2, 2])]).unwrap_err();
        assert!(matches!(err, LayerError::NotBuilt { layer: "MockLayer" }));
    }

    #[test]
    fn test_apply_builds_on_first_use() {
        let mut layer = MockLayer { weight: None };
        let out = layer.apply(&[Tensor::ones(&[3, 2])]).unwrap();
        assert!(layer.is_built());
        assert_eq!(out.shape(), &[3, 2]);

        let mut bad = MockLayer { weight: None };
        assert!(bad.apply(&[Tensor::ones(&[3])]).unwrap_err().is_shape_error());
    }

    #[test]
    fn test_set_weights_validates() {
        let mut layer = MockLayer { weight: None };
        layer.build(&[Shape::batched(&[2])]).unwrap();

        assert!(layer.set_weights(&[]).is_err());
        let err = layer.set_weights(&[Tensor::zeros(&[3])]).unwrap_err();
        assert!(matches!(err, LayerError::ShapeMismatch { .. }));

        layer.set_weights(&[Tensor::full(&[2], 7.0)]).unwrap();
        assert_eq!(layer.get_weights()[0].to_vec(), vec![7.0, 7.0]);
    }
}
