//! Canonical pair enumeration for pairwise-interaction layers.
//!
//! For `n` inputs the pairs are `(i, j)` with `i < j`, ordered by `i` and then
//! by `j`. Output columns of the product layers follow this order, so for
//! three inputs the columns are `(0,1), (0,2), (1,2)`.

use crate::error::{LayerError, LayerResult};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Number of unordered pairs among `n` inputs.
pub fn num_pairs(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Returns the `(row, col)` index lists of every pair, in canonical order.
///
/// ```
/// use ctr_layers::pairs::pair_indices;
///
/// let (row, col) = pair_indices(3);
/// assert_eq!(row, vec![0, 0, 1]);
/// assert_eq!(col, vec![1, 2, 2]);
/// ```
pub fn pair_indices(n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut row = Vec::with_capacity(num_pairs(n));
    let mut col = Vec::with_capacity(num_pairs(n));
    for i in 0..n {
        for j in i + 1..n {
            row.push(i);
            col.push(j);
        }
    }
    (row, col)
}

fn same_dims(a: &Shape, b: &Shape) -> bool {
    a.ndim() == b.ndim()
        && a
            .as_slice()
            .iter()
            .zip(b.as_slice())
            .all(|(x, y)| x.is_none() || y.is_none() || x == y)
}

/// Validates a list of `(batch, 1, embedding_dim)` inputs and returns the
/// embedding dimension.
///
/// Requires at least two inputs of rank 3 with identical shapes and a field
/// axis of size 1. Unknown axes are compatible with any size, except the
/// embedding axis, which must be known.
pub(crate) fn validate_pair_shapes(layer: &'static str, shapes: &[Shape]) -> LayerResult<usize> {
    if shapes.len() < 2 {
        return Err(LayerError::shape(
            layer,
            format!("expected a list of at least 2 inputs, got {}", shapes.len()),
        ));
    }
    let first = &shapes[0];
    for (i, shape) in shapes.iter().enumerate() {
        if shape.ndim() != 3 {
            return Err(LayerError::shape(
                layer,
                format!("expected rank 3 inputs, input {} has shape {}", i, shape),
            ));
        }
        if !same_dims(first, shape) {
            return Err(LayerError::shape(
                layer,
                format!(
                    "all inputs must share one shape, input 0 is {} and input {} is {}",
                    first, i, shape
                ),
            ));
        }
        if shape.dim(1).is_some_and(|fields| fields != 1) {
            return Err(LayerError::shape(
                layer,
                format!("expected field axis of size 1, input {} has shape {}", i, shape),
            ));
        }
    }
    first.last().ok_or_else(|| {
        LayerError::shape(
            layer,
            format!("embedding axis must be known, got {}", first),
        )
    })
}

/// Runtime counterpart of [`validate_pair_shapes`] that also checks the
/// embedding dimension the layer was built with.
pub(crate) fn validate_pair_inputs(
    layer: &'static str,
    inputs: &[Tensor],
    embedding_dim: usize,
) -> LayerResult<()> {
    let shapes: Vec<Shape> = inputs.iter().map(|t| Shape::of(t.shape())).collect();
    let dim = validate_pair_shapes(layer, &shapes)?;
    if dim != embedding_dim {
        return Err(LayerError::shape(
            layer,
            format!(
                "layer was built for embedding dim {}, got inputs of shape {}",
                embedding_dim, shapes[0]
            ),
        ));
    }
    Ok(())
}

/// Stacks the inputs along the field axis and gathers both sides of every
/// pair, giving two `(batch, num_pairs, embedding_dim)` tensors.
pub(crate) fn gather_pairs(inputs: &[Tensor]) -> LayerResult<(Tensor, Tensor)> {
    let (row, col) = pair_indices(inputs.len());
    let stacked = Tensor::concat(inputs, 1)?;
    Ok((stacked.select(1, &row)?, stacked.select(1, &col)?))
}
