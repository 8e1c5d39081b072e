//! Factorization-machine interaction layers.
//!
//! Both layers compute every pairwise interaction among the fields of a
//! `(batch, fields, embedding_dim)` tensor with the identity
//!
//! ```text
//! sum_{i<j} v_i * v_j = 0.5 * ((sum_i v_i)^2 - sum_i v_i^2)
//! ```
//!
//! which costs O(fields) instead of O(fields^2). [`FM`] reduces the result to
//! one scalar per row; [`BiInteractionPooling`] keeps one value per embedding
//! dimension.
//!
//! # References
//!
//! - [Factorization Machines](https://www.csie.ntu.edu.tw/~b97053/paper/Rendle2010FM.pdf)
//! - [Neural Factorization Machines for Sparse Predictive Analytics](https://arxiv.org/abs/1708.05027)

use tracing::debug;

use crate::config::LayerConfig;
use crate::error::LayerResult;
use crate::layer::{expect_rank, single_input, Layer};
use crate::shape::Shape;
use crate::tensor::Tensor;

const FM_NAME: &str = "FM";
const BI_INTERACTION_NAME: &str = "BiInteractionPooling";

/// Per-dimension pairwise interaction: `(batch, fields, d) -> (batch, d)`.
fn pairwise_pooling(layer: &'static str, input: &Tensor) -> LayerResult<Tensor> {
    expect_rank(layer, &Shape::of(input.shape()), 3)?;
    let square_of_sum = input.sum_axis(1, false)?.square();
    let sum_of_square = input.square().sum_axis(1, false)?;
    Ok(square_of_sum.sub(&sum_of_square)?.scale(0.5))
}

fn build_rank3(layer: &'static str, input_shapes: &[Shape]) -> LayerResult<()> {
    let shape = single_input(layer, input_shapes)?;
    expect_rank(layer, shape, 3)?;
    debug!(layer, input_shape = %shape, "built");
    Ok(())
}

/// Factorization Machine pairwise (order-2) interaction without the linear
/// term and bias.
///
/// Input: `(batch, fields, embedding_dim)`. Output: `(batch, 1)`.
#[derive(Debug, Clone, Default)]
pub struct FM {
    built: bool,
}

impl FM {
    /// Creates an FM layer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for FM {
    fn name(&self) -> &'static str {
        FM_NAME
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        build_rank3(FM_NAME, input_shapes)?;
        self.built = true;
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let input = single_input(FM_NAME, inputs)?;
        let cross = pairwise_pooling(FM_NAME, input)?;
        cross.sum_axis(1, true)
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        let shape = single_input(FM_NAME, input_shapes)?;
        expect_rank(FM_NAME, shape, 3)?;
        Ok(Shape::new(vec![shape.dim(0), Some(1)]))
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::FM
    }
}

/// Bi-Interaction pooling from Neural Factorization Machines.
///
/// Input: `(batch, fields, embedding_dim)`. Output: `(batch, embedding_dim)`.
#[derive(Debug, Clone, Default)]
pub struct BiInteractionPooling {
    built: bool,
}

impl BiInteractionPooling {
    /// Creates a Bi-Interaction pooling layer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for BiInteractionPooling {
    fn name(&self) -> &'static str {
        BI_INTERACTION_NAME
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        build_rank3(BI_INTERACTION_NAME, input_shapes)?;
        self.built = true;
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let input = single_input(BI_INTERACTION_NAME, inputs)?;
        pairwise_pooling(BI_INTERACTION_NAME, input)
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        let shape = single_input(BI_INTERACTION_NAME, input_shapes)?;
        expect_rank(BI_INTERACTION_NAME, shape, 3)?;
        Ok(Shape::new(vec![shape.dim(0), shape.last()]))
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::BiInteractionPooling
    }
}
