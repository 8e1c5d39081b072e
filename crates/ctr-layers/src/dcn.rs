//! Cross Network of the Deep & Cross Network.
//!
//! Each cross layer computes
//!
//! ```text
//! x_{l+1} = x_0 * (x_l . w_l) + b_l + x_l
//! ```
//!
//! where `x_0` is the `(batch, dim)` input, `w_l` a `(dim, 1)` kernel and
//! `b_l` a `(dim, 1)` bias. Every layer adds one degree of explicit feature
//! interaction, so `layer_num` bounds the interaction order.
//!
//! # Example
//!
//! ```
//! use ctr_layers::dcn::CrossNetConfig;
//! use ctr_layers::layer::Layer;
//! use ctr_layers::tensor::Tensor;
//!
//! let mut cross = CrossNetConfig::new(3).with_l2_reg(1e-5).build().unwrap();
//! let output = cross.apply(&[Tensor::ones(&[8, 16])]).unwrap();
//! assert_eq!(output.shape(), &[8, 16]);
//! ```
//!
//! # References
//!
//! - [Deep & Cross Network for Ad Click Predictions](https://arxiv.org/abs/1708.05123)

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{check_non_negative, LayerConfig};
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{ensure_built, expect_rank, single_input, Layer};
use crate::regularizer::Regularizer;
use crate::shape::Shape;
use crate::tensor::Tensor;

const CROSS_NET: &str = "CrossNet";

/// Configuration for [`CrossNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossNetConfig {
    /// Number of cross layers
    pub layer_num: usize,
    /// L2 strength applied to every kernel
    pub l2_reg: f32,
    /// Base seed; kernel `i` is initialized from `seed + i`
    pub seed: u64,
}

impl Default for CrossNetConfig {
    fn default() -> Self {
        Self {
            layer_num: 1,
            l2_reg: 0.0,
            seed: 1024,
        }
    }
}

impl CrossNetConfig {
    /// Creates a configuration with `layer_num` cross layers.
    pub fn new(layer_num: usize) -> Self {
        Self {
            layer_num,
            ..Self::default()
        }
    }

    /// Sets the kernel L2 strength.
    pub fn with_l2_reg(mut self, l2_reg: f32) -> Self {
        self.l2_reg = l2_reg;
        self
    }

    /// Sets the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        check_non_negative("l2_reg", self.l2_reg)
    }

    /// Builds an unbuilt layer after validating the configuration.
    pub fn build(self) -> LayerResult<CrossNet> {
        CrossNet::from_config(self)
    }
}

/// One cross layer: a `(dim, 1)` kernel and a `(dim, 1)` bias.
#[derive(Debug, Clone, PartialEq)]
struct CrossLayer {
    kernel: Tensor,
    bias: Tensor,
}

impl CrossLayer {
    fn new(dim: usize, seed: u64) -> Self {
        Self {
            kernel: Initializer::GlorotNormal { seed }.initialize(&[dim, 1]),
            bias: Tensor::zeros(&[dim, 1]),
        }
    }

    /// Computes `x0 * (xl . w) + b + xl` on `(batch, dim)` tensors.
    ///
    /// `x0 (x_l^T w)` equals `(x0 x_l^T) w`, so the `(batch, dim, dim)` outer
    /// product is never formed.
    fn forward_with_x0(&self, x0: &Tensor, xl: &Tensor) -> LayerResult<Tensor> {
        let dim = self.kernel.shape()[0];
        // (batch, 1)
        let scores = xl.matmul(&self.kernel)?;
        let bias = self.bias.reshape(&[1, dim])?;
        x0.mul(&scores)?.add(xl)?.add(&bias)
    }
}

/// Stack of cross layers sharing the same base input.
///
/// Input and output are `(batch, dim)`. With `layer_num = 0` the network is
/// the identity.
#[derive(Debug, Clone)]
pub struct CrossNet {
    config: CrossNetConfig,
    regularizer: Regularizer,
    layers: Vec<CrossLayer>,
    dim: Option<usize>,
}

impl CrossNet {
    /// Creates a cross network with `layer_num` layers, L2 strength and seed.
    pub fn new(layer_num: usize, l2_reg: f32, seed: u64) -> LayerResult<Self> {
        CrossNetConfig::new(layer_num)
            .with_l2_reg(l2_reg)
            .with_seed(seed)
            .build()
    }

    /// Creates an unbuilt network from its configuration.
    pub fn from_config(config: CrossNetConfig) -> LayerResult<Self> {
        config.validate()?;
        Ok(Self {
            regularizer: Regularizer::l2(config.l2_reg),
            config,
            layers: Vec::new(),
            dim: None,
        })
    }

    fn check_input(&self, input: &Tensor, dim: usize) -> LayerResult<()> {
        let shape = Shape::of(input.shape());
        expect_rank(CROSS_NET, &shape, 2)?;
        if shape.last() != Some(dim) {
            return Err(LayerError::shape(
                CROSS_NET,
                format!("layer was built for dim {}, got input {}", dim, shape),
            ));
        }
        Ok(())
    }
}

impl Layer for CrossNet {
    fn name(&self) -> &'static str {
        CROSS_NET
    }

    fn is_built(&self) -> bool {
        self.dim.is_some()
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let shape = single_input(CROSS_NET, input_shapes)?;
        expect_rank(CROSS_NET, shape, 2)?;
        let dim = shape.last().ok_or_else(|| {
            LayerError::shape(CROSS_NET, format!("feature axis must be known, got {}", shape))
        })?;
        let seed = self.config.seed;
        self.layers = (0..self.config.layer_num)
            .map(|i| CrossLayer::new(dim, seed.wrapping_add(i as u64)))
            .collect();
        self.dim = Some(dim);
        debug!(
            layer = CROSS_NET,
            input_shape = %shape,
            layer_num = self.config.layer_num,
            "built"
        );
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        ensure_built(CROSS_NET, self.is_built())?;
        let x0 = single_input(CROSS_NET, inputs)?;
        self.check_input(x0, self.dim.unwrap_or_default())?;

        let mut xl = x0.clone();
        for layer in &self.layers {
            xl = layer.forward_with_x0(x0, &xl)?;
        }
        Ok(xl)
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        let shape = single_input(CROSS_NET, input_shapes)?;
        expect_rank(CROSS_NET, shape, 2)?;
        Ok(shape.clone())
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::CrossNet(self.config.clone())
    }

    /// All kernels first, then all biases.
    fn weights(&self) -> Vec<&Tensor> {
        let kernels = self.layers.iter().map(|l| &l.kernel);
        let biases = self.layers.iter().map(|l| &l.bias);
        kernels.chain(biases).collect()
    }

    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        let (kernels, biases): (Vec<_>, Vec<_>) = self
            .layers
            .iter_mut()
            .map(|l| (&mut l.kernel, &mut l.bias))
            .unzip();
        kernels.into_iter().chain(biases).collect()
    }

    fn regularization_loss(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| self.regularizer.loss(&l.kernel))
            .sum()
    }
}
