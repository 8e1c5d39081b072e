//! Product-based pairwise interaction layers from Product-based Neural
//! Networks.
//!
//! Both layers take a list of `N >= 2` embeddings shaped
//! `(batch, 1, embedding_dim)` and emit one column per pair in canonical
//! order (see [`crate::pairs`]).
//!
//! # References
//!
//! - [Product-based Neural Networks for User Response Prediction](https://arxiv.org/abs/1611.00144)

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::LayerConfig;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{ensure_built, Layer};
use crate::pairs::{gather_pairs, num_pairs, validate_pair_inputs, validate_pair_shapes};
use crate::shape::Shape;
use crate::tensor::Tensor;

const INNER_PRODUCT: &str = "InnerProductLayer";
const OUTTER_PRODUCT: &str = "OutterProductLayer";

/// Configuration for [`InnerProductLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerProductConfig {
    /// Sum each pair's element-wise product over the embedding axis
    pub reduce_sum: bool,
}

impl Default for InnerProductConfig {
    fn default() -> Self {
        Self { reduce_sum: true }
    }
}

impl InnerProductConfig {
    /// Creates the default configuration (`reduce_sum = true`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the embedding axis is summed away.
    pub fn with_reduce_sum(mut self, reduce_sum: bool) -> Self {
        self.reduce_sum = reduce_sum;
        self
    }

    /// Builds an unbuilt layer.
    pub fn build(self) -> InnerProductLayer {
        InnerProductLayer::from_config(self)
    }
}

/// Element-wise products of every embedding pair.
///
/// Output is `(batch, num_pairs)` with `reduce_sum`, otherwise
/// `(batch, num_pairs, embedding_dim)`.
///
/// # Example
///
/// ```
/// use ctr_layers::layer::Layer;
/// use ctr_layers::product::InnerProductLayer;
/// use ctr_layers::tensor::Tensor;
///
/// let mut layer = InnerProductLayer::new(true);
/// let inputs = vec![Tensor::ones(&[2, 1, 4]); 3];
/// let out = layer.apply(&inputs).unwrap();
/// assert_eq!(out.shape(), &[2, 3]);
/// assert_eq!(out.to_vec(), vec![4.0; 6]);
/// ```
#[derive(Debug, Clone)]
pub struct InnerProductLayer {
    config: InnerProductConfig,
    built: bool,
}

impl InnerProductLayer {
    /// Creates an inner-product layer.
    pub fn new(reduce_sum: bool) -> Self {
        Self::from_config(InnerProductConfig::new().with_reduce_sum(reduce_sum))
    }

    /// Creates an unbuilt layer from its configuration.
    pub fn from_config(config: InnerProductConfig) -> Self {
        Self {
            config,
            built: false,
        }
    }
}

impl Layer for InnerProductLayer {
    fn name(&self) -> &'static str {
        INNER_PRODUCT
    }

    fn is_built(&self) -> bool {
        self.built
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let embedding_dim = validate_pair_shapes(INNER_PRODUCT, input_shapes)?;
        debug!(
            layer = INNER_PRODUCT,
            inputs = input_shapes.len(),
            embedding_dim,
            "built"
        );
        self.built = true;
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        let shapes: Vec<Shape> = inputs.iter().map(|t| Shape::of(t.shape())).collect();
        validate_pair_shapes(INNER_PRODUCT, &shapes)?;
        let (p, q) = gather_pairs(inputs)?;
        let product = p.mul(&q)?;
        if self.config.reduce_sum {
            product.sum_axis(2, false)
        } else {
            Ok(product)
        }
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        let embedding_dim = validate_pair_shapes(INNER_PRODUCT, input_shapes)?;
        let pairs = Some(num_pairs(input_shapes.len()));
        let batch = input_shapes[0].dim(0);
        Ok(if self.config.reduce_sum {
            Shape::new(vec![batch, pairs])
        } else {
            Shape::new(vec![batch, pairs, Some(embedding_dim)])
        })
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::InnerProductLayer(self.config.clone())
    }
}

/// Weighting applied to each pair by [`OutterProductLayer`].
///
/// Serialized as `"mat"`, `"vec"` or `"num"`; decoding goes through
/// [`FromStr`], so JSON and string parsing reject the same names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelType {
    /// A full `(d, pairs, d)` quadratic-form kernel per pair
    #[default]
    Mat,
    /// A `(pairs, d)` per-dimension weight per pair
    Vec,
    /// A `(pairs, 1)` scalar weight per pair
    Num,
}

impl KernelType {
    /// Returns the lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mat => "mat",
            Self::Vec => "vec",
            Self::Num => "num",
        }
    }

    fn kernel_shape(self, pairs: usize, embedding_dim: usize) -> Vec<usize> {
        match self {
            Self::Mat => vec![embedding_dim, pairs, embedding_dim],
            Self::Vec => vec![pairs, embedding_dim],
            Self::Num => vec![pairs, 1],
        }
    }
}

impl FromStr for KernelType {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mat" => Ok(Self::Mat),
            "vec" => Ok(Self::Vec),
            "num" => Ok(Self::Num),
            other => Err(LayerError::config(format!(
                "kernel_type must be mat, vec or num, got '{}'",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for KernelType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for [`OutterProductLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutterProductConfig {
    /// Pair weighting mode; fixed for the layer's lifetime
    pub kernel_type: KernelType,
    /// Seed of the Glorot-uniform kernel initializer
    pub seed: u64,
}

impl Default for OutterProductConfig {
    fn default() -> Self {
        Self {
            kernel_type: KernelType::Mat,
            seed: 1024,
        }
    }
}

impl OutterProductConfig {
    /// Creates a configuration for the given kernel type.
    pub fn new(kernel_type: KernelType) -> Self {
        Self {
            kernel_type,
            ..Self::default()
        }
    }

    /// Parses the kernel type from its name (`"mat"`, `"vec"` or `"num"`).
    pub fn from_kernel_name(kernel_type: &str) -> LayerResult<Self> {
        Ok(Self::new(kernel_type.parse()?))
    }

    /// Sets the initializer seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builds an unbuilt layer.
    pub fn build(self) -> OutterProductLayer {
        OutterProductLayer::from_config(self)
    }
}

/// Kernel-weighted products of every embedding pair. Output is always
/// `(batch, num_pairs)`.
///
/// With `p` and `q` the two embeddings of a pair and `W` the pair's kernel
/// slice:
///
/// - `mat`: `sum_k q_k * sum_l W[k, pair, l] * p_l`
/// - `vec`: `sum_d p_d * q_d * w_d`
/// - `num`: `w * sum_d p_d * q_d`
///
/// All three kernels are Glorot-uniform initialized from the configured seed.
#[derive(Debug, Clone)]
pub struct OutterProductLayer {
    config: OutterProductConfig,
    kernel: Option<Tensor>,
    embedding_dim: usize,
    pairs: usize,
}

impl OutterProductLayer {
    /// Creates an outer-product layer with the given kernel type and seed.
    pub fn new(kernel_type: KernelType, seed: u64) -> Self {
        Self::from_config(OutterProductConfig::new(kernel_type).with_seed(seed))
    }

    /// Creates an unbuilt layer from its configuration.
    pub fn from_config(config: OutterProductConfig) -> Self {
        Self {
            config,
            kernel: None,
            embedding_dim: 0,
            pairs: 0,
        }
    }

    fn kernel(&self) -> LayerResult<&Tensor> {
        self.kernel
            .as_ref()
            .ok_or(LayerError::NotBuilt { layer: OUTTER_PRODUCT })
    }

    /// `out[b, pair] = sum_k q[b, pair, k] * sum_l kernel[k, pair, l] * p[b, pair, l]`
    fn mat_product(p: &Tensor, q: &Tensor, kernel: &Tensor) -> LayerResult<Tensor> {
        let p = p.view3()?;
        let q = q.view3()?;
        let kernel = kernel.view3()?;
        let (batch, pairs, _) = p.dim();
        let mut out = Array2::<f32>::zeros((batch, pairs));
        for pair in 0..pairs {
            // (d_k, d_l) slice of the kernel for this pair
            let w = kernel.index_axis(Axis(1), pair);
            let p_pair = p.index_axis(Axis(1), pair);
            let q_pair = q.index_axis(Axis(1), pair);
            // (batch, d_k)
            let projected = p_pair.dot(&w.t());
            let column = (&projected * &q_pair).sum_axis(Axis(1));
            out.column_mut(pair).assign(&column);
        }
        Ok(Tensor::from_array(out.into_dyn()))
    }
}

impl Layer for OutterProductLayer {
    fn name(&self) -> &'static str {
        OUTTER_PRODUCT
    }

    fn is_built(&self) -> bool {
        self.kernel.is_some()
    }

    fn build(&mut self, input_shapes: &[Shape]) -> LayerResult<()> {
        let embedding_dim = validate_pair_shapes(OUTTER_PRODUCT, input_shapes)?;
        let pairs = num_pairs(input_shapes.len());
        let shape = self.config.kernel_type.kernel_shape(pairs, embedding_dim);
        let init = Initializer::GlorotUniform {
            seed: self.config.seed,
        };
        self.kernel = Some(init.initialize(&shape));
        self.embedding_dim = embedding_dim;
        self.pairs = pairs;
        debug!(
            layer = OUTTER_PRODUCT,
            kernel_type = %self.config.kernel_type,
            pairs,
            embedding_dim,
            "built"
        );
        Ok(())
    }

    fn call(&self, inputs: &[Tensor]) -> LayerResult<Tensor> {
        ensure_built(OUTTER_PRODUCT, self.is_built())?;
        validate_pair_inputs(OUTTER_PRODUCT, inputs, self.embedding_dim)?;
        let kernel = self.kernel()?;
        if num_pairs(inputs.len()) != self.pairs {
            return Err(LayerError::shape(
                OUTTER_PRODUCT,
                format!(
                    "layer was built for {} pairs, got {} inputs",
                    self.pairs,
                    inputs.len()
                ),
            ));
        }

        let (p, q) = gather_pairs(inputs)?;
        match self.config.kernel_type {
            KernelType::Mat => Self::mat_product(&p, &q, kernel),
            // (pairs, d | 1) broadcasts against (batch, pairs, d)
            KernelType::Vec | KernelType::Num => p.mul(&q)?.mul(kernel)?.sum_axis(2, false),
        }
    }

    fn compute_output_shape(&self, input_shapes: &[Shape]) -> LayerResult<Shape> {
        validate_pair_shapes(OUTTER_PRODUCT, input_shapes)?;
        Ok(Shape::new(vec![
            input_shapes[0].dim(0),
            Some(num_pairs(input_shapes.len())),
        ]))
    }

    fn get_config(&self) -> LayerConfig {
        LayerConfig::OutterProductLayer(self.config.clone())
    }

    fn weights(&self) -> Vec<&Tensor> {
        self.kernel.iter().collect()
    }

    fn weights_mut(&mut self) -> Vec<&mut Tensor> {
        self.kernel.iter_mut().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Vec<Tensor> {
        vec![
            Tensor::from_data(&[1, 1, 2], vec![1.0, 2.0]).unwrap(),
            Tensor::from_data(&[1, 1, 2], vec![3.0, -1.0]).unwrap(),
            Tensor::from_data(&[1, 1, 2], vec![0.5, 4.0]).unwrap(),
        ]
    }

    #[test]
    fn test_inner_product_order() {
        let layer = InnerProductLayer::new(true);
        let out = layer.call(&inputs()).unwrap();
        assert_eq!(out.shape(), &[1, 3]);
        assert_eq!(out.to_vec(), vec![1.0, 8.5, -2.5]);
    }

    #[test]
    fn test_inner_product_without_reduce() {
        let layer = InnerProductLayer::new(false);
        let out = layer.call(&inputs()).unwrap();
        assert_eq!(out.shape(), &[1, 3, 2]);
        assert_eq!(out.to_vec(), vec![3.0, -2.0, 0.5, 8.0, 1.5, -4.0]);
        assert_eq!(
            layer
                .compute_output_shape(&vec![Shape::batched(&[1, 2]); 3])
                .unwrap(),
            Shape::batched(&[3, 2])
        );
    }

    #[test]
    fn test_kernel_type_parsing() {
        assert_eq!("vec".parse::<KernelType>().unwrap(), KernelType::Vec);
        let err = "matrix".parse::<KernelType>().unwrap_err();
        assert!(matches!(err, LayerError::ConfigError { .. }));
        assert!(OutterProductConfig::from_kernel_name("bogus").is_err());
    }

    #[test]
    fn test_kernel_type_serde_uses_from_str() {
        assert_eq!(serde_json::to_string(&KernelType::Num).unwrap(), "\"num\"");
        let back: KernelType = serde_json::from_str("\"mat\"").unwrap();
        assert_eq!(back, KernelType::Mat);
        let err = serde_json::from_str::<KernelType>("\"tensor\"").unwrap_err();
        assert!(err.to_string().contains("kernel_type must be mat, vec or num"));
    }

    #[test]
    fn test_kernel_shapes() {
        let shapes = vec![Shape::batched(&[1, 4]); 3];
        for (kernel_type, expected) in [
            (KernelType::Mat, vec![4, 3, 4]),
            (KernelType::Vec, vec![3, 4]),
            (KernelType::Num, vec![3, 1]),
        ] {
            let mut layer = OutterProductLayer::new(kernel_type, 7);
            layer.build(&shapes).unwrap();
            assert_eq!(layer.weights()[0].shape(), expected.as_slice());
        }
    }

    #[test]
    fn test_mat_kernel_contraction() {
        let inputs = vec![
            Tensor::from_data(&[1, 1, 2], vec![1.0, 2.0]).unwrap(),
            Tensor::from_data(&[1, 1, 2], vec![3.0, 5.0]).unwrap(),
        ];
        let mut layer = OutterProductLayer::new(KernelType::Mat, 1);
        layer.build(&[Shape::batched(&[1, 2]), Shape::batched(&[1, 2])]).unwrap();
        // kernel[k, 0, l]: [[1, 2], [3, 4]]
        let kernel = Tensor::from_data(&[2, 1, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        layer.set_weights(&[kernel]).unwrap();
        // W p = [5, 11]; q . (W p) = 15 + 55
        assert_eq!(layer.call(&inputs).unwrap().to_vec(), vec![70.0]);
    }

    #[test]
    fn test_vec_kernel_weights_dimensions() {
        let mut layer = OutterProductLayer::new(KernelType::Vec, 1);
        let data = inputs();
        layer.build(&vec![Shape::batched(&[1, 2]); 3]).unwrap();
        let kernel = Tensor::from_data(&[3, 2], vec![1.0, 0.0, 0.0, 1.0, 2.0, 2.0]).unwrap();
        layer.set_weights(&[kernel]).unwrap();
        // pair products: (3,-2), (0.5,8), (1.5,-4)
        assert_eq!(layer.call(&data).unwrap().to_vec(), vec![3.0, 8.0, -5.0]);
    }

    #[test]
    fn test_outter_requires_build_and_matching_inputs() {
        let mut layer = OutterProductLayer::new(KernelType::Num, 1);
        let err = layer.call(&inputs()).unwrap_err();
        assert!(matches!(err, LayerError::NotBuilt { .. }));

        layer.build(&vec![Shape::batched(&[1, 2]); 3]).unwrap();
        assert!(layer.call(&inputs()[..2]).unwrap_err().is_shape_error());
    }

    #[test]
    fn test_same_seed_same_kernel() {
        let shapes = vec![Shape::batched(&[1, 3]); 4];
        let mut a = OutterProductLayer::new(KernelType::Vec, 11);
        let mut b = OutterProductLayer::new(KernelType::Vec, 11);
        a.build(&shapes).unwrap();
        b.build(&shapes).unwrap();
        assert_eq!(a.get_weights(), b.get_weights());
    }
}
