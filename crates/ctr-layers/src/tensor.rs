//! Dense CPU tensor used by every layer in this crate.
//!
//! [`Tensor`] wraps an `ndarray::ArrayD<f32>`. Operations that depend on
//! shape compatibility return [`LayerResult`] instead of panicking, so a bad
//! shape coming from a caller surfaces as a [`LayerError`].

use ndarray::{
    concatenate, Array2, ArrayD, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3, IxDyn, Zip,
};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};
use crate::shape::broadcast_dims;

const TENSOR: &str = "Tensor";

/// A multi-dimensional array of `f32` values in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use ctr_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: ArrayD::ones(IxDyn(shape)),
        }
    }

    /// Creates a new tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// Creates a tensor from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ShapeMismatch`] if `data.len()` does not match the
    /// number of elements implied by `shape`.
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> LayerResult<Self> {
        let len = data.len();
        let data = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| {
            LayerError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![len],
            }
        })?;
        Ok(Self { data })
    }

    /// Wraps an existing ndarray.
    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Returns a reference to the underlying ndarray.
    pub fn as_array(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Copies the elements out in row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Reshapes the tensor, keeping the row-major element order.
    pub fn reshape(&self, shape: &[usize]) -> LayerResult<Self> {
        if shape.iter().product::<usize>() != self.numel() {
            return Err(LayerError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: self.shape().to_vec(),
            });
        }
        Self::from_data(shape, self.to_vec())
    }

    /// Applies a function element-wise.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            data: self.data.mapv(f),
        }
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f32) -> Self {
        self.map(|x| x * scalar)
    }

    /// Element-wise square.
    pub fn square(&self) -> Self {
        self.map(|x| x * x)
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f32 {
        self.data.sum()
    }

    fn zip_with<F>(&self, other: &Tensor, f: F) -> LayerResult<Self>
    where
        F: Fn(f32, f32) -> f32,
    {
        let mismatch = || LayerError::ShapeMismatch {
            expected: self.shape().to_vec(),
            actual: other.shape().to_vec(),
        };
        let dims = broadcast_dims(self.shape(), other.shape()).ok_or_else(mismatch)?;
        let lhs = self.data.broadcast(IxDyn(&dims)).ok_or_else(mismatch)?;
        let rhs = other.data.broadcast(IxDyn(&dims)).ok_or_else(mismatch)?;
        let data = Zip::from(&lhs).and(&rhs).map_collect(|&a, &b| f(a, b));
        Ok(Self { data })
    }

    /// Element-wise addition with NumPy broadcasting.
    ///
    /// ```
    /// use ctr_layers::tensor::Tensor;
    ///
    /// let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    /// let b = Tensor::from_data(&[3], vec![10.0, 20.0, 30.0]).unwrap();
    /// let c = a.add(&b).unwrap();
    /// assert_eq!(c.to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    /// ```
    pub fn add(&self, other: &Tensor) -> LayerResult<Self> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise subtraction with broadcasting.
    pub fn sub(&self, other: &Tensor) -> LayerResult<Self> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise multiplication with broadcasting.
    pub fn mul(&self, other: &Tensor) -> LayerResult<Self> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Element-wise division with broadcasting.
    pub fn div(&self, other: &Tensor) -> LayerResult<Self> {
        self.zip_with(other, |a, b| a / b)
    }

    fn check_axis(&self, axis: usize) -> LayerResult<()> {
        if axis >= self.ndim() {
            return Err(LayerError::shape(
                TENSOR,
                format!("axis {} out of range for shape {:?}", axis, self.shape()),
            ));
        }
        Ok(())
    }

    /// Sums along `axis`, optionally keeping it as a size-1 axis.
    pub fn sum_axis(&self, axis: usize, keep_dim: bool) -> LayerResult<Self> {
        self.check_axis(axis)?;
        let mut data = self.data.sum_axis(Axis(axis));
        if keep_dim {
            data = data.insert_axis(Axis(axis));
        }
        Ok(Self { data })
    }

    /// Contracts the last axis of `self` against a `[k, n]` matrix.
    ///
    /// A `[..., k]` input produces a `[..., n]` output, which is how a dense
    /// projection is applied to rank-3 embedding tensors.
    pub fn matmul(&self, rhs: &Tensor) -> LayerResult<Self> {
        let k = self.shape().last().copied().unwrap_or(0);
        if self.ndim() < 2 || rhs.ndim() != 2 || rhs.shape()[0] != k || k == 0 {
            return Err(LayerError::shape(
                TENSOR,
                format!(
                    "cannot multiply {:?} by {:?}: inner dimensions must match",
                    self.shape(),
                    rhs.shape()
                ),
            ));
        }
        let n = rhs.shape()[1];
        let rows = self.numel() / k;
        let lhs = Array2::from_shape_vec((rows, k), self.to_vec()).map_err(|_| {
            LayerError::ShapeMismatch {
                expected: vec![rows, k],
                actual: self.shape().to_vec(),
            }
        })?;
        let product = lhs.dot(&rhs.view2()?);

        let mut shape = self.shape().to_vec();
        if let Some(last) = shape.last_mut() {
            *last = n;
        }
        Self::from_data(&shape, product.iter().copied().collect())
    }

    /// Concatenates tensors along `axis`.
    pub fn concat(tensors: &[Tensor], axis: usize) -> LayerResult<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| LayerError::shape(TENSOR, "cannot concatenate an empty list"))?;
        first.check_axis(axis)?;
        let views: Vec<ArrayViewD<'_, f32>> = tensors.iter().map(|t| t.data.view()).collect();
        let data = concatenate(Axis(axis), &views).map_err(|_| {
            let shapes: Vec<&[usize]> = tensors.iter().map(|t| t.shape()).collect();
            LayerError::shape(
                TENSOR,
                format!("cannot concatenate shapes {:?} along axis {}", shapes, axis),
            )
        })?;
        Ok(Self { data })
    }

    /// Gathers the given indices along `axis`, in order.
    pub fn select(&self, axis: usize, indices: &[usize]) -> LayerResult<Self> {
        self.check_axis(axis)?;
        let size = self.shape()[axis];
        if let Some(&bad) = indices.iter().find(|&&i| i >= size) {
            return Err(LayerError::shape(
                TENSOR,
                format!("index {} out of range for axis {} of size {}", bad, axis, size),
            ));
        }
        Ok(Self {
            data: self.data.select(Axis(axis), indices),
        })
    }

    /// Repeats a size-1 axis `times` times.
    pub fn repeat(&self, axis: usize, times: usize) -> LayerResult<Self> {
        self.check_axis(axis)?;
        if self.shape()[axis] != 1 {
            return Err(LayerError::shape(
                TENSOR,
                format!("can only repeat a size-1 axis, got {:?}", self.shape()),
            ));
        }
        let mut dims = self.shape().to_vec();
        dims[axis] = times;
        let view = self.data.broadcast(IxDyn(&dims)).ok_or_else(|| {
            LayerError::ShapeMismatch {
                expected: dims.clone(),
                actual: self.shape().to_vec(),
            }
        })?;
        Ok(Self {
            data: view.to_owned(),
        })
    }

    /// Normalized exponential along `axis`, shifted by the per-slice maximum
    /// so large logits do not overflow.
    pub fn softmax(&self, axis: usize) -> LayerResult<Self> {
        self.check_axis(axis)?;
        let max = self
            .data
            .fold_axis(Axis(axis), f32::NEG_INFINITY, |&m, &x| m.max(x))
            .insert_axis(Axis(axis));
        let exp = self.sub(&Self::from_array(max))?.map(f32::exp);
        let denom = exp.sum_axis(axis, true)?;
        exp.div(&denom)
    }

    pub(crate) fn view2(&self) -> LayerResult<ArrayView2<'_, f32>> {
        self.data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| {
                LayerError::shape(TENSOR, format!("expected rank 2, got {:?}", self.shape()))
            })
    }

    pub(crate) fn view3(&self) -> LayerResult<ArrayView3<'_, f32>> {
        self.data
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| {
                LayerError::shape(TENSOR, format!("expected rank 3, got {:?}", self.shape()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(shape: &[usize], data: Vec<f32>) -> Tensor {
        Tensor::from_data(shape, data).unwrap()
    }

    #[test]
    fn test_tensor_creation() {
        let z = Tensor::zeros(&[2, 3]);
        assert_eq!(z.shape(), &[2, 3]);
        assert!(z.to_vec().iter().all(|&x| x == 0.0));

        let o = Tensor::full(&[3], 2.5);
        assert_eq!(o.to_vec(), vec![2.5; 3]);

        assert!(Tensor::from_data(&[2, 2], vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_matmul_rank3() {
        let a = t(&[1, 2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = t(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), &[1, 2, 2]);
        assert_eq!(c.to_vec(), vec![22.0, 28.0, 49.0, 64.0]);

        let bad = t(&[2, 2], vec![0.0; 4]);
        assert!(a.matmul(&bad).unwrap_err().is_shape_error());
    }

    #[test]
    fn test_broadcast_ops() {
        let a = t(&[2, 1], vec![1.0, 2.0]);
        let b = t(&[3], vec![1.0, 2.0, 3.0]);
        assert_eq!(
            a.mul(&b).unwrap().to_vec(),
            vec![1.0, 2.0, 3.0, 2.0, 4.0, 6.0]
        );
        // (2, 1) against (4,) stretches both sides to (2, 4)
        let wide = a.add(&t(&[4], vec![0.0, 1.0, 2.0, 3.0])).unwrap();
        assert_eq!(wide.shape(), &[2, 4]);
        assert_eq!(wide.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 2.0, 3.0, 4.0, 5.0]);

        let err = t(&[2, 2], vec![0.0; 4])
            .add(&t(&[3], vec![0.0; 3]))
            .unwrap_err();
        assert!(matches!(err, LayerError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_sum_axis_keep_dim() {
        let a = t(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let s = a.sum_axis(1, true).unwrap();
        assert_eq!(s.shape(), &[2, 1]);
        assert_eq!(s.to_vec(), vec![6.0, 15.0]);
        assert_eq!(a.sum_axis(0, false).unwrap().to_vec(), vec![5.0, 7.0, 9.0]);
        assert!(a.sum_axis(2, false).is_err());
    }

    #[test]
    fn test_concat_select_repeat() {
        let a = t(&[1, 1, 2], vec![1.0, 2.0]);
        let b = t(&[1, 1, 2], vec![3.0, 4.0]);
        let c = Tensor::concat(&[a.clone(), b], 1).unwrap();
        assert_eq!(c.shape(), &[1, 2, 2]);

        let s = c.select(1, &[1, 0, 1]).unwrap();
        assert_eq!(s.to_vec(), vec![3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(c.select(1, &[2]).is_err());

        let r = a.repeat(1, 3).unwrap();
        assert_eq!(r.shape(), &[1, 3, 2]);
        assert_eq!(r.to_vec(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
        assert!(c.repeat(1, 2).is_err());
    }

    #[test]
    fn test_softmax_is_stable() {
        let a = t(&[1, 3], vec![1000.0, 1000.0, 1000.0]);
        let s = a.softmax(1).unwrap();
        for v in s.to_vec() {
            assert!((v - 1.0 / 3.0).abs() < 1e-6);
        }

        let b = t(&[2, 2], vec![0.0, 0.0, 1.0, 3.0]);
        let s = b.softmax(0).unwrap();
        let v = s.to_vec();
        assert!((v[0] + v[2] - 1.0).abs() < 1e-6);
        assert!((v[1] + v[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reshape() {
        let a = t(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = a.reshape(&[3, 2]).unwrap();
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(b.to_vec(), a.to_vec());
        assert!(a.reshape(&[4, 2]).is_err());
    }
}
