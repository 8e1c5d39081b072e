//! Partially static tensor shapes used for build-time validation.
//!
//! A layer is built before any data flows through it, so the batch axis (and
//! sometimes a sequence axis) is unknown at that point. [`Shape`] keeps one
//! optional size per axis, where `None` means "known only at call time".

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

/// Represents the (partially known) shape of a tensor.
///
/// # Examples
///
/// ```
/// use ctr_layers::shape::Shape;
///
/// let shape = Shape::batched(&[1, 4]);
/// assert_eq!(shape.ndim(), 3);
/// assert_eq!(shape[0], None);
/// assert_eq!(shape.last(), Some(4));
/// assert_eq!(shape.to_string(), "(None, 1, 4)");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Option<usize>>,
}

impl Shape {
    /// Creates a shape from optional per-axis sizes.
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self { dims }
    }

    /// Creates a fully static shape.
    pub fn of(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().copied().map(Some).collect(),
        }
    }

    /// Creates a shape with an unknown leading batch axis followed by `dims`.
    pub fn batched(dims: &[usize]) -> Self {
        let mut all = Vec::with_capacity(dims.len() + 1);
        all.push(None);
        all.extend(dims.iter().copied().map(Some));
        Self { dims: all }
    }

    /// Returns the rank.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Returns the size of `axis`, or `None` when unknown or out of range.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied().flatten()
    }

    /// Returns the size of the last axis, if known.
    pub fn last(&self) -> Option<usize> {
        self.dims.last().copied().flatten()
    }

    /// Returns the dimensions as a slice.
    pub fn as_slice(&self) -> &[Option<usize>] {
        &self.dims
    }

    /// Returns a copy with the last axis replaced by `size`.
    pub fn with_last(&self, size: usize) -> Self {
        let mut dims = self.dims.clone();
        if let Some(last) = dims.last_mut() {
            *last = Some(size);
        }
        Self { dims }
    }
}

impl Index<usize> for Shape {
    type Output = Option<usize>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.dims[index]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match dim {
                Some(d) => write!(f, "{}", d)?,
                None => write!(f, "None")?,
            }
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{}", self)
    }
}

/// Computes the NumPy broadcast of two concrete shapes.
///
/// Returns `None` if the shapes are not broadcast-compatible.
pub fn broadcast_dims(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        out[ndim - 1 - i] = match (da, db) {
            _ if da == db => da,
            (1, d) | (d, 1) => d,
            _ => return None,
        };
    }
    Some(out)
}
