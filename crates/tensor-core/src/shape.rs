// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use crate::{DType, TensorError};
use std::fmt;

/// The extents of a tensor, outermost dimension first.
///
/// A rank-0 shape is a scalar holding one element. A shape with any zero
/// extent holds no elements and needs no bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Builds a shape from signed extents as they appear in serialized models.
    pub fn from_signed<T>(dims: &[T]) -> Result<Self, TensorError>
    where
        T: Copy + Into<i64>,
    {
        dims.iter()
            .enumerate()
            .map(|(axis, &d)| {
                let value: i64 = d.into();
                usize::try_from(value).map_err(|_| TensorError::NegativeDimension { axis, value })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements; 1 for a scalar.
    ///
    /// Saturates at `usize::MAX`. Shapes that come from outside the process
    /// go through [`Shape::checked_num_elements`] first.
    pub fn num_elements(&self) -> usize {
        self.checked_num_elements().unwrap_or(usize::MAX)
    }

    /// Element count, or `None` if it does not fit in `usize`.
    pub fn checked_num_elements(&self) -> Option<usize> {
        if self.dims.contains(&0) {
            return Some(0);
        }
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Computes the memory footprint in bytes for a given [`DType`].
    ///
    /// Saturates like [`Shape::num_elements`].
    pub fn size_bytes(&self, dtype: DType) -> usize {
        self.checked_size_bytes(dtype).unwrap_or(usize::MAX)
    }

    /// Byte footprint, or `None` if it does not fit in `usize`.
    pub fn checked_size_bytes(&self, dtype: DType) -> Option<usize> {
        self.checked_num_elements()?.checked_mul(dtype.size_bytes())
    }

    /// Row-major (C-order) element strides.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1].saturating_mul(self.dims[i + 1]);
        }
        strides
    }

    /// Returns the numpy-style broadcast of two shapes, or `None` if some
    /// right-aligned pair of extents differs and neither is 1.
    ///
    /// ```
    /// use tensor_core::Shape;
    /// let a = Shape::new(vec![4, 1, 3]);
    /// let b = Shape::new(vec![2, 1]);
    /// assert_eq!(a.broadcast(&b), Some(Shape::new(vec![4, 2, 3])));
    /// ```
    pub fn broadcast(&self, other: &Shape) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims = vec![0usize; rank];
        for (i, slot) in dims.iter_mut().enumerate() {
            let a = self.aligned_dim(i, rank);
            let b = other.aligned_dim(i, rank);
            *slot = match (a, b) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                _ => return None,
            };
        }
        Some(Shape::new(dims))
    }

    /// Extent of axis `i` when this shape is right-aligned to `rank`; missing
    /// leading axes read as 1.
    pub(crate) fn aligned_dim(&self, i: usize, rank: usize) -> usize {
        let offset = rank - self.rank();
        if i < offset {
            1
        } else {
            self.dims[i - offset]
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_empty_extent() {
        let s = Shape::new(vec![3, 0, 2]);
        assert_eq!(s.num_elements(), 0);
        assert_eq!(s.size_bytes(DType::Float32), 0);
    }

    #[test]
    fn test_strides() {
        assert_eq!(Shape::vector(5).strides(), vec![1]);
        assert_eq!(Shape::new(vec![2, 3, 4]).strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_broadcast() {
        let a = Shape::new(vec![1, 3]);
        assert_eq!(a.broadcast(&Shape::new(vec![4, 3])), Some(Shape::new(vec![4, 3])));
        assert_eq!(a.broadcast(&Shape::scalar()), Some(a.clone()));
        assert_eq!(a.broadcast(&Shape::new(vec![4, 2])), None);
    }

    #[test]
    fn test_from_signed() {
        assert_eq!(Shape::from_signed(&[1i32, 2, 3]).unwrap(), Shape::new(vec![1, 2, 3]));
        let err = Shape::from_signed(&[1i32, -1]).unwrap_err();
        assert!(matches!(err, TensorError::NegativeDimension { axis: 1, value: -1 }));
    }

    #[test]
    fn test_checked_counts_overflow() {
        let huge = Shape::new(vec![65536; 4]);
        assert_eq!(huge.checked_num_elements(), None);
        assert_eq!(huge.checked_size_bytes(DType::Float32), None);
        assert_eq!(huge.num_elements(), usize::MAX);

        let bytes_only = Shape::new(vec![usize::MAX / 2]);
        assert!(bytes_only.checked_num_elements().is_some());
        assert_eq!(bytes_only.checked_size_bytes(DType::Float32), None);

        // A zero extent holds nothing however large the others are.
        let empty = Shape::new(vec![usize::MAX, usize::MAX, 0]);
        assert_eq!(empty.checked_num_elements(), Some(0));
        assert_eq!(empty.checked_size_bytes(DType::Int64), Some(0));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::new(vec![2, 3, 4])), "[2, 3, 4]");
        assert_eq!(format!("{}", Shape::scalar()), "[]");
    }

    #[test]
    fn test_size_bytes() {
        let s = Shape::new(vec![10, 20]);
        assert_eq!(s.size_bytes(DType::Float32), 800);
        assert_eq!(s.size_bytes(DType::Int64), 1600);
        assert_eq!(s.size_bytes(DType::QuantInt8Symm), 200);
    }
}
