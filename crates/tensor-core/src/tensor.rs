// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned tensors and borrowed views.
//!
//! [`Tensor`] is what callers hand to and receive from the executor.
//! [`TensorView`] and [`TensorViewMut`] are what kernels see: a shape, a
//! dtype and a byte slice borrowed from wherever the buffer lives (a pool
//! allocation, a cached constant, or caller memory).
//!
//! Byte buffers carry no alignment guarantee, so typed reads go through
//! `bytemuck` copies rather than in-place reinterpretation.

use crate::{DType, Shape, TensorError};
use bytemuck::Pod;

/// An owned, row-major tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a tensor filled with zero bytes.
    ///
    /// ```
    /// use tensor_core::{DType, Shape, Tensor};
    /// let t = Tensor::zeros(Shape::new(vec![2, 3]), DType::Float32);
    /// assert_eq!(t.size_bytes(), 24);
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw bytes, checking the length against
    /// `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates a tensor from typed values.
    pub fn from_values<T: Pod>(shape: Shape, dtype: DType, values: &[T]) -> Result<Self, TensorError> {
        Self::from_bytes(shape, dtype, bytemuck::cast_slice(values).to_vec())
    }

    /// Creates a `Float32` tensor.
    ///
    /// ```
    /// use tensor_core::{Shape, Tensor};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_vec::<f32>(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_values(shape, DType::Float32, values)
    }

    /// Creates an `Int32` tensor.
    pub fn from_i32(shape: Shape, values: &[i32]) -> Result<Self, TensorError> {
        Self::from_values(shape, DType::Int32, values)
    }

    /// Creates a `Bool8` tensor.
    pub fn from_bool(shape: Shape, values: &[bool]) -> Result<Self, TensorError> {
        let bytes = values.iter().map(|&b| u8::from(b)).collect();
        Self::from_bytes(shape, DType::Bool8, bytes)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView::from_parts(&self.shape, self.dtype, &self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Copies the elements out as `T`.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        self.view().to_vec()
    }
}

/// A borrowed, read-only tensor.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    dtype: DType,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    pub fn from_parts(shape: &'a Shape, dtype: DType, data: &'a [u8]) -> Self {
        Self { shape, dtype, data }
    }

    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Copies the elements out as `T`, tolerating unaligned storage.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(self.data)
    }

    /// Reads an integer vector (`Int32` or `Int64`) widened to `i64`.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        match self.dtype {
            DType::Int32 => Ok(self.to_vec::<i32>().into_iter().map(i64::from).collect()),
            DType::Int64 => Ok(self.to_vec::<i64>()),
            dtype => Err(TensorError::UnsupportedDType {
                op: "read integer vector",
                dtype,
            }),
        }
    }

    /// Makes an owned copy.
    pub fn to_tensor(&self) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            dtype: self.dtype,
            data: self.data.to_vec(),
        }
    }
}

/// A borrowed, writable tensor.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    shape: &'a Shape,
    dtype: DType,
    data: &'a mut [u8],
}

impl<'a> TensorViewMut<'a> {
    pub fn from_parts(shape: &'a Shape, dtype: DType, data: &'a mut [u8]) -> Self {
        Self { shape, dtype, data }
    }

    pub fn shape(&self) -> &Shape {
        self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Writes typed values into the buffer. The value count must cover the
    /// buffer exactly.
    pub fn write<T: Pod>(&mut self, values: &[T]) -> Result<(), TensorError> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        if bytes.len() != self.data.len() {
            return Err(TensorError::BufferSizeMismatch {
                expected: self.data.len(),
                actual: bytes.len(),
            });
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::new(vec![2, 3]), DType::Float32);
        assert_eq!(t.size_bytes(), 24);
        assert!(t.to_vec::<f32>().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Tensor::from_bytes(Shape::new(vec![2, 3]), DType::Float32, vec![0u8; 10]);
        assert!(matches!(
            result,
            Err(TensorError::BufferSizeMismatch { expected: 24, actual: 10 })
        ));
    }

    #[test]
    fn test_unaligned_view_read() {
        let mut raw = vec![0u8; 9];
        raw[1..5].copy_from_slice(&2.5f32.to_ne_bytes());
        raw[5..9].copy_from_slice(&(-1.0f32).to_ne_bytes());
        let shape = Shape::vector(2);
        let view = TensorView::from_parts(&shape, DType::Float32, &raw[1..]);
        assert_eq!(view.to_vec::<f32>(), vec![2.5, -1.0]);
    }

    #[test]
    fn test_int_widening() {
        let t = Tensor::from_i32(Shape::vector(3), &[1, -2, 3]).unwrap();
        assert_eq!(t.view().to_i64_vec().unwrap(), vec![1, -2, 3]);
        let f = Tensor::from_f32(Shape::vector(1), &[1.0]).unwrap();
        assert!(f.view().to_i64_vec().is_err());
    }

    #[test]
    fn test_view_mut_write() {
        let shape = Shape::vector(2);
        let mut buf = vec![0u8; 8];
        let mut out = TensorViewMut::from_parts(&shape, DType::Float32, &mut buf);
        out.write(&[1.0f32, 2.0]).unwrap();
        assert!(out.write(&[1.0f32]).is_err());
        assert_eq!(Tensor::from_bytes(shape.clone(), DType::Float32, buf).unwrap().to_vec::<f32>(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_bool_tensor() {
        let t = Tensor::from_bool(Shape::vector(2), &[true, false]).unwrap();
        assert_eq!(t.as_bytes(), &[1, 0]);
    }
}
