// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operand metadata: element type, quantization, sparsity and shape.

use tensor_core::{DType, Shape};

/// Compressed layout of a 2-D sparse constant: the outer dimension is
/// dense and the inner one is CSR-encoded.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SparsityInfo {
    /// Row start offsets into `w1_indices`, one more than the row count.
    pub w1_segments: Vec<u16>,
    /// Column index of each stored value.
    pub w1_indices: Vec<u16>,
}

/// Element type plus the single scale/zero-point pair the runtime supports.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TypeInfo {
    dtype: DType,
    scale: f32,
    zero_point: i32,
    sparsity: Option<SparsityInfo>,
}

impl TypeInfo {
    /// An unquantized type.
    pub fn new(dtype: DType) -> Self {
        Self::quantized(dtype, 0.0, 0)
    }

    pub fn quantized(dtype: DType, scale: f32, zero_point: i32) -> Self {
        Self {
            dtype,
            scale,
            zero_point,
            sparsity: None,
        }
    }

    pub fn with_sparsity(mut self, sparsity: SparsityInfo) -> Self {
        self.sparsity = Some(sparsity);
        self
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zero_point(&self) -> i32 {
        self.zero_point
    }

    pub fn sparsity(&self) -> Option<&SparsityInfo> {
        self.sparsity.as_ref()
    }

    pub fn set_dtype(&mut self, dtype: DType) {
        self.dtype = dtype;
    }
}

/// Shape and type of one operand.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OperandInfo {
    shape: Shape,
    type_info: TypeInfo,
    dynamic: bool,
}

impl OperandInfo {
    pub fn new(shape: Shape, type_info: TypeInfo) -> Self {
        Self {
            shape,
            type_info,
            dynamic: false,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    pub fn dtype(&self) -> DType {
        self.type_info.dtype
    }

    /// Dense byte size implied by shape and dtype.
    pub fn total_size(&self) -> usize {
        self.shape.size_bytes(self.type_info.dtype)
    }

    /// Like [`OperandInfo::total_size`], but `None` when the size overflows.
    pub fn checked_total_size(&self) -> Option<usize> {
        self.shape.checked_size_bytes(self.type_info.dtype)
    }

    /// `true` once the operand's shape is known to be decided at run time.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn set_dynamic(&mut self) {
        self.dynamic = true;
    }

    pub fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub fn type_info_mut(&mut self) -> &mut TypeInfo {
        &mut self.type_info
    }
}
