// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};

/// Errors raised by tensor construction, permutation and reference kernels.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The byte buffer does not match `shape × dtype`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two shapes cannot be combined by the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The element type is not handled by this routine.
    #[error("unsupported dtype {dtype} for {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A dimension list contained a negative extent.
    #[error("negative dimension {value} at axis {axis}")]
    NegativeDimension { axis: usize, value: i64 },

    /// `shape × dtype` does not fit in `usize`.
    #[error("{shape} of {dtype} overflows the addressable size")]
    SizeOverflow { shape: Shape, dtype: DType },

    /// A layout permutation was requested for a tensor it does not apply to.
    #[error("cannot permute rank-{rank} tensor between layouts")]
    UnsupportedPermutation { rank: usize },
}
