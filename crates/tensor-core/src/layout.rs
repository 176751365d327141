// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory layouts for rank-4 activations and the permutation between them.

use crate::{Shape, Tensor, TensorError, TensorView};

/// Axis order of a rank-4 tensor. Tensors of any other rank are
/// layout-agnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Batch, height, width, channels. The layout of TFLite models.
    #[default]
    Nhwc,
    /// Batch, channels, height, width.
    Nchw,
}

impl Layout {
    pub fn as_str(self) -> &'static str {
        match self {
            Layout::Nhwc => "nhwc",
            Layout::Nchw => "nchw",
        }
    }

    /// Converts a rank-4 shape expressed in `self` into the same logical
    /// tensor expressed in `to`.
    pub fn convert_shape(self, shape: &Shape, to: Layout) -> Shape {
        match (self, to, shape.dims()) {
            (Layout::Nchw, Layout::Nhwc, &[n, c, h, w]) => Shape::new(vec![n, h, w, c]),
            (Layout::Nhwc, Layout::Nchw, &[n, h, w, c]) => Shape::new(vec![n, c, h, w]),
            _ => shape.clone(),
        }
    }
}

/// Reorders `input`, laid out as `from`, into `to`.
///
/// Identical layouts and tensors whose rank is not 4 are copied unchanged.
pub fn permute(input: &TensorView<'_>, from: Layout, to: Layout) -> Result<Tensor, TensorError> {
    if from == to || input.shape().rank() != 4 {
        return Ok(input.to_tensor());
    }
    let src_dims = input.shape().dims();
    let out_shape = from.convert_shape(input.shape(), to);
    let elem = input.dtype().size_bytes();
    let src = input.as_bytes();
    let src_strides = input.shape().strides();
    let out_dims = out_shape.dims().to_vec();

    // out axis i reads source axis perm[i]
    let perm: [usize; 4] = match (from, to) {
        (Layout::Nchw, Layout::Nhwc) => [0, 2, 3, 1],
        (Layout::Nhwc, Layout::Nchw) => [0, 3, 1, 2],
        _ => return Err(TensorError::UnsupportedPermutation { rank: src_dims.len() }),
    };

    let mut out = Tensor::zeros(out_shape, input.dtype());
    let dst = out.as_bytes_mut();
    let mut flat = 0usize;
    for a in 0..out_dims[0] {
        for b in 0..out_dims[1] {
            for c in 0..out_dims[2] {
                for d in 0..out_dims[3] {
                    let idx = [a, b, c, d];
                    let mut src_elem = 0usize;
                    for (axis, &p) in perm.iter().enumerate() {
                        src_elem += idx[axis] * src_strides[p];
                    }
                    let s = src_elem * elem;
                    dst[flat * elem..(flat + 1) * elem].copy_from_slice(&src[s..s + elem]);
                    flat += 1;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nchw_to_nhwc() {
        // N=1, C=2, H=1, W=2
        let t = Tensor::from_f32(Shape::new(vec![1, 2, 1, 2]), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let p = permute(&t.view(), Layout::Nchw, Layout::Nhwc).unwrap();
        assert_eq!(p.shape(), &Shape::new(vec![1, 1, 2, 2]));
        assert_eq!(p.to_vec::<f32>(), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_permute_inverse() {
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let t = Tensor::from_f32(Shape::new(vec![1, 2, 3, 4]), &values).unwrap();
        let there = permute(&t.view(), Layout::Nhwc, Layout::Nchw).unwrap();
        let back = permute(&there.view(), Layout::Nchw, Layout::Nhwc).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_non_rank4_passthrough() {
        let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
        let p = permute(&t.view(), Layout::Nchw, Layout::Nhwc).unwrap();
        assert_eq!(p, t);
    }
}
