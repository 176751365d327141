// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Broadcasting binary operations.

use crate::{Shape, TensorError};

/// Maps every output coordinate to the flat offsets it reads in `lhs` and
/// `rhs` under numpy broadcasting, then calls `f` with both offsets.
fn for_each_broadcast(
    lhs: &Shape,
    rhs: &Shape,
    out: &Shape,
    mut f: impl FnMut(usize, usize, usize),
) {
    let rank = out.rank();
    let lhs_strides = broadcast_strides(lhs, rank);
    let rhs_strides = broadcast_strides(rhs, rank);
    let out_dims = out.dims();
    let mut index = vec![0usize; rank];

    for flat in 0..out.num_elements() {
        let (mut l, mut r) = (0usize, 0usize);
        for axis in 0..rank {
            l += index[axis] * lhs_strides[axis];
            r += index[axis] * rhs_strides[axis];
        }
        f(flat, l, r);

        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < out_dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

/// Strides of `shape` right-aligned to `rank`, with broadcast axes at 0.
fn broadcast_strides(shape: &Shape, rank: usize) -> Vec<usize> {
    let own = shape.strides();
    let offset = rank - shape.rank();
    (0..rank)
        .map(|axis| {
            if axis < offset || shape.aligned_dim(axis, rank) == 1 {
                0
            } else {
                own[axis - offset]
            }
        })
        .collect()
}

fn check_shapes(
    op: &'static str,
    lhs: &Shape,
    rhs: &Shape,
    out: &Shape,
) -> Result<(), TensorError> {
    match lhs.broadcast(rhs) {
        Some(expected) if &expected == out => Ok(()),
        Some(expected) => Err(TensorError::ShapeMismatch {
            op,
            lhs: expected,
            rhs: out.clone(),
        }),
        None => Err(TensorError::ShapeMismatch {
            op,
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }),
    }
}

/// Computes `out[i] = f(lhs[i'], rhs[i''])` with broadcasting.
///
/// ```
/// use tensor_core::{broadcast_binary, Shape};
/// let mut out = [0.0f32; 4];
/// broadcast_binary(
///     &[1.0, 2.0], &Shape::new(vec![2, 1]),
///     &[10.0, 20.0], &Shape::new(vec![2]),
///     &mut out, &Shape::new(vec![2, 2]),
///     |a, b| a + b,
/// ).unwrap();
/// assert_eq!(out, [11.0, 21.0, 12.0, 22.0]);
/// ```
pub fn broadcast_binary<T: Copy>(
    lhs: &[T],
    lhs_shape: &Shape,
    rhs: &[T],
    rhs_shape: &Shape,
    out: &mut [T],
    out_shape: &Shape,
    f: impl Fn(T, T) -> T,
) -> Result<(), TensorError> {
    check_shapes("broadcast_binary", lhs_shape, rhs_shape, out_shape)?;
    for_each_broadcast(lhs_shape, rhs_shape, out_shape, |o, l, r| {
        out[o] = f(lhs[l], rhs[r]);
    });
    Ok(())
}

/// Like [`broadcast_binary`] but writes a boolean byte per element.
pub fn broadcast_compare<T: Copy>(
    lhs: &[T],
    lhs_shape: &Shape,
    rhs: &[T],
    rhs_shape: &Shape,
    out: &mut [u8],
    out_shape: &Shape,
    f: impl Fn(T, T) -> bool,
) -> Result<(), TensorError> {
    check_shapes("broadcast_compare", lhs_shape, rhs_shape, out_shape)?;
    for_each_broadcast(lhs_shape, rhs_shape, out_shape, |o, l, r| {
        out[o] = u8::from(f(lhs[l], rhs[r]));
    });
    Ok(())
}
