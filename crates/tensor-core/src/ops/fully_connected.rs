// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fully connected (dense) layer.

use crate::{Shape, TensorError};

/// Computes `output[b, o] = sum_i input[b, i] * weights[o, i] + bias[o]`.
///
/// `weights` is row-major `[out_features, in_features]`, the layout TFLite
/// stores. `input` holds `batch * in_features` elements and `output` holds
/// `batch * out_features`.
pub fn fully_connected(
    input: &[f32],
    weights: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
    in_features: usize,
    out_features: usize,
) -> Result<(), TensorError> {
    if in_features == 0 || weights.len() != in_features * out_features || input.len() % in_features != 0 {
        return Err(TensorError::ShapeMismatch {
            op: "fully_connected",
            lhs: Shape::vector(input.len()),
            rhs: Shape::new(vec![out_features, in_features]),
        });
    }
    let batch = input.len() / in_features;
    if output.len() != batch * out_features || bias.is_some_and(|b| b.len() != out_features) {
        return Err(TensorError::ShapeMismatch {
            op: "fully_connected (output)",
            lhs: Shape::new(vec![batch, out_features]),
            rhs: Shape::vector(output.len()),
        });
    }

    for (row, out_row) in input.chunks(in_features).zip(output.chunks_mut(out_features)) {
        for (o, dst) in out_row.iter_mut().enumerate() {
            let w = &weights[o * in_features..(o + 1) * in_features];
            let dot: f32 = row.iter().zip(w).map(|(x, y)| x * y).sum();
            *dst = dot + bias.map_or(0.0, |b| b[o]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_weights() {
        let mut out = [0.0f32; 2];
        fully_connected(&[3.0, 4.0], &[1.0, 0.0, 0.0, 1.0], None, &mut out, 2, 2).unwrap();
        assert_eq!(out, [3.0, 4.0]);
    }

    #[test]
    fn test_bias_and_batch() {
        // batch 2, in 2, out 1
        let mut out = [0.0f32; 2];
        fully_connected(&[1.0, 2.0, 3.0, 4.0], &[1.0, 1.0], Some(&[0.5]), &mut out, 2, 1).unwrap();
        assert_eq!(out, [3.5, 7.5]);
    }

    #[test]
    fn test_weight_mismatch() {
        let mut out = [0.0f32; 2];
        assert!(fully_connected(&[1.0, 2.0], &[1.0], None, &mut out, 2, 2).is_err());
    }
}
