// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax over the innermost axis.

/// Computes `exp(beta * (x - max)) / sum` independently for each run of
/// `depth` contiguous elements.
///
/// The maximum is subtracted before exponentiation so large logits do not
/// overflow. A `depth` of zero leaves the output untouched.
pub fn softmax(input: &[f32], output: &mut [f32], depth: usize, beta: f32) {
    if depth == 0 {
        return;
    }
    for (row_src, row_dst) in input.chunks(depth).zip(output.chunks_mut(depth)) {
        let max_val = row_src.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for (d, &s) in row_dst.iter_mut().zip(row_src) {
            let e = (beta * (s - max_val)).exp();
            *d = e;
            sum += e;
        }

        if sum > 0.0 {
            let inv_sum = 1.0 / sum;
            row_dst.iter_mut().for_each(|d| *d *= inv_sum);
        }
    }
}
