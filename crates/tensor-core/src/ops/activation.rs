// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise activations.

/// Clamps every element to `[lower, upper]`.
///
/// ReLU is `(0, inf)`, ReLU1 is `(-1, 1)` and ReLU6 is `(0, 6)`.
pub fn clamp(input: &[f32], output: &mut [f32], lower: f32, upper: f32) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = x.max(lower).min(upper);
    }
}

/// `x` for non-negative inputs, `alpha * x` otherwise.
///
/// ```
/// let mut out = [0.0f32; 3];
/// tensor_core::leaky_relu(&[2.0, 0.0, -4.0], &mut out, 0.5);
/// assert_eq!(out, [2.0, 0.0, -2.0]);
/// ```
pub fn leaky_relu(input: &[f32], output: &mut [f32], alpha: f32) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = if x < 0.0 { alpha * x } else { x };
    }
}

/// Scaled hyperbolic tangent: `alpha * tanh(beta * x)`.
pub fn tanh(input: &[f32], output: &mut [f32], alpha: f32, beta: f32) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = alpha * (beta * x).tanh();
    }
}

/// Sigmoid: `1 / (1 + exp(-x))`.
pub fn logistic(input: &[f32], output: &mut [f32]) {
    for (o, &x) in output.iter_mut().zip(input) {
        *o = 1.0 / (1.0 + (-x).exp());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu6_clamp() {
        let mut out = [0.0f32; 4];
        clamp(&[-3.0, 2.0, 7.0, 6.0], &mut out, 0.0, 6.0);
        assert_eq!(out, [0.0, 2.0, 6.0, 6.0]);
    }

    #[test]
    fn test_relu_unbounded() {
        let mut out = [0.0f32; 2];
        clamp(&[-1.0, 1e9], &mut out, 0.0, f32::INFINITY);
        assert_eq!(out, [0.0, 1e9]);
    }

    #[test]
    fn test_leaky_relu() {
        let input = [0.0f32, 1.0, 3.0, 1.0, -1.0, -2.0];
        let mut out = [0.0f32; 6];
        leaky_relu(&input, &mut out, 0.5);
        assert_eq!(out, [0.0, 1.0, 3.0, 1.0, -0.5, -1.0]);
    }

    #[test]
    fn test_logistic_midpoint() {
        let mut out = [0.0f32; 1];
        logistic(&[0.0], &mut out);
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tanh_scaled() {
        let mut out = [0.0f32; 1];
        tanh(&[0.5], &mut out, 2.0, 1.0);
        assert!((out[0] - 2.0 * 0.5f32.tanh()).abs() < 1e-6);
    }
}
