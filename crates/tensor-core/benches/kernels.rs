// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the reference kernels.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_core::{broadcast_binary, fully_connected, leaky_relu, softmax, Shape};

fn bench_activation(c: &mut Criterion) {
    let input: Vec<f32> = (0..65_536).map(|i| (i as f32 - 32_768.0) / 1000.0).collect();
    let mut output = vec![0.0f32; input.len()];
    c.bench_function("leaky_relu_64k", |b| {
        b.iter(|| leaky_relu(black_box(&input), &mut output, 0.1))
    });
}

fn bench_broadcast_add(c: &mut Criterion) {
    let lhs_shape = Shape::new(vec![64, 256]);
    let rhs_shape = Shape::new(vec![256]);
    let lhs = vec![1.0f32; lhs_shape.num_elements()];
    let rhs = vec![2.0f32; rhs_shape.num_elements()];
    let mut out = vec![0.0f32; lhs.len()];
    c.bench_function("broadcast_add_64x256", |b| {
        b.iter(|| {
            broadcast_binary(&lhs, &lhs_shape, &rhs, &rhs_shape, &mut out, &lhs_shape, |a, b| a + b)
        })
    });
}

fn bench_softmax(c: &mut Criterion) {
    let input: Vec<f32> = (0..32 * 1000).map(|i| (i % 17) as f32).collect();
    let mut output = vec![0.0f32; input.len()];
    c.bench_function("softmax_32x1000", |b| {
        b.iter(|| softmax(black_box(&input), &mut output, 1000, 1.0))
    });
}

fn bench_fully_connected(c: &mut Criterion) {
    let input = vec![0.5f32; 8 * 128];
    let weights = vec![0.25f32; 64 * 128];
    let bias = vec![1.0f32; 64];
    let mut output = vec![0.0f32; 8 * 64];
    c.bench_function("fully_connected_8x128x64", |b| {
        b.iter(|| fully_connected(black_box(&input), &weights, Some(&bias), &mut output, 128, 64))
    });
}

criterion_group!(
    benches,
    bench_activation,
    bench_broadcast_add,
    bench_softmax,
    bench_fully_connected
);
criterion_main!(benches);
