// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for end-to-end execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model_loader::builder::{BuiltinOptions, ModelBuilder, OperatorDef, SubgraphDef, TensorDef};
use model_loader::schema::{activation, tensor_type, BuiltinOperator as Op};
use runtime::{InferenceSession, IoDescription, Ready, RuntimeConfig};
use tensor_core::{Shape, Tensor};

/// x[1, 256] ─FC(256→256, RELU)─► h ─LeakyRelu─► y
fn mlp_session() -> InferenceSession<Ready> {
    let mut sg = SubgraphDef::new("mlp");
    let x = sg.add_tensor(TensorDef::new("x", tensor_type::FLOAT32, &[1, 256]));
    let w = sg.add_tensor(TensorDef::new("w", tensor_type::FLOAT32, &[256, 256]).with_f32s(&[0.01; 256 * 256]));
    let h = sg.add_tensor(TensorDef::new("h", tensor_type::FLOAT32, &[1, 256]));
    let y = sg.add_tensor(TensorDef::new("y", tensor_type::FLOAT32, &[1, 256]));
    sg.set_inputs(&[x]).set_outputs(&[y]);
    sg.add_operator(
        OperatorDef::builtin(Op::FULLY_CONNECTED, &[x, w, -1], &[h])
            .with_options(BuiltinOptions::fully_connected(activation::RELU)),
    );
    sg.add_operator(OperatorDef::builtin(Op::LEAKY_RELU, &[h], &[y]).with_options(BuiltinOptions::leaky_relu(0.1)));

    let model = model_loader::load_from_buffer(ModelBuilder::new().with_subgraph(sg).build()).expect("model loads");
    let config = RuntimeConfig { enable_profiling: false, ..Default::default() };
    InferenceSession::from_model(config, model).prepare().expect("session prepares")
}

fn bench_static_execution(c: &mut Criterion) {
    let session = mlp_session();
    let io = IoDescription::new(vec![Tensor::from_f32(Shape::new(vec![1, 256]), &[0.5; 256]).expect("input")]);
    c.bench_function("mlp_static_1x256", |b| b.iter(|| session.run(black_box(&io)).expect("run")));
}

fn bench_dynamic_batch(c: &mut Criterion) {
    let session = mlp_session();
    // Alternating batch sizes force shape inference and reallocation.
    let small = IoDescription::new(vec![Tensor::from_f32(Shape::new(vec![1, 256]), &[0.5; 256]).expect("input")]);
    let large = IoDescription::new(vec![Tensor::from_f32(Shape::new(vec![8, 256]), &[0.5; 8 * 256]).expect("input")]);
    c.bench_function("mlp_dynamic_batch", |b| {
        b.iter(|| {
            session.run(black_box(&large)).expect("run");
            session.run(black_box(&small)).expect("run");
        })
    });
}

criterion_group!(benches, bench_static_execution, bench_dynamic_batch);
criterion_main!(benches);
