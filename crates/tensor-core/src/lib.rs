// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Element types, shapes and tensor containers shared by every nnrt crate.
//!
//! This crate provides:
//! - [`DType`]: the closed set of element types a model operand can carry.
//! - [`Shape`]: dimension lists with broadcasting and byte-size helpers.
//! - [`Layout`] and [`permute`]: NHWC/NCHW axis orders for rank-4 data.
//! - [`Tensor`], [`TensorView`], [`TensorViewMut`]: owned and borrowed
//!   byte-backed tensors.
//! - Reference kernels: clamp-style activations, leaky ReLU, tanh, logistic,
//!   broadcasting binary ops and comparisons, softmax, fully connected.
//!
//! # Design Goals
//! - Kernels write into caller-sized buffers and never allocate output.
//! - Byte buffers carry no alignment promise; typed access copies through
//!   `bytemuck`.
//! - Clean error types via `thiserror`.

mod dtype;
mod error;
mod layout;
mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use layout::{permute, Layout};
pub use ops::{
    broadcast_binary, broadcast_compare, clamp, fully_connected, leaky_relu, logistic, softmax, tanh,
};
pub use shape::Shape;
pub use tensor::{Tensor, TensorView, TensorViewMut};
