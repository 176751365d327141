// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kernel invocation contract between the executor and compute backends.
//!
//! The executor never computes anything itself. For each operation it binds
//! the input buffers as [`TensorView`]s (absent optional inputs are `None`),
//! binds the output buffers as [`TensorViewMut`]s sized to their final
//! shapes, and hands both to [`Backend::execute`].

mod cpu;

pub use cpu::CpuBackend;

use crate::{KernelError, ShapeError};
use model_ir::Operation;
use tensor_core::{Shape, TensorView, TensorViewMut};

/// A compute backend.
///
/// Implementations must be shareable across executors; each executor
/// serializes its own calls, but two executors may call concurrently.
pub trait Backend: Send + Sync {
    /// Short name for logs and errors.
    fn name(&self) -> &'static str;

    /// Output shapes for `op`, if this backend knows better than the
    /// built-in rules. `None` defers to
    /// [`shape_inference::infer`](crate::shape_inference::infer).
    fn infer_output_shapes(
        &self,
        _op: &Operation,
        _inputs: &[Option<TensorView<'_>>],
    ) -> Option<Result<Vec<Shape>, ShapeError>> {
        None
    }

    /// Runs `op`. Output buffers are zeroed or hold the previous run's data.
    fn execute(
        &self,
        op: &Operation,
        inputs: &[Option<TensorView<'_>>],
        outputs: &mut [TensorViewMut<'_>],
    ) -> Result<(), KernelError>;
}
