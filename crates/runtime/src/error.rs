// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the runtime.
//!
//! Every failure here is terminal for the call that raised it. An executor
//! that returned an error can run again, but the outputs of the failed run
//! mean nothing.

use model_ir::{OperandIndex, OperationIndex, SubgraphIndex};
use tensor_core::{DType, Shape};

/// Shape problems found while binding inputs or resolving dynamic shapes.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("expected {expected} inputs, got {actual}")]
    InputCount { expected: usize, actual: usize },

    #[error("input {position} has dtype {actual}, graph declares {expected}")]
    InputDType { position: usize, expected: DType, actual: DType },

    #[error("input {position} has rank {actual}, graph declares {expected}")]
    InputRank { position: usize, expected: usize, actual: usize },

    /// Neither the backend nor the built-in rules can size this output.
    #[error("cannot infer output shape of {op} ({operation})")]
    Unresolvable { op: &'static str, operation: OperationIndex },

    #[error("{op}: {from} has {} elements, {to} has {}", .from.num_elements(), .to.num_elements())]
    ElementCount { op: &'static str, from: Shape, to: Shape },

    #[error("{op}: {detail}")]
    Invalid { op: &'static str, detail: String },
}

/// A backend kernel failed or does not exist.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("{op} is not supported by the {backend} backend ({detail})")]
    Unsupported { op: &'static str, backend: &'static str, detail: String },

    #[error("{op} failed: {source}")]
    Tensor {
        op: &'static str,
        #[source]
        source: tensor_core::TensorError,
    },

    #[error("{op} failed: {detail}")]
    Failed { op: &'static str, detail: String },
}

/// Umbrella error for loading, planning and executing.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("model loading failed: {0}")]
    Load(#[from] model_loader::LoadError),

    #[error("invalid model: {0}")]
    Ir(#[from] model_ir::IrError),

    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    #[error("planning failed: {0}")]
    Planner(#[from] planner::PlannerError),

    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// An operation was reached while one of its inputs had no buffer.
    #[error("{operand} is unallocated when {operation} needs it")]
    UnallocatedOperand { operand: OperandIndex, operation: OperationIndex },

    /// A subgraph was invoked while it was already running.
    #[error("{0} is already executing; nested re-entry is not allowed")]
    NonReentrant(SubgraphIndex),

    #[error("model has no {0}")]
    UnknownSubgraph(SubgraphIndex),

    #[error("configuration error: {0}")]
    Config(String),
}
