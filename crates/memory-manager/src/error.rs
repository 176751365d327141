// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

use model_ir::OperandIndex;

/// Errors raised by the pool and the tensor managers.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The requested allocation would exceed the memory budget.
    #[error("out of memory: requested {requested_bytes} bytes, but only {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// A tensor slot was registered twice.
    #[error("tensor {0} is already registered")]
    AlreadyRegistered(OperandIndex),

    /// No tensor slot exists for the operand.
    #[error("tensor {0} is not registered")]
    UnknownTensor(OperandIndex),

    /// The tensor exists but holds no buffer.
    #[error("tensor {0} has no buffer")]
    BufferMissing(OperandIndex),

    /// A budget string could not be parsed.
    #[error("invalid memory budget '{0}': expected a positive number with an optional K, M or G suffix")]
    InvalidBudget(String),
}
