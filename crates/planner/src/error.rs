// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for lowering.

use model_ir::{OperandIndex, OperationIndex, SubgraphIndex};

/// Errors that can occur while lowering a subgraph.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("model has no {0}")]
    UnknownSubgraph(SubgraphIndex),

    /// Some operations can never become ready.
    #[error("{subgraph} has a dependency cycle through {remaining} operations")]
    Cycle { subgraph: SubgraphIndex, remaining: usize },

    /// An operation reads an operand that nothing writes.
    #[error("{subgraph}: {operation} reads {operand}, which is not constant, not an input and has no producer")]
    MissingProducer {
        subgraph: SubgraphIndex,
        operation: OperationIndex,
        operand: OperandIndex,
    },

    /// A plan does not describe its subgraph.
    #[error("invalid plan for {subgraph}: {detail}")]
    InvalidPlan { subgraph: SubgraphIndex, detail: String },
}
