// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for IR construction and validation.

use crate::{OperandIndex, SubgraphIndex};

/// Errors raised while building or validating a graph.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// An operation or graph I/O list names an operand that does not exist.
    #[error("operand {operand} does not exist (graph has {count} operands)")]
    UnknownOperand { operand: OperandIndex, count: usize },

    /// An operation was given the wrong number of inputs or outputs.
    #[error("{op} expects {expected} {role}, got {actual}")]
    Arity {
        op: &'static str,
        role: &'static str,
        expected: String,
        actual: usize,
    },

    /// An operand is written by more than one operation.
    #[error("operand {operand} already has a producer")]
    MultipleProducers { operand: OperandIndex },

    /// A control-flow operation references a subgraph that is not in the model.
    #[error("{op} references {subgraph}, but the model has {count} subgraphs")]
    UnknownSubgraph {
        op: &'static str,
        subgraph: SubgraphIndex,
        count: usize,
    },

    /// A constant value does not match its operand's declared size.
    #[error("constant for operand {operand} has {actual} bytes, expected {expected}")]
    ConstantSize {
        operand: OperandIndex,
        expected: usize,
        actual: usize,
    },

    /// The model is structurally unusable.
    #[error("invalid model: {0}")]
    InvalidModel(String),
}
