// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One subgraph: operand and operation tables plus designated I/O.
//!
//! Construction is append-only. Operands and operations are never removed,
//! so an index handed out once stays valid for the graph's lifetime.

use crate::{Data, IrError, Operand, OperandIndex, OperandInfo, Operation, OperationIndex};
use std::sync::Arc;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Graph {
    name: Option<String>,
    operands: Vec<Operand>,
    operations: Vec<Operation>,
    inputs: Vec<OperandIndex>,
    outputs: Vec<OperandIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    // ── Construction ───────────────────────────────────────────────

    /// Appends an operand and returns its index.
    pub fn add_operand(&mut self, info: OperandInfo) -> OperandIndex {
        let index = OperandIndex::new(self.operands.len() as u32);
        self.operands.push(Operand::new(info));
        index
    }

    pub fn add_named_operand(&mut self, info: OperandInfo, name: impl Into<String>) -> OperandIndex {
        let index = self.add_operand(info);
        self.operands[index.as_usize()].set_name(name);
        index
    }

    /// Attaches a constant value to an operand.
    ///
    /// Dense operands must receive exactly `shape × dtype` bytes; sparse ones
    /// store their compressed values and are not size-checked.
    pub fn set_operand_value(&mut self, index: OperandIndex, data: Arc<Data>) -> Result<(), IrError> {
        let count = self.operands.len();
        let operand = self
            .operands
            .get_mut(index.as_usize())
            .ok_or(IrError::UnknownOperand { operand: index, count })?;
        let expected = operand.info().total_size();
        if operand.info().type_info().sparsity().is_none() && data.len() != expected {
            return Err(IrError::ConstantSize {
                operand: index,
                expected,
                actual: data.len(),
            });
        }
        operand.set_data(data);
        Ok(())
    }

    /// Appends an operation, linking its producer and consumer edges.
    pub fn add_operation(&mut self, operation: Operation) -> Result<OperationIndex, IrError> {
        let index = OperationIndex::new(self.operations.len() as u32);
        for input in operation.defined_inputs() {
            self.check_operand(input)?;
        }
        for &output in operation.outputs() {
            let operand = self.check_operand(output)?;
            if operand.producer().is_some() {
                return Err(IrError::MultipleProducers { operand: output });
            }
            if operand.is_constant() {
                return Err(IrError::InvalidModel(format!(
                    "{} writes constant operand {output}",
                    operation.name()
                )));
            }
        }

        for input in operation.defined_inputs() {
            self.operands[input.as_usize()].add_consumer(index);
        }
        for &output in operation.outputs() {
            self.operands[output.as_usize()].set_producer(index);
        }
        self.operations.push(operation);
        Ok(index)
    }

    pub fn add_input(&mut self, index: OperandIndex) -> Result<(), IrError> {
        self.check_operand(index)?;
        self.inputs.push(index);
        Ok(())
    }

    pub fn add_output(&mut self, index: OperandIndex) -> Result<(), IrError> {
        self.check_operand(index)?;
        self.outputs.push(index);
        Ok(())
    }

    fn check_operand(&self, index: OperandIndex) -> Result<&Operand, IrError> {
        self.operands.get(index.as_usize()).ok_or(IrError::UnknownOperand {
            operand: index,
            count: self.operands.len(),
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn operand(&self, index: OperandIndex) -> Option<&Operand> {
        self.operands.get(index.as_usize())
    }

    /// Mutable access to operand metadata, for loaders and lowering.
    pub fn operand_mut(&mut self, index: OperandIndex) -> Option<&mut Operand> {
        self.operands.get_mut(index.as_usize())
    }

    pub fn operation(&self, index: OperationIndex) -> Option<&Operation> {
        self.operations.get(index.as_usize())
    }

    pub fn operands(&self) -> impl Iterator<Item = (OperandIndex, &Operand)> {
        self.operands
            .iter()
            .enumerate()
            .map(|(i, o)| (OperandIndex::new(i as u32), o))
    }

    pub fn operations(&self) -> impl Iterator<Item = (OperationIndex, &Operation)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(i, o)| (OperationIndex::new(i as u32), o))
    }

    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    pub fn num_operations(&self) -> usize {
        self.operations.len()
    }

    pub fn inputs(&self) -> &[OperandIndex] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OperandIndex] {
        &self.outputs
    }

    /// Bytes held by constant operands.
    pub fn constant_bytes(&self) -> usize {
        self.operands
            .iter()
            .filter_map(|o| o.data())
            .map(|d| d.len())
            .sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "'{}': {} operands ({} constant, {:.1} KB), {} operations, {} inputs, {} outputs",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.operands.len(),
            self.operands.iter().filter(|o| o.is_constant()).count(),
            self.constant_bytes() as f64 / 1024.0,
            self.operations.len(),
            self.inputs.len(),
            self.outputs.len(),
        )
    }
}
