// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A model: one or more subgraphs, with subgraph 0 as the entry point.
//!
//! # Type-State Pattern
//!
//! ```text
//! Model<Loaded>: subgraphs appended, references not yet checked.
//!       │  .validate()
//!       ▼
//! Model<Validated>: control-flow references resolve, ready for lowering.
//! ```
//!
//! Lowering and execution only accept `Model<Validated>`, so a dangling
//! subgraph reference can never reach the executor.

use crate::{Graph, IrError, SubgraphIndex};
use std::fmt;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: subgraphs have been appended but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: every cross-subgraph reference resolves.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for model states.
pub trait ModelState: fmt::Debug + Clone {}
impl ModelState for Loaded {}
impl ModelState for Validated {}

// ── Model ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Model<S: ModelState = Loaded> {
    description: Option<String>,
    subgraphs: Vec<Graph>,
    _state: std::marker::PhantomData<S>,
}

impl<S: ModelState> Model<S> {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn num_subgraphs(&self) -> usize {
        self.subgraphs.len()
    }

    pub fn subgraph(&self, index: SubgraphIndex) -> Option<&Graph> {
        self.subgraphs.get(index.as_usize())
    }

    pub fn subgraphs(&self) -> impl Iterator<Item = (SubgraphIndex, &Graph)> {
        self.subgraphs
            .iter()
            .enumerate()
            .map(|(i, g)| (SubgraphIndex::new(i as u32), g))
    }
}

// ── Loaded state ───────────────────────────────────────────────────

impl Model<Loaded> {
    pub fn new() -> Self {
        Self {
            description: None,
            subgraphs: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Appends a subgraph and returns its index.
    pub fn push_subgraph(&mut self, graph: Graph) -> SubgraphIndex {
        let index = SubgraphIndex::new(self.subgraphs.len() as u32);
        self.subgraphs.push(graph);
        index
    }

    /// Validates cross-subgraph references and transitions to `Validated`.
    ///
    /// # Checks
    /// - The model has at least one subgraph.
    /// - Every If/While references existing subgraphs.
    /// - Each If/While operand count agrees with the callee's declared I/O.
    pub fn validate(self) -> Result<Model<Validated>, IrError> {
        if self.subgraphs.is_empty() {
            return Err(IrError::InvalidModel("model contains no subgraphs".into()));
        }
        let count = self.subgraphs.len();

        for graph in &self.subgraphs {
            for (_, op) in graph.operations() {
                for sub in op.kind().referenced_subgraphs() {
                    if sub.as_usize() >= count {
                        return Err(IrError::UnknownSubgraph {
                            op: op.name(),
                            subgraph: sub,
                            count,
                        });
                    }
                }
                self.check_call_signature(op)?;
            }
            if graph.outputs().is_empty() {
                tracing::warn!("subgraph '{}' declares no outputs", graph.name().unwrap_or("<unnamed>"));
            }
        }
        tracing::debug!("validated model with {count} subgraphs");

        Ok(Model {
            description: self.description,
            subgraphs: self.subgraphs,
            _state: std::marker::PhantomData,
        })
    }

    fn check_call_signature(&self, op: &crate::Operation) -> Result<(), IrError> {
        use crate::OperationKind;
        // (callee, inputs passed to it, outputs it must supply)
        let calls: Vec<(SubgraphIndex, usize, Option<usize>)> = match op.kind() {
            OperationKind::If(p) => {
                let args = op.inputs().len() - 1;
                let outs = op.outputs().len();
                vec![(p.then_subgraph, args, Some(outs)), (p.else_subgraph, args, Some(outs))]
            }
            OperationKind::While(p) => {
                let vars = op.inputs().len();
                vec![(p.cond_subgraph, vars, None), (p.body_subgraph, vars, Some(vars))]
            }
            _ => return Ok(()),
        };
        for (callee, args, outs) in calls {
            let graph = &self.subgraphs[callee.as_usize()];
            if graph.inputs().len() != args || outs.is_some_and(|n| graph.outputs().len() != n) {
                return Err(IrError::InvalidModel(format!(
                    "{} passes {args} operands to {callee}, which declares {} inputs and {} outputs",
                    op.name(),
                    graph.inputs().len(),
                    graph.outputs().len(),
                )));
            }
        }
        Ok(())
    }
}

impl Default for Model<Loaded> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Model<Validated> {
    /// The entry subgraph.
    pub fn primary(&self) -> &Graph {
        // validate() guarantees at least one subgraph
        &self.subgraphs[0]
    }

    pub fn total_constant_bytes(&self) -> usize {
        self.subgraphs.iter().map(Graph::constant_bytes).sum()
    }

    pub fn summary(&self) -> String {
        let ops: usize = self.subgraphs.iter().map(Graph::num_operations).sum();
        format!(
            "Model '{}': {} subgraphs, {} operations, {:.2} MB constants",
            self.description.as_deref().unwrap_or("<unnamed>"),
            self.subgraphs.len(),
            ops,
            self.total_constant_bytes() as f64 / (1024.0 * 1024.0),
        )
    }

    /// Structural dump: subgraphs, operand metadata and operations.
    /// Constant payloads are reported by length only.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(serde::Serialize)]
        struct Dump<'a> {
            description: Option<&'a str>,
            subgraphs: &'a [Graph],
        }
        serde_json::to_string_pretty(&Dump {
            description: self.description.as_deref(),
            subgraphs: &self.subgraphs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IfParams, OperandInfo, Operation, OperationKind, TypeInfo, WhileParams};
    use tensor_core::{DType, Shape};

    fn passthrough_graph() -> Graph {
        let mut g = Graph::new();
        let x = g.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Float32)));
        g.add_input(x).unwrap();
        g.add_output(x).unwrap();
        g
    }

    fn if_graph(then_subgraph: u32) -> Graph {
        let mut g = Graph::new();
        let cond = g.add_operand(OperandInfo::new(Shape::scalar(), TypeInfo::new(DType::Bool8)));
        let x = g.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Float32)));
        let y = g.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Float32)));
        let kind = OperationKind::If(IfParams {
            then_subgraph: SubgraphIndex::new(then_subgraph),
            else_subgraph: SubgraphIndex::new(1),
        });
        g.add_operation(Operation::new(kind, vec![cond, x], vec![y]).unwrap())
            .unwrap();
        g
    }

    #[test]
    fn test_empty_model_rejected() {
        assert!(Model::new().validate().is_err());
    }

    #[test]
    fn test_control_flow_reference_checked() {
        let mut model = Model::new();
        model.push_subgraph(if_graph(7));
        model.push_subgraph(passthrough_graph());
        let err = model.validate().unwrap_err();
        assert!(matches!(err, IrError::UnknownSubgraph { count: 2, .. }));
    }

    #[test]
    fn test_valid_if_model() {
        let mut model = Model::new();
        model.set_description("branchy");
        model.push_subgraph(if_graph(1));
        model.push_subgraph(passthrough_graph());
        let model = model.validate().unwrap();
        assert_eq!(model.num_subgraphs(), 2);
        assert_eq!(model.primary().num_operations(), 1);
        assert!(model.summary().contains("branchy"));
        assert!(model.to_json().unwrap().contains("\"If\""));
    }

    #[test]
    fn test_while_body_signature_checked() {
        let mut main = Graph::new();
        let a = main.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
        let b = main.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
        let a2 = main.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
        let b2 = main.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
        let kind = OperationKind::While(WhileParams {
            cond_subgraph: SubgraphIndex::new(1),
            body_subgraph: SubgraphIndex::new(1),
        });
        main.add_operation(Operation::new(kind, vec![a, b], vec![a2, b2]).unwrap())
            .unwrap();

        let mut model = Model::new();
        model.push_subgraph(main);
        // one input, but the loop carries two variables
        model.push_subgraph(passthrough_graph());
        assert!(matches!(model.validate(), Err(IrError::InvalidModel(_))));
    }
}
