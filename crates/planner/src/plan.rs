// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution plan: the contract between lowering and the executor.
//!
//! A plan fixes three things for one subgraph:
//!
//! 1. The order operations run in, never changed at run time.
//! 2. The liveness annotations: which operands may be released after
//!    which operation.
//! 3. Which operands are dynamic and must never be allocated statically.

use crate::PlannerError;
use model_ir::{Graph, OperandIndex, OperationIndex, SubgraphIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Lowered form of one subgraph.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionPlan {
    pub(crate) subgraph: SubgraphIndex,
    pub(crate) order: Vec<OperationIndex>,
    pub(crate) releases: BTreeMap<OperationIndex, Vec<OperandIndex>>,
    pub(crate) dynamic: BTreeSet<OperandIndex>,
}

impl ExecutionPlan {
    pub fn subgraph(&self) -> SubgraphIndex {
        self.subgraph
    }

    /// Operations in execution order.
    pub fn order(&self) -> &[OperationIndex] {
        &self.order
    }

    /// Operands whose buffers are no longer needed once `operation` has run.
    pub fn releases_after(&self, operation: OperationIndex) -> &[OperandIndex] {
        self.releases.get(&operation).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every liveness annotation as `(operation, operand)` pairs.
    pub fn dealloc_annotations(&self) -> impl Iterator<Item = (OperationIndex, OperandIndex)> + '_ {
        self.releases
            .iter()
            .flat_map(|(&op, operands)| operands.iter().map(move |&operand| (op, operand)))
    }

    pub fn is_dynamic(&self, operand: OperandIndex) -> bool {
        self.dynamic.contains(&operand)
    }

    pub fn dynamic_operands(&self) -> impl Iterator<Item = OperandIndex> + '_ {
        self.dynamic.iter().copied()
    }

    pub fn num_operations(&self) -> usize {
        self.order.len()
    }

    /// Checks the plan against the graph it was built for.
    ///
    /// - Every operation appears exactly once.
    /// - Producers run before their consumers.
    /// - Every annotation names an operation in the plan.
    pub fn validate(&self, graph: &Graph) -> Result<(), PlannerError> {
        let invalid = |detail: String| PlannerError::InvalidPlan { subgraph: self.subgraph, detail };

        if self.order.len() != graph.num_operations() {
            return Err(invalid(format!(
                "plan orders {} operations, graph has {}",
                self.order.len(),
                graph.num_operations()
            )));
        }

        let mut position = vec![None; graph.num_operations()];
        for (pos, &op) in self.order.iter().enumerate() {
            match position.get_mut(op.as_usize()) {
                None => return Err(invalid(format!("{op} is not in the graph"))),
                Some(Some(_)) => return Err(invalid(format!("{op} is scheduled twice"))),
                Some(slot) => *slot = Some(pos),
            }
        }

        for (index, op) in graph.operations() {
            let consumer_pos = position[index.as_usize()];
            for input in op.defined_inputs() {
                let producer = graph.operand(input).and_then(|o| o.producer());
                if let Some(producer) = producer {
                    if position[producer.as_usize()] > consumer_pos {
                        return Err(invalid(format!("{index} runs before {producer}, which writes {input}")));
                    }
                }
            }
        }

        if let Some(op) = self.releases.keys().find(|op| op.as_usize() >= graph.num_operations()) {
            return Err(invalid(format!("release annotated after unknown {op}")));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "Plan for {}: {} operations, {} release points, {} dynamic operands",
            self.subgraph,
            self.order.len(),
            self.releases.len(),
            self.dynamic.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{Operation, OperationKind, OperandInfo, TypeInfo};
    use tensor_core::{DType, Shape};

    /// x -> Shape -> y -> Rank -> z
    fn chain() -> Graph {
        let mut g = Graph::new();
        let info = || OperandInfo::new(Shape::vector(2), TypeInfo::new(DType::Int32));
        let x = g.add_operand(info());
        let y = g.add_operand(info());
        let z = g.add_operand(OperandInfo::new(Shape::scalar(), TypeInfo::new(DType::Int32)));
        g.add_operation(Operation::new(OperationKind::Shape, vec![x], vec![y]).unwrap()).unwrap();
        g.add_operation(Operation::new(OperationKind::Rank, vec![y], vec![z]).unwrap()).unwrap();
        g.add_input(x).unwrap();
        g.add_output(z).unwrap();
        g
    }

    fn plan(order: &[u32]) -> ExecutionPlan {
        ExecutionPlan {
            subgraph: SubgraphIndex::PRIMARY,
            order: order.iter().map(|&i| OperationIndex::new(i)).collect(),
            releases: BTreeMap::new(),
            dynamic: BTreeSet::new(),
        }
    }

    #[test]
    fn test_validate_ok() {
        plan(&[0, 1]).validate(&chain()).unwrap();
    }

    #[test]
    fn test_validate_wrong_count() {
        assert!(matches!(plan(&[0]).validate(&chain()), Err(PlannerError::InvalidPlan { .. })));
    }

    #[test]
    fn test_validate_duplicate() {
        let err = plan(&[0, 0]).validate(&chain()).unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_validate_consumer_first() {
        let err = plan(&[1, 0]).validate(&chain()).unwrap_err();
        assert!(err.to_string().contains("runs before"));
    }

    #[test]
    fn test_validate_unknown_release_point() {
        let mut p = plan(&[0, 1]);
        p.releases.insert(OperationIndex::new(9), vec![OperandIndex::new(0)]);
        assert!(p.validate(&chain()).is_err());
    }

    #[test]
    fn test_accessors() {
        let mut p = plan(&[0, 1]);
        p.releases.insert(OperationIndex::new(1), vec![OperandIndex::new(1)]);
        p.dynamic.insert(OperandIndex::new(2));
        assert_eq!(p.releases_after(OperationIndex::new(1)), &[OperandIndex::new(1)]);
        assert!(p.releases_after(OperationIndex::new(0)).is_empty());
        assert!(p.is_dynamic(OperandIndex::new(2)));
        assert_eq!(p.dealloc_annotations().count(), 1);
        assert!(p.summary().contains("2 operations"));
    }
}
