// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Builds an [`ExecutionPlan`] from a validated subgraph.
//!
//! # Order
//! Kahn's algorithm over operand edges. Constants and graph inputs are
//! ready from the start; among ready operations the lowest index runs first,
//! so a graph that is already in dependency order keeps its order.
//!
//! # Liveness
//! Every operand that is neither constant nor a graph output is annotated
//! with the last operation (in plan order) that reads it. An operand nobody
//! reads is annotated with its producer.
//!
//! # Dynamic operands
//! An output is dynamic when its size can only be known while running:
//! it comes from control flow or a custom operator, it depends on the
//! *values* of a non-constant shape-bearing input, or any input of its
//! producer is itself dynamic.

use crate::{ExecutionPlan, PlannerError};
use model_ir::{Graph, Model, OperandIndex, Operation, OperationIndex, OperationKind, SubgraphIndex, Validated};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::debug;

/// Lowers one subgraph of `model`.
pub fn plan_subgraph(model: &Model<Validated>, subgraph: SubgraphIndex) -> Result<ExecutionPlan, PlannerError> {
    let graph = model.subgraph(subgraph).ok_or(PlannerError::UnknownSubgraph(subgraph))?;

    let order = schedule(graph, subgraph)?;
    let releases = liveness(graph, &order);
    let dynamic = classify_dynamic(graph, &order);

    let plan = ExecutionPlan { subgraph, order, releases, dynamic };
    plan.validate(graph)?;
    debug!("{}", plan.summary());
    Ok(plan)
}

/// Lowers every subgraph, in subgraph order.
pub fn plan_model(model: &Model<Validated>) -> Result<Vec<ExecutionPlan>, PlannerError> {
    model.subgraphs().map(|(index, _)| plan_subgraph(model, index)).collect()
}

fn is_ready_source(graph: &Graph, operand: OperandIndex) -> bool {
    graph.inputs().contains(&operand) || graph.operand(operand).is_some_and(|o| o.is_constant())
}

fn schedule(graph: &Graph, subgraph: SubgraphIndex) -> Result<Vec<OperationIndex>, PlannerError> {
    let n = graph.num_operations();
    let mut pending = vec![0usize; n];
    // producer op -> consumers waiting on it, one entry per input occurrence
    let mut waiting: Vec<Vec<OperationIndex>> = vec![Vec::new(); n];

    for (index, op) in graph.operations() {
        for input in op.defined_inputs() {
            if is_ready_source(graph, input) {
                continue;
            }
            let producer = graph.operand(input).and_then(|o| o.producer()).ok_or(
                PlannerError::MissingProducer { subgraph, operation: index, operand: input },
            )?;
            pending[index.as_usize()] += 1;
            waiting[producer.as_usize()].push(index);
        }
    }

    let mut ready: BinaryHeap<Reverse<OperationIndex>> = graph
        .operations()
        .filter(|(index, _)| pending[index.as_usize()] == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(op)) = ready.pop() {
        order.push(op);
        for &consumer in &waiting[op.as_usize()] {
            let count = &mut pending[consumer.as_usize()];
            *count -= 1;
            if *count == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() != n {
        return Err(PlannerError::Cycle { subgraph, remaining: n - order.len() });
    }
    Ok(order)
}

fn liveness(graph: &Graph, order: &[OperationIndex]) -> BTreeMap<OperationIndex, Vec<OperandIndex>> {
    let mut position = vec![0usize; graph.num_operations()];
    for (pos, op) in order.iter().enumerate() {
        position[op.as_usize()] = pos;
    }

    let mut releases: BTreeMap<OperationIndex, Vec<OperandIndex>> = BTreeMap::new();
    for (index, operand) in graph.operands() {
        if operand.is_constant() || graph.outputs().contains(&index) {
            continue;
        }
        let last_reader = operand.consumers().iter().copied().max_by_key(|op| position[op.as_usize()]);
        if let Some(op) = last_reader.or(operand.producer()) {
            releases.entry(op).or_default().push(index);
        }
    }
    releases
}

/// Positions of inputs whose values determine an output shape.
fn shape_bearing_inputs(op: &Operation) -> &'static [usize] {
    match op.kind() {
        OperationKind::Fill | OperationKind::StatelessRandomUniform => &[0],
        OperationKind::Range => &[0, 1, 2],
        OperationKind::BroadcastTo
        | OperationKind::Pad
        | OperationKind::ExpandDims
        | OperationKind::OneHot { .. }
        | OperationKind::Reduce(_)
        | OperationKind::ArgMax(_) => &[1],
        OperationKind::Slice | OperationKind::SpaceToBatchND | OperationKind::BatchToSpaceND => &[1, 2],
        OperationKind::StridedSlice(_) => &[1, 2, 3],
        _ => &[],
    }
}

fn produces_dynamic(graph: &Graph, op: &Operation, dynamic: &BTreeSet<OperandIndex>) -> bool {
    if matches!(op.kind(), OperationKind::If(_) | OperationKind::While(_) | OperationKind::Custom(_)) {
        return true;
    }
    let data_dependent = shape_bearing_inputs(op).iter().any(|&pos| {
        op.inputs()
            .get(pos)
            .filter(|i| i.is_valid())
            .is_some_and(|&i| graph.operand(i).is_some_and(|o| !o.is_constant()))
    });
    data_dependent || op.defined_inputs().any(|i| dynamic.contains(&i))
}

fn classify_dynamic(graph: &Graph, order: &[OperationIndex]) -> BTreeSet<OperandIndex> {
    let mut dynamic: BTreeSet<OperandIndex> =
        graph.operands().filter(|(_, o)| o.is_dynamic()).map(|(i, _)| i).collect();

    for &index in order {
        let Some(op) = graph.operation(index) else { continue };
        if produces_dynamic(graph, op, &dynamic) {
            dynamic.extend(op.outputs().iter().copied());
        }
    }
    dynamic
}
