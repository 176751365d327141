// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `If` and `While`: synchronous calls into other subgraphs.
//!
//! Bound input values are copied into owned tensors and passed as the
//! callee's inputs. The callee copies its outputs out before releasing
//! them, and those copies are bound to the outer operation's outputs here.

use super::{input_views, write_bytes, ExecState, ExecutorSet};
use crate::{ExecutionMetrics, KernelError, RuntimeError, ShapeError};
use model_ir::{Graph, Operation, OperationIndex, OperationKind};
use tensor_core::{DType, Tensor};
use tracing::debug;

pub(super) fn run(
    set: &ExecutorSet,
    graph: &Graph,
    state: &mut ExecState,
    index: OperationIndex,
    op: &Operation,
    metrics: &mut ExecutionMetrics,
) -> Result<(), RuntimeError> {
    let inputs: Vec<Tensor> = input_views(graph, &state.registry, op, index)?
        .into_iter()
        .flatten()
        .map(|view| view.to_tensor())
        .collect();

    let outputs = match op.kind() {
        OperationKind::If(params) => {
            let (condition, operands) = inputs
                .split_first()
                .ok_or_else(|| ShapeError::Invalid { op: "If", detail: "missing condition".into() })?;
            let branch = if truth("If", condition)? { params.then_subgraph } else { params.else_subgraph };
            debug!("{index} If takes {branch}");
            set.invoke_nested(branch, operands, metrics)?
        }
        OperationKind::While(params) => {
            let mut values = inputs;
            let mut iterations = 0usize;
            loop {
                let verdict = set.invoke_nested(params.cond_subgraph, &values, metrics)?;
                let condition = verdict
                    .first()
                    .ok_or_else(|| ShapeError::Invalid { op: "While", detail: "condition produced no output".into() })?;
                if !truth("While", condition)? {
                    break;
                }
                values = set.invoke_nested(params.body_subgraph, &values, metrics)?;
                iterations += 1;
            }
            debug!("{index} While finished after {iterations} iterations");
            values
        }
        _ => {
            return Err(KernelError::Unsupported {
                op: op.name(),
                backend: "control-flow",
                detail: "not a control-flow operation".into(),
            }
            .into())
        }
    };

    bind_outputs(state, op, &outputs)
}

/// Reads a boolean scalar; any non-zero byte is true.
fn truth(op: &'static str, condition: &Tensor) -> Result<bool, RuntimeError> {
    if condition.dtype() != DType::Bool8 || condition.shape().num_elements() != 1 {
        return Err(ShapeError::Invalid {
            op,
            detail: format!("condition must be a bool scalar, got {} {}", condition.dtype(), condition.shape()),
        }
        .into());
    }
    Ok(condition.as_bytes().iter().any(|&b| b != 0))
}

fn bind_outputs(state: &mut ExecState, op: &Operation, values: &[Tensor]) -> Result<(), RuntimeError> {
    if values.len() != op.outputs().len() {
        return Err(ShapeError::Invalid {
            op: op.name(),
            detail: format!("subgraph returned {} values for {} outputs", values.len(), op.outputs().len()),
        }
        .into());
    }
    for (&output, value) in op.outputs().iter().zip(values) {
        let slot = state.registry.get(output)?;
        if slot.dtype() != value.dtype() {
            return Err(ShapeError::Invalid {
                op: op.name(),
                detail: format!("{output} is {}, subgraph returned {}", slot.dtype(), value.dtype()),
            }
            .into());
        }
        if slot.shape() != value.shape() || slot.is_dynamic() {
            state.dynamic.apply_shape(&mut state.registry, output, value.shape().clone())?;
        }
        write_bytes(&mut state.registry, output, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CpuBackend, IoDescription};
    use memory_manager::{MemoryBudget, MemoryPool};
    use model_ir::{
        Activation, ArithmeticOp, BinaryArithmeticParams, ComparisonOp, Data, IfParams, Loaded, Model, OperandIndex,
        OperandInfo, SubgraphIndex, TypeInfo, WhileParams,
    };
    use std::sync::Arc;
    use tensor_core::{Layout, Shape};

    fn info(dtype: DType, dims: Vec<usize>) -> OperandInfo {
        OperandInfo::new(Shape::new(dims), TypeInfo::new(dtype))
    }

    fn arithmetic(op: ArithmeticOp) -> OperationKind {
        OperationKind::BinaryArithmetic(BinaryArithmeticParams { op, activation: Activation::None })
    }

    fn constant_f32(g: &mut Graph, value: f32) -> OperandIndex {
        let c = g.add_operand(info(DType::Float32, vec![1]));
        g.set_operand_value(c, Arc::new(Data::cached(value.to_le_bytes().to_vec()))).unwrap();
        c
    }

    /// y = x <op> k, as a standalone subgraph.
    fn scalar_op(op: ArithmeticOp, k: f32) -> Graph {
        let mut g = Graph::new();
        let x = g.add_operand(info(DType::Float32, vec![1]));
        let c = constant_f32(&mut g, k);
        let y = g.add_operand(info(DType::Float32, vec![1]));
        g.add_operation(Operation::new(arithmetic(op), vec![x, c], vec![y]).unwrap()).unwrap();
        g.add_input(x).unwrap();
        g.add_output(y).unwrap();
        g
    }

    fn build(graphs: Vec<Graph>) -> ExecutorSet {
        let mut model = Model::<Loaded>::new();
        for g in graphs {
            model.push_subgraph(g);
        }
        let model = Arc::new(model.validate().unwrap());
        let plans = planner::plan_model(&model).unwrap();
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        ExecutorSet::new(model, plans, Arc::new(CpuBackend::new()), pool, Layout::Nhwc).unwrap()
    }

    fn if_model() -> ExecutorSet {
        let mut main = Graph::new();
        let cond = main.add_operand(info(DType::Bool8, vec![]));
        let x = main.add_operand(info(DType::Float32, vec![1]));
        let y = main.add_operand(info(DType::Float32, vec![1]));
        let params = IfParams { then_subgraph: SubgraphIndex::new(1), else_subgraph: SubgraphIndex::new(2) };
        main.add_operation(Operation::new(OperationKind::If(params), vec![cond, x], vec![y]).unwrap()).unwrap();
        main.add_input(cond).unwrap();
        main.add_input(x).unwrap();
        main.add_output(y).unwrap();
        build(vec![main, scalar_op(ArithmeticOp::Add, 10.0), scalar_op(ArithmeticOp::Mul, -1.0)])
    }

    fn if_inputs(flag: bool, x: f32) -> IoDescription {
        IoDescription::new(vec![
            Tensor::from_bool(Shape::scalar(), &[flag]).unwrap(),
            Tensor::from_f32(Shape::vector(1), &[x]).unwrap(),
        ])
    }

    #[test]
    fn test_if_selects_branch() {
        let set = if_model();
        let then = set.execute(&if_inputs(true, 2.0)).unwrap();
        assert_eq!(then.outputs[0].to_vec::<f32>(), vec![12.0]);
        let otherwise = set.execute(&if_inputs(false, 2.0)).unwrap();
        assert_eq!(otherwise.outputs[0].to_vec::<f32>(), vec![-2.0]);

        // Nested operations are recorded along with the If itself.
        let names: Vec<_> = otherwise.metrics.operations.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Mul", "If"]);
    }

    #[test]
    fn test_if_output_released_after_copy() {
        let set = if_model();
        set.execute(&if_inputs(true, 1.0)).unwrap();
        let main = set.primary().unwrap();
        let y = OperandIndex::new(2);
        assert_eq!(main.allocation_counters(y).allocations, 1);
        assert_eq!(main.allocation_counters(y).deallocations, 1);
    }

    #[test]
    fn test_if_rejects_non_bool_condition() {
        let set = if_model();
        let io = IoDescription::new(vec![
            Tensor::from_i32(Shape::scalar(), &[1]).unwrap(),
            Tensor::from_f32(Shape::vector(1), &[0.0]).unwrap(),
        ]);
        assert!(matches!(set.execute(&io), Err(RuntimeError::Shape(ShapeError::InputDType { .. }))));
    }

    #[test]
    fn test_while_counts_up() {
        // while (x < 5) x = x + 1
        let mut main = Graph::new();
        let x = main.add_operand(info(DType::Float32, vec![1]));
        let y = main.add_operand(info(DType::Float32, vec![1]));
        let params = WhileParams { cond_subgraph: SubgraphIndex::new(1), body_subgraph: SubgraphIndex::new(2) };
        main.add_operation(Operation::new(OperationKind::While(params), vec![x], vec![y]).unwrap()).unwrap();
        main.add_input(x).unwrap();
        main.add_output(y).unwrap();

        let mut cond = Graph::new();
        let v = cond.add_operand(info(DType::Float32, vec![1]));
        let limit = constant_f32(&mut cond, 5.0);
        let flag = cond.add_operand(info(DType::Bool8, vec![1]));
        cond.add_operation(
            Operation::new(OperationKind::Comparison(ComparisonOp::Less), vec![v, limit], vec![flag]).unwrap(),
        )
        .unwrap();
        cond.add_input(v).unwrap();
        cond.add_output(flag).unwrap();

        let set = build(vec![main, cond, scalar_op(ArithmeticOp::Add, 1.0)]);
        let out = set.execute(&IoDescription::new(vec![Tensor::from_f32(Shape::vector(1), &[1.5]).unwrap()])).unwrap();
        assert_eq!(out.outputs[0].to_vec::<f32>(), vec![5.5]);

        // Already past the limit: the body never runs.
        let out = set.execute(&IoDescription::new(vec![Tensor::from_f32(Shape::vector(1), &[9.0]).unwrap()])).unwrap();
        assert_eq!(out.outputs[0].to_vec::<f32>(), vec![9.0]);
    }

    #[test]
    fn test_recursive_if_is_rejected() {
        // The primary subgraph names itself as both branches.
        let mut main = Graph::new();
        let cond = main.add_operand(info(DType::Bool8, vec![]));
        let y = main.add_operand(info(DType::Bool8, vec![]));
        let params = IfParams { then_subgraph: SubgraphIndex::PRIMARY, else_subgraph: SubgraphIndex::PRIMARY };
        main.add_operation(Operation::new(OperationKind::If(params), vec![cond, cond], vec![y]).unwrap()).unwrap();
        main.add_input(cond).unwrap();
        main.add_output(y).unwrap();

        let set = build(vec![main]);
        let io = IoDescription::new(vec![Tensor::from_bool(Shape::scalar(), &[true]).unwrap()]);
        assert!(matches!(set.execute(&io), Err(RuntimeError::NonReentrant(SubgraphIndex::PRIMARY))));

        // The lock is released on the error path.
        assert!(matches!(set.execute(&io), Err(RuntimeError::NonReentrant(_))));
    }
}
