// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runs lowered subgraphs against a backend.
//!
//! An [`ExecutorSet`] holds one [`Executor`] per subgraph. They share the
//! backend and the [`MemoryPool`]. Each executor owns the tensor state of its
//! subgraph behind a mutex, so one executor runs at most one invocation at a
//! time:
//!
//! - a top-level [`ExecutorSet::execute`] waits for the primary executor;
//! - a nested invocation from `If` or `While` only tries the lock and fails
//!   with [`RuntimeError::NonReentrant`] if the subgraph is already running.
//!
//! Per operation the executor checks that every input is bound, sizes the
//! outputs when their shape is not fixed, invokes the kernel and then
//! releases the dynamic inputs whose last reader it was.

mod control_flow;

use crate::shape_inference;
use crate::{Backend, ExecutionMetrics, ExecutionOutput, IoDescription, OperationMetrics, RuntimeError, ShapeError};
use memory_manager::{
    AllocationCounters, DynamicTensorManager, MemoryError, MemoryPool, StaticTensorManager, TensorRegistry,
};
use model_ir::{Graph, Model, OperandIndex, Operation, OperationIndex, SubgraphIndex, Validated};
use planner::{ExecutionPlan, PlannerError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};
use tensor_core::{permute, Layout, Shape, Tensor, TensorView, TensorViewMut};
use tracing::debug;

/// Every subgraph of one model, ready to run.
pub struct ExecutorSet {
    model: Arc<Model<Validated>>,
    backend: Arc<dyn Backend>,
    pool: MemoryPool,
    layout: Layout,
    profiling: bool,
    executors: Vec<Executor>,
}

impl ExecutorSet {
    /// Builds one executor per plan. `plans[i]` must describe subgraph `i`.
    pub fn new(
        model: Arc<Model<Validated>>,
        plans: Vec<ExecutionPlan>,
        backend: Arc<dyn Backend>,
        pool: MemoryPool,
        layout: Layout,
    ) -> Result<Self, RuntimeError> {
        let mut executors = Vec::with_capacity(plans.len());
        for (position, plan) in plans.into_iter().enumerate() {
            let subgraph = plan.subgraph();
            if subgraph.as_usize() != position {
                return Err(PlannerError::InvalidPlan {
                    subgraph,
                    detail: format!("plan found at position {position}"),
                }
                .into());
            }
            let graph = model.subgraph(subgraph).ok_or(RuntimeError::UnknownSubgraph(subgraph))?;
            executors.push(Executor::new(graph, plan, pool.clone(), layout)?);
        }
        if executors.len() != model.num_subgraphs() {
            return Err(RuntimeError::Config(format!(
                "{} plans for {} subgraphs",
                executors.len(),
                model.num_subgraphs()
            )));
        }
        Ok(Self { model, backend, pool, layout, profiling: true, executors })
    }

    /// Turns per-operation metrics on or off.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn model(&self) -> &Model<Validated> {
        &self.model
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn executors(&self) -> &[Executor] {
        &self.executors
    }

    pub fn executor(&self, subgraph: SubgraphIndex) -> Result<&Executor, RuntimeError> {
        self.executors.get(subgraph.as_usize()).ok_or(RuntimeError::UnknownSubgraph(subgraph))
    }

    pub fn primary(&self) -> Result<&Executor, RuntimeError> {
        self.executor(SubgraphIndex::PRIMARY)
    }

    /// Runs the primary subgraph on `io` and returns its outputs.
    ///
    /// Blocks while another thread is executing the same set. Any error is
    /// terminal for this call; outputs of a failed run are never returned.
    pub fn execute(&self, io: &IoDescription) -> Result<ExecutionOutput, RuntimeError> {
        let started = Instant::now();
        let mut metrics = ExecutionMetrics::new();

        let staged = io
            .inputs
            .iter()
            .map(|t| permute(&t.view(), io.input_layout, self.layout))
            .collect::<Result<Vec<_>, _>>()?;

        let raw = self.primary()?.invoke(self, &staged, Entry::TopLevel, &mut metrics)?;

        let outputs = raw
            .iter()
            .map(|t| permute(&t.view(), self.layout, io.output_layout))
            .collect::<Result<Vec<_>, _>>()?;

        metrics.finalise(started.elapsed(), self.pool.stats().peak_allocated_bytes);
        debug!("{}", metrics.summary());
        Ok(ExecutionOutput { outputs, metrics })
    }

    fn invoke_nested(
        &self,
        subgraph: SubgraphIndex,
        inputs: &[Tensor],
        metrics: &mut ExecutionMetrics,
    ) -> Result<Vec<Tensor>, RuntimeError> {
        self.executor(subgraph)?.invoke(self, inputs, Entry::Nested, metrics)
    }
}

impl fmt::Debug for ExecutorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorSet")
            .field("backend", &self.backend.name())
            .field("layout", &self.layout)
            .field("profiling", &self.profiling)
            .field("executors", &self.executors.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    TopLevel,
    Nested,
}

#[derive(Debug)]
struct ExecState {
    registry: TensorRegistry,
    statics: StaticTensorManager,
    dynamic: DynamicTensorManager,
}

/// One subgraph's plan together with the tensors it runs on.
#[derive(Debug)]
pub struct Executor {
    subgraph: SubgraphIndex,
    plan: ExecutionPlan,
    inputs: Vec<OperandIndex>,
    state: Mutex<ExecState>,
}

impl Executor {
    fn new(graph: &Graph, plan: ExecutionPlan, pool: MemoryPool, layout: Layout) -> Result<Self, RuntimeError> {
        let mut registry = TensorRegistry::new();
        let mut statics = StaticTensorManager::new(pool.clone());
        let mut dynamic = DynamicTensorManager::new(pool);

        for (index, operand) in graph.operands() {
            if operand.is_constant() {
                continue;
            }
            if plan.is_dynamic(index) {
                dynamic.register_tensor(&mut registry, index, operand.info().type_info().clone(), layout)?;
            } else {
                statics.register(&mut registry, index, operand.info().clone(), layout)?;
            }
        }
        for (operation, operand) in plan.dealloc_annotations() {
            dynamic.plan_deallocation_after(operation, operand);
        }

        Ok(Self {
            subgraph: plan.subgraph(),
            plan,
            inputs: graph.inputs().to_vec(),
            state: Mutex::new(ExecState { registry, statics, dynamic }),
        })
    }

    pub fn subgraph(&self) -> SubgraphIndex {
        self.subgraph
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Whether any graph input is dynamically shaped, in which case output
    /// sizes are only known once real inputs have been staged.
    ///
    /// An input turns dynamic when the plan says so or once it has been fed
    /// a shape other than its declared one, and it stays dynamic.
    pub fn has_dynamic_input(&self) -> bool {
        let state = self.lock();
        self.inputs
            .iter()
            .any(|&i| self.plan.is_dynamic(i) || state.registry.get(i).is_ok_and(|t| t.is_dynamic()))
    }

    /// Current shape of a non-constant operand.
    pub fn tensor_shape(&self, operand: OperandIndex) -> Result<Shape, RuntimeError> {
        Ok(self.lock().registry.get(operand)?.shape().clone())
    }

    /// Dynamic allocation counters of `operand` since the executor was built.
    pub fn allocation_counters(&self, operand: OperandIndex) -> AllocationCounters {
        self.lock().dynamic.counters(operand)
    }

    /// Bytes currently held by this executor's tensors.
    pub fn allocated_bytes(&self) -> usize {
        self.lock().registry.allocated_bytes()
    }

    /// Returns every statically allocated buffer to the pool. They are
    /// allocated again at the start of the next run.
    pub fn release_static(&self) -> Result<usize, RuntimeError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        Ok(state.statics.deallocate_all(&mut state.registry)?)
    }

    fn lock(&self) -> MutexGuard<'_, ExecState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invoke(
        &self,
        set: &ExecutorSet,
        inputs: &[Tensor],
        entry: Entry,
        metrics: &mut ExecutionMetrics,
    ) -> Result<Vec<Tensor>, RuntimeError> {
        let mut guard = match entry {
            Entry::TopLevel => self.lock(),
            Entry::Nested => match self.state.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return Err(RuntimeError::NonReentrant(self.subgraph)),
            },
        };
        let state = &mut *guard;
        let graph = set.model.subgraph(self.subgraph).ok_or(RuntimeError::UnknownSubgraph(self.subgraph))?;
        let allocations_before = state.dynamic.total_allocations();

        debug!("executing {} ({} operations)", self.subgraph, self.plan.num_operations());
        state.statics.allocate_all(&mut state.registry)?;
        stage_inputs(graph, state, inputs)?;

        for &index in self.plan.order() {
            let op = graph.operation(index).ok_or_else(|| PlannerError::InvalidPlan {
                subgraph: self.subgraph,
                detail: format!("{index} is not in the graph"),
            })?;
            self.run_operation(set, graph, state, index, op, metrics)?;
        }

        let outputs = collect_outputs(graph, &state.registry)?;
        for &output in graph.outputs() {
            state.dynamic.release_subgraph_output(&mut state.registry, output);
        }
        metrics.add_dynamic_allocations(state.dynamic.total_allocations() - allocations_before);
        Ok(outputs)
    }

    fn run_operation(
        &self,
        set: &ExecutorSet,
        graph: &Graph,
        state: &mut ExecState,
        index: OperationIndex,
        op: &Operation,
        metrics: &mut ExecutionMetrics,
    ) -> Result<(), RuntimeError> {
        // Fail before sizing anything if an input was never produced.
        input_views(graph, &state.registry, op, index)?;

        let mut shape_inference_duration = Duration::ZERO;
        let compute_duration;

        if op.kind().is_control_flow() {
            let started = Instant::now();
            control_flow::run(set, graph, state, index, op, metrics)?;
            compute_duration = started.elapsed();
        } else {
            if self.needs_shape_inference(&state.registry, op) {
                let started = Instant::now();
                infer_and_apply(set.backend(), graph, state, index, op)?;
                shape_inference_duration = started.elapsed();
            }
            let started = Instant::now();
            dispatch(set.backend(), graph, state, index, op)?;
            compute_duration = started.elapsed();
        }
        debug!("{} {index} {} done", self.subgraph, op.name());

        state.dynamic.release_consumed_inputs(&mut state.registry, index);

        if set.profiling {
            metrics.record_operation(OperationMetrics {
                subgraph: self.subgraph,
                operation: index,
                name: op.name(),
                compute_duration,
                shape_inference_duration,
            });
        }
        Ok(())
    }

    fn needs_shape_inference(&self, registry: &TensorRegistry, op: &Operation) -> bool {
        let dynamic_input = op.defined_inputs().any(|i| registry.get(i).is_ok_and(|t| t.is_dynamic()));
        let open_output = op.outputs().iter().any(|&o| {
            self.plan.is_dynamic(o) || registry.get(o).is_ok_and(|t| t.is_dynamic() && !t.is_allocated())
        });
        dynamic_input || open_output
    }
}

/// A view of `index`, from its constant data or its buffer.
fn bound_view<'a>(graph: &'a Graph, registry: &'a TensorRegistry, index: OperandIndex) -> Option<TensorView<'a>> {
    let operand = graph.operand(index)?;
    if let Some(data) = operand.data() {
        return Some(TensorView::from_parts(operand.shape(), operand.dtype(), data.bytes()));
    }
    let tensor = registry.get(index).ok()?;
    Some(TensorView::from_parts(tensor.shape(), tensor.dtype(), tensor.bytes()?))
}

/// Views of every input of `op`; absent optional inputs map to `None`.
fn input_views<'a>(
    graph: &'a Graph,
    registry: &'a TensorRegistry,
    op: &Operation,
    operation: OperationIndex,
) -> Result<Vec<Option<TensorView<'a>>>, RuntimeError> {
    op.inputs()
        .iter()
        .map(|&operand| {
            if !operand.is_valid() {
                return Ok(None);
            }
            bound_view(graph, registry, operand)
                .map(Some)
                .ok_or(RuntimeError::UnallocatedOperand { operand, operation })
        })
        .collect()
}

fn stage_inputs(graph: &Graph, state: &mut ExecState, inputs: &[Tensor]) -> Result<(), RuntimeError> {
    let declared = graph.inputs();
    if declared.len() != inputs.len() {
        return Err(ShapeError::InputCount { expected: declared.len(), actual: inputs.len() }.into());
    }

    for (position, (&index, value)) in declared.iter().zip(inputs).enumerate() {
        let operand = graph
            .operand(index)
            .ok_or(model_ir::IrError::UnknownOperand { operand: index, count: graph.num_operands() })?;
        if value.dtype() != operand.dtype() {
            return Err(ShapeError::InputDType { position, expected: operand.dtype(), actual: value.dtype() }.into());
        }
        // A dynamic input declared without dims accepts any rank.
        let expected = operand.shape().rank();
        let rank_known = !(operand.is_dynamic() && expected == 0);
        if rank_known && value.shape().rank() != expected {
            return Err(ShapeError::InputRank { position, expected, actual: value.shape().rank() }.into());
        }

        let slot = state.registry.get(index)?;
        if slot.shape() != value.shape() || (slot.is_dynamic() && !slot.is_allocated()) {
            state.dynamic.apply_shape(&mut state.registry, index, value.shape().clone())?;
        }
        write_bytes(&mut state.registry, index, value)?;
    }
    Ok(())
}

/// Copies `value` into the buffer of `index`; the shapes must already agree.
fn write_bytes(registry: &mut TensorRegistry, index: OperandIndex, value: &Tensor) -> Result<(), RuntimeError> {
    let dst = registry.get_mut(index)?.bytes_mut().ok_or(MemoryError::BufferMissing(index))?;
    if dst.len() != value.size_bytes() {
        return Err(tensor_core::TensorError::BufferSizeMismatch { expected: dst.len(), actual: value.size_bytes() }.into());
    }
    dst.copy_from_slice(value.as_bytes());
    Ok(())
}

fn infer_and_apply(
    backend: &dyn Backend,
    graph: &Graph,
    state: &mut ExecState,
    index: OperationIndex,
    op: &Operation,
) -> Result<(), RuntimeError> {
    let shapes = {
        let inputs = input_views(graph, &state.registry, op, index)?;
        backend
            .infer_output_shapes(op, &inputs)
            .or_else(|| shape_inference::infer(op, &inputs))
            .ok_or(ShapeError::Unresolvable { op: op.name(), operation: index })??
    };
    if shapes.len() != op.outputs().len() {
        return Err(ShapeError::Invalid {
            op: op.name(),
            detail: format!("{} shapes inferred for {} outputs", shapes.len(), op.outputs().len()),
        }
        .into());
    }
    for (&output, shape) in op.outputs().iter().zip(shapes) {
        state.dynamic.apply_shape(&mut state.registry, output, shape)?;
    }
    Ok(())
}

/// Invokes the kernel with the output buffers moved out of the registry,
/// and puts them back whatever the kernel returned.
fn dispatch(
    backend: &dyn Backend,
    graph: &Graph,
    state: &mut ExecState,
    index: OperationIndex,
    op: &Operation,
) -> Result<(), RuntimeError> {
    let mut slots = Vec::with_capacity(op.outputs().len());
    for &output in op.outputs() {
        let tensor = state.registry.get(output)?;
        slots.push((output, tensor.shape().clone(), tensor.dtype()));
    }

    let mut taken = Vec::with_capacity(slots.len());
    let mut missing = None;
    for (output, _, _) in &slots {
        match state.registry.take_buffer(*output) {
            Ok(guard) => taken.push(guard),
            Err(_) => {
                missing = Some(*output);
                break;
            }
        }
    }

    let result = match missing {
        Some(operand) => Err(RuntimeError::UnallocatedOperand { operand, operation: index }),
        None => input_views(graph, &state.registry, op, index).and_then(|inputs| {
            let mut outputs: Vec<TensorViewMut<'_>> = taken
                .iter_mut()
                .zip(&slots)
                .map(|(guard, (_, shape, dtype))| TensorViewMut::from_parts(shape, *dtype, guard.as_bytes_mut()))
                .collect();
            backend.execute(op, &inputs, &mut outputs).map_err(RuntimeError::from)
        }),
    };

    for ((output, _, _), guard) in slots.iter().zip(taken) {
        state.registry.restore_buffer(*output, guard)?;
    }
    result
}

fn collect_outputs(graph: &Graph, registry: &TensorRegistry) -> Result<Vec<Tensor>, RuntimeError> {
    graph
        .outputs()
        .iter()
        .map(|&output| {
            bound_view(graph, registry, output)
                .map(|view| view.to_tensor())
                .ok_or_else(|| RuntimeError::from(MemoryError::BufferMissing(output)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuBackend;
    use memory_manager::MemoryBudget;
    use model_ir::{
        ActivationKind, ArithmeticOp, BinaryArithmeticParams, Activation, Data, ElementwiseActivationParams, Loaded,
        OperandInfo, OperationKind, ReshapeParams, TypeInfo,
    };
    use tensor_core::DType;

    fn f32_info(dims: Vec<usize>) -> OperandInfo {
        OperandInfo::new(Shape::new(dims), TypeInfo::new(DType::Float32))
    }

    fn build(graphs: Vec<Graph>) -> ExecutorSet {
        let mut model = Model::<Loaded>::new();
        for g in graphs {
            model.push_subgraph(g);
        }
        let model = Arc::new(model.validate().unwrap());
        let plans = planner::plan_model(&model).unwrap();
        let pool = MemoryPool::new(MemoryBudget::from_mb(4));
        ExecutorSet::new(model, plans, Arc::new(CpuBackend::new()), pool, Layout::Nhwc).unwrap()
    }

    fn leaky(alpha: f32) -> OperationKind {
        OperationKind::ElementwiseActivation(ElementwiseActivationParams {
            kind: ActivationKind::LeakyRelu,
            alpha,
            beta: 0.0,
        })
    }

    fn add() -> OperationKind {
        OperationKind::BinaryArithmetic(BinaryArithmeticParams { op: ArithmeticOp::Add, activation: Activation::None })
    }

    /// x -> LeakyRelu -> h -> Add(h, h) -> y
    fn chain(dims: Vec<usize>) -> Graph {
        let mut g = Graph::new();
        let x = g.add_operand(f32_info(dims.clone()));
        let h = g.add_operand(f32_info(dims.clone()));
        let y = g.add_operand(f32_info(dims));
        g.add_operation(Operation::new(leaky(0.5), vec![x], vec![h]).unwrap()).unwrap();
        g.add_operation(Operation::new(add(), vec![h, h], vec![y]).unwrap()).unwrap();
        g.add_input(x).unwrap();
        g.add_output(y).unwrap();
        g
    }

    fn input(dims: Vec<usize>, values: &[f32]) -> IoDescription {
        IoDescription::new(vec![Tensor::from_f32(Shape::new(dims), values).unwrap()])
    }

    #[test]
    fn test_static_chain() {
        let set = build(vec![chain(vec![4])]);
        let out = set.execute(&input(vec![4], &[-2.0, -1.0, 0.0, 3.0])).unwrap();
        assert_eq!(out.outputs[0].to_vec::<f32>(), vec![-2.0, -1.0, 0.0, 6.0]);
        assert_eq!(out.metrics.operations.len(), 2);
        assert_eq!(out.metrics.dynamic_allocations, 0);
        assert!(!set.primary().unwrap().has_dynamic_input());
    }

    #[test]
    fn test_input_binding_errors() {
        let set = build(vec![chain(vec![4])]);

        let none = IoDescription::new(vec![]);
        assert!(matches!(set.execute(&none), Err(RuntimeError::Shape(ShapeError::InputCount { .. }))));

        let ints = IoDescription::new(vec![Tensor::from_i32(Shape::vector(4), &[1, 2, 3, 4]).unwrap()]);
        assert!(matches!(set.execute(&ints), Err(RuntimeError::Shape(ShapeError::InputDType { .. }))));

        let rank = input(vec![2, 2], &[1.0; 4]);
        assert!(matches!(set.execute(&rank), Err(RuntimeError::Shape(ShapeError::InputRank { .. }))));

        // The executor is usable again after a failed call.
        assert!(set.execute(&input(vec![4], &[1.0; 4])).is_ok());
    }

    #[test]
    fn test_static_to_dynamic_handoff() {
        let set = build(vec![chain(vec![2])]);
        let exec = set.primary().unwrap();
        let x = OperandIndex::new(0);
        let h = OperandIndex::new(1);

        set.execute(&input(vec![2], &[1.0, -1.0])).unwrap();
        assert_eq!(exec.allocation_counters(x), AllocationCounters::default());
        assert!(!exec.has_dynamic_input());

        let out = set.execute(&input(vec![3], &[1.0, -1.0, 2.0])).unwrap();
        assert_eq!(out.outputs[0].shape(), &Shape::vector(3));
        assert_eq!(out.outputs[0].to_vec::<f32>(), vec![2.0, -1.0, 4.0]);
        assert_eq!(exec.tensor_shape(h).unwrap(), Shape::vector(3));

        // One release for the static buffer, one after its last reader, and
        // a single dynamic allocation in between.
        let handed_over = AllocationCounters { allocations: 1, deallocations: 2 };
        assert_eq!(exec.allocation_counters(x), handed_over);
        assert_eq!(exec.allocation_counters(h), handed_over);
        assert_eq!(exec.allocation_counters(OperandIndex::new(2)), handed_over);

        // The input keeps its dynamic flag, even when fed the declared shape again.
        assert!(exec.has_dynamic_input());
        set.execute(&input(vec![2], &[1.0, -1.0])).unwrap();
        assert!(exec.has_dynamic_input());
    }

    #[test]
    fn test_dynamic_buffers_released_after_run() {
        let set = build(vec![chain(vec![2])]);
        let exec = set.primary().unwrap();
        set.execute(&input(vec![5], &[1.0; 5])).unwrap();
        set.execute(&input(vec![5], &[1.0; 5])).unwrap();
        // Every tensor went dynamic, so nothing stays allocated between runs.
        assert_eq!(exec.allocated_bytes(), 0);
        assert_eq!(exec.release_static().unwrap(), 0);
        assert_eq!(set.pool().allocated_bytes(), 0);
    }

    #[test]
    fn test_reshape_of_dynamic_input() {
        let mut g = Graph::new();
        let x = g.add_operand(f32_info(vec![1, 4]));
        let y = g.add_operand(f32_info(vec![4]));
        let kind = OperationKind::Reshape(ReshapeParams { new_shape: vec![-1] });
        g.add_operation(Operation::new(kind, vec![x], vec![y]).unwrap()).unwrap();
        g.add_input(x).unwrap();
        g.add_output(y).unwrap();
        let set = build(vec![g]);

        let out = set.execute(&input(vec![2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        assert_eq!(out.outputs[0].shape(), &Shape::vector(6));
        assert!(out.metrics.dynamic_allocations >= 2);
    }

    #[test]
    fn test_unresolvable_shape() {
        let mut g = Graph::new();
        let x = g.add_operand(f32_info(vec![2]));
        let idx = g.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
        g.set_operand_value(idx, Arc::new(Data::cached(bytemuck::cast_slice::<i32, u8>(&[0]).to_vec()))).unwrap();
        let y = g.add_operand(f32_info(vec![1]));
        g.add_operation(Operation::new(OperationKind::Gather { axis: 0 }, vec![x, idx], vec![y]).unwrap()).unwrap();
        g.add_input(x).unwrap();
        g.add_output(y).unwrap();
        let set = build(vec![g]);

        let err = set.execute(&input(vec![3], &[1.0; 3])).unwrap_err();
        assert!(matches!(err, RuntimeError::Shape(ShapeError::Unresolvable { op: "Gather", .. })));
    }

    #[test]
    fn test_overflowing_fill_dims_are_rejected() {
        let mut g = Graph::new();
        let dims = g.add_operand(OperandInfo::new(Shape::vector(4), TypeInfo::new(DType::Int32)));
        let value = g.add_operand(f32_info(vec![]));
        g.set_operand_value(value, Arc::new(Data::cached(1.5f32.to_le_bytes().to_vec()))).unwrap();
        let y = g.add_operand(f32_info(vec![1, 1, 1, 1]));
        g.add_operation(Operation::new(OperationKind::Fill, vec![dims, value], vec![y]).unwrap()).unwrap();
        g.add_input(dims).unwrap();
        g.add_output(y).unwrap();
        let set = build(vec![g]);

        let huge = IoDescription::new(vec![Tensor::from_i32(Shape::vector(4), &[65536; 4]).unwrap()]);
        let err = set.execute(&huge).unwrap_err();
        assert!(matches!(err, RuntimeError::Shape(ShapeError::Invalid { op: "Fill", .. })));

        let small = IoDescription::new(vec![Tensor::from_i32(Shape::vector(4), &[1, 2, 1, 1]).unwrap()]);
        let out = set.execute(&small).unwrap();
        assert_eq!(out.outputs[0].to_vec::<f32>(), vec![1.5, 1.5]);
    }

    #[test]
    fn test_unaddressable_declared_shape_is_refused() {
        let set = build(vec![chain(vec![65536; 4])]);
        let err = set.execute(&input(vec![1], &[1.0])).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Memory(MemoryError::OutOfMemory { requested_bytes: usize::MAX, .. })
        ));
        assert_eq!(set.pool().allocated_bytes(), 0);
    }

    #[test]
    fn test_kernel_failure_restores_buffers() {
        let mut g = Graph::new();
        let x = g.add_operand(f32_info(vec![2]));
        let idx = g.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
        g.set_operand_value(idx, Arc::new(Data::cached(bytemuck::cast_slice::<i32, u8>(&[0]).to_vec()))).unwrap();
        let y = g.add_operand(f32_info(vec![1]));
        g.add_operation(Operation::new(OperationKind::Gather { axis: 0 }, vec![x, idx], vec![y]).unwrap()).unwrap();
        g.add_input(x).unwrap();
        g.add_output(y).unwrap();
        let set = build(vec![g]);

        let err = set.execute(&input(vec![2], &[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(_)));
        let exec = set.primary().unwrap();
        assert_eq!(exec.allocated_bytes(), 12);
    }

    #[test]
    fn test_plan_count_mismatch() {
        let mut model = Model::<Loaded>::new();
        model.push_subgraph(chain(vec![1]));
        model.push_subgraph(chain(vec![1]));
        let model = Arc::new(model.validate().unwrap());
        let plans = vec![planner::plan_subgraph(&model, SubgraphIndex::PRIMARY).unwrap()];
        let pool = MemoryPool::unlimited();
        let result = ExecutorSet::new(model, plans, Arc::new(CpuBackend::new()), pool, Layout::Nhwc);
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
