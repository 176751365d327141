// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lifecycle of tensors whose size is only known while the graph runs.
//!
//! Each dynamic operand moves through
//!
//! ```text
//! Unallocated ──apply_shape──► Allocated ──release──► Unallocated
//! ```
//!
//! driven by the executor. [`DynamicTensorManager::apply_shape`] also marks
//! the operand dynamic, and that flag is never cleared.
//!
//! # Static handoff
//! A tensor that was planned statically can still receive a new shape at run
//! time (a graph input fed with a different batch size, for instance). The
//! first `apply_shape` on such a tensor drops its static [`BufferGuard`]
//! before anything else happens, so the buffer goes back to the pool exactly
//! once, and the release is counted as a deallocation of that operand. From
//! then on the tensor belongs to this manager only.
//!
//! [`BufferGuard`]: crate::BufferGuard

use crate::{BufferOrigin, ManagedTensor, MemoryError, MemoryPool, TensorRegistry};
use model_ir::{OperandIndex, OperationIndex, TypeInfo};
use std::collections::HashMap;
use tensor_core::{Layout, Shape};
use tracing::debug;

/// Per-operand allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationCounters {
    pub allocations: u64,
    pub deallocations: u64,
}

#[derive(Debug)]
pub struct DynamicTensorManager {
    pool: MemoryPool,
    dealloc_plan: HashMap<OperationIndex, Vec<OperandIndex>>,
    counters: HashMap<OperandIndex, AllocationCounters>,
}

impl DynamicTensorManager {
    pub fn new(pool: MemoryPool) -> Self {
        Self { pool, dealloc_plan: HashMap::new(), counters: HashMap::new() }
    }

    /// Declares a slot for an operand whose shape is not known yet.
    ///
    /// # Errors
    /// [`MemoryError::AlreadyRegistered`] if the operand already has a slot.
    pub fn register_tensor(
        &mut self,
        registry: &mut TensorRegistry,
        index: OperandIndex,
        type_info: TypeInfo,
        layout: Layout,
    ) -> Result<(), MemoryError> {
        registry.insert(index, ManagedTensor::unshaped(type_info, layout))
    }

    /// Gives `index` a run-time shape and makes sure it has a buffer for it.
    ///
    /// A buffer whose byte size already matches is kept as is, so repeated
    /// calls with equally sized shapes never touch the pool.
    pub fn apply_shape(
        &mut self,
        registry: &mut TensorRegistry,
        index: OperandIndex,
        shape: Shape,
    ) -> Result<(), MemoryError> {
        let tensor = registry.get_mut(index)?;
        let Some(required) = shape.checked_size_bytes(tensor.dtype()) else {
            debug!("shape {shape} of {index} overflows the address space");
            return Err(self.pool.unrepresentable());
        };
        let counters = self.counters.entry(index).or_default();

        tensor.set_shape(shape);
        tensor.mark_dynamic();

        if tensor.origin() == Some(BufferOrigin::Static) {
            drop(tensor.release());
            counters.deallocations += 1;
            debug!("handing {index} over from static to dynamic allocation");
        }

        match tensor.allocated_bytes() {
            Some(current) if current == required => {
                debug!("reusing buffer of {index} ({required} bytes)");
                return Ok(());
            }
            Some(_) => {
                drop(tensor.release());
                counters.deallocations += 1;
            }
            None => {}
        }

        let guard = self.pool.allocate(required)?;
        tensor.attach(guard, BufferOrigin::Dynamic);
        counters.allocations += 1;
        debug!("allocated {required} bytes for {index} with shape {}", tensor.shape());
        Ok(())
    }

    /// Records that `operand` may be released once `operation` has run.
    pub fn plan_deallocation_after(&mut self, operation: OperationIndex, operand: OperandIndex) {
        let planned = self.dealloc_plan.entry(operation).or_default();
        if !planned.contains(&operand) {
            planned.push(operand);
        }
    }

    /// Releases the annotated inputs of `operation` that are dynamic and
    /// allocated. Statically planned tensors are left alone. Returns how
    /// many buffers went back to the pool.
    pub fn release_consumed_inputs(
        &mut self,
        registry: &mut TensorRegistry,
        operation: OperationIndex,
    ) -> usize {
        let Some(planned) = self.dealloc_plan.get(&operation) else {
            return 0;
        };
        let mut released = 0;
        for &operand in planned {
            let Ok(tensor) = registry.get_mut(operand) else {
                continue;
            };
            if !tensor.is_dynamic() || !tensor.is_allocated() {
                continue;
            }
            debug!("deallocating #{} (input of op #{})", operand.value(), operation.value());
            drop(tensor.release());
            self.counters.entry(operand).or_default().deallocations += 1;
            released += 1;
        }
        released
    }

    /// Releases a dynamic subgraph output once its value has been copied out.
    /// Returns whether a buffer was released.
    pub fn release_subgraph_output(&mut self, registry: &mut TensorRegistry, operand: OperandIndex) -> bool {
        let Ok(tensor) = registry.get_mut(operand) else {
            return false;
        };
        if !tensor.is_dynamic() || !tensor.is_allocated() {
            return false;
        }
        debug!("deallocating subgraph output {operand}");
        drop(tensor.release());
        self.counters.entry(operand).or_default().deallocations += 1;
        true
    }

    pub fn counters(&self, operand: OperandIndex) -> AllocationCounters {
        self.counters.get(&operand).copied().unwrap_or_default()
    }

    /// Total dynamic allocations across every operand.
    pub fn total_allocations(&self) -> u64 {
        self.counters.values().map(|c| c.allocations).sum()
    }

    pub fn planned_releases(&self, operation: OperationIndex) -> &[OperandIndex] {
        self.dealloc_plan.get(&operation).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBudget, StaticTensorManager};
    use model_ir::OperandInfo;
    use tensor_core::DType;

    fn setup() -> (MemoryPool, TensorRegistry, DynamicTensorManager) {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mgr = DynamicTensorManager::new(pool.clone());
        (pool, TensorRegistry::new(), mgr)
    }

    fn idx(i: u32) -> OperandIndex {
        OperandIndex::new(i)
    }

    fn f32_info() -> TypeInfo {
        TypeInfo::new(DType::Float32)
    }

    #[test]
    fn test_register_twice_fails() {
        let (_, mut reg, mut mgr) = setup();
        mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap();
        let err = mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_apply_shape_unregistered() {
        let (_, mut reg, mut mgr) = setup();
        let err = mgr.apply_shape(&mut reg, idx(9), Shape::vector(1)).unwrap_err();
        assert!(matches!(err, MemoryError::UnknownTensor(_)));
    }

    #[test]
    fn test_equal_size_reuses_buffer() {
        let (pool, mut reg, mut mgr) = setup();
        mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap();

        mgr.apply_shape(&mut reg, idx(0), Shape::new(vec![2, 3])).unwrap();
        let first = reg.get(idx(0)).unwrap().buffer().unwrap().id();

        // Same byte count, different dims.
        mgr.apply_shape(&mut reg, idx(0), Shape::new(vec![3, 2])).unwrap();
        let second = reg.get(idx(0)).unwrap().buffer().unwrap().id();

        assert_eq!(first, second);
        assert_eq!(reg.get(idx(0)).unwrap().shape().dims(), &[3, 2]);
        assert_eq!(mgr.counters(idx(0)), AllocationCounters { allocations: 1, deallocations: 0 });
        assert_eq!(pool.stats().total_allocations, 1);
    }

    #[test]
    fn test_size_change_deallocates_once_and_allocates_once() {
        let (pool, mut reg, mut mgr) = setup();
        mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap();
        mgr.apply_shape(&mut reg, idx(0), Shape::vector(4)).unwrap();
        let before = mgr.counters(idx(0));
        let stats_before = pool.stats();

        mgr.apply_shape(&mut reg, idx(0), Shape::vector(10)).unwrap();

        let after = mgr.counters(idx(0));
        assert_eq!(after.deallocations - before.deallocations, 1);
        assert_eq!(after.allocations - before.allocations, 1);
        let stats_after = pool.stats();
        assert_eq!(stats_after.total_deallocations - stats_before.total_deallocations, 1);
        assert_eq!(stats_after.total_allocations - stats_before.total_allocations, 1);
        assert_eq!(reg.get(idx(0)).unwrap().allocated_bytes(), Some(40));
        assert_eq!(pool.allocated_bytes(), 40);
    }

    #[test]
    fn test_release_consumed_inputs_only_touches_dynamic() {
        let (pool, mut reg, mut mgr) = setup();
        let mut statics = StaticTensorManager::new(pool.clone());
        let op = OperationIndex::new(0);

        let info = OperandInfo::new(Shape::vector(4), f32_info());
        statics.register(&mut reg, idx(0), info, Layout::Nhwc).unwrap();
        statics.allocate_all(&mut reg).unwrap();

        mgr.register_tensor(&mut reg, idx(1), f32_info(), Layout::Nhwc).unwrap();
        mgr.register_tensor(&mut reg, idx(2), f32_info(), Layout::Nhwc).unwrap();
        mgr.apply_shape(&mut reg, idx(1), Shape::vector(8)).unwrap();
        mgr.apply_shape(&mut reg, idx(2), Shape::vector(8)).unwrap();

        mgr.plan_deallocation_after(op, idx(0));
        mgr.plan_deallocation_after(op, idx(1));
        mgr.plan_deallocation_after(op, idx(1));

        assert_eq!(mgr.planned_releases(op), &[idx(0), idx(1)]);
        assert_eq!(mgr.release_consumed_inputs(&mut reg, op), 1);

        assert!(reg.get(idx(0)).unwrap().is_allocated());
        assert!(!reg.get(idx(1)).unwrap().is_allocated());
        // Not annotated for this op.
        assert!(reg.get(idx(2)).unwrap().is_allocated());
        assert_eq!(pool.allocated_bytes(), 16 + 32);

        // Nothing left to release the second time.
        assert_eq!(mgr.release_consumed_inputs(&mut reg, op), 0);
        assert_eq!(mgr.release_consumed_inputs(&mut reg, OperationIndex::new(7)), 0);
    }

    #[test]
    fn test_static_handoff_releases_exactly_once() {
        let (pool, mut reg, mut mgr) = setup();
        let mut statics = StaticTensorManager::new(pool.clone());
        let info = OperandInfo::new(Shape::vector(4), f32_info());
        statics.register(&mut reg, idx(0), info, Layout::Nhwc).unwrap();
        statics.allocate_all(&mut reg).unwrap();
        assert_eq!(pool.allocated_bytes(), 16);

        mgr.apply_shape(&mut reg, idx(0), Shape::vector(6)).unwrap();

        let t = reg.get(idx(0)).unwrap();
        assert!(t.is_dynamic());
        assert_eq!(t.origin(), Some(BufferOrigin::Dynamic));
        assert_eq!(pool.allocated_bytes(), 24);
        assert_eq!(pool.stats().total_deallocations, 1);
        assert_eq!(mgr.counters(idx(0)), AllocationCounters { allocations: 1, deallocations: 1 });

        // The static manager no longer owns the slot.
        assert_eq!(statics.deallocate_all(&mut reg).unwrap(), 0);
        assert_eq!(statics.allocate_all(&mut reg).unwrap(), 0);
        assert_eq!(pool.allocated_bytes(), 24);
    }

    #[test]
    fn test_static_handoff_with_same_size() {
        let (pool, mut reg, mut mgr) = setup();
        let mut statics = StaticTensorManager::new(pool.clone());
        let info = OperandInfo::new(Shape::vector(4), f32_info());
        statics.register(&mut reg, idx(0), info, Layout::Nhwc).unwrap();
        statics.allocate_all(&mut reg).unwrap();

        mgr.apply_shape(&mut reg, idx(0), Shape::new(vec![2, 2])).unwrap();
        assert_eq!(mgr.counters(idx(0)), AllocationCounters { allocations: 1, deallocations: 1 });
        assert_eq!(pool.allocated_bytes(), 16);
    }

    #[test]
    fn test_release_subgraph_output() {
        let (pool, mut reg, mut mgr) = setup();
        mgr.register_tensor(&mut reg, idx(3), f32_info(), Layout::Nhwc).unwrap();
        assert!(!mgr.release_subgraph_output(&mut reg, idx(3)));

        mgr.apply_shape(&mut reg, idx(3), Shape::vector(2)).unwrap();
        assert!(mgr.release_subgraph_output(&mut reg, idx(3)));
        assert!(!mgr.release_subgraph_output(&mut reg, idx(3)));
        assert!(!mgr.release_subgraph_output(&mut reg, idx(42)));
        assert_eq!(pool.allocated_bytes(), 0);
        assert!(reg.get(idx(3)).unwrap().is_dynamic());
    }

    #[test]
    fn test_zero_sized_shape_counts_as_allocated() {
        let (_, mut reg, mut mgr) = setup();
        mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap();
        mgr.apply_shape(&mut reg, idx(0), Shape::new(vec![0, 3])).unwrap();
        assert!(reg.get(idx(0)).unwrap().is_allocated());
        assert_eq!(mgr.total_allocations(), 1);
    }

    #[test]
    fn test_budget_failure_leaves_tensor_unallocated() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(64));
        let mut mgr = DynamicTensorManager::new(pool);
        let mut reg = TensorRegistry::new();
        mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap();
        mgr.apply_shape(&mut reg, idx(0), Shape::vector(4)).unwrap();

        let err = mgr.apply_shape(&mut reg, idx(0), Shape::vector(100)).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { .. }));
        assert!(!reg.get(idx(0)).unwrap().is_allocated());
    }

    #[test]
    fn test_overflowing_shape_is_refused() {
        let (pool, mut reg, mut mgr) = setup();
        mgr.register_tensor(&mut reg, idx(0), f32_info(), Layout::Nhwc).unwrap();
        mgr.apply_shape(&mut reg, idx(0), Shape::vector(4)).unwrap();

        let err = mgr.apply_shape(&mut reg, idx(0), Shape::new(vec![65536; 4])).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { requested_bytes: usize::MAX, .. }));
        // The previous shape and buffer are left alone.
        let t = reg.get(idx(0)).unwrap();
        assert_eq!(t.shape(), &Shape::vector(4));
        assert_eq!(t.allocated_bytes(), Some(16));
        assert_eq!(pool.stats().refused, 1);
    }
}
