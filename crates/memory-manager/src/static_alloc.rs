// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocator for operands whose shape is fixed before execution.

use crate::{BufferOrigin, ManagedTensor, MemoryError, MemoryPool, TensorRegistry};
use model_ir::{OperandIndex, OperandInfo};
use tensor_core::Layout;
use tracing::debug;

/// Owns the lifetime of statically planned tensors.
///
/// Buffers are sized from the load-time shape and handed out by
/// [`allocate_all`](Self::allocate_all) before a run starts. A static tensor
/// whose shape later changes at run time is handed over to the
/// [`DynamicTensorManager`](crate::DynamicTensorManager), which releases the
/// static buffer and stops this manager from touching the slot again.
#[derive(Debug)]
pub struct StaticTensorManager {
    pool: MemoryPool,
    planned: Vec<OperandIndex>,
}

impl StaticTensorManager {
    pub fn new(pool: MemoryPool) -> Self {
        Self { pool, planned: Vec::new() }
    }

    pub fn register(
        &mut self,
        registry: &mut TensorRegistry,
        index: OperandIndex,
        info: OperandInfo,
        layout: Layout,
    ) -> Result<(), MemoryError> {
        registry.insert(index, ManagedTensor::new(info, layout))?;
        self.planned.push(index);
        Ok(())
    }

    /// Allocates every planned tensor that is still static and has no buffer.
    /// Returns the number of bytes newly allocated.
    pub fn allocate_all(&mut self, registry: &mut TensorRegistry) -> Result<usize, MemoryError> {
        let mut total = 0;
        for &index in &self.planned {
            let tensor = registry.get_mut(index)?;
            if tensor.is_dynamic() || tensor.is_allocated() {
                continue;
            }
            let bytes = tensor.required_bytes().ok_or_else(|| self.pool.unrepresentable())?;
            tensor.attach(self.pool.allocate(bytes)?, BufferOrigin::Static);
            total += bytes;
        }
        if total > 0 {
            debug!(bytes = total, tensors = self.planned.len(), "static tensors allocated");
        }
        Ok(total)
    }

    /// Returns every buffer this manager still owns to the pool.
    pub fn deallocate_all(&mut self, registry: &mut TensorRegistry) -> Result<usize, MemoryError> {
        let mut released = 0;
        for &index in &self.planned {
            let tensor = registry.get_mut(index)?;
            if tensor.origin() == Some(BufferOrigin::Static) && tensor.release().is_some() {
                released += 1;
            }
        }
        Ok(released)
    }

    pub fn planned(&self) -> &[OperandIndex] {
        &self.planned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBudget;
    use model_ir::TypeInfo;
    use tensor_core::{DType, Shape};

    fn info(dims: Vec<usize>) -> OperandInfo {
        OperandInfo::new(Shape::new(dims), TypeInfo::new(DType::Float32))
    }

    #[test]
    fn test_allocate_and_deallocate_all() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut reg = TensorRegistry::new();
        let mut mgr = StaticTensorManager::new(pool.clone());
        mgr.register(&mut reg, OperandIndex::new(0), info(vec![2, 2]), Layout::Nhwc).unwrap();
        mgr.register(&mut reg, OperandIndex::new(1), info(vec![8]), Layout::Nhwc).unwrap();

        assert_eq!(mgr.allocate_all(&mut reg).unwrap(), 48);
        assert_eq!(pool.allocated_bytes(), 48);
        assert_eq!(reg.get(OperandIndex::new(1)).unwrap().origin(), Some(BufferOrigin::Static));

        // Already allocated tensors are skipped.
        assert_eq!(mgr.allocate_all(&mut reg).unwrap(), 0);

        assert_eq!(mgr.deallocate_all(&mut reg).unwrap(), 2);
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_overflowing_declared_shape_is_refused() {
        let pool = MemoryPool::unlimited();
        let mut reg = TensorRegistry::new();
        let mut mgr = StaticTensorManager::new(pool.clone());
        mgr.register(&mut reg, OperandIndex::new(0), info(vec![65536; 4]), Layout::Nhwc).unwrap();

        let err = mgr.allocate_all(&mut reg).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { requested_bytes: usize::MAX, .. }));
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_budget_failure_surfaces() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(32));
        let mut reg = TensorRegistry::new();
        let mut mgr = StaticTensorManager::new(pool);
        mgr.register(&mut reg, OperandIndex::new(0), info(vec![16]), Layout::Nhwc).unwrap();
        assert!(matches!(mgr.allocate_all(&mut reg), Err(MemoryError::OutOfMemory { .. })));
    }

    #[test]
    fn test_register_twice_fails() {
        let mut reg = TensorRegistry::new();
        let mut mgr = StaticTensorManager::new(MemoryPool::unlimited());
        mgr.register(&mut reg, OperandIndex::new(4), info(vec![1]), Layout::Nhwc).unwrap();
        assert!(mgr.register(&mut reg, OperandIndex::new(4), info(vec![1]), Layout::Nhwc).is_err());
        assert_eq!(mgr.planned().len(), 1);
    }
}
