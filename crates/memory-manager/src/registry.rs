// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operand-indexed table of backend tensors for one subgraph.
//!
//! Both tensor managers work on the same [`TensorRegistry`], so kernels see
//! static and dynamic tensors the same way: by operand index.

use crate::{BufferGuard, ManagedTensor, MemoryError};
use model_ir::OperandIndex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct TensorRegistry {
    tensors: BTreeMap<OperandIndex, ManagedTensor>,
}

impl TensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// [`MemoryError::AlreadyRegistered`] if `index` already has a slot.
    pub fn insert(&mut self, index: OperandIndex, tensor: ManagedTensor) -> Result<(), MemoryError> {
        if self.tensors.contains_key(&index) {
            return Err(MemoryError::AlreadyRegistered(index));
        }
        self.tensors.insert(index, tensor);
        Ok(())
    }

    pub fn contains(&self, index: OperandIndex) -> bool {
        self.tensors.contains_key(&index)
    }

    pub fn get(&self, index: OperandIndex) -> Result<&ManagedTensor, MemoryError> {
        self.tensors.get(&index).ok_or(MemoryError::UnknownTensor(index))
    }

    pub fn get_mut(&mut self, index: OperandIndex) -> Result<&mut ManagedTensor, MemoryError> {
        self.tensors.get_mut(&index).ok_or(MemoryError::UnknownTensor(index))
    }

    /// Bytes of an allocated tensor.
    pub fn bytes(&self, index: OperandIndex) -> Result<&[u8], MemoryError> {
        self.get(index)?.bytes().ok_or(MemoryError::BufferMissing(index))
    }

    /// Moves a tensor's buffer out so it can be written while other tensors
    /// are borrowed. Pair every call with [`restore_buffer`](Self::restore_buffer).
    pub fn take_buffer(&mut self, index: OperandIndex) -> Result<BufferGuard, MemoryError> {
        self.get_mut(index)?.take().ok_or(MemoryError::BufferMissing(index))
    }

    pub fn restore_buffer(&mut self, index: OperandIndex, guard: BufferGuard) -> Result<(), MemoryError> {
        self.get_mut(index)?.restore(guard);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperandIndex, &ManagedTensor)> {
        self.tensors.iter().map(|(&i, t)| (i, t))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Sum of bytes held by allocated tensors.
    pub fn allocated_bytes(&self) -> usize {
        self.tensors.values().filter_map(ManagedTensor::allocated_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::TypeInfo;
    use tensor_core::{DType, Layout};

    fn slot() -> ManagedTensor {
        ManagedTensor::unshaped(TypeInfo::new(DType::Float32), Layout::Nhwc)
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut reg = TensorRegistry::new();
        reg.insert(OperandIndex::new(3), slot()).unwrap();
        let err = reg.insert(OperandIndex::new(3), slot()).unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyRegistered(i) if i.value() == 3));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_missing_lookups() {
        let mut reg = TensorRegistry::new();
        assert!(matches!(reg.get(OperandIndex::new(0)), Err(MemoryError::UnknownTensor(_))));
        reg.insert(OperandIndex::new(0), slot()).unwrap();
        assert!(matches!(reg.bytes(OperandIndex::new(0)), Err(MemoryError::BufferMissing(_))));
        assert!(matches!(reg.take_buffer(OperandIndex::new(0)), Err(MemoryError::BufferMissing(_))));
    }

    #[test]
    fn test_iteration_is_index_ordered() {
        let mut reg = TensorRegistry::new();
        for i in [5, 1, 3] {
            reg.insert(OperandIndex::new(i), slot()).unwrap();
        }
        let order: Vec<u32> = reg.iter().map(|(i, _)| i.value()).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }
}
