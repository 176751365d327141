// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backend storage for one non-constant operand.

use crate::BufferGuard;
use model_ir::{OperandInfo, TypeInfo};
use tensor_core::{DType, Layout, Shape};

/// Which manager handed out the buffer a tensor currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOrigin {
    Static,
    Dynamic,
}

/// A registered operand slot: metadata, layout and at most one pool buffer.
///
/// The shape and the `dynamic` flag live in the embedded [`OperandInfo`].
/// Once a tensor is dynamic it stays dynamic.
#[derive(Debug)]
pub struct ManagedTensor {
    info: OperandInfo,
    layout: Layout,
    buffer: Option<BufferGuard>,
    origin: Option<BufferOrigin>,
}

impl ManagedTensor {
    pub fn new(info: OperandInfo, layout: Layout) -> Self {
        Self { info, layout, buffer: None, origin: None }
    }

    /// A slot whose shape is not known yet.
    pub fn unshaped(type_info: TypeInfo, layout: Layout) -> Self {
        let mut info = OperandInfo::new(Shape::default(), type_info);
        info.set_dynamic();
        Self::new(info, layout)
    }

    pub fn info(&self) -> &OperandInfo {
        &self.info
    }

    pub fn shape(&self) -> &Shape {
        self.info.shape()
    }

    pub fn dtype(&self) -> DType {
        self.info.dtype()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_dynamic(&self) -> bool {
        self.info.is_dynamic()
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Bytes the current shape needs, or `None` if that overflows `usize`.
    pub fn required_bytes(&self) -> Option<usize> {
        self.info.checked_total_size()
    }

    /// Bytes of the buffer currently held.
    pub fn allocated_bytes(&self) -> Option<usize> {
        self.buffer.as_ref().map(BufferGuard::size_bytes)
    }

    /// Who allocated the held buffer. Survives a take/restore cycle.
    pub fn origin(&self) -> Option<BufferOrigin> {
        self.origin
    }

    pub fn buffer(&self) -> Option<&BufferGuard> {
        self.buffer.as_ref()
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.buffer.as_ref().map(BufferGuard::as_bytes)
    }

    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.buffer.as_mut().map(BufferGuard::as_bytes_mut)
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.info.set_shape(shape);
    }

    pub(crate) fn mark_dynamic(&mut self) {
        self.info.set_dynamic();
    }

    pub(crate) fn attach(&mut self, guard: BufferGuard, origin: BufferOrigin) {
        self.buffer = Some(guard);
        self.origin = Some(origin);
    }

    /// Detaches the buffer for good. Dropping the result returns it to the pool.
    pub(crate) fn release(&mut self) -> Option<BufferGuard> {
        self.origin = None;
        self.buffer.take()
    }

    /// Detaches the buffer for a kernel call; the origin is kept.
    pub(crate) fn take(&mut self) -> Option<BufferGuard> {
        self.buffer.take()
    }

    pub(crate) fn restore(&mut self, guard: BufferGuard) {
        self.buffer = Some(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBudget, MemoryPool};

    #[test]
    fn test_required_bytes_follow_shape() {
        let info = OperandInfo::new(Shape::new(vec![2, 3]), TypeInfo::new(DType::Float32));
        let mut t = ManagedTensor::new(info, Layout::Nhwc);
        assert_eq!(t.required_bytes(), Some(24));
        t.set_shape(Shape::new(vec![4]));
        assert_eq!(t.required_bytes(), Some(16));
        t.set_shape(Shape::new(vec![65536; 4]));
        assert_eq!(t.required_bytes(), None);
        assert!(!t.is_allocated());
        assert!(t.bytes().is_none());
    }

    #[test]
    fn test_unshaped_is_dynamic() {
        let t = ManagedTensor::unshaped(TypeInfo::new(DType::Int32), Layout::Nchw);
        assert!(t.is_dynamic());
        assert_eq!(t.layout(), Layout::Nchw);
        assert_eq!(t.dtype(), DType::Int32);
    }

    #[test]
    fn test_take_keeps_origin_release_clears_it() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let info = OperandInfo::new(Shape::vector(4), TypeInfo::new(DType::Float32));
        let mut t = ManagedTensor::new(info, Layout::Nhwc);
        t.attach(pool.allocate(16).unwrap(), BufferOrigin::Static);

        let guard = t.take().unwrap();
        assert!(!t.is_allocated());
        assert_eq!(t.origin(), Some(BufferOrigin::Static));
        t.restore(guard);
        assert_eq!(t.allocated_bytes(), Some(16));

        drop(t.release());
        assert_eq!(t.origin(), None);
        assert_eq!(pool.allocated_bytes(), 0);
    }
}
