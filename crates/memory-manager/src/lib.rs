// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Backend tensor storage for the executor, drawn from one budgeted pool.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: the hard ceiling, parsed from strings like `"512M"`.
//! - [`MemoryPool`]: enforces the budget and keeps a size-classed free list.
//! - [`BufferGuard`]: RAII buffer handle; dropping it returns the memory.
//! - [`TensorRegistry`]: operand-indexed [`ManagedTensor`] slots for one
//!   subgraph.
//! - [`StaticTensorManager`]: buffers for tensors whose shape is known before
//!   the run.
//! - [`DynamicTensorManager`]: shape application, liveness-driven release
//!   and the static-to-dynamic handoff for everything else.
//!
//! # Ownership Model
//!
//! ```text
//!  StaticTensorManager ─┐                 ┌─► ManagedTensor ─► BufferGuard
//!                       ├─► TensorRegistry┤
//! DynamicTensorManager ─┘                 └─► ManagedTensor ─► (none)
//!                                                   │ drop
//!                                                   ▼
//!                                         MemoryPool free list
//! ```
//!
//! A tensor holds at most one guard, and only the manager named by its
//! [`BufferOrigin`] may release it.
//!
//! # Example
//! ```
//! use memory_manager::{DynamicTensorManager, MemoryBudget, MemoryPool, TensorRegistry};
//! use model_ir::{OperandIndex, TypeInfo};
//! use tensor_core::{DType, Layout, Shape};
//!
//! let pool = MemoryPool::new(MemoryBudget::from_mb(16));
//! let mut registry = TensorRegistry::new();
//! let mut dynamic = DynamicTensorManager::new(pool.clone());
//!
//! let x = OperandIndex::new(0);
//! dynamic.register_tensor(&mut registry, x, TypeInfo::new(DType::Float32), Layout::Nhwc).unwrap();
//! dynamic.apply_shape(&mut registry, x, Shape::new(vec![1, 8])).unwrap();
//! assert_eq!(pool.allocated_bytes(), 32);
//!
//! assert!(dynamic.release_subgraph_output(&mut registry, x));
//! assert_eq!(pool.allocated_bytes(), 0);
//! ```

mod budget;
mod dynamic;
mod error;
mod guard;
pub mod pool;
mod registry;
mod static_alloc;
mod stats;
mod tensor;

pub use budget::MemoryBudget;
pub use dynamic::{AllocationCounters, DynamicTensorManager};
pub use error::MemoryError;
pub use guard::BufferGuard;
pub use pool::MemoryPool;
pub use registry::TensorRegistry;
pub use static_alloc::StaticTensorManager;
pub use stats::AllocationStats;
pub use tensor::{BufferOrigin, ManagedTensor};
