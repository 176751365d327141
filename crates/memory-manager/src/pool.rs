// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budgeted buffer pool shared by the static and dynamic tensor managers.
//!
//! Every tensor buffer the runtime owns is drawn from one [`MemoryPool`].
//! The pool:
//!
//! 1. Refuses any allocation that would push live bytes past the budget.
//! 2. Keeps returned buffers in a free list binned by size class, so a
//!    dynamic tensor that is released and reallocated on every run does not
//!    go back to the system allocator.
//! 3. Keeps [`AllocationStats`] for the CLI and the execution metrics.
//!
//! Size classes are powers of two, never smaller than [`MIN_SIZE_CLASS`].

use crate::{AllocationStats, BufferGuard, MemoryBudget, MemoryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Smallest size class in bytes.
pub const MIN_SIZE_CLASS: usize = 4096;

/// Pool state shared between the pool handle and its outstanding guards.
pub(crate) struct PoolInner {
    budget: MemoryBudget,
    allocated_bytes: AtomicUsize,
    free_buffers: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    free_list_bytes: AtomicUsize,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    /// Called from `BufferGuard::drop`.
    pub(crate) fn return_buffer(&self, buffer: Vec<u8>, size_bytes: usize) {
        self.allocated_bytes.fetch_sub(size_bytes, Ordering::AcqRel);
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_deallocation();
        }

        // Zero-sized guards never hold memory worth caching.
        if buffer.capacity() == 0 {
            return;
        }
        let class = size_class_for(size_bytes);
        if let Ok(mut free) = self.free_buffers.lock() {
            self.free_list_bytes.fetch_add(buffer.capacity(), Ordering::AcqRel);
            free.entry(class).or_default().push(buffer);
        }
    }

    /// Reserves `size_bytes` against the budget, or reports how much is left.
    fn reserve(&self, size_bytes: usize) -> Result<usize, usize> {
        let budget = self.budget.as_bytes();
        self.allocated_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(size_bytes).filter(|&total| total <= budget)
            })
            .map(|previous| previous + size_bytes)
    }

    fn take_cached(&self, size_bytes: usize) -> Option<Vec<u8>> {
        let class = size_class_for(size_bytes);
        let mut free = self.free_buffers.lock().ok()?;
        let mut buf = free.get_mut(&class)?.pop()?;
        self.free_list_bytes.fetch_sub(buf.capacity(), Ordering::AcqRel);
        drop(free);

        buf.clear();
        buf.resize(size_bytes, 0);
        Some(buf)
    }
}

/// Handle to a budgeted buffer pool.
///
/// Cloning is cheap: all clones share the same budget, free list and stats.
///
/// # Example
/// ```
/// use memory_manager::{MemoryBudget, MemoryPool};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(64));
/// let guard = pool.allocate(1024 * 1024).unwrap();
/// assert_eq!(pool.allocated_bytes(), 1024 * 1024);
///
/// drop(guard);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new(budget: MemoryBudget) -> Self {
        info!(%budget, "creating tensor memory pool");
        Self {
            inner: Arc::new(PoolInner {
                budget,
                allocated_bytes: AtomicUsize::new(0),
                free_buffers: Mutex::new(HashMap::new()),
                free_list_bytes: AtomicUsize::new(0),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// A pool with no practical ceiling.
    pub fn unlimited() -> Self {
        Self::new(MemoryBudget::UNLIMITED)
    }

    /// Allocates a zeroed buffer of exactly `size_bytes`.
    ///
    /// A zero-byte request succeeds with an empty guard. Tensors with a zero
    /// dimension are legal and still need to count as allocated.
    ///
    /// # Errors
    /// [`MemoryError::OutOfMemory`] when live bytes would exceed the budget.
    pub fn allocate(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        if size_bytes == 0 {
            if let Ok(mut stats) = self.inner.stats.lock() {
                stats.record_allocation(0, false, self.allocated_bytes());
            }
            return Ok(BufferGuard::new(Vec::new(), Arc::clone(&self.inner), 0));
        }

        let live = match self.inner.reserve(size_bytes) {
            Ok(live) => live,
            Err(current) => {
                if let Ok(mut stats) = self.inner.stats.lock() {
                    stats.record_refusal();
                }
                let budget = self.inner.budget.as_bytes();
                debug!(requested = size_bytes, live = current, "allocation refused by budget");
                return Err(MemoryError::OutOfMemory {
                    requested_bytes: size_bytes,
                    available_bytes: budget.saturating_sub(current),
                    budget_bytes: budget,
                });
            }
        };

        let cached = self.inner.take_cached(size_bytes);
        let reused = cached.is_some();
        let data = cached.unwrap_or_else(|| vec![0u8; size_bytes]);

        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_allocation(size_bytes, reused, live);
        }

        Ok(BufferGuard::new(data, Arc::clone(&self.inner), size_bytes))
    }

    /// The error for a request whose byte size does not even fit in `usize`.
    pub(crate) fn unrepresentable(&self) -> MemoryError {
        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_refusal();
        }
        MemoryError::OutOfMemory {
            requested_bytes: usize::MAX,
            available_bytes: self.available_bytes(),
            budget_bytes: self.inner.budget.as_bytes(),
        }
    }

    /// Live bytes: handed out and not yet returned.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes.load(Ordering::Acquire)
    }

    pub fn available_bytes(&self) -> usize {
        self.inner.budget.as_bytes().saturating_sub(self.allocated_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// Snapshot of the allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        self.inner.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Drops every cached free buffer. Live guards are unaffected.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.inner.free_buffers.lock() {
            let released = self.inner.free_list_bytes.swap(0, Ordering::AcqRel);
            free.clear();
            debug!(released, "pool free list cleared");
        }
    }

    /// Bytes held by cached free buffers.
    pub fn free_list_bytes(&self) -> usize {
        self.inner.free_list_bytes.load(Ordering::Acquire)
    }
}

/// Smallest power of two that is at least `size` and at least [`MIN_SIZE_CLASS`].
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.inner.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("free_list_bytes", &self.free_list_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_drop() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));

        let guard = pool.allocate(1024).unwrap();
        assert_eq!(pool.allocated_bytes(), 1024);
        assert_eq!(guard.size_bytes(), 1024);

        drop(guard);
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_buffer_is_zeroed_and_writable() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut guard = pool.allocate(16).unwrap();
        assert!(guard.as_bytes().iter().all(|&b| b == 0));

        guard.as_bytes_mut()[0] = 42;
        assert_eq!(guard.as_bytes()[0], 42);
    }

    #[test]
    fn test_budget_exhausted() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(1024));
        let _a = pool.allocate(512).unwrap();
        let _b = pool.allocate(512).unwrap();

        match pool.allocate(1) {
            Err(MemoryError::OutOfMemory { requested_bytes, available_bytes, budget_bytes }) => {
                assert_eq!(requested_bytes, 1);
                assert_eq!(available_bytes, 0);
                assert_eq!(budget_bytes, 1024);
            }
            other => panic!("expected OutOfMemory, got {other:?}"),
        }
        assert_eq!(pool.allocated_bytes(), 1024);
    }

    #[test]
    fn test_zero_sized_allocation() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(16));
        let guard = pool.allocate(0).unwrap();
        assert_eq!(guard.size_bytes(), 0);
        assert!(guard.as_bytes().is_empty());
        drop(guard);
        assert_eq!(pool.allocated_bytes(), 0);
        assert_eq!(pool.free_list_bytes(), 0);
    }

    #[test]
    fn test_free_list_reuse() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        drop(pool.allocate(4096).unwrap());
        let _again = pool.allocate(3000).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.fresh, 1);
        assert_eq!(pool.free_list_bytes(), 0);
    }

    #[test]
    fn test_reused_buffer_is_zeroed() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let mut g = pool.allocate(4096).unwrap();
        g.as_bytes_mut().fill(0xFF);
        drop(g);

        let g2 = pool.allocate(4096).unwrap();
        assert_eq!(g2.as_bytes().len(), 4096);
        assert!(g2.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clones_share_budget() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(10_000));
        let other = pool.clone();

        let _g = other.allocate(3000).unwrap();
        assert_eq!(pool.available_bytes(), 7000);
        assert_eq!(pool.stats().total_allocations, 1);
    }

    #[test]
    fn test_shrink() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        drop(pool.allocate(8192).unwrap());
        assert!(pool.free_list_bytes() >= 8192);

        pool.shrink();
        assert_eq!(pool.free_list_bytes(), 0);
        let _g = pool.allocate(8192).unwrap();
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn test_stats_peak_and_refusal() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(4000));
        let g1 = pool.allocate(1000).unwrap();
        let g2 = pool.allocate(2000).unwrap();
        drop(g1);
        drop(g2);
        assert!(pool.allocate(5000).is_err());

        let stats = pool.stats();
        assert_eq!(stats.peak_allocated_bytes, 3000);
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.total_deallocations, 2);
    }

    #[test]
    fn test_concurrent_allocations_respect_budget() {
        let pool = MemoryPool::new(MemoryBudget::from_bytes(64 * 1024));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter_map(|_| pool.allocate(4096).ok())
                        .map(|g| {
                            assert!(pool.allocated_bytes() <= 64 * 1024);
                            g.size_bytes()
                        })
                        .sum::<usize>()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap() > 0);
        }
        assert_eq!(pool.allocated_bytes(), 0);
    }

    #[test]
    fn test_size_class() {
        assert_eq!(size_class_for(1), MIN_SIZE_CLASS);
        assert_eq!(size_class_for(4096), 4096);
        assert_eq!(size_class_for(5000), 8192);
        assert_eq!(size_class_for(1024 * 1024), 1024 * 1024);
    }

    #[test]
    fn test_debug_format() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(64));
        let debug = format!("{pool:?}");
        assert!(debug.contains("MemoryPool"));
        assert!(debug.contains("budget"));
    }
}
