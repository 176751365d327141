// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII handle for one pool buffer.

use crate::pool::PoolInner;
use std::sync::Arc;

/// Owns a buffer drawn from a [`MemoryPool`](crate::MemoryPool).
///
/// Dropping the guard returns the buffer to the pool's free list and gives
/// its bytes back to the budget. A tensor holds at most one guard, so
/// "released" and "dropped" are the same event.
pub struct BufferGuard {
    data: Vec<u8>,
    pool: Arc<PoolInner>,
    size_bytes: usize,
}

impl BufferGuard {
    pub(crate) fn new(data: Vec<u8>, pool: Arc<PoolInner>, size_bytes: usize) -> Self {
        Self { data, pool, size_bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes charged against the budget for this guard.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Address of the backing storage.
    ///
    /// Two guards alive at the same time never share an id, so comparing ids
    /// before and after an operation tells whether the buffer was replaced.
    pub fn id(&self) -> usize {
        self.data.as_ptr() as usize
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.return_buffer(data, self.size_bytes);
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGuard")
            .field("size_bytes", &self.size_bytes)
            .field("id", &format_args!("{:#x}", self.id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{MemoryBudget, MemoryPool};

    #[test]
    fn test_drop_returns_to_pool() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let guard = pool.allocate(2048).unwrap();
        assert_eq!(pool.allocated_bytes(), 2048);
        drop(guard);
        assert_eq!(pool.allocated_bytes(), 0);
        assert!(pool.free_list_bytes() >= 2048);
    }

    #[test]
    fn test_distinct_live_guards_have_distinct_ids() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let a = pool.allocate(64).unwrap();
        let b = pool.allocate(64).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_debug_shows_size() {
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let g = pool.allocate(100).unwrap();
        assert!(format!("{g:?}").contains("size_bytes: 100"));
    }
}
