// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pool allocation counters.

/// Cumulative counters for one [`MemoryPool`](crate::MemoryPool).
///
/// Every clone of a pool feeds the same counters, so one snapshot covers all
/// executors of a session. Refused requests are not allocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Guards handed out, including zero-byte ones.
    pub total_allocations: u64,
    /// Allocations served by a buffer from the free list.
    pub reused: u64,
    /// Allocations that needed a fresh `Vec`.
    pub fresh: u64,
    /// Requests refused because the budget would be exceeded.
    pub refused: u64,
    /// Guards dropped back into the pool.
    pub total_deallocations: u64,
    /// High-water mark of live bytes.
    pub peak_allocated_bytes: usize,
    /// Largest single successful request.
    pub largest_request_bytes: usize,
    pub bytes_handed_out: u64,
}

impl AllocationStats {
    /// Guards handed out and not yet dropped.
    pub fn live_buffers(&self) -> u64 {
        self.total_allocations.saturating_sub(self.total_deallocations)
    }

    /// Share of allocations served from the free list, in `[0.0, 1.0]`.
    pub fn reuse_ratio(&self) -> f64 {
        if self.total_allocations == 0 {
            return 0.0;
        }
        self.reused as f64 / self.total_allocations as f64
    }

    pub(crate) fn record_allocation(&mut self, size: usize, reused: bool, live_bytes: usize) {
        self.total_allocations += 1;
        if reused {
            self.reused += 1;
        } else {
            self.fresh += 1;
        }
        self.bytes_handed_out += size as u64;
        self.largest_request_bytes = self.largest_request_bytes.max(size);
        self.peak_allocated_bytes = self.peak_allocated_bytes.max(live_bytes);
    }

    pub(crate) fn record_refusal(&mut self) {
        self.refused += 1;
    }

    pub(crate) fn record_deallocation(&mut self) {
        self.total_deallocations += 1;
    }

    /// One-line report used by `nnrt run`.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_allocated_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Pool: {} allocations ({} reused, {:.0}%), {} released, {} live, \
             {} refused, peak {:.2} MB",
            self.total_allocations,
            self.reused,
            self.reuse_ratio() * 100.0,
            self.total_deallocations,
            self.live_buffers(),
            self.refused,
            peak_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let s = AllocationStats::default();
        assert_eq!(s.live_buffers(), 0);
        assert_eq!(s.reuse_ratio(), 0.0);
    }

    #[test]
    fn test_reuse_ratio() {
        let mut s = AllocationStats::default();
        s.record_allocation(100, true, 100);
        s.record_allocation(100, true, 200);
        s.record_allocation(200, false, 400);
        assert!((s.reuse_ratio() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(s.fresh, 1);
        assert_eq!(s.bytes_handed_out, 400);
    }

    #[test]
    fn test_peak_and_largest_only_grow() {
        let mut s = AllocationStats::default();
        s.record_allocation(100, false, 300);
        s.record_allocation(50, false, 120);
        assert_eq!(s.peak_allocated_bytes, 300);
        assert_eq!(s.largest_request_bytes, 100);
    }

    #[test]
    fn test_refusals_are_not_allocations() {
        let mut s = AllocationStats::default();
        s.record_allocation(10, false, 10);
        s.record_allocation(10, false, 20);
        s.record_refusal();
        s.record_deallocation();
        assert_eq!(s.total_allocations, 2);
        assert_eq!(s.live_buffers(), 1);
        assert_eq!(s.refused, 1);
    }

    #[test]
    fn test_summary() {
        let mut s = AllocationStats::default();
        s.record_allocation(1024 * 1024, false, 1024 * 1024);
        s.record_allocation(512, true, 1024 * 1024 + 512);
        let summary = s.summary();
        assert!(summary.contains("2 allocations"));
        assert!(summary.contains("1 reused"));
        assert!(summary.contains("2 live"));
    }
}
