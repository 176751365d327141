// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution profiling metrics.
//!
//! [`ExecutionMetrics`] collects per-operation timings, including the time
//! spent sizing dynamic outputs, along with dynamic allocation counts and
//! the pool's peak usage.

use model_ir::{OperationIndex, SubgraphIndex};
use std::time::Duration;

/// Metrics for a single operation invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OperationMetrics {
    pub subgraph: SubgraphIndex,
    pub operation: OperationIndex,
    /// Operator name, e.g. `"Add"`.
    pub name: &'static str,
    /// Time spent in the kernel (or the nested subgraph for control flow).
    pub compute_duration: Duration,
    /// Time spent inferring and applying output shapes.
    pub shape_inference_duration: Duration,
}

/// Aggregate metrics for one execution.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutionMetrics {
    /// Total wall-clock time, including input staging and output copies.
    pub total_duration: Duration,
    /// Per-operation metrics, nested subgraphs included, in execution order.
    pub operations: Vec<OperationMetrics>,
    /// Dynamic buffers allocated during the run.
    pub dynamic_allocations: u64,
    /// Pool high-water mark after the run.
    pub peak_pool_bytes: usize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&mut self, metrics: OperationMetrics) {
        self.operations.push(metrics);
    }

    pub fn add_dynamic_allocations(&mut self, count: u64) {
        self.dynamic_allocations += count;
    }

    /// Finalises metrics with the total wall-clock time and the pool peak.
    pub fn finalise(&mut self, total: Duration, peak_pool_bytes: usize) {
        self.total_duration = total;
        self.peak_pool_bytes = peak_pool_bytes;
    }

    pub fn total_compute_duration(&self) -> Duration {
        self.operations.iter().map(|m| m.compute_duration).sum()
    }

    pub fn total_shape_inference_duration(&self) -> Duration {
        self.operations.iter().map(|m| m.shape_inference_duration).sum()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_pool_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Execution: {:.2}ms total, {} operations, {:.2}ms compute, \
             {:.2}ms shape inference, {} dynamic allocations, peak {:.2} MB",
            self.total_duration.as_secs_f64() * 1000.0,
            self.operations.len(),
            self.total_compute_duration().as_secs_f64() * 1000.0,
            self.total_shape_inference_duration().as_secs_f64() * 1000.0,
            self.dynamic_allocations,
            peak_mb,
        )
    }
}
