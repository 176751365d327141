// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Executes validated models with dynamic shapes and bounded memory.
//!
//! The runtime takes:
//! - A `Model<Validated>` from `model-loader` or built in memory.
//! - One `ExecutionPlan` per subgraph from `planner`.
//! - A `MemoryPool` from `memory-manager`, sized by the configured budget.
//!
//! and runs the primary subgraph operation by operation on a [`Backend`].
//! Outputs whose shape depends on run-time values are sized just before
//! their producer runs, and dynamic buffers go back to the pool right after
//! their last reader.
//!
//! # Type-State Pipeline
//! ```text
//! InferenceSession<Idle> → InferenceSession<Loaded> → InferenceSession<Ready>
//! ```
//!
//! # Concurrency
//! There is no parallelism inside one execution. Each subgraph executor is
//! guarded by a mutex, so concurrent calls on one session are serialized,
//! while separate sessions run independently.

mod backend;
mod config;
mod error;
mod executor;
mod io;
mod metrics;
mod session;
pub mod shape_inference;

pub use backend::{Backend, CpuBackend};
pub use config::RuntimeConfig;
pub use error::{KernelError, RuntimeError, ShapeError};
pub use executor::{Executor, ExecutorSet};
pub use io::{ExecutionOutput, IoDescription};
pub use metrics::{ExecutionMetrics, OperationMetrics};
pub use session::{Idle, InferenceSession, Loaded, Ready, SessionState};
