// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The inference session, with a type-state enforced pipeline.
//!
//! ```text
//! InferenceSession<Idle>
//!     │  .load_model()          (or InferenceSession::from_model)
//!     ▼
//! InferenceSession<Loaded>
//!     │  .prepare()
//!     ▼
//! InferenceSession<Ready>
//!     │  .run()
//!     ▼
//!   ExecutionOutput
//! ```
//!
//! Each transition consumes the old value and returns a new one, and each
//! state carries exactly the data it needs, so invalid sequences do not
//! compile.

use crate::{ExecutionOutput, ExecutorSet, IoDescription, RuntimeConfig, RuntimeError};
use memory_manager::{AllocationStats, MemoryPool};
use model_ir::{Model, Validated};
use std::sync::Arc;
use tracing::info;

// ── Type-state markers ─────────────────────────────────────────

/// No model yet.
#[derive(Debug)]
pub struct Idle;

/// A validated model is held.
#[derive(Debug)]
pub struct Loaded {
    model: Arc<Model<Validated>>,
}

/// Executors are built and the pool exists.
#[derive(Debug)]
pub struct Ready {
    set: ExecutorSet,
}

/// Sealed trait for session states.
pub trait SessionState: std::fmt::Debug + sealed::Sealed {}
impl SessionState for Idle {}
impl SessionState for Loaded {}
impl SessionState for Ready {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Idle {}
    impl Sealed for super::Loaded {}
    impl Sealed for super::Ready {}
}

/// Drives a model from file to execution.
///
/// # Example
/// ```no_run
/// use runtime::{InferenceSession, IoDescription, RuntimeConfig};
/// use tensor_core::{Shape, Tensor};
///
/// # fn example() -> Result<(), runtime::RuntimeError> {
/// let session = InferenceSession::new(RuntimeConfig::default())
///     .load_model()?
///     .prepare()?;
/// let x = Tensor::from_f32(Shape::new(vec![1, 4]), &[0.5; 4])?;
/// let output = session.run(&IoDescription::new(vec![x]))?;
/// println!("{}", output.metrics.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InferenceSession<S: SessionState = Idle> {
    config: RuntimeConfig,
    state: S,
}

impl<S: SessionState> InferenceSession<S> {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

// ── Idle → Loaded ──────────────────────────────────────────────

impl InferenceSession<Idle> {
    pub fn new(config: RuntimeConfig) -> Self {
        info!("session created for '{}' on the {} backend", config.model_path.display(), config.backend);
        Self { config, state: Idle }
    }

    /// Loads and validates the configured model file.
    pub fn load_model(self) -> Result<InferenceSession<Loaded>, RuntimeError> {
        let model = model_loader::load_from_file(&self.config.model_path)?;
        info!("{}", model.summary());
        Ok(InferenceSession { config: self.config, state: Loaded { model: Arc::new(model) } })
    }

    /// Starts from an already loaded model.
    pub fn from_model(config: RuntimeConfig, model: Model<Validated>) -> InferenceSession<Loaded> {
        InferenceSession { config, state: Loaded { model: Arc::new(model) } }
    }
}

// ── Loaded → Ready ─────────────────────────────────────────────

impl InferenceSession<Loaded> {
    pub fn model(&self) -> &Model<Validated> {
        &self.state.model
    }

    /// Plans every subgraph, creates the backend and the memory pool, and
    /// builds the executors.
    pub fn prepare(self) -> Result<InferenceSession<Ready>, RuntimeError> {
        let budget = self.config.parse_budget()?;
        let plans = planner::plan_model(&self.state.model)?;
        for plan in &plans {
            info!("{}", plan.summary());
        }

        let backend = self.config.create_backend()?;
        let pool = MemoryPool::new(budget);
        let set = ExecutorSet::new(self.state.model, plans, backend, pool, self.config.layout)?
            .with_profiling(self.config.enable_profiling);
        info!("session ready: {} executors, {} layout", set.executors().len(), set.layout().as_str());

        Ok(InferenceSession { config: self.config, state: Ready { set } })
    }
}

// ── Ready: run ─────────────────────────────────────────────────

impl InferenceSession<Ready> {
    /// Executes the primary subgraph. Calls from several threads run one
    /// after another.
    pub fn run(&self, io: &IoDescription) -> Result<ExecutionOutput, RuntimeError> {
        self.state.set.execute(io)
    }

    pub fn model(&self) -> &Model<Validated> {
        self.state.set.model()
    }

    pub fn executors(&self) -> &ExecutorSet {
        &self.state.set
    }

    /// Returns the current memory pool statistics.
    pub fn memory_stats(&self) -> AllocationStats {
        self.state.set.pool().stats()
    }
}
