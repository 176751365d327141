// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # planner
//!
//! Lowers a validated [`Model`](model_ir::Model) into one [`ExecutionPlan`]
//! per subgraph: a fixed operation order, liveness annotations for the
//! dynamic tensor manager and the set of operands that must be sized at
//! run time.
//!
//! # Example
//! ```
//! use model_ir::{Graph, Model, Operation, OperationKind, OperandInfo, SubgraphIndex, TypeInfo};
//! use tensor_core::{DType, Shape};
//!
//! let mut g = Graph::new();
//! let x = g.add_operand(OperandInfo::new(Shape::vector(3), TypeInfo::new(DType::Float32)));
//! let s = g.add_operand(OperandInfo::new(Shape::vector(1), TypeInfo::new(DType::Int32)));
//! g.add_operation(Operation::new(OperationKind::Shape, vec![x], vec![s]).unwrap()).unwrap();
//! g.add_input(x).unwrap();
//! g.add_output(s).unwrap();
//!
//! let mut model = Model::new();
//! model.push_subgraph(g);
//! let model = model.validate().unwrap();
//!
//! let plan = planner::plan_subgraph(&model, SubgraphIndex::PRIMARY).unwrap();
//! assert_eq!(plan.num_operations(), 1);
//! assert_eq!(plan.releases_after(plan.order()[0]), &[x]);
//! ```

mod error;
mod lowering;
mod plan;

pub use error::PlannerError;
pub use lowering::{plan_model, plan_subgraph};
pub use plan::ExecutionPlan;
