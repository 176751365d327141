// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! A backend-agnostic, index-based intermediate representation for
//! imported neural-network models:
//!
//! - [`OperandIndex`], [`OperationIndex`], [`SubgraphIndex`]: dense `u32`
//!   indices; [`OperandIndex::UNDEFINED`] marks an absent optional input.
//! - [`Operand`]: one tensor value slot: [`OperandInfo`] metadata, an
//!   optional constant [`Data`] buffer, and its def/use links.
//! - [`Operation`]: one node: an [`OperationKind`] (with parameters) and
//!   ordered input/output operand lists, arity-checked at construction.
//! - [`Graph`]: one append-only subgraph.
//! - [`Model`]: the subgraph collection, with a **type-state pattern**
//!   (`Loaded` → `Validated`).
//!
//! # Example
//! ```
//! use model_ir::{Graph, Model, OperandInfo, Operation, OperationKind, TypeInfo};
//! use tensor_core::{DType, Shape};
//!
//! let mut g = Graph::new();
//! let x = g.add_operand(OperandInfo::new(Shape::new(vec![1, 4]), TypeInfo::new(DType::Float32)));
//! let y = g.add_operand(OperandInfo::new(Shape::vector(2), TypeInfo::new(DType::Int32)));
//! g.add_operation(Operation::new(OperationKind::Shape, vec![x], vec![y]).unwrap()).unwrap();
//! g.add_input(x).unwrap();
//! g.add_output(y).unwrap();
//!
//! let mut model = Model::new();
//! model.push_subgraph(g);
//! let model = model.validate().unwrap();
//! println!("{}", model.summary());
//! ```

mod data;
mod error;
pub mod graph;
mod index;
pub mod model;
mod operand;
pub mod operation;
pub mod params;
mod types;

pub use data::Data;
pub use error::IrError;
pub use graph::Graph;
pub use index::{OperandIndex, OperationIndex, SubgraphIndex};
pub use model::{Loaded, Model, ModelState, Validated};
pub use operand::Operand;
pub use operation::{Arity, Operation, OperationKind};
pub use params::*;
pub use types::{OperandInfo, SparsityInfo, TypeInfo};
