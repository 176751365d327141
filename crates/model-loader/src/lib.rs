// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-loader
//!
//! Reads TFLite flatbuffer models into [`model_ir::Model`].
//!
//! - [`load_from_file`] maps the file, copies constants into owned buffers
//!   and releases the copied pages from the mapping as it goes.
//! - [`load_from_buffer`] keeps constants as zero-copy ranges into the
//!   caller's shared buffer.
//!
//! Loading either succeeds with a [`Model<Validated>`](model_ir::Model) or
//! fails with a [`LoadError`]; there is no partial result.
//!
//! [`builder::ModelBuilder`] writes models in the same format.

pub mod builder;
mod custom;
mod error;
mod loader;
mod operations;
mod region;
pub mod schema;

pub use builder::ModelBuilder;
pub use error::LoadError;
pub use loader::{load_from_buffer, load_from_file};
pub use region::{aligned_inner_range, MappedRegion};
