// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One tensor slot in a graph.

use crate::{Data, OperandInfo, OperationIndex};
use bytemuck::Pod;
use std::sync::Arc;
use tensor_core::{DType, Shape};

/// A graph operand: metadata, an optional constant value, and def-use links.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Operand {
    info: OperandInfo,
    #[serde(rename = "constant_bytes", serialize_with = "serialize_data_len")]
    data: Option<Arc<Data>>,
    name: Option<String>,
    producer: Option<OperationIndex>,
    consumers: Vec<OperationIndex>,
}

fn serialize_data_len<S: serde::Serializer>(data: &Option<Arc<Data>>, s: S) -> Result<S::Ok, S::Error> {
    match data {
        Some(d) => s.serialize_some(&d.len()),
        None => s.serialize_none(),
    }
}

impl Operand {
    pub(crate) fn new(info: OperandInfo) -> Self {
        Self {
            info,
            data: None,
            name: None,
            producer: None,
            consumers: Vec::new(),
        }
    }

    pub fn info(&self) -> &OperandInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut OperandInfo {
        &mut self.info
    }

    pub fn shape(&self) -> &Shape {
        self.info.shape()
    }

    pub fn dtype(&self) -> DType {
        self.info.dtype()
    }

    /// A constant always carries its value.
    pub fn is_constant(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_dynamic(&self) -> bool {
        self.info.is_dynamic()
    }

    pub fn data(&self) -> Option<&Arc<Data>> {
        self.data.as_ref()
    }

    pub(crate) fn set_data(&mut self, data: Arc<Data>) {
        self.data = Some(data);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// The operation that writes this operand, if any.
    pub fn producer(&self) -> Option<OperationIndex> {
        self.producer
    }

    pub(crate) fn set_producer(&mut self, op: OperationIndex) {
        self.producer = Some(op);
    }

    /// Operations that read this operand, in insertion order.
    pub fn consumers(&self) -> &[OperationIndex] {
        &self.consumers
    }

    pub(crate) fn add_consumer(&mut self, op: OperationIndex) {
        if !self.consumers.contains(&op) {
            self.consumers.push(op);
        }
    }

    /// Reads a constant's bytes as a vector of `T`.
    pub fn as_vector<T: Pod>(&self) -> Option<Vec<T>> {
        let data = self.data.as_ref()?;
        if data.len() % std::mem::size_of::<T>() != 0 {
            return None;
        }
        Some(bytemuck::pod_collect_to_vec(data.bytes()))
    }

    /// Reads the first element of a constant as `T`.
    pub fn as_scalar<T: Pod>(&self) -> Option<T> {
        let data = self.data.as_ref()?;
        let bytes = data.bytes().get(..std::mem::size_of::<T>())?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}
