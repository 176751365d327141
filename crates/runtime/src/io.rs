// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Caller-facing input and output bundles.

use crate::ExecutionMetrics;
use tensor_core::{Layout, Tensor};

/// Values for the primary subgraph's inputs, in declaration order.
///
/// Rank-4 tensors are permuted between `input_layout` and the backend
/// layout on the way in, and from the backend layout into `output_layout`
/// on the way out.
#[derive(Debug, Clone, Default)]
pub struct IoDescription {
    pub inputs: Vec<Tensor>,
    pub input_layout: Layout,
    pub output_layout: Layout,
}

impl IoDescription {
    pub fn new(inputs: Vec<Tensor>) -> Self {
        Self { inputs, ..Default::default() }
    }

    pub fn with_input_layout(mut self, layout: Layout) -> Self {
        self.input_layout = layout;
        self
    }

    pub fn with_output_layout(mut self, layout: Layout) -> Self {
        self.output_layout = layout;
        self
    }
}

/// The result of one execution.
#[derive(Debug)]
pub struct ExecutionOutput {
    /// Primary subgraph outputs, in declaration order.
    pub outputs: Vec<Tensor>,
    pub metrics: ExecutionMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape};

    #[test]
    fn test_builder_layouts() {
        let io = IoDescription::new(vec![Tensor::zeros(Shape::vector(2), DType::Float32)])
            .with_input_layout(Layout::Nchw);
        assert_eq!(io.inputs.len(), 1);
        assert_eq!(io.input_layout, Layout::Nchw);
        assert_eq!(io.output_layout, Layout::Nhwc);
    }
}
