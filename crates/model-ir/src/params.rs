// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator parameter records.

use crate::SubgraphIndex;
use serde::Serialize;
use tensor_core::DType;

// ── Shared attributes ──────────────────────────────────────────────

/// Activation fused into the tail of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Activation {
    #[default]
    None,
    Relu,
    /// Clamp to `[-1, 1]`.
    Relu1,
    Relu6,
    Tanh,
}

impl Activation {
    /// The `[lower, upper]` clamp this activation applies, if it is a clamp.
    pub fn clamp_range(self) -> Option<(f32, f32)> {
        match self {
            Activation::None => None,
            Activation::Relu => Some((0.0, f32::INFINITY)),
            Activation::Relu1 => Some((-1.0, 1.0)),
            Activation::Relu6 => Some((0.0, 6.0)),
            Activation::Tanh => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Padding {
    Same,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stride {
    pub vertical: u32,
    pub horizontal: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dilation {
    pub height_factor: u32,
    pub width_factor: u32,
}

impl Default for Dilation {
    fn default() -> Self {
        Self {
            height_factor: 1,
            width_factor: 1,
        }
    }
}

// ── Convolution and pooling ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conv2DParams {
    pub stride: Stride,
    pub padding: Padding,
    pub activation: Activation,
    pub dilation: Dilation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthwiseConv2DParams {
    pub stride: Stride,
    pub padding: Padding,
    pub multiplier: u32,
    pub activation: Activation,
    pub dilation: Dilation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransposeConvParams {
    pub stride: Stride,
    pub padding: Padding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolKind {
    Avg,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pool2DParams {
    pub kind: PoolKind,
    pub kernel_height: u32,
    pub kernel_width: u32,
    pub stride: Stride,
    pub padding: Padding,
    pub activation: Activation,
}

// ── Shape manipulation ─────────────────────────────────────────────

/// Target shape; at most one entry may be `-1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReshapeParams {
    pub new_shape: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeParams {
    pub height_out: i32,
    pub width_out: i32,
    pub align_corners: bool,
    pub half_pixel_centers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransposeParams {
    pub perm: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqueezeParams {
    /// Axes to drop; empty drops every unit axis.
    pub dims: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackParams {
    pub num: u32,
    pub axis: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitParams {
    pub axis: i32,
    pub num_splits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StridedSliceParams {
    pub begin_mask: i32,
    pub end_mask: i32,
    pub ellipsis_mask: i32,
    pub new_axis_mask: i32,
    pub shrink_axis_mask: i32,
}

// ── Elementwise ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinaryArithmeticParams {
    pub op: ArithmeticOp,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivationKind {
    /// Clamp to `[beta, alpha]`.
    Relu,
    /// `alpha * tanh(beta * x)`.
    Tanh,
    Logistic,
    /// Negative inputs scaled by `alpha`.
    LeakyRelu,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementwiseActivationParams {
    pub kind: ActivationKind,
    pub alpha: f32,
    pub beta: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Min,
    Max,
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Rsqrt,
    Sqrt,
    Exp,
    Abs,
    Cos,
    Sin,
    Neg,
    Log,
    Round,
    LogicalNot,
    ZerosLike,
    Quantize,
    Cast,
    Erf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

// ── Reductions and indexing ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReduceKind {
    Mean,
    Sum,
    Max,
    Prod,
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReduceParams {
    pub kind: ReduceKind,
    pub keep_dims: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgMaxParams {
    pub output_type: DType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchMatMulParams {
    pub adj_x: bool,
    pub adj_y: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EinsumParams {
    pub equation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedBatchNormParams {
    pub is_training: bool,
    pub epsilon: f32,
    pub data_format: String,
}

// ── Control flow and custom ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfParams {
    pub then_subgraph: SubgraphIndex,
    pub else_subgraph: SubgraphIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhileParams {
    pub cond_subgraph: SubgraphIndex,
    pub body_subgraph: SubgraphIndex,
}

/// An operator the loader does not understand, kept for a backend that might.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomParams {
    pub id: String,
    /// Raw option bytes exactly as serialized.
    pub user_data: Vec<u8>,
}
