// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph nodes.
//!
//! [`OperationKind`] is closed: every operator the loader can produce is a
//! variant carrying its parameter record, and every consumer dispatches
//! with an exhaustive `match`. Adding an operator means adding a variant
//! and its arity rule below.

use crate::params::*;
use crate::{IrError, OperandIndex, SubgraphIndex};
use serde::Serialize;

/// Operator kind plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OperationKind {
    Conv2D(Conv2DParams),
    DepthwiseConv2D(DepthwiseConv2DParams),
    TransposeConv(TransposeConvParams),
    Pool2D(Pool2DParams),
    FullyConnected { activation: Activation },
    BatchMatMul(BatchMatMulParams),
    Einsum(EinsumParams),
    FusedBatchNorm(FusedBatchNormParams),
    L2Normalization,

    Reshape(ReshapeParams),
    Squeeze(SqueezeParams),
    ExpandDims,
    Transpose(TransposeParams),
    Concat { axis: i32, activation: Activation },
    Pack(PackParams),
    Unpack(PackParams),
    Split(SplitParams),
    SplitV { num_splits: u32 },
    StridedSlice(StridedSliceParams),
    Slice,
    Gather { axis: i32 },
    Tile,
    Pad,
    Reverse,
    SpaceToDepth { block_size: u32 },
    SpaceToBatchND,
    BatchToSpaceND,
    ResizeBilinear(ResizeParams),
    ResizeNearestNeighbor(ResizeParams),
    BroadcastTo,
    Shape,
    Rank,
    Fill,
    Range,
    OneHot { axis: i32 },
    MatrixBandPart,

    Softmax { beta: f32 },
    LogSoftmax { beta: f32, axis: i32 },
    ElementwiseActivation(ElementwiseActivationParams),
    BinaryArithmetic(BinaryArithmeticParams),
    ElementwiseBinary(BinaryOp),
    ElementwiseUnary(UnaryOp),
    Comparison(ComparisonOp),
    SquaredDifference,
    Pow,
    PReLU,
    Select,
    Reduce(ReduceParams),
    ArgMax(ArgMaxParams),
    StatelessRandomUniform,

    If(IfParams),
    While(WhileParams),
    Custom(CustomParams),
}

/// How many operands an operation accepts in one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(k) => n == k,
            Arity::Between(lo, hi) => (lo..=hi).contains(&n),
            Arity::AtLeast(k) => n >= k,
        }
    }

    fn describe(self) -> String {
        match self {
            Arity::Exactly(k) => k.to_string(),
            Arity::Between(lo, hi) => format!("{lo}..={hi}"),
            Arity::AtLeast(k) => format!("at least {k}"),
        }
    }
}

impl OperationKind {
    /// Short operator name for logs and errors.
    pub fn name(&self) -> &'static str {
        use OperationKind::*;
        match self {
            Conv2D(_) => "Conv2D",
            DepthwiseConv2D(_) => "DepthwiseConv2D",
            TransposeConv(_) => "TransposeConv",
            Pool2D(p) => match p.kind {
                PoolKind::Avg => "AvgPool2D",
                PoolKind::Max => "MaxPool2D",
            },
            FullyConnected { .. } => "FullyConnected",
            BatchMatMul(_) => "BatchMatMul",
            Einsum(_) => "Einsum",
            FusedBatchNorm(_) => "FusedBatchNorm",
            L2Normalization => "L2Normalization",
            Reshape(_) => "Reshape",
            Squeeze(_) => "Squeeze",
            ExpandDims => "ExpandDims",
            Transpose(_) => "Transpose",
            Concat { .. } => "Concat",
            Pack(_) => "Pack",
            Unpack(_) => "Unpack",
            Split(_) => "Split",
            SplitV { .. } => "SplitV",
            StridedSlice(_) => "StridedSlice",
            Slice => "Slice",
            Gather { .. } => "Gather",
            Tile => "Tile",
            Pad => "Pad",
            Reverse => "Reverse",
            SpaceToDepth { .. } => "SpaceToDepth",
            SpaceToBatchND => "SpaceToBatchND",
            BatchToSpaceND => "BatchToSpaceND",
            ResizeBilinear(_) => "ResizeBilinear",
            ResizeNearestNeighbor(_) => "ResizeNearestNeighbor",
            BroadcastTo => "BroadcastTo",
            Shape => "Shape",
            Rank => "Rank",
            Fill => "Fill",
            Range => "Range",
            OneHot { .. } => "OneHot",
            MatrixBandPart => "MatrixBandPart",
            Softmax { .. } => "Softmax",
            LogSoftmax { .. } => "LogSoftmax",
            ElementwiseActivation(p) => match p.kind {
                ActivationKind::Relu => "Relu",
                ActivationKind::Tanh => "Tanh",
                ActivationKind::Logistic => "Logistic",
                ActivationKind::LeakyRelu => "LeakyRelu",
            },
            BinaryArithmetic(p) => match p.op {
                ArithmeticOp::Add => "Add",
                ArithmeticOp::Sub => "Sub",
                ArithmeticOp::Mul => "Mul",
                ArithmeticOp::Div => "Div",
            },
            ElementwiseBinary(op) => match op {
                BinaryOp::Min => "Minimum",
                BinaryOp::Max => "Maximum",
                BinaryOp::LogicalOr => "LogicalOr",
            },
            ElementwiseUnary(op) => match op {
                UnaryOp::Rsqrt => "Rsqrt",
                UnaryOp::Sqrt => "Sqrt",
                UnaryOp::Exp => "Exp",
                UnaryOp::Abs => "Abs",
                UnaryOp::Cos => "Cos",
                UnaryOp::Sin => "Sin",
                UnaryOp::Neg => "Neg",
                UnaryOp::Log => "Log",
                UnaryOp::Round => "Round",
                UnaryOp::LogicalNot => "LogicalNot",
                UnaryOp::ZerosLike => "ZerosLike",
                UnaryOp::Quantize => "Quantize",
                UnaryOp::Cast => "Cast",
                UnaryOp::Erf => "Erf",
            },
            Comparison(_) => "Comparison",
            SquaredDifference => "SquaredDifference",
            Pow => "Pow",
            PReLU => "PReLU",
            Select => "Select",
            Reduce(_) => "Reduce",
            ArgMax(_) => "ArgMax",
            StatelessRandomUniform => "StatelessRandomUniform",
            If(_) => "If",
            While(_) => "While",
            Custom(_) => "Custom",
        }
    }

    /// Accepted `(inputs, outputs)` counts.
    pub fn arity(&self) -> (Arity, Arity) {
        use Arity::*;
        use OperationKind::*;
        let one = Exactly(1);
        match self {
            Conv2D(_) | DepthwiseConv2D(_) | FullyConnected { .. } => (Between(2, 3), one),
            TransposeConv(_) => (Between(3, 4), one),
            Pool2D(_) | Squeeze(_) | Transpose(_) | ResizeBilinear(_) | ResizeNearestNeighbor(_) => (one, one),
            Softmax { .. } | LogSoftmax { .. } | ElementwiseActivation(_) | ElementwiseUnary(_) => (one, one),
            SpaceToDepth { .. } | Shape | Rank | L2Normalization => (one, one),
            Reshape(_) => (Between(1, 2), one),
            Concat { .. } => (AtLeast(1), one),
            Pack(p) => (Exactly(p.num as usize), one),
            Unpack(p) => (one, Exactly(p.num as usize)),
            Split(p) => (one, Exactly(p.num_splits as usize)),
            SplitV { num_splits } => (Exactly(3), Exactly(*num_splits as usize)),
            BatchMatMul(_) | Einsum(_) | BinaryArithmetic(_) | ElementwiseBinary(_) | Comparison(_) => {
                (Exactly(2), one)
            }
            Gather { .. } | Tile | Reverse | ExpandDims | PReLU | Pow | SquaredDifference => (Exactly(2), one),
            Reduce(_) | ArgMax(_) | Fill | BroadcastTo | StatelessRandomUniform => (Exactly(2), one),
            Pad | BatchToSpaceND => (Between(2, 3), one),
            Select | Slice | Range | SpaceToBatchND | MatrixBandPart => (Exactly(3), one),
            StridedSlice(_) => (Exactly(4), one),
            FusedBatchNorm(_) => (Exactly(5), AtLeast(1)),
            OneHot { .. } => (Exactly(4), one),
            If(_) => (AtLeast(1), AtLeast(0)),
            While(_) | Custom(_) => (AtLeast(0), AtLeast(0)),
        }
    }

    /// Subgraphs this operation invokes.
    pub fn referenced_subgraphs(&self) -> Vec<SubgraphIndex> {
        match self {
            OperationKind::If(p) => vec![p.then_subgraph, p.else_subgraph],
            OperationKind::While(p) => vec![p.cond_subgraph, p.body_subgraph],
            _ => Vec::new(),
        }
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(self, OperationKind::If(_) | OperationKind::While(_))
    }
}

/// A validated, immutable graph node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    kind: OperationKind,
    inputs: Vec<OperandIndex>,
    outputs: Vec<OperandIndex>,
}

impl Operation {
    /// Builds an operation, checking the operand counts its kind requires.
    ///
    /// ```
    /// use model_ir::{Operation, OperationKind, OperandIndex};
    /// let ok = Operation::new(OperationKind::Shape, vec![OperandIndex::new(0)], vec![OperandIndex::new(1)]);
    /// assert!(ok.is_ok());
    /// let bad = Operation::new(OperationKind::Shape, vec![], vec![OperandIndex::new(1)]);
    /// assert!(bad.is_err());
    /// ```
    pub fn new(
        kind: OperationKind,
        inputs: Vec<OperandIndex>,
        outputs: Vec<OperandIndex>,
    ) -> Result<Self, IrError> {
        let (ins, outs) = kind.arity();
        if !ins.accepts(inputs.len()) {
            return Err(IrError::Arity {
                op: kind.name(),
                role: "inputs",
                expected: ins.describe(),
                actual: inputs.len(),
            });
        }
        if !outs.accepts(outputs.len()) {
            return Err(IrError::Arity {
                op: kind.name(),
                role: "outputs",
                expected: outs.describe(),
                actual: outputs.len(),
            });
        }
        if matches!(kind, OperationKind::While(_)) && inputs.len() != outputs.len() {
            return Err(IrError::Arity {
                op: kind.name(),
                role: "outputs (one per loop variable)",
                expected: inputs.len().to_string(),
                actual: outputs.len(),
            });
        }
        if outputs.iter().any(|o| !o.is_valid()) {
            return Err(IrError::InvalidModel(format!(
                "{} has an absent output",
                kind.name()
            )));
        }
        Ok(Self { kind, inputs, outputs })
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Inputs in positional order; absent optional inputs are
    /// [`OperandIndex::UNDEFINED`].
    pub fn inputs(&self) -> &[OperandIndex] {
        &self.inputs
    }

    /// Present inputs only.
    pub fn defined_inputs(&self) -> impl Iterator<Item = OperandIndex> + '_ {
        self.inputs.iter().copied().filter(|i| i.is_valid())
    }

    pub fn outputs(&self) -> &[OperandIndex] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(v: &[u32]) -> Vec<OperandIndex> {
        v.iter().map(|&i| OperandIndex::new(i)).collect()
    }

    #[test]
    fn test_fused_batch_norm_needs_five_inputs() {
        let kind = OperationKind::FusedBatchNorm(FusedBatchNormParams {
            is_training: false,
            epsilon: 1e-3,
            data_format: "NHWC".into(),
        });
        assert!(Operation::new(kind.clone(), idx(&[0, 1, 2, 3, 4]), idx(&[5])).is_ok());
        let err = Operation::new(kind, idx(&[0, 1, 2, 3]), idx(&[5])).unwrap_err();
        assert!(matches!(err, IrError::Arity { op: "FusedBatchNorm", actual: 4, .. }));
    }

    #[test]
    fn test_einsum_needs_two_inputs() {
        let kind = OperationKind::Einsum(EinsumParams {
            equation: "ij,jk->ik".into(),
        });
        assert!(Operation::new(kind.clone(), idx(&[0, 1]), idx(&[2])).is_ok());
        assert!(Operation::new(kind, idx(&[0, 1, 2]), idx(&[3])).is_err());
    }

    #[test]
    fn test_split_output_count_follows_num_splits() {
        let kind = OperationKind::Split(SplitParams { axis: 0, num_splits: 2 });
        assert!(Operation::new(kind.clone(), idx(&[0]), idx(&[1, 2])).is_ok());
        assert!(Operation::new(kind, idx(&[0]), idx(&[1, 2, 3])).is_err());
    }

    #[test]
    fn test_while_pairs_inputs_and_outputs() {
        let kind = OperationKind::While(WhileParams {
            cond_subgraph: SubgraphIndex::new(1),
            body_subgraph: SubgraphIndex::new(2),
        });
        assert!(Operation::new(kind.clone(), idx(&[0, 1]), idx(&[2, 3])).is_ok());
        assert!(Operation::new(kind, idx(&[0, 1]), idx(&[2])).is_err());
    }

    #[test]
    fn test_optional_input_filtered() {
        let op = Operation::new(
            OperationKind::FullyConnected {
                activation: Activation::None,
            },
            vec![OperandIndex::new(0), OperandIndex::new(1), OperandIndex::UNDEFINED],
            idx(&[2]),
        )
        .unwrap();
        assert_eq!(op.inputs().len(), 3);
        assert_eq!(op.defined_inputs().count(), 2);
    }

    #[test]
    fn test_names() {
        let add = OperationKind::BinaryArithmetic(BinaryArithmeticParams {
            op: ArithmeticOp::Add,
            activation: Activation::Relu,
        });
        assert_eq!(add.name(), "Add");
        assert_eq!(OperationKind::ElementwiseUnary(UnaryOp::Erf).name(), "Erf");
    }
}
