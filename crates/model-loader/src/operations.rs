// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator translation: serialized operator → [`OperationKind`].

use crate::custom::custom_kind;
use crate::loader::{convert_tensor_type, Opcode, SubgraphLoader};
use crate::schema::{self, activation, padding, tensor_type, BuiltinOperator as Op, UnionMember};
use crate::LoadError;
use model_ir::{
    Activation, ActivationKind, ArgMaxParams, ArithmeticOp, BatchMatMulParams, BinaryArithmeticParams, BinaryOp,
    ComparisonOp, Conv2DParams, DepthwiseConv2DParams, Dilation, ElementwiseActivationParams, IfParams,
    OperandIndex, Operation, OperationIndex, OperationKind, PackParams, Padding, Pool2DParams, PoolKind,
    ReduceKind, ReduceParams, ReshapeParams, ResizeParams, SplitParams, SqueezeParams, Stride, StridedSliceParams,
    SubgraphIndex, TransposeConvParams, TransposeParams, UnaryOp, WhileParams,
};
use tensor_core::DType;

/// Operators that may leave an input position absent (`-1`).
fn allows_optional_input(code: Op) -> bool {
    code == Op::FULLY_CONNECTED
}

pub(crate) fn convert_activation(op: &'static str, code: i8) -> Result<Activation, LoadError> {
    Ok(match code {
        activation::NONE => Activation::None,
        activation::RELU => Activation::Relu,
        activation::RELU_N1_TO_1 => Activation::Relu1,
        activation::RELU6 => Activation::Relu6,
        activation::TANH => Activation::Tanh,
        _ => {
            return Err(LoadError::UnsupportedAttribute {
                op,
                attribute: "fused activation",
                value: i64::from(code),
            })
        }
    })
}

fn convert_padding(op: &'static str, code: i8) -> Result<Padding, LoadError> {
    match code {
        padding::SAME => Ok(Padding::Same),
        padding::VALID => Ok(Padding::Valid),
        _ => Err(LoadError::UnsupportedAttribute {
            op,
            attribute: "padding",
            value: i64::from(code),
        }),
    }
}

fn non_negative(op: &'static str, what: &'static str, value: i32) -> Result<u32, LoadError> {
    u32::try_from(value).map_err(|_| LoadError::InvalidParameter {
        op,
        what,
        reason: format!("{value} is negative"),
    })
}

fn stride(op: &'static str, h: i32, w: i32) -> Result<Stride, LoadError> {
    Ok(Stride {
        vertical: non_negative(op, "stride_h", h)?,
        horizontal: non_negative(op, "stride_w", w)?,
    })
}

fn subgraph(op: &'static str, what: &'static str, index: i32) -> Result<SubgraphIndex, LoadError> {
    Ok(SubgraphIndex::new(non_negative(op, what, index)?))
}

fn options<'a, T: UnionMember<'a>>(op: &schema::Operator<'a>, name: &'static str) -> Result<T, LoadError> {
    op.builtin_options_as::<T>().ok_or(LoadError::MissingOptions { op: name })
}

fn activation_kind(kind: ActivationKind, alpha: f32, beta: f32) -> OperationKind {
    OperationKind::ElementwiseActivation(ElementwiseActivationParams { kind, alpha, beta })
}

fn arithmetic(op: ArithmeticOp, activation: Activation) -> OperationKind {
    OperationKind::BinaryArithmetic(BinaryArithmeticParams { op, activation })
}

fn input_at(op: &'static str, inputs: &[OperandIndex], position: usize) -> Result<OperandIndex, LoadError> {
    inputs.get(position).copied().ok_or(LoadError::InvalidParameter {
        op,
        what: "inputs",
        reason: format!("expected at least {} inputs, got {}", position + 1, inputs.len()),
    })
}

impl<'l, 'a> SubgraphLoader<'l, 'a> {
    pub(crate) fn load_operation(&mut self, op: schema::Operator<'a>) -> Result<OperationIndex, LoadError> {
        let opcode = self.loader.opcode(op.opcode_index())?;
        let mut inputs = self.operation_inputs(&op, opcode)?;
        let outputs = op
            .outputs()
            .iter()
            .flat_map(|v| v.iter())
            .map(|t| self.operand(t))
            .collect::<Result<Vec<_>, _>>()?;

        let kind = if opcode.code == Op::CUSTOM {
            let name = opcode.custom_name.ok_or(LoadError::MissingField {
                table: "OperatorCode",
                field: "custom_code",
            })?;
            custom_kind(name, &op)?
        } else {
            self.builtin_kind(opcode.code, &op, &mut inputs)?
        };

        let index = self.graph.add_operation(Operation::new(kind, inputs, outputs)?)?;
        self.retype_operands(index);
        Ok(index)
    }

    fn operation_inputs(&self, op: &schema::Operator<'a>, opcode: Opcode<'a>) -> Result<Vec<OperandIndex>, LoadError> {
        let mut inputs = Vec::new();
        for (position, tensor) in op.inputs().iter().flat_map(|v| v.iter()).enumerate() {
            if tensor == -1 && !allows_optional_input(opcode.code) {
                let name = match opcode.custom_name {
                    Some(custom) if opcode.code == Op::CUSTOM => custom.to_string(),
                    _ => opcode.code.to_string(),
                };
                return Err(LoadError::OptionalInputNotAllowed { op: name, position });
            }
            inputs.push(self.operand(tensor)?);
        }
        Ok(inputs)
    }

    /// Reads a constant integer vector (`int32` or `int64`) from an operand.
    fn constant_ints(&self, op: &'static str, what: &'static str, index: OperandIndex) -> Result<Vec<i32>, LoadError> {
        let operand = self
            .graph
            .operand(index)
            .filter(|o| o.is_constant())
            .ok_or(LoadError::NonConstantParameter { op, what })?;
        let invalid = |reason: String| LoadError::InvalidParameter { op, what, reason };
        match operand.dtype() {
            DType::Int32 => operand.as_vector::<i32>().ok_or_else(|| invalid("misaligned data".into())),
            DType::Int64 => operand
                .as_vector::<i64>()
                .ok_or_else(|| invalid("misaligned data".into()))?
                .into_iter()
                .map(|v| i32::try_from(v).map_err(|_| invalid(format!("{v} does not fit in int32"))))
                .collect(),
            other => Err(invalid(format!("expected an integer tensor, got {other}"))),
        }
    }

    fn require_constant(&self, op: &'static str, what: &'static str, index: OperandIndex) -> Result<(), LoadError> {
        match self.graph.operand(index) {
            Some(operand) if operand.is_constant() => Ok(()),
            _ => Err(LoadError::NonConstantParameter { op, what }),
        }
    }

    fn builtin_kind(
        &self,
        code: Op,
        op: &schema::Operator<'a>,
        inputs: &mut Vec<OperandIndex>,
    ) -> Result<OperationKind, LoadError> {
        use schema::*;
        let kind = match code {
            // ── Convolution and pooling ────────────────────────────
            Op::CONV_2D => {
                let o: Conv2DOptions = options(op, "Conv2D")?;
                OperationKind::Conv2D(Conv2DParams {
                    stride: stride("Conv2D", o.stride_h(), o.stride_w())?,
                    padding: convert_padding("Conv2D", o.padding())?,
                    activation: convert_activation("Conv2D", o.fused_activation_function())?,
                    dilation: Dilation {
                        height_factor: non_negative("Conv2D", "dilation_h_factor", o.dilation_h_factor())?,
                        width_factor: non_negative("Conv2D", "dilation_w_factor", o.dilation_w_factor())?,
                    },
                })
            }
            Op::DEPTHWISE_CONV_2D => {
                let name = "DepthwiseConv2D";
                let o: DepthwiseConv2DOptions = options(op, name)?;
                OperationKind::DepthwiseConv2D(DepthwiseConv2DParams {
                    stride: stride(name, o.stride_h(), o.stride_w())?,
                    padding: convert_padding(name, o.padding())?,
                    multiplier: non_negative(name, "depth_multiplier", o.depth_multiplier())?,
                    activation: convert_activation(name, o.fused_activation_function())?,
                    dilation: Dilation {
                        height_factor: non_negative(name, "dilation_h_factor", o.dilation_h_factor())?,
                        width_factor: non_negative(name, "dilation_w_factor", o.dilation_w_factor())?,
                    },
                })
            }
            Op::TRANSPOSE_CONV => {
                let o: TransposeConvOptions = options(op, "TransposeConv")?;
                OperationKind::TransposeConv(TransposeConvParams {
                    stride: stride("TransposeConv", o.stride_h(), o.stride_w())?,
                    padding: convert_padding("TransposeConv", o.padding())?,
                })
            }
            Op::AVERAGE_POOL_2D | Op::MAX_POOL_2D => {
                let (kind, name) = if code == Op::MAX_POOL_2D {
                    (PoolKind::Max, "MaxPool2D")
                } else {
                    (PoolKind::Avg, "AvgPool2D")
                };
                let o: Pool2DOptions = options(op, name)?;
                OperationKind::Pool2D(Pool2DParams {
                    kind,
                    kernel_height: non_negative(name, "filter_height", o.filter_height())?,
                    kernel_width: non_negative(name, "filter_width", o.filter_width())?,
                    stride: stride(name, o.stride_h(), o.stride_w())?,
                    padding: convert_padding(name, o.padding())?,
                    activation: convert_activation(name, o.fused_activation_function())?,
                })
            }
            Op::FULLY_CONNECTED => {
                let o: FullyConnectedOptions = options(op, "FullyConnected")?;
                OperationKind::FullyConnected {
                    activation: convert_activation("FullyConnected", o.fused_activation_function())?,
                }
            }
            Op::BATCH_MATMUL => {
                let o: BatchMatMulOptions = options(op, "BatchMatMul")?;
                OperationKind::BatchMatMul(BatchMatMulParams {
                    adj_x: o.adj_x(),
                    adj_y: o.adj_y(),
                })
            }
            Op::L2_NORMALIZATION => OperationKind::L2Normalization,

            // ── Shape manipulation ─────────────────────────────────
            Op::RESHAPE => self.reshape(op, inputs)?,
            Op::SQUEEZE => {
                let dims = op
                    .builtin_options_as::<SqueezeOptions>()
                    .and_then(|o| o.squeeze_dims())
                    .map(|v| v.iter().collect())
                    .unwrap_or_default();
                OperationKind::Squeeze(SqueezeParams { dims })
            }
            Op::EXPAND_DIMS => OperationKind::ExpandDims,
            Op::TRANSPOSE => {
                let perm = self.constant_ints("Transpose", "perm", input_at("Transpose", inputs, 1)?)?;
                inputs.truncate(1);
                OperationKind::Transpose(TransposeParams { perm })
            }
            Op::CONCATENATION => {
                let o: ConcatenationOptions = options(op, "Concat")?;
                OperationKind::Concat {
                    axis: o.axis(),
                    activation: convert_activation("Concat", o.fused_activation_function())?,
                }
            }
            Op::PACK => {
                let o: PackOptions = options(op, "Pack")?;
                OperationKind::Pack(PackParams {
                    num: non_negative("Pack", "values_count", o.values_count())?,
                    axis: o.axis(),
                })
            }
            Op::UNPACK => {
                let o: UnpackOptions = options(op, "Unpack")?;
                OperationKind::Unpack(PackParams {
                    num: non_negative("Unpack", "num", o.num())?,
                    axis: o.axis(),
                })
            }
            Op::SPLIT => {
                // Serialized as (axis, input).
                let o: SplitOptions = options(op, "Split")?;
                let axes = self.constant_ints("Split", "axis", input_at("Split", inputs, 0)?)?;
                let &[axis] = axes.as_slice() else {
                    return Err(LoadError::InvalidParameter {
                        op: "Split",
                        what: "axis",
                        reason: format!("expected a scalar, got {} values", axes.len()),
                    });
                };
                let input = input_at("Split", inputs, 1)?;
                *inputs = vec![input];
                OperationKind::Split(SplitParams {
                    axis,
                    num_splits: non_negative("Split", "num_splits", o.num_splits())?,
                })
            }
            Op::SPLIT_V => {
                let o: SplitVOptions = options(op, "SplitV")?;
                OperationKind::SplitV {
                    num_splits: non_negative("SplitV", "num_splits", o.num_splits())?,
                }
            }
            Op::STRIDED_SLICE => {
                let o: StridedSliceOptions = options(op, "StridedSlice")?;
                OperationKind::StridedSlice(StridedSliceParams {
                    begin_mask: o.begin_mask(),
                    end_mask: o.end_mask(),
                    ellipsis_mask: o.ellipsis_mask(),
                    new_axis_mask: o.new_axis_mask(),
                    shrink_axis_mask: o.shrink_axis_mask(),
                })
            }
            Op::SLICE => OperationKind::Slice,
            Op::GATHER => {
                let o: GatherOptions = options(op, "Gather")?;
                OperationKind::Gather { axis: o.axis() }
            }
            Op::TILE => {
                self.require_constant("Tile", "multiples", input_at("Tile", inputs, 1)?)?;
                OperationKind::Tile
            }
            Op::PAD | Op::PADV2 => OperationKind::Pad,
            Op::REVERSE_V2 => OperationKind::Reverse,
            Op::SPACE_TO_DEPTH => {
                let o: SpaceToDepthOptions = options(op, "SpaceToDepth")?;
                OperationKind::SpaceToDepth {
                    block_size: non_negative("SpaceToDepth", "block_size", o.block_size())?,
                }
            }
            Op::SPACE_TO_BATCH_ND => OperationKind::SpaceToBatchND,
            Op::BATCH_TO_SPACE_ND => OperationKind::BatchToSpaceND,
            Op::RESIZE_BILINEAR => {
                let o: ResizeBilinearOptions = options(op, "ResizeBilinear")?;
                let (height_out, width_out) = self.resize_size("ResizeBilinear", inputs)?;
                OperationKind::ResizeBilinear(ResizeParams {
                    height_out,
                    width_out,
                    align_corners: o.align_corners(),
                    half_pixel_centers: o.half_pixel_centers(),
                })
            }
            Op::RESIZE_NEAREST_NEIGHBOR => {
                let o: ResizeNearestNeighborOptions = options(op, "ResizeNearestNeighbor")?;
                let (height_out, width_out) = self.resize_size("ResizeNearestNeighbor", inputs)?;
                OperationKind::ResizeNearestNeighbor(ResizeParams {
                    height_out,
                    width_out,
                    align_corners: o.align_corners(),
                    half_pixel_centers: o.half_pixel_centers(),
                })
            }
            Op::SHAPE => OperationKind::Shape,
            Op::RANK => OperationKind::Rank,
            Op::FILL => OperationKind::Fill,
            Op::RANGE => OperationKind::Range,
            Op::ONE_HOT => {
                let o: OneHotOptions = options(op, "OneHot")?;
                OperationKind::OneHot { axis: o.axis() }
            }

            // ── Activations ───────────────────────────────────────
            Op::SOFTMAX => {
                let o: SoftmaxOptions = options(op, "Softmax")?;
                OperationKind::Softmax { beta: o.beta() }
            }
            Op::LOG_SOFTMAX => OperationKind::LogSoftmax { beta: 1.0, axis: -1 },
            Op::RELU => activation_kind(ActivationKind::Relu, f32::INFINITY, 0.0),
            Op::RELU_N1_TO_1 => activation_kind(ActivationKind::Relu, 1.0, -1.0),
            Op::RELU6 => activation_kind(ActivationKind::Relu, 6.0, 0.0),
            Op::TANH => activation_kind(ActivationKind::Tanh, 1.0, 1.0),
            Op::LOGISTIC => activation_kind(ActivationKind::Logistic, 0.0, 0.0),
            Op::LEAKY_RELU => {
                let o: LeakyReluOptions = options(op, "LeakyRelu")?;
                activation_kind(ActivationKind::LeakyRelu, o.alpha(), 1.0)
            }
            Op::PRELU => OperationKind::PReLU,

            // ── Elementwise arithmetic ─────────────────────────────
            Op::ADD => {
                let o: AddOptions = options(op, "Add")?;
                arithmetic(ArithmeticOp::Add, convert_activation("Add", o.fused_activation_function())?)
            }
            Op::SUB => {
                let o: SubOptions = options(op, "Sub")?;
                arithmetic(ArithmeticOp::Sub, convert_activation("Sub", o.fused_activation_function())?)
            }
            Op::MUL => {
                let o: MulOptions = options(op, "Mul")?;
                arithmetic(ArithmeticOp::Mul, convert_activation("Mul", o.fused_activation_function())?)
            }
            Op::DIV => {
                let o: DivOptions = options(op, "Div")?;
                arithmetic(ArithmeticOp::Div, convert_activation("Div", o.fused_activation_function())?)
            }
            Op::MINIMUM => OperationKind::ElementwiseBinary(BinaryOp::Min),
            Op::MAXIMUM => OperationKind::ElementwiseBinary(BinaryOp::Max),
            Op::LOGICAL_OR => OperationKind::ElementwiseBinary(BinaryOp::LogicalOr),
            Op::SQUARED_DIFFERENCE => OperationKind::SquaredDifference,
            Op::POW => OperationKind::Pow,
            Op::SELECT | Op::SELECT_V2 => OperationKind::Select,

            Op::RSQRT => OperationKind::ElementwiseUnary(UnaryOp::Rsqrt),
            Op::SQRT => OperationKind::ElementwiseUnary(UnaryOp::Sqrt),
            Op::EXP => OperationKind::ElementwiseUnary(UnaryOp::Exp),
            Op::ABS => OperationKind::ElementwiseUnary(UnaryOp::Abs),
            Op::COS => OperationKind::ElementwiseUnary(UnaryOp::Cos),
            Op::SIN => OperationKind::ElementwiseUnary(UnaryOp::Sin),
            Op::NEG => OperationKind::ElementwiseUnary(UnaryOp::Neg),
            Op::LOG => OperationKind::ElementwiseUnary(UnaryOp::Log),
            Op::ROUND => OperationKind::ElementwiseUnary(UnaryOp::Round),
            Op::LOGICAL_NOT => OperationKind::ElementwiseUnary(UnaryOp::LogicalNot),
            Op::ZEROS_LIKE => OperationKind::ElementwiseUnary(UnaryOp::ZerosLike),
            Op::QUANTIZE => OperationKind::ElementwiseUnary(UnaryOp::Quantize),
            Op::CAST => OperationKind::ElementwiseUnary(UnaryOp::Cast),

            Op::EQUAL => OperationKind::Comparison(ComparisonOp::Equal),
            Op::NOT_EQUAL => OperationKind::Comparison(ComparisonOp::NotEqual),
            Op::GREATER => OperationKind::Comparison(ComparisonOp::Greater),
            Op::GREATER_EQUAL => OperationKind::Comparison(ComparisonOp::GreaterEqual),
            Op::LESS => OperationKind::Comparison(ComparisonOp::Less),
            Op::LESS_EQUAL => OperationKind::Comparison(ComparisonOp::LessEqual),

            // ── Reductions ─────────────────────────────────────────
            Op::MEAN | Op::SUM | Op::REDUCE_MAX | Op::REDUCE_PROD | Op::REDUCE_ANY => {
                let kind = match code {
                    Op::MEAN => ReduceKind::Mean,
                    Op::SUM => ReduceKind::Sum,
                    Op::REDUCE_MAX => ReduceKind::Max,
                    Op::REDUCE_PROD => ReduceKind::Prod,
                    _ => ReduceKind::Any,
                };
                let o: ReducerOptions = options(op, "Reduce")?;
                OperationKind::Reduce(ReduceParams {
                    kind,
                    keep_dims: o.keep_dims(),
                })
            }
            Op::ARG_MAX => {
                let o: ArgMaxOptions = options(op, "ArgMax")?;
                let output_type = match o.output_type() {
                    t @ (tensor_type::INT32 | tensor_type::INT64) => convert_tensor_type("ArgMax", t)?,
                    t => {
                        return Err(LoadError::UnsupportedAttribute {
                            op: "ArgMax",
                            attribute: "output_type",
                            value: i64::from(t),
                        })
                    }
                };
                let axis = input_at("ArgMax", inputs, 1)?;
                let axis_ok = self.graph.operand(axis).is_some_and(|o| {
                    o.info().total_size() == 4 && matches!(o.dtype(), DType::Int32 | DType::Int64)
                });
                if !axis_ok {
                    return Err(LoadError::InvalidParameter {
                        op: "ArgMax",
                        what: "axis",
                        reason: "expected a single 4-byte integer".into(),
                    });
                }
                OperationKind::ArgMax(ArgMaxParams { output_type })
            }

            // ── Control flow ───────────────────────────────────────
            Op::IF => {
                let o: IfOptions = options(op, "If")?;
                OperationKind::If(IfParams {
                    then_subgraph: subgraph("If", "then_subgraph_index", o.then_subgraph_index())?,
                    else_subgraph: subgraph("If", "else_subgraph_index", o.else_subgraph_index())?,
                })
            }
            Op::WHILE => {
                let o: WhileOptions = options(op, "While")?;
                OperationKind::While(WhileParams {
                    cond_subgraph: subgraph("While", "cond_subgraph_index", o.cond_subgraph_index())?,
                    body_subgraph: subgraph("While", "body_subgraph_index", o.body_subgraph_index())?,
                })
            }

            other => return Err(LoadError::UnsupportedOperator(other.to_string())),
        };
        Ok(kind)
    }

    /// Reshape takes its target from the options table when present, else
    /// from the constant shape input.
    fn reshape(&self, op: &schema::Operator<'a>, inputs: &[OperandIndex]) -> Result<OperationKind, LoadError> {
        let shape_input = inputs.get(1).copied().filter(|i| i.is_valid());
        if let Some(shape) = shape_input {
            self.require_constant("Reshape", "shape", shape)?;
        }
        let from_options: Option<Vec<i32>> = op
            .builtin_options_as::<schema::ReshapeOptions>()
            .and_then(|o| o.new_shape())
            .map(|v| v.iter().collect())
            .filter(|v: &Vec<i32>| !v.is_empty());
        let new_shape = match (from_options, shape_input) {
            (Some(shape), _) => shape,
            (None, Some(shape)) => self.constant_ints("Reshape", "shape", shape)?,
            (None, None) => Vec::new(),
        };
        Ok(OperationKind::Reshape(ReshapeParams { new_shape }))
    }

    /// Reads the constant `(height, width)` size and drops it from `inputs`.
    fn resize_size(&self, op: &'static str, inputs: &mut Vec<OperandIndex>) -> Result<(i32, i32), LoadError> {
        let size = self.constant_ints(op, "size", input_at(op, inputs, 1)?)?;
        let &[height, width] = size.as_slice() else {
            return Err(LoadError::InvalidParameter {
                op,
                what: "size",
                reason: format!("expected 2 values, got {}", size.len()),
            });
        };
        inputs.truncate(1);
        Ok((height, width))
    }

    /// Element-type adjustments some operators imply for their operands.
    fn retype_operands(&mut self, index: OperationIndex) {
        let Some(operation) = self.graph.operation(index) else {
            return;
        };
        let dtype = |i: OperandIndex| self.graph.operand(i).map(|o| o.dtype());
        let mut retype = Vec::new();
        match operation.kind() {
            // Hybrid FC: float activations with 8-bit weights stored as uint8.
            OperationKind::FullyConnected { .. } => {
                let (input, weights) = (operation.inputs()[0], operation.inputs()[1]);
                if dtype(input) == Some(DType::Float32) && dtype(weights) == Some(DType::QuantUint8Asymm) {
                    retype.push((weights, DType::QuantInt8Symm));
                }
            }
            // Cast reads and writes raw uint8, not quantized values.
            OperationKind::ElementwiseUnary(UnaryOp::Cast) => {
                for i in [operation.inputs()[0], operation.outputs()[0]] {
                    if dtype(i) == Some(DType::QuantUint8Asymm) {
                        retype.push((i, DType::Uint8));
                    }
                }
            }
            _ => {}
        }
        for (operand, to) in retype {
            if let Some(operand) = self.graph.operand_mut(operand) {
                operand.info_mut().type_info_mut().set_dtype(to);
            }
        }
    }
}
