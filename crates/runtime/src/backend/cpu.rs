// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference CPU backend built on the `tensor-core` kernels.
//!
//! Covers the activation, arithmetic, comparison, softmax and fully
//! connected families for `Float32` (and `Int32` where the arithmetic makes
//! sense), plus byte-level reshapes and the shape-producing ops. Anything
//! else is reported as [`KernelError::Unsupported`].

use crate::{Backend, KernelError};
use model_ir::{
    Activation, ActivationKind, ArithmeticOp, BinaryArithmeticParams, BinaryOp, ComparisonOp,
    ElementwiseActivationParams, Operation, OperationKind,
};
use tensor_core::{DType, TensorView, TensorViewMut};

const BACKEND: &str = "cpu";

/// Single-threaded reference kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn execute(
        &self,
        op: &Operation,
        inputs: &[Option<TensorView<'_>>],
        outputs: &mut [TensorViewMut<'_>],
    ) -> Result<(), KernelError> {
        let name = op.name();
        let Some(out) = outputs.first_mut() else {
            return Err(KernelError::Failed { op: name, detail: "operation has no outputs".into() });
        };

        match op.kind() {
            OperationKind::ElementwiseActivation(p) => activation(name, p, input(name, inputs, 0)?, out),
            OperationKind::BinaryArithmetic(p) => {
                arithmetic(name, p, input(name, inputs, 0)?, input(name, inputs, 1)?, out)
            }
            OperationKind::ElementwiseBinary(bop) => {
                elementwise_binary(name, *bop, input(name, inputs, 0)?, input(name, inputs, 1)?, out)
            }
            OperationKind::Comparison(cmp) => {
                compare(name, *cmp, input(name, inputs, 0)?, input(name, inputs, 1)?, out)
            }
            OperationKind::Softmax { beta } => {
                let x = input(name, inputs, 0)?;
                let values = f32s(name, x)?;
                let depth = x.shape().dims().last().copied().unwrap_or(1).max(1);
                let mut y = vec![0.0f32; values.len()];
                tensor_core::softmax(&values, &mut y, depth, *beta);
                write(name, out, &y)
            }
            OperationKind::FullyConnected { activation } => fully_connected(name, *activation, inputs, out),
            OperationKind::Reshape(_) | OperationKind::ExpandDims | OperationKind::Squeeze(_) => {
                copy_bytes(name, input(name, inputs, 0)?, out)
            }
            OperationKind::Fill => fill(name, input(name, inputs, 1)?, out),
            OperationKind::Shape => {
                let dims = input(name, inputs, 0)?.shape().dims().to_vec();
                write_ints(name, out, dims.into_iter())
            }
            OperationKind::Rank => {
                let rank = input(name, inputs, 0)?.shape().rank();
                write_ints(name, out, std::iter::once(rank))
            }
            _ => Err(unsupported(name, "no cpu kernel")),
        }
    }
}

fn unsupported(op: &'static str, detail: impl Into<String>) -> KernelError {
    KernelError::Unsupported { op, backend: BACKEND, detail: detail.into() }
}

fn input<'v, 'a>(
    op: &'static str,
    inputs: &'v [Option<TensorView<'a>>],
    position: usize,
) -> Result<&'v TensorView<'a>, KernelError> {
    inputs
        .get(position)
        .and_then(Option::as_ref)
        .ok_or_else(|| KernelError::Failed { op, detail: format!("input {position} is missing") })
}

fn f32s(op: &'static str, view: &TensorView<'_>) -> Result<Vec<f32>, KernelError> {
    match view.dtype() {
        DType::Float32 => Ok(view.to_vec()),
        other => Err(unsupported(op, format!("dtype {other}"))),
    }
}

fn write<T: bytemuck::Pod>(op: &'static str, out: &mut TensorViewMut<'_>, values: &[T]) -> Result<(), KernelError> {
    out.write(values).map_err(|source| KernelError::Tensor { op, source })
}

fn write_ints(
    op: &'static str,
    out: &mut TensorViewMut<'_>,
    values: impl Iterator<Item = usize>,
) -> Result<(), KernelError> {
    match out.dtype() {
        DType::Int32 => {
            let v = narrow::<i32>(op, values)?;
            write(op, out, &v)
        }
        DType::Int64 => {
            let v = narrow::<i64>(op, values)?;
            write(op, out, &v)
        }
        other => Err(unsupported(op, format!("output dtype {other}"))),
    }
}

fn narrow<T: TryFrom<usize>>(op: &'static str, values: impl Iterator<Item = usize>) -> Result<Vec<T>, KernelError> {
    values
        .map(|x| {
            T::try_from(x).map_err(|_| KernelError::Failed {
                op,
                detail: format!("{x} does not fit the output type"),
            })
        })
        .collect()
}

fn apply_fused(op: &'static str, activation: Activation, values: &mut [f32]) -> Result<(), KernelError> {
    match activation {
        Activation::None => {}
        Activation::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
        clamp => {
            let (lo, hi) = clamp
                .clamp_range()
                .ok_or_else(|| unsupported(op, format!("fused {clamp:?}")))?;
            values.iter_mut().for_each(|v| *v = v.clamp(lo, hi));
        }
    }
    Ok(())
}

fn activation(
    op: &'static str,
    params: &ElementwiseActivationParams,
    x: &TensorView<'_>,
    out: &mut TensorViewMut<'_>,
) -> Result<(), KernelError> {
    let values = f32s(op, x)?;
    let mut y = vec![0.0f32; values.len()];
    match params.kind {
        ActivationKind::Relu => tensor_core::clamp(&values, &mut y, params.beta, params.alpha),
        ActivationKind::LeakyRelu => tensor_core::leaky_relu(&values, &mut y, params.alpha),
        ActivationKind::Tanh => tensor_core::tanh(&values, &mut y, params.alpha, params.beta),
        ActivationKind::Logistic => tensor_core::logistic(&values, &mut y),
    }
    write(op, out, &y)
}

fn arithmetic(
    op: &'static str,
    params: &BinaryArithmeticParams,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    out: &mut TensorViewMut<'_>,
) -> Result<(), KernelError> {
    let tensor_err = |source| KernelError::Tensor { op, source };
    let len = out.shape().num_elements();

    match (lhs.dtype(), rhs.dtype()) {
        (DType::Float32, DType::Float32) => {
            let f: fn(f32, f32) -> f32 = match params.op {
                ArithmeticOp::Add => |a, b| a + b,
                ArithmeticOp::Sub => |a, b| a - b,
                ArithmeticOp::Mul => |a, b| a * b,
                ArithmeticOp::Div => |a, b| a / b,
            };
            let mut y = vec![0.0f32; len];
            let (a, b) = (lhs.to_vec::<f32>(), rhs.to_vec::<f32>());
            tensor_core::broadcast_binary(&a, lhs.shape(), &b, rhs.shape(), &mut y, out.shape(), f)
                .map_err(tensor_err)?;
            apply_fused(op, params.activation, &mut y)?;
            write(op, out, &y)
        }
        (DType::Int32, DType::Int32) => {
            let (a, b) = (lhs.to_vec::<i32>(), rhs.to_vec::<i32>());
            if params.op == ArithmeticOp::Div && b.contains(&0) {
                return Err(KernelError::Failed { op, detail: "integer division by zero".into() });
            }
            let f: fn(i32, i32) -> i32 = match params.op {
                ArithmeticOp::Add => i32::wrapping_add,
                ArithmeticOp::Sub => i32::wrapping_sub,
                ArithmeticOp::Mul => i32::wrapping_mul,
                ArithmeticOp::Div => i32::wrapping_div,
            };
            let mut y = vec![0i32; len];
            tensor_core::broadcast_binary(&a, lhs.shape(), &b, rhs.shape(), &mut y, out.shape(), f)
                .map_err(tensor_err)?;
            match params.activation {
                Activation::None => {}
                Activation::Tanh => return Err(unsupported(op, "fused tanh on Int32")),
                clamp => {
                    if let Some((lo, hi)) = clamp.clamp_range() {
                        // Float bounds saturate when cast, so ReLU keeps i32::MAX as its top.
                        let (lo, hi) = (lo as i32, hi as i32);
                        y.iter_mut().for_each(|v| *v = (*v).clamp(lo, hi));
                    }
                }
            }
            write(op, out, &y)
        }
        (l, r) => Err(unsupported(op, format!("dtypes {l} and {r}"))),
    }
}

fn elementwise_binary(
    op: &'static str,
    bop: BinaryOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    out: &mut TensorViewMut<'_>,
) -> Result<(), KernelError> {
    let tensor_err = |source| KernelError::Tensor { op, source };
    let len = out.shape().num_elements();

    match (bop, lhs.dtype(), rhs.dtype()) {
        (BinaryOp::Min | BinaryOp::Max, DType::Float32, DType::Float32) => {
            let f: fn(f32, f32) -> f32 = if bop == BinaryOp::Min { f32::min } else { f32::max };
            let mut y = vec![0.0f32; len];
            let (a, b) = (lhs.to_vec::<f32>(), rhs.to_vec::<f32>());
            tensor_core::broadcast_binary(&a, lhs.shape(), &b, rhs.shape(), &mut y, out.shape(), f)
                .map_err(tensor_err)?;
            write(op, out, &y)
        }
        (BinaryOp::Min | BinaryOp::Max, DType::Int32, DType::Int32) => {
            let f: fn(i32, i32) -> i32 = if bop == BinaryOp::Min { std::cmp::min } else { std::cmp::max };
            let mut y = vec![0i32; len];
            let (a, b) = (lhs.to_vec::<i32>(), rhs.to_vec::<i32>());
            tensor_core::broadcast_binary(&a, lhs.shape(), &b, rhs.shape(), &mut y, out.shape(), f)
                .map_err(tensor_err)?;
            write(op, out, &y)
        }
        (BinaryOp::LogicalOr, DType::Bool8, DType::Bool8) => {
            let mut y = vec![0u8; len];
            tensor_core::broadcast_binary(lhs.as_bytes(), lhs.shape(), rhs.as_bytes(), rhs.shape(), &mut y, out.shape(), |a, b| {
                u8::from(a != 0 || b != 0)
            })
            .map_err(tensor_err)?;
            write(op, out, &y)
        }
        (_, l, r) => Err(unsupported(op, format!("dtypes {l} and {r}"))),
    }
}

fn compare(
    op: &'static str,
    cmp: ComparisonOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    out: &mut TensorViewMut<'_>,
) -> Result<(), KernelError> {
    fn predicate<T: PartialOrd>(cmp: ComparisonOp) -> fn(T, T) -> bool {
        match cmp {
            ComparisonOp::Equal => |a, b| a == b,
            ComparisonOp::NotEqual => |a, b| a != b,
            ComparisonOp::Greater => |a, b| a > b,
            ComparisonOp::GreaterEqual => |a, b| a >= b,
            ComparisonOp::Less => |a, b| a < b,
            ComparisonOp::LessEqual => |a, b| a <= b,
        }
    }

    let tensor_err = |source| KernelError::Tensor { op, source };
    let mut y = vec![0u8; out.shape().num_elements()];
    let result = match (lhs.dtype(), rhs.dtype()) {
        (DType::Float32, DType::Float32) => tensor_core::broadcast_compare(
            &lhs.to_vec::<f32>(),
            lhs.shape(),
            &rhs.to_vec::<f32>(),
            rhs.shape(),
            &mut y,
            out.shape(),
            predicate::<f32>(cmp),
        ),
        (DType::Int32, DType::Int32) => tensor_core::broadcast_compare(
            &lhs.to_vec::<i32>(),
            lhs.shape(),
            &rhs.to_vec::<i32>(),
            rhs.shape(),
            &mut y,
            out.shape(),
            predicate::<i32>(cmp),
        ),
        (l, r) => return Err(unsupported(op, format!("dtypes {l} and {r}"))),
    };
    result.map_err(tensor_err)?;
    write(op, out, &y)
}

fn fully_connected(
    op: &'static str,
    activation: Activation,
    inputs: &[Option<TensorView<'_>>],
    out: &mut TensorViewMut<'_>,
) -> Result<(), KernelError> {
    let x = f32s(op, input(op, inputs, 0)?)?;
    let weights_view = input(op, inputs, 1)?;
    let weights = f32s(op, weights_view)?;
    let bias = match inputs.get(2).and_then(Option::as_ref) {
        Some(b) => Some(f32s(op, b)?),
        None => None,
    };
    let (out_features, in_features) = match weights_view.shape().dims() {
        &[o, i] => (o, i),
        dims => return Err(KernelError::Failed { op, detail: format!("weights must be 2-D, got {dims:?}") }),
    };

    let mut y = vec![0.0f32; out.shape().num_elements()];
    tensor_core::fully_connected(&x, &weights, bias.as_deref(), &mut y, in_features, out_features)
        .map_err(|source| KernelError::Tensor { op, source })?;
    apply_fused(op, activation, &mut y)?;
    write(op, out, &y)
}

fn copy_bytes(op: &'static str, x: &TensorView<'_>, out: &mut TensorViewMut<'_>) -> Result<(), KernelError> {
    let dst = out.as_bytes_mut();
    if dst.len() != x.as_bytes().len() {
        return Err(KernelError::Failed {
            op,
            detail: format!("output holds {} bytes, input {}", dst.len(), x.as_bytes().len()),
        });
    }
    dst.copy_from_slice(x.as_bytes());
    Ok(())
}

fn fill(op: &'static str, value: &TensorView<'_>, out: &mut TensorViewMut<'_>) -> Result<(), KernelError> {
    let elem = out.dtype().size_bytes();
    let pattern = value.as_bytes();
    if value.dtype() != out.dtype() || pattern.len() != elem {
        return Err(KernelError::Failed {
            op,
            detail: format!("fill value must be one {} element", out.dtype()),
        });
    }
    out.as_bytes_mut().chunks_exact_mut(elem).for_each(|chunk| chunk.copy_from_slice(pattern));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{OperandIndex, OperationKind, ReshapeParams};
    use tensor_core::{Shape, Tensor};

    fn op(kind: OperationKind, n_in: u32) -> Operation {
        let ins = (0..n_in).map(OperandIndex::new).collect();
        Operation::new(kind, ins, vec![OperandIndex::new(n_in)]).unwrap()
    }

    fn run(op: &Operation, inputs: &[&Tensor], out_shape: Shape, out_dtype: DType) -> Result<Tensor, KernelError> {
        let views: Vec<_> = inputs.iter().map(|t| Some(t.view())).collect();
        let mut out = Tensor::zeros(out_shape.clone(), out_dtype);
        let shape = out.shape().clone();
        let mut outs = [TensorViewMut::from_parts(&shape, out_dtype, out.as_bytes_mut())];
        CpuBackend::new().execute(op, &views, &mut outs)?;
        Ok(out)
    }

    fn f32_tensor(dims: Vec<usize>, values: &[f32]) -> Tensor {
        Tensor::from_f32(Shape::new(dims), values).unwrap()
    }

    #[test]
    fn test_leaky_relu() {
        let kind = OperationKind::ElementwiseActivation(ElementwiseActivationParams {
            kind: ActivationKind::LeakyRelu,
            alpha: 0.5,
            beta: 0.0,
        });
        let x = f32_tensor(vec![6], &[0.0, 1.0, 3.0, 1.0, -1.0, -2.0]);
        let y = run(&op(kind, 1), &[&x], Shape::vector(6), DType::Float32).unwrap();
        assert_eq!(y.to_vec::<f32>(), vec![0.0, 1.0, 3.0, 1.0, -0.5, -1.0]);
    }

    #[test]
    fn test_relu6_clamps() {
        let kind = OperationKind::ElementwiseActivation(ElementwiseActivationParams {
            kind: ActivationKind::Relu,
            alpha: 6.0,
            beta: 0.0,
        });
        let x = f32_tensor(vec![3], &[-1.0, 3.0, 9.0]);
        let y = run(&op(kind, 1), &[&x], Shape::vector(3), DType::Float32).unwrap();
        assert_eq!(y.to_vec::<f32>(), vec![0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_broadcast_add_with_fused_relu() {
        let kind = OperationKind::BinaryArithmetic(BinaryArithmeticParams {
            op: ArithmeticOp::Add,
            activation: Activation::Relu,
        });
        let a = f32_tensor(vec![2, 2], &[1.0, -5.0, 2.0, -1.0]);
        let b = f32_tensor(vec![2], &[1.0, 2.0]);
        let y = run(&op(kind, 2), &[&a, &b], Shape::new(vec![2, 2]), DType::Float32).unwrap();
        assert_eq!(y.to_vec::<f32>(), vec![2.0, 0.0, 3.0, 1.0]);
    }

    #[test]
    fn test_int_division_by_zero() {
        let kind = OperationKind::BinaryArithmetic(BinaryArithmeticParams {
            op: ArithmeticOp::Div,
            activation: Activation::None,
        });
        let a = Tensor::from_i32(Shape::vector(2), &[4, 6]).unwrap();
        let b = Tensor::from_i32(Shape::vector(2), &[2, 0]).unwrap();
        let err = run(&op(kind, 2), &[&a, &b], Shape::vector(2), DType::Int32).unwrap_err();
        assert!(matches!(err, KernelError::Failed { op: "Div", .. }));
    }

    #[test]
    fn test_maximum_int() {
        let kind = OperationKind::ElementwiseBinary(BinaryOp::Max);
        let a = Tensor::from_i32(Shape::vector(3), &[1, 7, -3]).unwrap();
        let b = Tensor::from_i32(Shape::scalar(), &[2]).unwrap();
        let y = run(&op(kind, 2), &[&a, &b], Shape::vector(3), DType::Int32).unwrap();
        assert_eq!(y.to_vec::<i32>(), vec![2, 7, 2]);
    }

    #[test]
    fn test_comparison_produces_bool() {
        let kind = OperationKind::Comparison(ComparisonOp::Greater);
        let a = f32_tensor(vec![3], &[1.0, 2.0, 3.0]);
        let b = f32_tensor(vec![], &[2.0]);
        let y = run(&op(kind, 2), &[&a, &b], Shape::vector(3), DType::Bool8).unwrap();
        assert_eq!(y.as_bytes(), &[0, 0, 1]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let x = f32_tensor(vec![2, 3], &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        let y = run(&op(OperationKind::Softmax { beta: 1.0 }, 1), &[&x], Shape::new(vec![2, 3]), DType::Float32)
            .unwrap()
            .to_vec::<f32>();
        assert!((y[..3].iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((y[3] - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_fully_connected_with_bias() {
        let kind = OperationKind::FullyConnected { activation: Activation::None };
        let x = f32_tensor(vec![1, 2], &[1.0, 2.0]);
        let w = f32_tensor(vec![2, 2], &[1.0, 0.0, 0.0, 1.0]);
        let b = f32_tensor(vec![2], &[10.0, 20.0]);
        let y = run(&op(kind, 3), &[&x, &w, &b], Shape::new(vec![1, 2]), DType::Float32).unwrap();
        assert_eq!(y.to_vec::<f32>(), vec![11.0, 22.0]);
    }

    #[test]
    fn test_fully_connected_without_bias() {
        let kind = OperationKind::FullyConnected { activation: Activation::None };
        let fc = Operation::new(
            kind,
            vec![OperandIndex::new(0), OperandIndex::new(1), OperandIndex::UNDEFINED],
            vec![OperandIndex::new(2)],
        )
        .unwrap();
        let x = f32_tensor(vec![1, 2], &[3.0, 4.0]);
        let w = f32_tensor(vec![1, 2], &[1.0, 1.0]);
        let views = [Some(x.view()), Some(w.view()), None];
        let shape = Shape::new(vec![1, 1]);
        let mut out = Tensor::zeros(shape.clone(), DType::Float32);
        let mut outs = [TensorViewMut::from_parts(&shape, DType::Float32, out.as_bytes_mut())];
        CpuBackend::new().execute(&fc, &views, &mut outs).unwrap();
        assert_eq!(out.to_vec::<f32>(), vec![7.0]);
    }

    #[test]
    fn test_reshape_copies_bytes() {
        let kind = OperationKind::Reshape(ReshapeParams { new_shape: vec![2, 2] });
        let x = f32_tensor(vec![4], &[1.0, 2.0, 3.0, 4.0]);
        let y = run(&op(kind, 1), &[&x], Shape::new(vec![2, 2]), DType::Float32).unwrap();
        assert_eq!(y.as_bytes(), x.as_bytes());
    }

    #[test]
    fn test_fill_shape_rank() {
        let dims = Tensor::from_i32(Shape::vector(2), &[2, 2]).unwrap();
        let value = f32_tensor(vec![], &[1.5]);
        let y = run(&op(OperationKind::Fill, 2), &[&dims, &value], Shape::new(vec![2, 2]), DType::Float32).unwrap();
        assert_eq!(y.to_vec::<f32>(), vec![1.5; 4]);

        let shape = run(&op(OperationKind::Shape, 1), &[&y], Shape::vector(2), DType::Int32).unwrap();
        assert_eq!(shape.to_vec::<i32>(), vec![2, 2]);

        let rank = run(&op(OperationKind::Rank, 1), &[&y], Shape::scalar(), DType::Int64).unwrap();
        assert_eq!(rank.to_vec::<i64>(), vec![2]);
    }

    #[test]
    fn test_shape_too_large_for_int32() {
        // Zero elements, so the tensor needs no memory.
        let x = Tensor::zeros(Shape::new(vec![0, 3_000_000_000]), DType::Float32);
        let kind = OperationKind::Shape;
        let err = run(&op(kind.clone(), 1), &[&x], Shape::vector(2), DType::Int32).unwrap_err();
        assert!(matches!(err, KernelError::Failed { op: "Shape", .. }));

        let wide = run(&op(kind, 1), &[&x], Shape::vector(2), DType::Int64).unwrap();
        assert_eq!(wide.to_vec::<i64>(), vec![0, 3_000_000_000]);
    }

    #[test]
    fn test_unsupported_op() {
        let a = f32_tensor(vec![1], &[1.0]);
        let err = run(&op(OperationKind::Tile, 2), &[&a, &a], Shape::vector(1), DType::Float32).unwrap_err();
        assert!(matches!(err, KernelError::Unsupported { op: "Tile", backend: "cpu", .. }));
    }

    #[test]
    fn test_wrong_dtype_is_unsupported() {
        let kind = OperationKind::Softmax { beta: 1.0 };
        let x = Tensor::from_i32(Shape::vector(2), &[1, 2]).unwrap();
        let err = run(&op(kind, 1), &[&x], Shape::vector(2), DType::Int32).unwrap_err();
        assert!(matches!(err, KernelError::Unsupported { .. }));
    }
}
