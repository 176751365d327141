// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built-in output shape rules.
//!
//! Consulted when an operation's outputs must be sized at run time and the
//! backend did not answer. [`infer`] returns `None` for operations it has
//! no rule for; the executor turns that into [`ShapeError::Unresolvable`].
//!
//! Rules that read values (Fill dims, ExpandDims axis, ...) read them from
//! the bound input views, so the inputs must already hold their data.

use crate::ShapeError;
use model_ir::{Operation, OperationKind};
use tensor_core::{DType, Shape, TensorView};

/// Output shapes of `op` given its bound inputs, or `None` if no rule applies.
pub fn infer(op: &Operation, inputs: &[Option<TensorView<'_>>]) -> Option<Result<Vec<Shape>, ShapeError>> {
    let name = op.name();
    let single = |r: Result<Shape, ShapeError>| Some(r.map(|s| vec![s]));

    match op.kind() {
        OperationKind::ElementwiseActivation(_)
        | OperationKind::ElementwiseUnary(_)
        | OperationKind::Softmax { .. }
        | OperationKind::LogSoftmax { .. }
        | OperationKind::L2Normalization => single(shape_at(name, inputs, 0).cloned()),

        OperationKind::BinaryArithmetic(_)
        | OperationKind::ElementwiseBinary(_)
        | OperationKind::Comparison(_)
        | OperationKind::SquaredDifference
        | OperationKind::Pow => single(broadcast(name, inputs)),

        OperationKind::Reshape(p) => single(reshape(name, &p.new_shape, inputs)),
        OperationKind::ExpandDims => single(expand_dims(name, inputs)),
        OperationKind::Squeeze(p) => single(squeeze(name, &p.dims, inputs)),
        OperationKind::Transpose(p) => single(transpose(name, &p.perm, inputs)),
        OperationKind::Concat { axis, .. } => single(concat(name, *axis, inputs)),
        OperationKind::Tile => single(tile(name, inputs)),
        OperationKind::FullyConnected { .. } => single(fully_connected(name, inputs)),
        OperationKind::Fill => single(values_at(name, inputs, 0).and_then(|d| dims_to_shape(name, &d))),
        OperationKind::BroadcastTo => single(values_at(name, inputs, 1).and_then(|d| dims_to_shape(name, &d))),
        OperationKind::Range => single(range(name, inputs)),
        OperationKind::Shape => single(shape_at(name, inputs, 0).map(|s| Shape::vector(s.rank()))),
        OperationKind::Rank => Some(Ok(vec![Shape::scalar()])),
        _ => None,
    }
}

fn invalid(op: &'static str, detail: impl Into<String>) -> ShapeError {
    ShapeError::Invalid { op, detail: detail.into() }
}

fn view_at<'v, 'a>(
    op: &'static str,
    inputs: &'v [Option<TensorView<'a>>],
    position: usize,
) -> Result<&'v TensorView<'a>, ShapeError> {
    inputs
        .get(position)
        .and_then(Option::as_ref)
        .ok_or_else(|| invalid(op, format!("input {position} is missing")))
}

fn shape_at<'v>(op: &'static str, inputs: &'v [Option<TensorView<'_>>], position: usize) -> Result<&'v Shape, ShapeError> {
    view_at(op, inputs, position).map(|v| v.shape())
}

fn values_at(op: &'static str, inputs: &[Option<TensorView<'_>>], position: usize) -> Result<Vec<i64>, ShapeError> {
    view_at(op, inputs, position)?
        .to_i64_vec()
        .map_err(|e| invalid(op, format!("input {position}: {e}")))
}

fn dims_to_shape(op: &'static str, dims: &[i64]) -> Result<Shape, ShapeError> {
    let shape = Shape::from_signed(dims).map_err(|e| invalid(op, e.to_string()))?;
    countable(op, shape)
}

/// Rejects shapes whose element count does not fit in `usize`.
fn countable(op: &'static str, shape: Shape) -> Result<Shape, ShapeError> {
    match shape.checked_num_elements() {
        Some(_) => Ok(shape),
        None => Err(invalid(op, format!("{shape} has too many elements"))),
    }
}

/// Maps a possibly negative axis into `0..rank`.
fn normalize_axis(op: &'static str, axis: i64, rank: usize) -> Result<usize, ShapeError> {
    let r = rank as i64;
    let a = if axis < 0 { axis + r } else { axis };
    if (0..r).contains(&a) {
        Ok(a as usize)
    } else {
        Err(invalid(op, format!("axis {axis} out of range for rank {rank}")))
    }
}

fn broadcast(op: &'static str, inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let (a, b) = (shape_at(op, inputs, 0)?, shape_at(op, inputs, 1)?);
    a.broadcast(b).ok_or_else(|| invalid(op, format!("cannot broadcast {a} with {b}")))
}

fn reshape(op: &'static str, new_shape: &[i32], inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let input = shape_at(op, inputs, 0)?;
    let target: Vec<i64> = if new_shape.is_empty() && inputs.get(1).is_some_and(Option::is_some) {
        values_at(op, inputs, 1)?
    } else {
        new_shape.iter().map(|&d| i64::from(d)).collect()
    };

    let total = input.num_elements();
    let mut wildcard = None;
    let mut known = 1usize;
    let mut dims = Vec::with_capacity(target.len());
    for (axis, &d) in target.iter().enumerate() {
        match d {
            -1 if wildcard.is_none() => {
                wildcard = Some(axis);
                dims.push(1);
            }
            d if d >= 0 => {
                let extent = usize::try_from(d).map_err(|_| invalid(op, format!("extent {d} too large")))?;
                known = known
                    .checked_mul(extent)
                    .ok_or_else(|| invalid(op, format!("target {target:?} has too many elements")))?;
                dims.push(extent);
            }
            _ => return Err(invalid(op, format!("bad extent {d} at axis {axis}"))),
        }
    }
    if let Some(axis) = wildcard {
        if known == 0 || total % known != 0 {
            return Err(ShapeError::ElementCount {
                op,
                from: input.clone(),
                to: Shape::new(dims),
            });
        }
        dims[axis] = total / known;
    }

    let out = Shape::new(dims);
    if out.num_elements() != total {
        return Err(ShapeError::ElementCount { op, from: input.clone(), to: out });
    }
    Ok(out)
}

fn expand_dims(op: &'static str, inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let input = shape_at(op, inputs, 0)?;
    let axis = values_at(op, inputs, 1)?
        .first()
        .copied()
        .ok_or_else(|| invalid(op, "axis input is empty"))?;
    let pos = normalize_axis(op, axis, input.rank() + 1)?;
    let mut dims = input.dims().to_vec();
    dims.insert(pos, 1);
    Ok(Shape::new(dims))
}

fn squeeze(op: &'static str, axes: &[i32], inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let input = shape_at(op, inputs, 0)?;
    if axes.is_empty() {
        return Ok(Shape::new(input.dims().iter().copied().filter(|&d| d != 1).collect()));
    }
    let drop = axes
        .iter()
        .map(|&a| normalize_axis(op, i64::from(a), input.rank()))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(&axis) = drop.iter().find(|&&a| input.dims()[a] != 1) {
        return Err(invalid(op, format!("axis {axis} of {input} is not 1")));
    }
    let dims = input
        .dims()
        .iter()
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, &d)| d)
        .collect();
    Ok(Shape::new(dims))
}

fn transpose(op: &'static str, perm: &[i32], inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let input = shape_at(op, inputs, 0)?;
    if perm.len() != input.rank() {
        return Err(invalid(op, format!("permutation {perm:?} does not fit {input}")));
    }
    let dims = perm
        .iter()
        .map(|&p| normalize_axis(op, i64::from(p), input.rank()).map(|axis| input.dims()[axis]))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Shape::new(dims))
}

fn concat(op: &'static str, axis: i32, inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let first = shape_at(op, inputs, 0)?;
    let axis = normalize_axis(op, i64::from(axis), first.rank())?;
    let mut dims = first.dims().to_vec();
    for position in 1..inputs.len() {
        let next = shape_at(op, inputs, position)?;
        let compatible = next.rank() == first.rank()
            && next.dims().iter().zip(first.dims()).enumerate().all(|(i, (a, b))| i == axis || a == b);
        if !compatible {
            return Err(invalid(op, format!("cannot concatenate {first} and {next} on axis {axis}")));
        }
        dims[axis] += next.dims()[axis];
    }
    Ok(Shape::new(dims))
}

fn tile(op: &'static str, inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let input = shape_at(op, inputs, 0)?;
    let multiples = values_at(op, inputs, 1)?;
    if multiples.len() != input.rank() || multiples.iter().any(|&m| m < 0) {
        return Err(invalid(op, format!("multiples {multiples:?} do not fit {input}")));
    }
    let dims = input
        .dims()
        .iter()
        .zip(&multiples)
        .map(|(&d, &m)| usize::try_from(m).ok().and_then(|m| d.checked_mul(m)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| invalid(op, format!("multiples {multiples:?} overflow {input}")))?;
    countable(op, Shape::new(dims))
}

fn fully_connected(op: &'static str, inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let input = shape_at(op, inputs, 0)?;
    let weights = shape_at(op, inputs, 1)?;
    let (out_features, in_features) = match weights.dims() {
        &[o, i] if i > 0 => (o, i),
        _ => return Err(invalid(op, format!("weights {weights} must be 2-D"))),
    };
    if input.num_elements() % in_features != 0 {
        return Err(invalid(op, format!("input {input} is not a multiple of {in_features} features")));
    }
    Ok(Shape::new(vec![input.num_elements() / in_features, out_features]))
}

fn scalar_f64(op: &'static str, view: &TensorView<'_>) -> Result<f64, ShapeError> {
    let value = match view.dtype() {
        DType::Float32 => view.to_vec::<f32>().first().map(|&v| f64::from(v)),
        _ => view
            .to_i64_vec()
            .map_err(|e| invalid(op, e.to_string()))?
            .first()
            .map(|&v| v as f64),
    };
    value.ok_or_else(|| invalid(op, "scalar input is empty"))
}

fn range(op: &'static str, inputs: &[Option<TensorView<'_>>]) -> Result<Shape, ShapeError> {
    let start = scalar_f64(op, view_at(op, inputs, 0)?)?;
    let limit = scalar_f64(op, view_at(op, inputs, 1)?)?;
    let delta = scalar_f64(op, view_at(op, inputs, 2)?)?;
    if delta == 0.0 {
        return Err(invalid(op, "delta must not be zero"));
    }
    let count = ((limit - start) / delta).ceil().max(0.0);
    Ok(Shape::vector(count as usize))
}
