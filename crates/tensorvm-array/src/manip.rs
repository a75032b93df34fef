//! Shape and layout kernels: reshape, squeeze, broadcast, slice, gather,
//! concat, stack.

use crate::array::{compute_strides, normalize_axis, unravel_index, Array};
use crate::elementwise::broadcast_shape;
use crate::error::{ArrayError, ArrayResult};

/// Reshapes to `dims`, where at most one entry may be `-1` and is inferred by
/// dividing the total element count. Inexact division fails.
pub fn reshape(a: &Array, dims: &[i64]) -> ArrayResult<Array> {
    let mut infer_axis = None;
    let mut known: usize = 1;
    for (axis, &dim) in dims.iter().enumerate() {
        if dim == -1 {
            if infer_axis.is_some() {
                return Err(ArrayError::shape(format!(
                    "reshape target {dims:?} has more than one inferred dimension"
                )));
            }
            infer_axis = Some(axis);
        } else if dim < 0 {
            return Err(ArrayError::shape(format!(
                "reshape target {dims:?} contains negative dimension {dim}"
            )));
        } else {
            known = known.saturating_mul(dim as usize);
        }
    }

    let total = a.len();
    let mut shape: Vec<usize> = dims
        .iter()
        .map(|&d| if d == -1 { 0 } else { d as usize })
        .collect();
    if let Some(axis) = infer_axis {
        if known == 0 || total % known != 0 {
            return Err(ArrayError::shape(format!(
                "cannot infer dimension: {total} elements do not divide evenly into {dims:?}"
            )));
        }
        shape[axis] = total / known;
    } else if known != total {
        return Err(ArrayError::shape(format!(
            "reshape target {dims:?} holds {known} elements, source holds {total}"
        )));
    }
    a.view_with_shape(shape)
}

/// Drops the listed axes, each of which must have extent 1. With no axes
/// given, drops every size-1 axis.
pub fn squeeze(a: &Array, axes: &[i64]) -> ArrayResult<Array> {
    let shape = if axes.is_empty() {
        a.shape().iter().copied().filter(|&d| d != 1).collect()
    } else {
        let mut drop = vec![false; a.rank()];
        for &axis in axes {
            let axis = normalize_axis(axis, a.rank())?;
            if a.shape()[axis] != 1 {
                return Err(ArrayError::shape(format!(
                    "cannot squeeze axis {axis} of extent {}",
                    a.shape()[axis]
                )));
            }
            drop[axis] = true;
        }
        a.shape()
            .iter()
            .zip(drop)
            .filter(|(_, d)| !d)
            .map(|(&dim, _)| dim)
            .collect()
    };
    a.view_with_shape(shape)
}

/// Inserts size-1 axes at the listed positions (interpreted against the
/// output rank, in ascending order).
pub fn unsqueeze(a: &Array, axes: &[i64]) -> ArrayResult<Array> {
    let out_rank = a.rank() + axes.len();
    let mut insert = vec![false; out_rank];
    for &axis in axes {
        let axis = normalize_axis(axis, out_rank)?;
        if insert[axis] {
            return Err(ArrayError::shape(format!(
                "duplicate unsqueeze axis {axis}"
            )));
        }
        insert[axis] = true;
    }
    let mut shape = Vec::with_capacity(out_rank);
    let mut src = a.shape().iter();
    for inserted in insert {
        if inserted {
            shape.push(1);
        } else {
            // insert flags cover exactly out_rank - rank positions
            shape.push(*src.next().unwrap_or(&1));
        }
    }
    a.view_with_shape(shape)
}

/// Materializes a broadcast of `a` to `target`.
pub fn broadcast_to(a: &Array, target: &[usize]) -> ArrayResult<Array> {
    let joined = broadcast_shape(a.shape(), target)?;
    if joined != target {
        return Err(ArrayError::Broadcast {
            lhs: a.shape().to_vec(),
            rhs: target.to_vec(),
        });
    }
    if a.shape() == target {
        return Ok(a.clone());
    }
    let strides = compute_strides(a.shape());
    let offset = target.len() - a.rank();
    let len: usize = target.iter().product();
    let mut data = Vec::with_capacity(len);
    for flat in 0..len {
        let coords = unravel_index(flat, target);
        let mut index = 0usize;
        for axis in 0..a.rank() {
            let dim = a.shape()[axis];
            let c = if dim == 1 { 0 } else { coords[axis + offset] };
            index += c * strides[axis];
        }
        data.push(a.data()[index]);
    }
    Ok(Array::from_parts(target.to_vec(), data))
}

/// Slices `[starts, ends)` along the listed axes. Negative bounds count from
/// the end; bounds are clamped to the axis extent.
pub fn slice(a: &Array, axes: &[i64], starts: &[i64], ends: &[i64]) -> ArrayResult<Array> {
    if axes.len() != starts.len() || axes.len() != ends.len() {
        return Err(ArrayError::shape(format!(
            "slice attribute lengths disagree: {} axes, {} starts, {} ends",
            axes.len(),
            starts.len(),
            ends.len()
        )));
    }
    let mut start = vec![0usize; a.rank()];
    let mut stop: Vec<usize> = a.shape().to_vec();
    for (i, &axis) in axes.iter().enumerate() {
        let axis = normalize_axis(axis, a.rank())?;
        let dim = a.shape()[axis] as i64;
        let lo = starts[i].clamp(-dim, dim);
        let hi = ends[i].clamp(-dim, dim);
        let lo = if lo < 0 { lo + dim } else { lo } as usize;
        let hi = if hi < 0 { hi + dim } else { hi } as usize;
        start[axis] = lo;
        stop[axis] = hi.max(lo);
    }
    let out_shape: Vec<usize> = start.iter().zip(&stop).map(|(&s, &e)| e - s).collect();
    let strides = compute_strides(a.shape());
    let len: usize = out_shape.iter().product();
    let mut data = Vec::with_capacity(len);
    for flat in 0..len {
        let coords = unravel_index(flat, &out_shape);
        let mut index = 0usize;
        for (axis, &c) in coords.iter().enumerate() {
            index += (start[axis] + c) * strides[axis];
        }
        data.push(a.data()[index]);
    }
    Ok(Array::from_parts(out_shape, data))
}

/// Gathers slices of `a` along `axis` at the positions named by `indices`.
/// Output shape is `a.shape[..axis] ++ indices.shape ++ a.shape[axis+1..]`.
pub fn gather(a: &Array, indices: &Array, axis: i64) -> ArrayResult<Array> {
    let axis = normalize_axis(axis, a.rank())?;
    let axis_len = a.shape()[axis];
    let outer: usize = a.shape()[..axis].iter().product();
    let inner: usize = a.shape()[axis + 1..].iter().product();

    let mut picks = Vec::with_capacity(indices.len());
    for &raw in indices.data() {
        let idx = raw as i64;
        let adjusted = if idx < 0 { idx + axis_len as i64 } else { idx };
        if adjusted < 0 || adjusted >= axis_len as i64 {
            return Err(ArrayError::IndexOutOfBounds {
                index: idx,
                len: axis_len,
            });
        }
        picks.push(adjusted as usize);
    }

    let mut shape = a.shape()[..axis].to_vec();
    shape.extend_from_slice(indices.shape());
    shape.extend_from_slice(&a.shape()[axis + 1..]);

    let mut data = Vec::with_capacity(outer * picks.len() * inner);
    for o in 0..outer {
        for &p in &picks {
            let base = (o * axis_len + p) * inner;
            data.extend_from_slice(&a.data()[base..base + inner]);
        }
    }
    Ok(Array::from_parts(shape, data))
}

/// Concatenates along `axis`; all other extents must agree.
pub fn concat(items: &[Array], axis: i64) -> ArrayResult<Array> {
    let first = items
        .first()
        .ok_or_else(|| ArrayError::shape("concat of zero arrays"))?;
    let axis = normalize_axis(axis, first.rank())?;
    let mut axis_total = 0usize;
    for item in items {
        if item.rank() != first.rank() {
            return Err(ArrayError::shape(format!(
                "concat rank mismatch: {:?} vs {:?}",
                first.shape(),
                item.shape()
            )));
        }
        for d in 0..first.rank() {
            if d != axis && item.shape()[d] != first.shape()[d] {
                return Err(ArrayError::shape(format!(
                    "concat extent mismatch on axis {d}: {:?} vs {:?}",
                    first.shape(),
                    item.shape()
                )));
            }
        }
        axis_total += item.shape()[axis];
    }

    let mut shape = first.shape().to_vec();
    shape[axis] = axis_total;
    let outer: usize = first.shape()[..axis].iter().product();
    let inner: usize = first.shape()[axis + 1..].iter().product();

    let mut data = Vec::with_capacity(shape.iter().product());
    for o in 0..outer {
        for item in items {
            let chunk = item.shape()[axis] * inner;
            let base = o * chunk;
            data.extend_from_slice(&item.data()[base..base + chunk]);
        }
    }
    Ok(Array::from_parts(shape, data))
}

/// Stacks arrays along a fresh leading axis of extent `items.len()`.
pub fn stack(items: &[Array]) -> ArrayResult<Array> {
    let mut lifted = Vec::with_capacity(items.len());
    for item in items {
        let mut shape = Vec::with_capacity(item.rank() + 1);
        shape.push(1);
        shape.extend_from_slice(item.shape());
        lifted.push(item.view_with_shape(shape)?);
    }
    concat(&lifted, 0)
}
