//! Elementwise kernels with numpy-style broadcasting.

use crate::array::{compute_strides, unravel_index, Array};
use crate::error::{ArrayError, ArrayResult};

/// Shape both operands broadcast to, right-aligned, size-1 axes stretch.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> ArrayResult<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let l = dim_from_right(lhs, rank, i);
        let r = dim_from_right(rhs, rank, i);
        out[i] = if l == r || r == 1 {
            l
        } else if l == 1 {
            r
        } else {
            return Err(ArrayError::Broadcast {
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        };
    }
    Ok(out)
}

fn dim_from_right(shape: &[usize], rank: usize, axis: usize) -> usize {
    let offset = rank - shape.len();
    if axis < offset {
        1
    } else {
        shape[axis - offset]
    }
}

/// Strides of `shape` stretched to `broadcast` rank, zeroed on stretched axes.
fn broadcast_strides(shape: &[usize], broadcast: &[usize]) -> Vec<usize> {
    let base = compute_strides(shape);
    let offset = broadcast.len() - shape.len();
    let mut out = vec![0usize; broadcast.len()];
    for axis in 0..broadcast.len() {
        if axis < offset {
            continue;
        }
        let dim = shape[axis - offset];
        if dim != 1 || broadcast[axis] == 1 {
            out[axis] = base[axis - offset];
        }
    }
    out
}

/// Applies `f` over two broadcast operands.
pub fn binary(a: &Array, b: &Array, f: impl Fn(f32, f32) -> f32) -> ArrayResult<Array> {
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let len: usize = shape.iter().product();

    // Fast path: identical shapes need no coordinate arithmetic.
    if a.shape() == b.shape() {
        let data = a
            .data()
            .iter()
            .zip(b.data().iter())
            .map(|(&x, &y)| f(x, y))
            .collect();
        return Array::from_vec(shape, data);
    }

    let a_strides = broadcast_strides(a.shape(), &shape);
    let b_strides = broadcast_strides(b.shape(), &shape);
    let mut data = Vec::with_capacity(len);
    for flat in 0..len {
        let coords = unravel_index(flat, &shape);
        let mut ai = 0usize;
        let mut bi = 0usize;
        for (axis, &c) in coords.iter().enumerate() {
            ai += c * a_strides[axis];
            bi += c * b_strides[axis];
        }
        data.push(f(a.data()[ai], b.data()[bi]));
    }
    Array::from_vec(shape, data)
}

/// Applies `f` to every element.
pub fn unary(a: &Array, f: impl Fn(f32) -> f32) -> Array {
    let data = a.data().iter().map(|&x| f(x)).collect::<Vec<f32>>();
    Array::from_parts(a.shape().to_vec(), data)
}

pub fn add(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, |x, y| x + y)
}

pub fn sub(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, |x, y| x - y)
}

pub fn mul(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, |x, y| x * y)
}

pub fn div(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, |x, y| x / y)
}

pub fn maximum(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, f32::max)
}

pub fn neg(a: &Array) -> Array {
    unary(a, |x| -x)
}

pub fn exp(a: &Array) -> Array {
    unary(a, f32::exp)
}

pub fn log(a: &Array) -> Array {
    unary(a, f32::ln)
}

pub fn sqrt(a: &Array) -> Array {
    unary(a, f32::sqrt)
}

/// Logistic function over single-precision values: 1 / (1 + exp(-x)).
pub fn sigmoid(a: &Array) -> Array {
    unary(a, |x| 1.0 / (1.0 + (-x).exp()))
}

pub fn relu(a: &Array) -> Array {
    unary(a, |x| x.max(0.0))
}

pub fn tanh(a: &Array) -> Array {
    unary(a, f32::tanh)
}

pub fn scale(a: &Array, factor: f32) -> Array {
    unary(a, |x| x * factor)
}

/// Elementwise `a > b` as a 0/1 mask.
pub fn greater(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, |x, y| if x > y { 1.0 } else { 0.0 })
}

/// Elementwise `a == b` as a 0/1 mask.
pub fn equal(a: &Array, b: &Array) -> ArrayResult<Array> {
    binary(a, b, |x, y| if x == y { 1.0 } else { 0.0 })
}

/// Logical negation of a 0/1 mask; any non-zero value counts as true.
pub fn logical_not(a: &Array) -> Array {
    unary(a, |x| if x == 0.0 { 1.0 } else { 0.0 })
}
