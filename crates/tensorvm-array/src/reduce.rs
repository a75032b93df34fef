//! Axis reductions: sum, mean, sum-of-squares.

use crate::array::{normalize_axis, unravel_index, Array};
use crate::error::ArrayResult;

fn reduced_shape(shape: &[usize], axes: &[usize], keepdims: bool) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| {
            if axes.contains(&i) {
                if keepdims {
                    Some(1)
                } else {
                    None
                }
            } else {
                Some(d)
            }
        })
        .collect()
}

fn accumulate(
    a: &Array,
    axes: &[usize],
    keepdims: bool,
    init: f32,
    fold: impl Fn(f32, f32) -> f32,
) -> Array {
    let shape = reduced_shape(a.shape(), axes, keepdims);
    // Shape of the output with reduced axes kept at extent 1, used to fold
    // input coordinates onto output slots regardless of keepdims.
    let kept: Vec<usize> = a
        .shape()
        .iter()
        .enumerate()
        .map(|(i, &d)| if axes.contains(&i) { 1 } else { d })
        .collect();
    let kept_strides = crate::array::compute_strides(&kept);

    // Zero-extent shapes yield zero-length buffers; an empty shape's product
    // is 1, which covers the full-reduction scalar case.
    let len: usize = shape.iter().product();
    let mut data = vec![init; len];
    for (flat, &v) in a.data().iter().enumerate() {
        let coords = unravel_index(flat, a.shape());
        let mut out = 0usize;
        for (axis, &c) in coords.iter().enumerate() {
            if !axes.contains(&axis) {
                out += c * kept_strides[axis];
            }
        }
        data[out] = fold(data[out], v);
    }
    Array::from_parts(shape, data)
}

/// Resolves the reduction axis set: `None` means every axis.
fn resolve_axes(axes: Option<&[i64]>, rank: usize) -> ArrayResult<Vec<usize>> {
    match axes {
        None => Ok((0..rank).collect()),
        Some(list) => list.iter().map(|&a| normalize_axis(a, rank)).collect(),
    }
}

pub fn sum(a: &Array, axes: Option<&[i64]>, keepdims: bool) -> ArrayResult<Array> {
    let axes = resolve_axes(axes, a.rank())?;
    Ok(accumulate(a, &axes, keepdims, 0.0, |acc, v| acc + v))
}

pub fn mean(a: &Array, axes: Option<&[i64]>, keepdims: bool) -> ArrayResult<Array> {
    let axes = resolve_axes(axes, a.rank())?;
    let count: usize = axes.iter().map(|&i| a.shape()[i]).product::<usize>().max(1);
    let summed = accumulate(a, &axes, keepdims, 0.0, |acc, v| acc + v);
    Ok(crate::elementwise::scale(&summed, 1.0 / count as f32))
}

pub fn sum_square(a: &Array, axes: Option<&[i64]>, keepdims: bool) -> ArrayResult<Array> {
    let axes = resolve_axes(axes, a.rank())?;
    Ok(accumulate(a, &axes, keepdims, 0.0, |acc, v| acc + v * v))
}

/// Running maximum along `axes`. Slots with nothing to fold stay at
/// negative infinity, which only zero-extent inputs can produce.
pub fn max(a: &Array, axes: Option<&[i64]>, keepdims: bool) -> ArrayResult<Array> {
    let axes = resolve_axes(axes, a.rank())?;
    Ok(accumulate(a, &axes, keepdims, f32::NEG_INFINITY, f32::max))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(shape: &[usize], data: &[f32]) -> Array {
        Array::from_vec(shape.to_vec(), data.to_vec()).unwrap()
    }

    #[test]
    fn sum_over_all_axes_yields_scalar() {
        let a = arr(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let r = sum(&a, None, false).unwrap();
        assert_eq!(r.rank(), 0);
        assert_eq!(r.as_scalar().unwrap(), 21.0);
    }

    #[test]
    fn sum_single_axis_keepdims() {
        let a = arr(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let r = sum(&a, Some(&[1]), true).unwrap();
        assert_eq!(r.shape(), &[2, 1]);
        assert_eq!(r.data(), &[6.0, 15.0]);
    }

    #[test]
    fn sum_negative_axis() {
        let a = arr(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let r = sum(&a, Some(&[-1]), false).unwrap();
        assert_eq!(r.shape(), &[2]);
        assert_eq!(r.data(), &[3.0, 7.0]);
    }

    #[test]
    fn mean_divides_by_reduced_count() {
        let a = arr(&[2, 2], &[2.0, 4.0, 6.0, 8.0]);
        let r = mean(&a, Some(&[0]), false).unwrap();
        assert_eq!(r.data(), &[4.0, 6.0]);
    }

    #[test]
    fn sum_square_squares_before_summing() {
        let a = arr(&[3], &[1.0, 2.0, 3.0]);
        let r = sum_square(&a, None, false).unwrap();
        assert_eq!(r.as_scalar().unwrap(), 14.0);
    }

    #[test]
    fn max_keeps_the_largest_per_slot() {
        let a = arr(&[2, 3], &[1.0, 5.0, 2.0, 4.0, 0.0, 3.0]);
        let r = max(&a, Some(&[1]), true).unwrap();
        assert_eq!(r.shape(), &[2, 1]);
        assert_eq!(r.data(), &[5.0, 4.0]);
    }

    #[test]
    fn reducing_a_zero_extent_tensor_keeps_the_buffer_empty() {
        let a = arr(&[0, 2], &[]);
        let r = sum(&a, Some(&[1]), false).unwrap();
        assert_eq!(r.shape(), &[0]);
        assert!(r.data().is_empty());

        let r = sum(&a, Some(&[0]), false).unwrap();
        assert_eq!(r.shape(), &[2]);
        assert_eq!(r.data(), &[0.0, 0.0]);
    }
}
