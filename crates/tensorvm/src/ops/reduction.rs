//! Axis reductions, plus the broadcast-inverse reduction used by gradient
//! accumulation.

use tensorvm_array::{manip, reduce, ArrayError};

use crate::error::VmError;
use crate::state::VmState;

pub(crate) fn sum(
    st: &mut VmState,
    input: i64,
    out: i64,
    axes: Option<&[i64]>,
    keepdims: bool,
) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = reduce::sum(&value, axes, keepdims)?;
    st.set_array(out, result)
}

pub(crate) fn mean(
    st: &mut VmState,
    input: i64,
    out: i64,
    axes: Option<&[i64]>,
    keepdims: bool,
) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = reduce::mean(&value, axes, keepdims)?;
    st.set_array(out, result)
}

pub(crate) fn sum_square(
    st: &mut VmState,
    input: i64,
    out: i64,
    axes: Option<&[i64]>,
    keepdims: bool,
) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = reduce::sum_square(&value, axes, keepdims)?;
    st.set_array(out, result)
}

/// Sums `data` down to the target shape named by the `shape` operand. This is
/// the inverse of broadcasting: leading surplus axes and axes stretched from
/// extent 1 are summed away, everything else must match exactly.
pub(crate) fn sum_to(st: &mut VmState, data: i64, shape: i64, out: i64) -> Result<(), VmError> {
    let value = st.get_array(data)?;
    let target: Vec<i64> = st.get_array(shape)?.iter().map(|&v| v as i64).collect();
    let src = value.shape().to_vec();
    if target.len() > src.len() {
        return Err(VmError::Shape(ArrayError::shape(format!(
            "cannot sum shape {src:?} down to higher-rank {target:?}"
        ))));
    }
    let offset = src.len() - target.len();
    let mut axes: Vec<i64> = (0..offset as i64).collect();
    for (i, (&t, &s)) in target.iter().zip(&src[offset..]).enumerate() {
        if t == s as i64 {
            continue;
        }
        if t == 1 {
            axes.push((offset + i) as i64);
        } else {
            return Err(VmError::Shape(ArrayError::shape(format!(
                "cannot sum shape {src:?} down to {target:?}: axis {} has extent {s}",
                offset + i
            ))));
        }
    }
    let summed = if axes.is_empty() {
        value
    } else {
        reduce::sum(&value, Some(&axes), true)?
    };
    // Reshape drops the kept-at-1 surplus axes onto the exact target rank.
    let result = manip::reshape(&summed, &target)?;
    st.set_array(out, result)
}
