//! Shape and layout operations. Target shapes arrive as tensor operands
//! whose elements are dimension extents; `-1` in a reshape target means
//! "infer this axis".

use tensorvm_array::{manip, Array, ArrayError};

use crate::error::VmError;
use crate::state::VmState;

/// Reads a shape operand: a rank-1 tensor of dimension extents.
fn shape_operand(st: &VmState, reg: i64) -> Result<Vec<i64>, VmError> {
    let dims = st.get_array(reg)?;
    Ok(dims.iter().map(|&v| v as i64).collect())
}

fn target_extents(dims: &[i64]) -> Result<Vec<usize>, VmError> {
    let mut extents = Vec::with_capacity(dims.len());
    for &d in dims {
        if d < 0 {
            return Err(VmError::Shape(ArrayError::shape(format!(
                "target shape extents must be non-negative, found {dims:?}"
            ))));
        }
        extents.push(d as usize);
    }
    Ok(extents)
}

pub(crate) fn reshape(st: &mut VmState, data: i64, shape: i64, out: i64) -> Result<(), VmError> {
    let value = st.get_array(data)?;
    let dims = shape_operand(st, shape)?;
    let result = manip::reshape(&value, &dims)?;
    st.set_array(out, result)
}

pub(crate) fn expand(st: &mut VmState, data: i64, shape: i64, out: i64) -> Result<(), VmError> {
    let value = st.get_array(data)?;
    let dims = target_extents(&shape_operand(st, shape)?)?;
    let result = manip::broadcast_to(&value, &dims)?;
    st.set_array(out, result)
}

pub(crate) fn squeeze(st: &mut VmState, input: i64, out: i64, axes: &[i64]) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = manip::squeeze(&value, axes)?;
    st.set_array(out, result)
}

pub(crate) fn unsqueeze(
    st: &mut VmState,
    input: i64,
    out: i64,
    axes: &[i64],
) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = manip::unsqueeze(&value, axes)?;
    st.set_array(out, result)
}

pub(crate) fn slice(
    st: &mut VmState,
    input: i64,
    out: i64,
    axes: &[i64],
    starts: &[i64],
    ends: &[i64],
) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = manip::slice(&value, axes, starts, ends)?;
    st.set_array(out, result)
}

pub(crate) fn gather(
    st: &mut VmState,
    data: i64,
    indices: i64,
    out: i64,
    axis: i64,
) -> Result<(), VmError> {
    let value = st.get_array(data)?;
    let index = st.get_array(indices)?;
    let result = manip::gather(&value, &index, axis)?;
    st.set_array(out, result)
}

/// Materializes the operand's shape as a rank-1 tensor of extents.
pub(crate) fn shape_of(st: &mut VmState, input: i64, out: i64) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let dims: Vec<f32> = value.shape().iter().map(|&d| d as f32).collect();
    let rank = dims.len();
    let result = Array::from_vec(vec![rank], dims)?;
    st.set_array(out, result)
}

pub(crate) fn size_of(st: &mut VmState, input: i64, out: i64) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    st.set_array(out, Array::scalar(value.len() as f32))
}
