//! Matrix products and the convolution family. Stride and padding attributes
//! may be omitted by the compiler; they default to 1 and 0 per spatial axis.

use tensorvm_array::{conv, elementwise, linalg, ArrayError};

use super::spatial;
use crate::error::VmError;
use crate::state::VmState;

pub(crate) fn matmul(st: &mut VmState, a: i64, b: i64, out: i64) -> Result<(), VmError> {
    let lhs = st.get_array(a)?;
    let rhs = st.get_array(b)?;
    let result = linalg::matmul(&lhs, &rhs)?;
    st.set_array(out, result)
}

/// `out = alpha * op(a) . op(b) + beta * c`. When `beta` is exactly zero the
/// bias register is never read; programs legitimately pass a dead register
/// there.
#[allow(clippy::too_many_arguments)]
pub(crate) fn gemm(
    st: &mut VmState,
    a: i64,
    b: i64,
    c: i64,
    out: i64,
    alpha: f32,
    beta: f32,
    trans_a: bool,
    trans_b: bool,
) -> Result<(), VmError> {
    let mut lhs = st.get_array(a)?;
    let mut rhs = st.get_array(b)?;
    if trans_a {
        lhs = linalg::transpose2d(&lhs)?;
    }
    if trans_b {
        rhs = linalg::transpose2d(&rhs)?;
    }
    let mut result = linalg::matmul(&lhs, &rhs)?;
    if alpha != 1.0 {
        result = elementwise::scale(&result, alpha);
    }
    if beta != 0.0 {
        let bias = st.get_array(c)?;
        result = elementwise::add(&result, &elementwise::scale(&bias, beta))?;
    }
    st.set_array(out, result)
}

pub(crate) fn conv(
    st: &mut VmState,
    x: i64,
    w: i64,
    b: i64,
    out: i64,
    strides: &[i64],
    pads: &[i64],
) -> Result<(), VmError> {
    let input = st.get_array(x)?;
    let weight = st.get_array(w)?;
    let bias = st.get_array_optional(b)?;
    let strides = spatial("conv strides", strides, 1)?;
    let pads = spatial("conv pads", pads, 0)?;
    let result = conv::conv2d(&input, &weight, bias.as_ref(), &strides, &pads)?;
    st.set_array(out, result)
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn conv_transpose(
    st: &mut VmState,
    x: i64,
    w: i64,
    b: i64,
    out: i64,
    strides: &[i64],
    pads: &[i64],
    output_shape: &[i64],
) -> Result<(), VmError> {
    let input = st.get_array(x)?;
    let weight = st.get_array(w)?;
    let bias = st.get_array_optional(b)?;
    let strides = spatial("conv_transpose strides", strides, 1)?;
    let pads = spatial("conv_transpose pads", pads, 0)?;
    let out_size = match output_shape {
        [] => None,
        [h, w] if *h >= 0 && *w >= 0 => Some((*h as usize, *w as usize)),
        _ => {
            return Err(VmError::Shape(ArrayError::shape(format!(
                "conv_transpose output shape must name both spatial extents, found {output_shape:?}"
            ))))
        }
    };
    let result = conv::conv_transpose2d(&input, &weight, bias.as_ref(), &strides, &pads, out_size)?;
    st.set_array(out, result)
}

/// Weight gradient. The forward weight register is read only for its shape.
pub(crate) fn conv_grad_weight(
    st: &mut VmState,
    w: i64,
    x: i64,
    gy: i64,
    out: i64,
    strides: &[i64],
    pads: &[i64],
) -> Result<(), VmError> {
    let weight = st.get_array(w)?;
    let input = st.get_array(x)?;
    let grad = st.get_array(gy)?;
    let strides = spatial("conv_grad_weight strides", strides, 1)?;
    let pads = spatial("conv_grad_weight pads", pads, 0)?;
    let result = conv::conv_grad_weight(weight.shape(), &input, &grad, &strides, &pads)?;
    st.set_array(out, result)
}
