//! Pooling and normalization, including the stateful forward/backward pairs.
//! A stateful forward stashes its auxiliary context under its own output
//! register; the paired backward names that register to claim the context.

use tensorvm_array::{norm, pool};

use super::spatial;
use crate::error::VmError;
use crate::state::VmState;
use crate::variable::{Auxiliary, BatchNormContext, MaxPoolContext};

pub(crate) fn max_pool(
    st: &mut VmState,
    x: i64,
    out: i64,
    kernel: &[i64],
    strides: &[i64],
    pads: &[i64],
) -> Result<(), VmError> {
    let input = st.get_array(x)?;
    let kernel = spatial("max_pool kernel", kernel, 1)?;
    let strides = spatial("max_pool strides", strides, 1)?;
    let pads = spatial("max_pool pads", pads, 0)?;
    let forward = pool::max_pool2d(&input, &kernel, &strides, &pads)?;
    st.set_array(out, forward.output)?;
    st.set_aux(
        out,
        Auxiliary::MaxPool(MaxPoolContext {
            argmax: forward.argmax,
            input_shape: forward.input_shape,
        }),
    )
}

pub(crate) fn max_pool_grad(st: &mut VmState, y: i64, gy: i64, out: i64) -> Result<(), VmError> {
    let context = match st.take_aux(y)? {
        Auxiliary::MaxPool(ctx) => ctx,
        other => {
            return Err(VmError::AuxiliaryKindMismatch {
                reg: y,
                expected: "max-pool",
                found: other.kind_name(),
            })
        }
    };
    let grad = st.get_array(gy)?;
    let result = pool::max_pool2d_backward(&context.argmax, &context.input_shape, &grad)?;
    st.set_array(out, result)
}

pub(crate) fn average_pool(
    st: &mut VmState,
    x: i64,
    out: i64,
    kernel: &[i64],
    strides: &[i64],
    pads: &[i64],
    count_include_pad: bool,
) -> Result<(), VmError> {
    let input = st.get_array(x)?;
    let kernel = spatial("average_pool kernel", kernel, 1)?;
    let strides = spatial("average_pool strides", strides, 1)?;
    let pads = spatial("average_pool pads", pads, 0)?;
    let result = pool::avg_pool2d(&input, &kernel, &strides, &pads, count_include_pad)?;
    st.set_array(out, result)
}

/// Training mode normalizes with batch statistics and stashes the backward's
/// intermediates; the `mean` and `var` registers are only read in inference
/// mode, where the op is stateless.
#[allow(clippy::too_many_arguments)]
pub(crate) fn batch_normalization(
    st: &mut VmState,
    x: i64,
    scale: i64,
    b: i64,
    mean: i64,
    var: i64,
    out: i64,
    epsilon: f32,
) -> Result<(), VmError> {
    let input = st.get_array(x)?;
    let scale_v = st.get_array(scale)?;
    let bias = st.get_array(b)?;
    if st.is_training() {
        let forward = norm::batch_norm_train(&input, &scale_v, &bias, epsilon)?;
        st.set_array(out, forward.output)?;
        st.set_aux(
            out,
            Auxiliary::BatchNorm(BatchNormContext {
                x_hat: forward.x_hat,
                inv_std: forward.inv_std,
                scale: forward.scale,
            }),
        )
    } else {
        let mean_v = st.get_array(mean)?;
        let var_v = st.get_array(var)?;
        let result = norm::batch_norm_infer(&input, &scale_v, &bias, &mean_v, &var_v, epsilon)?;
        st.set_array(out, result)
    }
}

pub(crate) fn batch_normalization_grad(
    st: &mut VmState,
    y: i64,
    gy: i64,
    gx: i64,
    gscale: i64,
    gbias: i64,
) -> Result<(), VmError> {
    let context = match st.take_aux(y)? {
        Auxiliary::BatchNorm(ctx) => ctx,
        other => {
            return Err(VmError::AuxiliaryKindMismatch {
                reg: y,
                expected: "batch-norm",
                found: other.kind_name(),
            })
        }
    };
    let grad = st.get_array(gy)?;
    let (gx_v, gscale_v, gbias_v) =
        norm::batch_norm_backward(&context.x_hat, &context.inv_std, &context.scale, &grad)?;
    st.set_array(gx, gx_v)?;
    st.set_array(gscale, gscale_v)?;
    st.set_array(gbias, gbias_v)
}
