//! Normalization kernels: batch normalization (channel axis is axis 1,
//! statistics over every other axis) and axiswise softmax.

use crate::array::Array;
use crate::elementwise::{add, div, exp, log, mul, sub};
use crate::error::{ArrayError, ArrayResult};
use crate::reduce;

/// Training-mode forward result. `x_hat` and `inv_std` are exactly the
/// intermediates the backward pass needs; recomputing them would double the
/// cost of the pair.
pub struct BatchNormTraining {
    pub output: Array,
    pub x_hat: Array,
    pub inv_std: Array,
    pub scale: Array,
}

/// Reshapes a per-channel parameter vector to the reduction layout
/// `[1, C, 1, ...]` for an input of `rank` axes. This is a view over the
/// original buffer; no data is copied.
pub fn channel_view(param: &Array, rank: usize) -> ArrayResult<Array> {
    if param.rank() != 1 {
        return Err(ArrayError::shape(format!(
            "batch-norm side parameter must be a vector, found shape {:?}",
            param.shape()
        )));
    }
    if rank < 2 {
        return Err(ArrayError::shape(format!(
            "batch-norm input must have a channel axis, rank {rank} is too small"
        )));
    }
    let mut shape = vec![1usize; rank];
    shape[1] = param.len();
    param.view_with_shape(shape)
}

fn reduction_axes(rank: usize) -> Vec<i64> {
    (0..rank as i64).filter(|&a| a != 1).collect()
}

fn check_channels(x: &Array, param: &Array, name: &str) -> ArrayResult<()> {
    let channels = x.shape().get(1).copied().unwrap_or(0);
    if param.len() != channels {
        return Err(ArrayError::shape(format!(
            "batch-norm {name} has {} entries, input {:?} has {channels} channels",
            param.len(),
            x.shape()
        )));
    }
    Ok(())
}

/// Training-mode forward: normalize with batch statistics and keep the
/// intermediates for the paired backward.
pub fn batch_norm_train(
    x: &Array,
    scale: &Array,
    bias: &Array,
    epsilon: f32,
) -> ArrayResult<BatchNormTraining> {
    check_channels(x, scale, "scale")?;
    check_channels(x, bias, "bias")?;
    let axes = reduction_axes(x.rank());
    let mean = reduce::mean(x, Some(&axes), true)?;
    let centered = sub(x, &mean)?;
    let var = reduce::mean(&mul(&centered, &centered)?, Some(&axes), true)?;
    let inv_std = crate::elementwise::unary(&var, |v| 1.0 / (v + epsilon).sqrt());
    let x_hat = mul(&centered, &inv_std)?;

    let scale_view = channel_view(scale, x.rank())?;
    let bias_view = channel_view(bias, x.rank())?;
    let output = add(&mul(&x_hat, &scale_view)?, &bias_view)?;
    Ok(BatchNormTraining {
        output,
        x_hat,
        inv_std,
        scale: scale_view,
    })
}

/// Inference-mode forward: fixed statistics, no auxiliary state.
pub fn batch_norm_infer(
    x: &Array,
    scale: &Array,
    bias: &Array,
    mean: &Array,
    var: &Array,
    epsilon: f32,
) -> ArrayResult<Array> {
    check_channels(x, scale, "scale")?;
    check_channels(x, bias, "bias")?;
    check_channels(x, mean, "mean")?;
    check_channels(x, var, "variance")?;
    let scale_view = channel_view(scale, x.rank())?;
    let bias_view = channel_view(bias, x.rank())?;
    let mean_view = channel_view(mean, x.rank())?;
    let var_view = channel_view(var, x.rank())?;
    let std = crate::elementwise::unary(&var_view, |v| (v + epsilon).sqrt());
    let normalized = div(&sub(x, &mean_view)?, &std)?;
    add(&mul(&normalized, &scale_view)?, &bias_view)
}

/// Backward for the training-mode forward. Returns `(gx, gscale, gbias)`
/// with the parameter gradients squeezed back to vectors.
pub fn batch_norm_backward(
    x_hat: &Array,
    inv_std: &Array,
    scale: &Array,
    gy: &Array,
) -> ArrayResult<(Array, Array, Array)> {
    if x_hat.shape() != gy.shape() {
        return Err(ArrayError::shape(format!(
            "batch-norm backward gradient shape {:?} does not match forward {:?}",
            gy.shape(),
            x_hat.shape()
        )));
    }
    let axes = reduction_axes(gy.rank());
    let count: usize = axes
        .iter()
        .map(|&a| gy.shape()[a as usize])
        .product::<usize>()
        .max(1);
    let inv_count = 1.0 / count as f32;

    let gbias = reduce::sum(gy, Some(&axes), true)?;
    let gscale = reduce::sum(&mul(gy, x_hat)?, Some(&axes), true)?;

    // gx = scale * inv_std * (gy - gbias/m - x_hat * gscale/m)
    let correction = add(
        &crate::elementwise::scale(&gbias, inv_count),
        &mul(x_hat, &crate::elementwise::scale(&gscale, inv_count))?,
    )?;
    let gx = mul(&mul(&sub(gy, &correction)?, inv_std)?, scale)?;

    let channels = gy.shape()[1];
    let gscale = gscale.view_with_shape(vec![channels])?;
    let gbias = gbias.view_with_shape(vec![channels])?;
    Ok((gx, gscale, gbias))
}

/// Softmax along `axis`, shifted by the axis maximum for stability.
pub fn softmax(x: &Array, axis: i64) -> ArrayResult<Array> {
    let axes = [axis];
    let shift = reduce::max(x, Some(&axes), true)?;
    let exps = exp(&sub(x, &shift)?);
    let total = reduce::sum(&exps, Some(&axes), true)?;
    div(&exps, &total)
}

/// Log of the softmax, computed as `(x - max) - log(sum(exp(x - max)))`
/// rather than through the softmax itself.
pub fn log_softmax(x: &Array, axis: i64) -> ArrayResult<Array> {
    let axes = [axis];
    let shift = reduce::max(x, Some(&axes), true)?;
    let shifted = sub(x, &shift)?;
    let total = reduce::sum(&exp(&shifted), Some(&axes), true)?;
    sub(&shifted, &log(&total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(shape: &[usize], data: &[f32]) -> Array {
        Array::from_vec(shape.to_vec(), data.to_vec()).unwrap()
    }

    #[test]
    fn channel_view_shares_buffer() {
        let p = arr(&[3], &[1.0, 2.0, 3.0]);
        let v = channel_view(&p, 4).unwrap();
        assert_eq!(v.shape(), &[1, 3, 1, 1]);
        assert_eq!(v.data().as_ptr(), p.data().as_ptr());
    }

    #[test]
    fn training_forward_standardizes() {
        let x = arr(&[2, 1, 1, 1], &[1.0, 3.0]);
        let scale = arr(&[1], &[1.0]);
        let bias = arr(&[1], &[0.0]);
        let r = batch_norm_train(&x, &scale, &bias, 1e-5).unwrap();
        // mean 2, var 1: outputs are +-1 up to epsilon.
        assert!((r.output.data()[0] + 1.0).abs() < 1e-2);
        assert!((r.output.data()[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn inference_uses_fixed_statistics() {
        let x = arr(&[1, 2, 1, 1], &[4.0, 10.0]);
        let scale = arr(&[2], &[1.0, 2.0]);
        let bias = arr(&[2], &[0.0, 1.0]);
        let mean = arr(&[2], &[2.0, 4.0]);
        let var = arr(&[2], &[4.0, 9.0]);
        let y = batch_norm_infer(&x, &scale, &bias, &mean, &var, 0.0).unwrap();
        assert!((y.data()[0] - 1.0).abs() < 1e-5);
        assert!((y.data()[1] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn backward_gradients_balance() {
        let x = arr(&[2, 1, 1, 1], &[1.0, 3.0]);
        let scale = arr(&[1], &[1.0]);
        let bias = arr(&[1], &[0.0]);
        let fwd = batch_norm_train(&x, &scale, &bias, 1e-5).unwrap();
        let gy = arr(&[2, 1, 1, 1], &[1.0, 1.0]);
        let (gx, gscale, gbias) =
            batch_norm_backward(&fwd.x_hat, &fwd.inv_std, &fwd.scale, &gy).unwrap();
        // A constant upstream gradient is entirely absorbed by the mean
        // subtraction, so gx vanishes while gbias collects the sum.
        assert!(gx.data().iter().all(|v| v.abs() < 1e-4));
        assert_eq!(gbias.data(), &[2.0]);
        assert!(gscale.data()[0].abs() < 1e-3);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let x = arr(&[2, 3], &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        let y = softmax(&x, 1).unwrap();
        for row in y.data().chunks(3) {
            let total: f32 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
        // The uniform row softmaxes to thirds.
        assert!((y.data()[3] - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let x = arr(&[1, 3], &[1.0, 2.0, 3.0]);
        let shifted = arr(&[1, 3], &[1001.0, 1002.0, 1003.0]);
        let a = softmax(&x, 1).unwrap();
        let b = softmax(&shifted, 1).unwrap();
        for (u, v) in a.iter().zip(b.iter()) {
            assert!((u - v).abs() < 1e-5);
        }
    }

    #[test]
    fn log_softmax_matches_log_of_softmax() {
        let x = arr(&[2, 2], &[0.5, -0.5, 2.0, 1.0]);
        let direct = log_softmax(&x, 1).unwrap();
        let via_softmax = softmax(&x, 1).unwrap();
        for (l, s) in direct.iter().zip(via_softmax.iter()) {
            assert!((l - s.ln()).abs() < 1e-5);
        }
    }
}
