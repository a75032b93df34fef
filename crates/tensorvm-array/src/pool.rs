//! 2-D pooling kernels over NCHW layouts. Max pooling captures the winning
//! input index per output element so its backward pass can route gradients
//! without recomputing the forward scan.

use crate::array::Array;
use crate::error::{ArrayError, ArrayResult};

/// Forward max pooling result: the pooled array plus, per output element, the
/// flat index of the input element that won the window.
pub struct MaxPoolForward {
    pub output: Array,
    pub argmax: Vec<usize>,
    pub input_shape: Vec<usize>,
}

fn check_nchw(name: &str, a: &Array) -> ArrayResult<()> {
    if a.rank() != 4 {
        return Err(ArrayError::shape(format!(
            "{name} expects an NCHW tensor, found shape {:?}",
            a.shape()
        )));
    }
    Ok(())
}

fn check_pair(name: &str, values: &[usize]) -> ArrayResult<(usize, usize)> {
    match values {
        [h, w] => Ok((*h, *w)),
        _ => Err(ArrayError::shape(format!(
            "{name} must hold one value per spatial axis, found {values:?}"
        ))),
    }
}

fn pooled_extent(input: usize, kernel: usize, stride: usize, pad: usize) -> ArrayResult<usize> {
    let padded = input + 2 * pad;
    if kernel == 0 || stride == 0 || padded < kernel {
        return Err(ArrayError::shape(format!(
            "pool window {kernel} with stride {stride} does not fit extent {input} (pad {pad})"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

pub fn max_pool2d(
    x: &Array,
    kernel: &[usize],
    strides: &[usize],
    pads: &[usize],
) -> ArrayResult<MaxPoolForward> {
    check_nchw("max_pool", x)?;
    let (kh, kw) = check_pair("max_pool kernel", kernel)?;
    let (sh, sw) = check_pair("max_pool strides", strides)?;
    let (ph, pw) = check_pair("max_pool pads", pads)?;
    let (batch, channels, height, width) =
        (x.shape()[0], x.shape()[1], x.shape()[2], x.shape()[3]);
    let out_h = pooled_extent(height, kh, sh, ph)?;
    let out_w = pooled_extent(width, kw, sw, pw)?;

    let mut data = vec![0.0f32; batch * channels * out_h * out_w];
    let mut argmax = vec![0usize; data.len()];
    for n in 0..batch {
        for c in 0..channels {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_index = None;
                    for ky in 0..kh {
                        let iy = (oy * sh + ky) as i64 - ph as i64;
                        if iy < 0 || iy >= height as i64 {
                            continue;
                        }
                        for kx in 0..kw {
                            let ix = (ox * sw + kx) as i64 - pw as i64;
                            if ix < 0 || ix >= width as i64 {
                                continue;
                            }
                            let xi = ((n * channels + c) * height + iy as usize) * width
                                + ix as usize;
                            let v = x.data()[xi];
                            if best_index.is_none() || v > best {
                                best = v;
                                best_index = Some(xi);
                            }
                        }
                    }
                    let index = best_index.ok_or_else(|| {
                        ArrayError::shape("max_pool window covered no input elements".to_string())
                    })?;
                    let oi = ((n * channels + c) * out_h + oy) * out_w + ox;
                    data[oi] = best;
                    argmax[oi] = index;
                }
            }
        }
    }
    Ok(MaxPoolForward {
        output: Array::from_parts(vec![batch, channels, out_h, out_w], data),
        argmax,
        input_shape: x.shape().to_vec(),
    })
}

/// Routes `gy` back to the winning input positions captured by the forward.
pub fn max_pool2d_backward(
    argmax: &[usize],
    input_shape: &[usize],
    gy: &Array,
) -> ArrayResult<Array> {
    if gy.len() != argmax.len() {
        return Err(ArrayError::shape(format!(
            "max_pool backward gradient has {} elements, forward produced {}",
            gy.len(),
            argmax.len()
        )));
    }
    let len: usize = input_shape.iter().product();
    let mut data = vec![0.0f32; len];
    for (&slot, &g) in argmax.iter().zip(gy.data().iter()) {
        if slot >= len {
            return Err(ArrayError::shape(
                "max_pool backward argmax index out of range".to_string(),
            ));
        }
        data[slot] += g;
    }
    Ok(Array::from_parts(input_shape.to_vec(), data))
}

pub fn avg_pool2d(
    x: &Array,
    kernel: &[usize],
    strides: &[usize],
    pads: &[usize],
    count_include_pad: bool,
) -> ArrayResult<Array> {
    check_nchw("average_pool", x)?;
    let (kh, kw) = check_pair("average_pool kernel", kernel)?;
    let (sh, sw) = check_pair("average_pool strides", strides)?;
    let (ph, pw) = check_pair("average_pool pads", pads)?;
    let (batch, channels, height, width) =
        (x.shape()[0], x.shape()[1], x.shape()[2], x.shape()[3]);
    let out_h = pooled_extent(height, kh, sh, ph)?;
    let out_w = pooled_extent(width, kw, sw, pw)?;

    let mut data = vec![0.0f32; batch * channels * out_h * out_w];
    for n in 0..batch {
        for c in 0..channels {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = 0.0f32;
                    let mut covered = 0usize;
                    for ky in 0..kh {
                        let iy = (oy * sh + ky) as i64 - ph as i64;
                        if iy < 0 || iy >= height as i64 {
                            continue;
                        }
                        for kx in 0..kw {
                            let ix = (ox * sw + kx) as i64 - pw as i64;
                            if ix < 0 || ix >= width as i64 {
                                continue;
                            }
                            acc += x.data()
                                [((n * channels + c) * height + iy as usize) * width + ix as usize];
                            covered += 1;
                        }
                    }
                    let divisor = if count_include_pad { kh * kw } else { covered.max(1) };
                    data[((n * channels + c) * out_h + oy) * out_w + ox] =
                        acc / divisor as f32;
                }
            }
        }
    }
    Ok(Array::from_parts(vec![batch, channels, out_h, out_w], data))
}
