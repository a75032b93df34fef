//! Direct (im2col-free) 2-D convolution kernels over NCHW layouts.

use crate::array::Array;
use crate::error::{ArrayError, ArrayResult};

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

/// Forward convolution. `x` is NCHW, `w` is [out_ch, in_ch, kh, kw], the
/// optional bias is a length-out_ch vector.
pub fn conv2d(
    x: &Array,
    w: &Array,
    bias: Option<&Array>,
    strides: &[usize],
    pads: &[usize],
) -> ArrayResult<Array> {
    check_nchw("conv", x)?;
    check_nchw("conv weight", w)?;
    let (sh, sw) = check_pair("conv strides", strides)?;
    let (ph, pw) = check_pair("conv pads", pads)?;
    let (batch, in_ch, height, width) = dims4(x);
    let (out_ch, w_in_ch, kh, kw) = dims4(w);
    if in_ch != w_in_ch {
        return Err(ArrayError::shape(format!(
            "conv channel mismatch: input {:?}, weight {:?}",
            x.shape(),
            w.shape()
        )));
    }
    let out_h = out_extent(height, kh, sh, ph, "conv")?;
    let out_w = out_extent(width, kw, sw, pw, "conv")?;
    if let Some(b) = bias {
        if b.len() != out_ch {
            return Err(ArrayError::shape(format!(
                "conv bias length {} does not match {out_ch} output channels",
                b.len()
            )));
        }
    }

    let mut data = vec![0.0f32; batch * out_ch * out_h * out_w];
    for n in 0..batch {
        for m in 0..out_ch {
            let base_bias = bias.map(|b| b.data()[m]).unwrap_or(0.0);
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = base_bias;
                    for c in 0..in_ch {
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
                                let xi = ((n * in_ch + c) * height + iy as usize) * width
                                    + ix as usize;
                                let wi = ((m * in_ch + c) * kh + ky) * kw + kx;
                                acc += x.data()[xi] * w.data()[wi];
                            }
                        }
                    }
                    data[((n * out_ch + m) * out_h + oy) * out_w + ox] = acc;
                }
            }
        }
    }
    Ok(Array::from_parts(vec![batch, out_ch, out_h, out_w], data))
}

/// Transposed convolution. `w` is [in_ch, out_ch, kh, kw]; `out_size`
/// overrides the inferred spatial extents when provided.
pub fn conv_transpose2d(
    x: &Array,
    w: &Array,
    bias: Option<&Array>,
    strides: &[usize],
    pads: &[usize],
    out_size: Option<(usize, usize)>,
) -> ArrayResult<Array> {
    check_nchw("conv_transpose", x)?;
    check_nchw("conv_transpose weight", w)?;
    let (sh, sw) = check_pair("conv_transpose strides", strides)?;
    let (ph, pw) = check_pair("conv_transpose pads", pads)?;
    let (batch, in_ch, height, width) = dims4(x);
    let (w_in_ch, out_ch, kh, kw) = dims4(w);
    if in_ch != w_in_ch {
        return Err(ArrayError::shape(format!(
            "conv_transpose channel mismatch: input {:?}, weight {:?}",
            x.shape(),
            w.shape()
        )));
    }
    let (out_h, out_w) = match out_size {
        Some(pair) => pair,
        None => (
            infer_transpose_extent(height, kh, sh, ph, "conv_transpose")?,
            infer_transpose_extent(width, kw, sw, pw, "conv_transpose")?,
        ),
    };

    let mut data = vec![0.0f32; batch * out_ch * out_h * out_w];
    for n in 0..batch {
        for c in 0..in_ch {
            for iy in 0..height {
                for ix in 0..width {
                    let xv = x.data()[((n * in_ch + c) * height + iy) * width + ix];
                    if xv == 0.0 {
                        continue;
                    }
                    for m in 0..out_ch {
                        for ky in 0..kh {
                            let oy = (iy * sh + ky) as i64 - ph as i64;
                            if oy < 0 || oy >= out_h as i64 {
                                continue;
                            }
                            for kx in 0..kw {
                                let ox = (ix * sw + kx) as i64 - pw as i64;
                                if ox < 0 || ox >= out_w as i64 {
                                    continue;
                                }
                                let wi = ((c * out_ch + m) * kh + ky) * kw + kx;
                                let oi = ((n * out_ch + m) * out_h + oy as usize) * out_w
                                    + ox as usize;
                                data[oi] += xv * w.data()[wi];
                            }
                        }
                    }
                }
            }
        }
    }
    if let Some(b) = bias {
        if b.len() != out_ch {
            return Err(ArrayError::shape(format!(
                "conv_transpose bias length {} does not match {out_ch} output channels",
                b.len()
            )));
        }
        for n in 0..batch {
            for m in 0..out_ch {
                let base = (n * out_ch + m) * out_h * out_w;
                let bv = b.data()[m];
                for slot in &mut data[base..base + out_h * out_w] {
                    *slot += bv;
                }
            }
        }
    }
    Ok(Array::from_parts(vec![batch, out_ch, out_h, out_w], data))
}

/// Gradient of the convolution weights given the forward input `x` and the
/// output gradient `gy`. `w_shape` names the weight layout to produce.
pub fn conv_grad_weight(
    w_shape: &[usize],
    x: &Array,
    gy: &Array,
    strides: &[usize],
    pads: &[usize],
) -> ArrayResult<Array> {
    check_nchw("conv_grad_weight input", x)?;
    check_nchw("conv_grad_weight gradient", gy)?;
    let (sh, sw) = check_pair("conv_grad_weight strides", strides)?;
    let (ph, pw) = check_pair("conv_grad_weight pads", pads)?;
    let [out_ch, in_ch, kh, kw] = match w_shape {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => {
            return Err(ArrayError::shape(format!(
                "conv_grad_weight weight shape must have rank 4, found {w_shape:?}"
            )))
        }
    };
    let (batch, x_ch, height, width) = dims4(x);
    let (g_batch, g_ch, out_h, out_w) = dims4(gy);
    if x_ch != in_ch || g_ch != out_ch || batch != g_batch {
        return Err(ArrayError::shape(format!(
            "conv_grad_weight layout mismatch: x {:?}, gy {:?}, w {w_shape:?}",
            x.shape(),
            gy.shape()
        )));
    }

    let mut data = vec![0.0f32; out_ch * in_ch * kh * kw];
    for n in 0..batch {
        for m in 0..out_ch {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let gv = gy.data()[((n * out_ch + m) * out_h + oy) * out_w + ox];
                    if gv == 0.0 {
                        continue;
                    }
                    for c in 0..in_ch {
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
                                let xi = ((n * in_ch + c) * height + iy as usize) * width
                                    + ix as usize;
                                data[((m * in_ch + c) * kh + ky) * kw + kx] +=
                                    gv * x.data()[xi];
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(Array::from_parts(w_shape.to_vec(), data))
}

fn dims4(a: &Array) -> (usize, usize, usize, usize) {
    (a.shape()[0], a.shape()[1], a.shape()[2], a.shape()[3])
}

fn out_extent(input: usize, kernel: usize, stride: usize, pad: usize, op: &str) -> ArrayResult<usize> {
    let padded = input + 2 * pad;
    if kernel == 0 || stride == 0 || padded < kernel {
        return Err(ArrayError::shape(format!(
            "{op} window {kernel}x stride {stride} does not fit input extent {input} (pad {pad})"
        )));
    }
    Ok((padded - kernel) / stride + 1)
}

fn infer_transpose_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    pad: usize,
    op: &str,
) -> ArrayResult<usize> {
    if input == 0 {
        return Err(ArrayError::shape(format!(
            "{op} cannot infer output extent from an empty input axis"
        )));
    }
    let grown = stride * (input - 1) + kernel;
    if grown < 2 * pad {
        return Err(ArrayError::shape(format!(
            "{op} cannot infer output extent from input {input}, kernel {kernel}, stride {stride}, pad {pad}"
        )));
    }
    Ok(grown - 2 * pad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(shape: &[usize], data: &[f32]) -> Array {
        Array::from_vec(shape.to_vec(), data.to_vec()).unwrap()
    }

    #[test]
    fn identity_kernel_passes_through() {
        let x = arr(&[1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let w = arr(&[1, 1, 1, 1], &[1.0]);
        let y = conv2d(&x, &w, None, &[1, 1], &[0, 0]).unwrap();
        assert_eq!(y.shape(), &[1, 1, 2, 2]);
        assert_eq!(y.data(), x.data());
    }

    #[test]
    fn sum_kernel_with_bias() {
        let x = arr(&[1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let w = arr(&[1, 1, 2, 2], &[1.0, 1.0, 1.0, 1.0]);
        let b = arr(&[1], &[0.5]);
        let y = conv2d(&x, &w, Some(&b), &[1, 1], &[0, 0]).unwrap();
        assert_eq!(y.shape(), &[1, 1, 1, 1]);
        assert_eq!(y.as_scalar().unwrap(), 10.5);
    }

    #[test]
    fn padding_grows_output() {
        let x = arr(&[1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let w = arr(&[1, 1, 2, 2], &[1.0, 1.0, 1.0, 1.0]);
        let y = conv2d(&x, &w, None, &[1, 1], &[1, 1]).unwrap();
        assert_eq!(y.shape(), &[1, 1, 3, 3]);
        // Center tap sees the whole input.
        assert_eq!(y.data()[4], 10.0);
    }

    #[test]
    fn transpose_inverts_spatial_extent() {
        let x = arr(&[1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let w = arr(&[1, 1, 2, 2], &[1.0, 1.0, 1.0, 1.0]);
        let y = conv_transpose2d(&x, &w, None, &[2, 2], &[0, 0], None).unwrap();
        assert_eq!(y.shape(), &[1, 1, 4, 4]);
        let total: f32 = y.data().iter().sum();
        assert_eq!(total, 40.0);
    }

    #[test]
    fn grad_weight_matches_manual_sum() {
        let x = arr(&[1, 1, 2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let gy = arr(&[1, 1, 1, 1], &[2.0]);
        let gw = conv_grad_weight(&[1, 1, 2, 2], &x, &gy, &[1, 1], &[0, 0]).unwrap();
        assert_eq!(gw.data(), &[2.0, 4.0, 6.0, 8.0]);
    }
}
