//! Matrix product kernels.

use crate::array::Array;
use crate::error::{ArrayError, ArrayResult};

/// 2-D transpose.
pub fn transpose2d(a: &Array) -> ArrayResult<Array> {
    if a.rank() != 2 {
        return Err(ArrayError::shape(format!(
            "transpose expects a matrix, found shape {:?}",
            a.shape()
        )));
    }
    let (rows, cols) = (a.shape()[0], a.shape()[1]);
    let mut data = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            data[c * rows + r] = a.data()[r * cols + c];
        }
    }
    Ok(Array::from_parts(vec![cols, rows], data))
}

/// Matrix product. Handles vector·vector, matrix·vector, vector·matrix,
/// matrix·matrix, and batched inputs whose leading batch extents agree.
pub fn matmul(a: &Array, b: &Array) -> ArrayResult<Array> {
    match (a.rank(), b.rank()) {
        (0, _) | (_, 0) => Err(ArrayError::shape(
            "matmul operands must have rank >= 1".to_string(),
        )),
        (1, 1) => {
            let k = contract_len(a, b, a.shape()[0], b.shape()[0])?;
            let dot = (0..k).map(|i| a.data()[i] * b.data()[i]).sum();
            Ok(Array::scalar(dot))
        }
        (1, 2) => {
            // Treat the vector as a 1 x K row, drop the unit row afterwards.
            let row = a.view_with_shape(vec![1, a.shape()[0]])?;
            let out = matmul(&row, b)?;
            out.view_with_shape(vec![b.shape()[1]])
        }
        (2, 1) => {
            let col = b.view_with_shape(vec![b.shape()[0], 1])?;
            let out = matmul(a, &col)?;
            out.view_with_shape(vec![a.shape()[0]])
        }
        (2, 2) => {
            let (m, k) = (a.shape()[0], a.shape()[1]);
            let (kb, n) = (b.shape()[0], b.shape()[1]);
            let k = contract_len(a, b, k, kb)?;
            let mut data = vec![0.0f32; m * n];
            matmul_into(a.data(), b.data(), m, k, n, &mut data);
            Ok(Array::from_parts(vec![m, n], data))
        }
        (ra, rb) if ra == rb => {
            let batch_a = &a.shape()[..ra - 2];
            let batch_b = &b.shape()[..rb - 2];
            if batch_a != batch_b {
                return Err(ArrayError::shape(format!(
                    "matmul batch extents disagree: {:?} vs {:?}",
                    a.shape(),
                    b.shape()
                )));
            }
            let (m, k) = (a.shape()[ra - 2], a.shape()[ra - 1]);
            let (kb, n) = (b.shape()[rb - 2], b.shape()[rb - 1]);
            let k = contract_len(a, b, k, kb)?;
            let batches: usize = batch_a.iter().product();
            let mut data = vec![0.0f32; batches * m * n];
            for batch in 0..batches {
                matmul_into(
                    &a.data()[batch * m * k..(batch + 1) * m * k],
                    &b.data()[batch * k * n..(batch + 1) * k * n],
                    m,
                    k,
                    n,
                    &mut data[batch * m * n..(batch + 1) * m * n],
                );
            }
            let mut shape = batch_a.to_vec();
            shape.push(m);
            shape.push(n);
            Ok(Array::from_parts(shape, data))
        }
        _ => Err(ArrayError::shape(format!(
            "matmul rank combination unsupported: {:?} x {:?}",
            a.shape(),
            b.shape()
        ))),
    }
}

fn contract_len(a: &Array, b: &Array, k: usize, kb: usize) -> ArrayResult<usize> {
    if k != kb {
        return Err(ArrayError::shape(format!(
            "matmul contraction extents disagree: {:?} x {:?}",
            a.shape(),
            b.shape()
        )));
    }
    Ok(k)
}

fn matmul_into(a: &[f32], b: &[f32], m: usize, k: usize, n: usize, out: &mut [f32]) {
    for row in 0..m {
        for inner in 0..k {
            let lhs = a[row * k + inner];
            if lhs == 0.0 {
                continue;
            }
            let b_row = &b[inner * n..(inner + 1) * n];
            let out_row = &mut out[row * n..(row + 1) * n];
            for (o, &rhs) in out_row.iter_mut().zip(b_row.iter()) {
                *o += lhs * rhs;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(shape: &[usize], data: &[f32]) -> Array {
        Array::from_vec(shape.to_vec(), data.to_vec()).unwrap()
    }

    #[test]
    fn matrix_product() {
        let a = arr(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = arr(&[3, 2], &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let r = matmul(&a, &b).unwrap();
        assert_eq!(r.shape(), &[2, 2]);
        assert_eq!(r.data(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn vector_dot() {
        let a = arr(&[3], &[1.0, 2.0, 3.0]);
        let b = arr(&[3], &[4.0, 5.0, 6.0]);
        assert_eq!(matmul(&a, &b).unwrap().as_scalar().unwrap(), 32.0);
    }

    #[test]
    fn matrix_vector() {
        let a = arr(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let v = arr(&[2], &[1.0, 1.0]);
        let r = matmul(&a, &v).unwrap();
        assert_eq!(r.shape(), &[2]);
        assert_eq!(r.data(), &[3.0, 7.0]);
    }

    #[test]
    fn batched_product() {
        let a = arr(&[2, 1, 2], &[1.0, 2.0, 3.0, 4.0]);
        let b = arr(&[2, 2, 1], &[1.0, 1.0, 1.0, 1.0]);
        let r = matmul(&a, &b).unwrap();
        assert_eq!(r.shape(), &[2, 1, 1]);
        assert_eq!(r.data(), &[3.0, 7.0]);
    }

    #[test]
    fn contraction_mismatch_rejected() {
        let a = Array::zeros(vec![2, 3]);
        let b = Array::zeros(vec![4, 2]);
        assert!(matmul(&a, &b).is_err());
    }

    #[test]
    fn transpose_swaps_extents() {
        let a = arr(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = transpose2d(&a).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
