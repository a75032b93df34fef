//! Dense row-major `f32` array value type.

use std::fmt;
use std::sync::Arc;

use crate::error::{ArrayError, ArrayResult};

/// Immutable dense array. Clones share the underlying buffer, so passing
/// arrays by value is cheap; kernels allocate fresh buffers for results.
#[derive(Clone, PartialEq)]
pub struct Array {
    shape: Vec<usize>,
    data: Arc<Vec<f32>>,
}

impl Array {
    /// Builds an array from a shape and a flat row-major buffer, validating
    /// that the buffer length matches the shape's element count.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> ArrayResult<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ArrayError::shape(format!(
                "buffer of {} elements does not fill shape {:?} ({} elements)",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Array {
            shape,
            data: Arc::new(data),
        })
    }

    /// Rank-0 array holding a single value.
    pub fn scalar(value: f32) -> Self {
        Array {
            shape: Vec::new(),
            data: Arc::new(vec![value]),
        }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        Array::full(shape, 0.0)
    }

    pub fn ones(shape: Vec<usize>) -> Self {
        Array::full(shape, 1.0)
    }

    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let len: usize = shape.iter().product();
        Array {
            shape,
            data: Arc::new(vec![value; len]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Extracts the sole element of a single-element array.
    pub fn as_scalar(&self) -> ArrayResult<f32> {
        if self.data.len() != 1 {
            return Err(ArrayError::shape(format!(
                "expected a single-element array, found shape {:?}",
                self.shape
            )));
        }
        Ok(self.data[0])
    }

    /// Reinterprets the buffer under a new shape without copying. The caller
    /// must have verified the element counts match.
    pub(crate) fn view_with_shape(&self, shape: Vec<usize>) -> ArrayResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != self.data.len() {
            return Err(ArrayError::shape(format!(
                "cannot view {} elements as shape {:?}",
                self.data.len(),
                shape
            )));
        }
        Ok(Array {
            shape,
            data: Arc::clone(&self.data),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f32> {
        self.data.iter()
    }

    /// Crate-internal constructor for kernels that computed a matching buffer.
    pub(crate) fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Array {
            shape,
            data: Arc::new(data),
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keep payload dumps short; diagnostics only ever need shape + a peek.
        const PEEK: usize = 8;
        write!(f, "Array{:?}[", self.shape)?;
        for (i, v) in self.data.iter().take(PEEK).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        if self.data.len() > PEEK {
            f.write_str(", ..")?;
        }
        f.write_str("]")
    }
}

/// Row-major strides for a shape.
pub(crate) fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Decomposes a flat index into per-axis coordinates for `shape`.
pub(crate) fn unravel_index(mut index: usize, shape: &[usize]) -> Vec<usize> {
    let mut coords = vec![0usize; shape.len()];
    for axis in (0..shape.len()).rev() {
        let dim = shape[axis].max(1);
        coords[axis] = index % dim;
        index /= dim;
    }
    coords
}

/// Normalizes a possibly-negative axis against `rank`.
pub(crate) fn normalize_axis(axis: i64, rank: usize) -> ArrayResult<usize> {
    let adjusted = if axis < 0 { axis + rank as i64 } else { axis };
    if adjusted < 0 || adjusted >= rank as i64 {
        return Err(ArrayError::AxisOutOfRange { axis, rank });
    }
    Ok(adjusted as usize)
}
