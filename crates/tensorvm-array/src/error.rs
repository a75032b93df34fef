use thiserror::Error;

/// Failure raised by an array kernel. Every variant is a caller contract
/// violation; kernels never panic on bad shapes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrayError {
    #[error("shape error: {0}")]
    Shape(String),
    #[error("cannot broadcast shapes {lhs:?} and {rhs:?}")]
    Broadcast { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("index {index} out of bounds for axis of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: i64, rank: usize },
}

impl ArrayError {
    pub fn shape(message: impl Into<String>) -> Self {
        ArrayError::Shape(message.into())
    }
}

pub type ArrayResult<T> = Result<T, ArrayError>;
