//! Reference multidimensional-array runtime for the tensorvm execution core.
//!
//! Arrays are dense, row-major, single precision (`f32`). The execution core
//! orchestrates register lifetimes and control flow; every numeric kernel it
//! needs lives here. Shape violations surface as [`ArrayError`] values so the
//! core can map them into its own fault taxonomy.

pub mod array;
pub mod conv;
pub mod elementwise;
pub mod error;
pub mod linalg;
pub mod manip;
pub mod norm;
pub mod pool;
pub mod reduce;

pub use array::Array;
pub use error::{ArrayError, ArrayResult};
