//! Register values and the auxiliary-context payloads shared by stateful
//! forward/backward operation pairs.

use std::fmt;

use tensorvm_array::Array;

/// Value held by a non-empty register.
#[derive(Debug, Clone)]
pub enum Variable {
    Array(Array),
    Sequence(Vec<Array>),
}

impl Variable {
    pub fn kind(&self) -> VariableKind {
        match self {
            Variable::Array(_) => VariableKind::Array,
            Variable::Sequence(_) => VariableKind::Sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Array,
    Sequence,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableKind::Array => f.write_str("tensor"),
            VariableKind::Sequence => f.write_str("sequence"),
        }
    }
}

/// Hidden state produced by a stateful forward op and consumed exactly once
/// by its paired backward op, keyed by the forward op's output register.
///
/// A closed tagged union rather than a type-erased box: a backward op that
/// finds the wrong payload kind reports a structural mismatch instead of a
/// failed downcast.
#[derive(Debug, Clone)]
pub enum Auxiliary {
    MaxPool(MaxPoolContext),
    BatchNorm(BatchNormContext),
}

impl Auxiliary {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Auxiliary::MaxPool(_) => "max-pool",
            Auxiliary::BatchNorm(_) => "batch-norm",
        }
    }
}

/// Winning input index per pooled output element, captured by the forward.
#[derive(Debug, Clone)]
pub struct MaxPoolContext {
    pub argmax: Vec<usize>,
    pub input_shape: Vec<usize>,
}

/// Normalized activations and statistics captured by a training-mode
/// batch-normalization forward.
#[derive(Debug, Clone)]
pub struct BatchNormContext {
    pub x_hat: Array,
    pub inv_std: Array,
    pub scale: Array,
}
