//! Error taxonomy for the execution core. Every variant is fatal to the run
//! it occurs in; the interpreter wraps the offending instruction's position
//! into a [`Fault`] and aborts with no partial outputs.

use tensorvm_array::ArrayError;
use thiserror::Error;

use crate::variable::VariableKind;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("register r{0} is empty")]
    UnboundRegister(i64),
    #[error("register r{reg} holds a {found}, expected a {expected}")]
    TypeMismatch {
        reg: i64,
        expected: VariableKind,
        found: VariableKind,
    },
    #[error("register r{0} already holds a value")]
    AlreadyExists(i64),
    #[error("no auxiliary context stashed for register r{0}")]
    MissingAuxiliary(i64),
    #[error("auxiliary context for register r{reg} is {found}, expected {expected}")]
    AuxiliaryKindMismatch {
        reg: i64,
        expected: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Shape(#[from] ArrayError),
    #[error("no input bound to name `{0}`")]
    UnboundInput(String),
    #[error("declared output `{0}` was never bound")]
    UnboundOutput(String),
    #[error("sequence index {index} out of range for length {len}")]
    SequenceIndexOutOfRange { index: i64, len: usize },
    #[error("numeric check: {what} found in register r{reg}")]
    NumericCheck { reg: i64, what: &'static str },
    #[error("operation `{0}` is recognized but not implemented")]
    Unimplemented(&'static str),
}

/// Terminal failure of a run: the instruction index, op kind, and register
/// operands of the faulting instruction plus the underlying error.
#[derive(Debug, Error)]
#[error("fault at pc {pc} in {op} (registers {registers:?}): {source}")]
pub struct Fault {
    pub pc: usize,
    pub op: &'static str,
    pub registers: Vec<i64>,
    #[source]
    pub source: VmError,
}
