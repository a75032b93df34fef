//! Execution core for compiled numeric-graph programs.
//!
//! A [`Program`] is a linear sequence of [`Instruction`]s over a register
//! file of tensor and sequence variables, produced ahead of time by a graph
//! compiler. The [`VirtualMachine`] runs it against named inputs and returns
//! named outputs; any contract violation aborts the run with a [`Fault`]
//! naming the instruction position and its register operands.
//!
//! Numeric kernels live in the companion `tensorvm-array` crate; this crate
//! owns register lifetimes, the auxiliary-context protocol for stateful
//! forward/backward pairs, and the fault taxonomy.

pub mod error;
pub mod interpreter;
mod ops;
pub mod program;
pub mod state;
pub mod variable;

pub use error::{Fault, VmError};
pub use interpreter::{Execution, RunPhase, VirtualMachine, VmOptions};
pub use program::{Instruction, Program, ProgramIoError, ProgramSerdeError};
pub use state::{InOuts, VmState};
pub use variable::{Auxiliary, BatchNormContext, MaxPoolContext, Variable, VariableKind};

pub use tensorvm_array::{Array, ArrayError};
