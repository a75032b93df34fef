//! Per-run state: the register file, auxiliary-context slots, and the named
//! input/output tables. One `VmState` belongs to exactly one run; the program
//! itself is shared read-only.

use std::collections::HashMap;

use tensorvm_array::Array;

use crate::error::VmError;
use crate::interpreter::VmOptions;
use crate::variable::{Auxiliary, Variable, VariableKind};

/// Named tensor table used for both run inputs and run outputs.
pub type InOuts = HashMap<String, Array>;

/// Arena-style register file: a fixed number of slots, each either empty or
/// holding one [`Variable`], plus one optional [`Auxiliary`] slot per index.
/// Any access to a dead slot is an immediate contract violation.
pub struct VmState {
    pc: usize,
    variables: Vec<Option<Variable>>,
    auxiliaries: Vec<Option<Auxiliary>>,
    inputs: InOuts,
    outputs: InOuts,
    options: VmOptions,
}

impl VmState {
    pub fn new(num_registers: usize, inputs: InOuts, options: VmOptions) -> Self {
        VmState {
            pc: 0,
            variables: (0..num_registers).map(|_| None).collect(),
            auxiliaries: (0..num_registers).map(|_| None).collect(),
            inputs,
            outputs: InOuts::new(),
            options,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn is_training(&self) -> bool {
        self.options.is_training
    }

    fn slot(&self, reg: i64) -> Result<usize, VmError> {
        if reg < 0 || reg as usize >= self.variables.len() {
            return Err(VmError::UnboundRegister(reg));
        }
        Ok(reg as usize)
    }

    /// Reads a tensor register. Empty slots and sequence slots are fatal.
    pub fn get_array(&self, reg: i64) -> Result<Array, VmError> {
        let slot = self.slot(reg)?;
        match &self.variables[slot] {
            None => Err(VmError::UnboundRegister(reg)),
            Some(Variable::Array(a)) => Ok(a.clone()),
            Some(other) => Err(VmError::TypeMismatch {
                reg,
                expected: VariableKind::Array,
                found: other.kind(),
            }),
        }
    }

    /// Reads an optional tensor operand; a negative register index in the
    /// artifact means the operand is absent.
    pub fn get_array_optional(&self, reg: i64) -> Result<Option<Array>, VmError> {
        if reg < 0 {
            return Ok(None);
        }
        self.get_array(reg).map(Some)
    }

    /// Unconditional overwrite: a register is an untyped slot, not a
    /// statically typed variable.
    pub fn set_array(&mut self, reg: i64, value: Array) -> Result<(), VmError> {
        let slot = self.slot(reg)?;
        self.variables[slot] = Some(Variable::Array(value));
        Ok(())
    }

    /// Clears a register. Freeing an already-empty register is fatal, which
    /// catches double-free bugs in compiled programs.
    pub fn free(&mut self, reg: i64) -> Result<(), VmError> {
        let slot = self.slot(reg)?;
        if self.variables[slot].take().is_none() {
            return Err(VmError::UnboundRegister(reg));
        }
        Ok(())
    }

    /// Creates a fresh empty sequence owned by `reg`. The slot must be empty.
    pub fn create_sequence(&mut self, reg: i64) -> Result<(), VmError> {
        let slot = self.slot(reg)?;
        if self.variables[slot].is_some() {
            return Err(VmError::AlreadyExists(reg));
        }
        self.variables[slot] = Some(Variable::Sequence(Vec::new()));
        Ok(())
    }

    pub fn sequence(&self, reg: i64) -> Result<&[Array], VmError> {
        let slot = self.slot(reg)?;
        match &self.variables[slot] {
            None => Err(VmError::UnboundRegister(reg)),
            Some(Variable::Sequence(items)) => Ok(items),
            Some(other) => Err(VmError::TypeMismatch {
                reg,
                expected: VariableKind::Sequence,
                found: other.kind(),
            }),
        }
    }

    pub fn sequence_mut(&mut self, reg: i64) -> Result<&mut Vec<Array>, VmError> {
        let slot = self.slot(reg)?;
        match &mut self.variables[slot] {
            None => Err(VmError::UnboundRegister(reg)),
            Some(Variable::Sequence(items)) => Ok(items),
            Some(other) => Err(VmError::TypeMismatch {
                reg,
                expected: VariableKind::Sequence,
                found: other.kind(),
            }),
        }
    }

    /// Stashes an auxiliary context for `reg`, overwriting any previous one.
    /// Overwrite-on-write is a known staleness risk the compiler avoids by
    /// never reusing a forward output register before its backward runs.
    pub fn set_aux(&mut self, reg: i64, aux: Auxiliary) -> Result<(), VmError> {
        let slot = self.slot(reg)?;
        self.auxiliaries[slot] = Some(aux);
        Ok(())
    }

    /// Consumes the auxiliary context stashed for `reg`. Single-consume is
    /// enforced here: a second take reports `MissingAuxiliary`.
    pub fn take_aux(&mut self, reg: i64) -> Result<Auxiliary, VmError> {
        let slot = self.slot(reg)?;
        self.auxiliaries[slot]
            .take()
            .ok_or(VmError::MissingAuxiliary(reg))
    }

    pub fn input(&self, name: &str) -> Result<Array, VmError> {
        self.inputs
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnboundInput(name.to_string()))
    }

    pub fn bind_output(&mut self, name: &str, value: Array) {
        self.outputs.insert(name.to_string(), value);
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    pub fn into_outputs(self) -> InOuts {
        self.outputs
    }

    /// Scans the watch set for NaN/Inf values per the run configuration.
    /// Report-only mode logs and continues; fatal mode returns the first hit.
    pub fn run_numeric_checks(
        &self,
        inputs: &[i64],
        outputs: &[i64],
    ) -> Result<(), VmError> {
        if !self.options.check_nans && !self.options.check_infs {
            return Ok(());
        }
        for &reg in inputs.iter().chain(outputs.iter()) {
            if reg < 0 || reg as usize >= self.variables.len() {
                continue;
            }
            let arrays: Vec<&Array> = match &self.variables[reg as usize] {
                None => continue,
                Some(Variable::Array(a)) => vec![a],
                Some(Variable::Sequence(items)) => items.iter().collect(),
            };
            for array in arrays {
                if self.options.check_nans {
                    self.report_numeric(reg, array, "NaN", |v| v.is_nan())?;
                }
                if self.options.check_infs {
                    self.report_numeric(reg, array, "Inf", |v| v.is_infinite())?;
                }
            }
        }
        Ok(())
    }

    fn report_numeric(
        &self,
        reg: i64,
        array: &Array,
        what: &'static str,
        hit: impl Fn(f32) -> bool,
    ) -> Result<(), VmError> {
        if !array.iter().any(|&v| hit(v)) {
            return Ok(());
        }
        if self.options.diagnostics_fatal {
            return Err(VmError::NumericCheck { reg, what });
        }
        log::warn!("numeric check: {what} found in register r{reg} ({array:?})");
        Ok(())
    }
}
