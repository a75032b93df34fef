//! The fetch-decode-execute loop.
//!
//! Execution is strictly sequential: one program counter, one instruction at
//! a time, no suspension points. A fault is terminal for the run; there is no
//! retry or rollback, and a faulted run never yields partial outputs.

use crate::error::{Fault, VmError};
use crate::ops;
use crate::program::{Instruction, Program};
use crate::state::{InOuts, VmState};

/// Per-run configuration, threaded explicitly rather than held as ambient
/// state. `diagnostics_fatal` selects whether NaN/Inf hits abort the run or
/// are only reported; that is the sole recoverable error category.
#[derive(Debug, Clone, Default)]
pub struct VmOptions {
    pub is_training: bool,
    pub trace_level: u32,
    pub check_nans: bool,
    pub check_infs: bool,
    pub diagnostics_fatal: bool,
}

/// Interpreter lifecycle. `Running` transitions to `Halted` when the program
/// counter reaches the end of the program with every declared output bound,
/// and to `Faulted` on the first operation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Ready,
    Running,
    Halted,
    Faulted,
}

/// An immutable program plus the entry point for running it. The program is
/// loaded once and may run many times against fresh register files; separate
/// threads may run it concurrently, each with its own inputs.
pub struct VirtualMachine {
    program: Program,
}

impl VirtualMachine {
    pub fn new(program: Program) -> Self {
        VirtualMachine { program }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Runs the program to completion over `inputs`.
    pub fn run(&self, inputs: InOuts, options: &VmOptions) -> Result<InOuts, Fault> {
        Execution::new(&self.program, inputs, options.clone()).run()
    }
}

/// One in-flight run: program counter, register file, and lifecycle phase.
/// Stepping is exposed so embedders can observe the counter between
/// instructions; future control-flow ops will retarget it here.
pub struct Execution<'p> {
    program: &'p Program,
    state: VmState,
    phase: RunPhase,
}

impl<'p> Execution<'p> {
    pub fn new(program: &'p Program, inputs: InOuts, options: VmOptions) -> Self {
        Execution {
            state: VmState::new(program.num_registers(), inputs, options),
            program,
            phase: RunPhase::Ready,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn pc(&self) -> usize {
        self.state.pc()
    }

    /// Executes the instruction under the program counter and advances it.
    /// Calling `step` on a finished run is a no-op returning the final phase.
    pub fn step(&mut self) -> Result<RunPhase, Fault> {
        match self.phase {
            RunPhase::Halted | RunPhase::Faulted => return Ok(self.phase),
            RunPhase::Ready => self.phase = RunPhase::Running,
            RunPhase::Running => {}
        }

        let pc = self.state.pc();
        if pc >= self.program.len() {
            return self.halt();
        }
        let instruction = &self.program.instructions()[pc];
        self.trace(pc, instruction);

        if let Err(source) = ops::execute(instruction, &mut self.state) {
            return Err(self.fault(pc, instruction, source));
        }

        let (inputs, outputs) = instruction.registers();
        if let Err(source) = self.state.run_numeric_checks(&inputs, &outputs) {
            return Err(self.fault(pc, instruction, source));
        }

        self.state.set_pc(pc + 1);
        if self.state.pc() >= self.program.len() {
            return self.halt();
        }
        Ok(self.phase)
    }

    /// Runs until halt and extracts the named outputs.
    pub fn run(mut self) -> Result<InOuts, Fault> {
        while self.phase != RunPhase::Halted {
            self.step()?;
        }
        Ok(self.state.into_outputs())
    }

    fn halt(&mut self) -> Result<RunPhase, Fault> {
        // A run only halts cleanly once every declared output is bound.
        for name in self.program.output_names() {
            if !self.state.has_output(name) {
                self.phase = RunPhase::Faulted;
                return Err(Fault {
                    pc: self.state.pc(),
                    op: "Out",
                    registers: Vec::new(),
                    source: VmError::UnboundOutput(name.to_string()),
                });
            }
        }
        self.phase = RunPhase::Halted;
        Ok(self.phase)
    }

    fn fault(&mut self, pc: usize, instruction: &Instruction, source: VmError) -> Fault {
        self.phase = RunPhase::Faulted;
        let (mut registers, outputs) = instruction.registers();
        registers.extend(outputs);
        Fault {
            pc,
            op: instruction.name(),
            registers,
            source,
        }
    }

    fn trace(&self, pc: usize, instruction: &Instruction) {
        let level = self.state.options().trace_level;
        if level == 0 {
            return;
        }
        if level == 1 {
            log::debug!("pc {pc:4} {}", instruction.name());
        } else {
            log::debug!("pc {pc:4} {instruction:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensorvm_array::Array;

    fn identity_program() -> Program {
        Program::new(vec![
            Instruction::In { name: "x".into(), out: 0 },
            Instruction::Out { name: "y".into(), input: 0 },
        ])
    }

    #[test]
    fn phases_progress_ready_running_halted() {
        let program = identity_program();
        let mut inputs = InOuts::new();
        inputs.insert("x".into(), Array::scalar(1.0));
        let mut exec = Execution::new(&program, inputs, VmOptions::default());
        assert_eq!(exec.phase(), RunPhase::Ready);
        assert_eq!(exec.step().unwrap(), RunPhase::Running);
        assert_eq!(exec.pc(), 1);
        assert_eq!(exec.step().unwrap(), RunPhase::Halted);
        assert_eq!(exec.step().unwrap(), RunPhase::Halted);
    }

    #[test]
    fn fault_is_terminal_and_reports_position() {
        let program = Program::new(vec![
            Instruction::In { name: "x".into(), out: 0 },
            // r1 was never written: this must fault.
            Instruction::Add { a: 0, b: 1, out: 2 },
            Instruction::Out { name: "y".into(), input: 2 },
        ]);
        let mut inputs = InOuts::new();
        inputs.insert("x".into(), Array::scalar(1.0));
        let fault = VirtualMachine::new(program)
            .run(inputs, &VmOptions::default())
            .unwrap_err();
        assert_eq!(fault.pc, 1);
        assert_eq!(fault.op, "Add");
        assert!(matches!(fault.source, VmError::UnboundRegister(1)));
    }

    #[test]
    fn empty_program_halts_immediately() {
        let program = Program::new(vec![]);
        let outputs = VirtualMachine::new(program)
            .run(InOuts::new(), &VmOptions::default())
            .unwrap();
        assert!(outputs.is_empty());
    }
}
