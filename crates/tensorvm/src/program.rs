//! The program artifact: an immutable, ordered list of instructions produced
//! by an external graph compiler. Register indices are assigned at compile
//! time; a negative index in an optional operand slot means "absent".

use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One bytecode instruction: op kind tag plus its register operands and
/// static attributes. Variants mirror the closed operation taxonomy the
/// compiler is allowed to emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Instruction {
    // I/O binding and register lifetime.
    In { name: String, out: i64 },
    Out { name: String, input: i64 },
    Free { reg: i64 },
    Ident { input: i64, out: i64 },

    // Elementwise arithmetic and transcendentals.
    Add { a: i64, b: i64, out: i64 },
    Sub { a: i64, b: i64, out: i64 },
    Mul { a: i64, b: i64, out: i64 },
    Div { a: i64, b: i64, out: i64 },
    Neg { input: i64, out: i64 },
    Exp { input: i64, out: i64 },
    Log { input: i64, out: i64 },
    Sqrt { input: i64, out: i64 },
    Sigmoid { input: i64, out: i64 },
    Relu { input: i64, out: i64 },
    Tanh { input: i64, out: i64 },
    Greater { a: i64, b: i64, out: i64 },
    GreaterEqual { a: i64, b: i64, out: i64 },
    Equal { a: i64, b: i64, out: i64 },
    Not { input: i64, out: i64 },
    Softmax { input: i64, out: i64, axis: i64 },
    LogSoftmax { input: i64, out: i64, axis: i64 },

    // Shape and layout.
    Reshape { data: i64, shape: i64, out: i64 },
    Squeeze { input: i64, out: i64, axes: Vec<i64> },
    Unsqueeze { input: i64, out: i64, axes: Vec<i64> },
    Slice { input: i64, out: i64, axes: Vec<i64>, starts: Vec<i64>, ends: Vec<i64> },
    Gather { data: i64, indices: i64, out: i64, axis: i64 },
    Expand { data: i64, shape: i64, out: i64 },
    Shape { input: i64, out: i64 },
    Size { input: i64, out: i64 },

    // Reductions.
    ReduceSum { input: i64, out: i64, axes: Option<Vec<i64>>, keepdims: bool },
    ReduceMean { input: i64, out: i64, axes: Option<Vec<i64>>, keepdims: bool },
    ReduceSumSquare { input: i64, out: i64, axes: Option<Vec<i64>>, keepdims: bool },
    ReduceSumTo { data: i64, shape: i64, out: i64 },

    // Linear algebra and convolution.
    MatMul { a: i64, b: i64, out: i64 },
    Gemm {
        a: i64,
        b: i64,
        c: i64,
        out: i64,
        alpha: f32,
        beta: f32,
        trans_a: bool,
        trans_b: bool,
    },
    Conv { x: i64, w: i64, b: i64, out: i64, strides: Vec<i64>, pads: Vec<i64> },
    ConvTranspose {
        x: i64,
        w: i64,
        b: i64,
        out: i64,
        strides: Vec<i64>,
        pads: Vec<i64>,
        output_shape: Vec<i64>,
    },
    ConvGradWeight { w: i64, x: i64, gy: i64, out: i64, strides: Vec<i64>, pads: Vec<i64> },

    // Pooling and normalization (stateful forward/backward pairs).
    MaxPool { x: i64, out: i64, kernel: Vec<i64>, strides: Vec<i64>, pads: Vec<i64> },
    MaxPoolGrad { y: i64, gy: i64, out: i64 },
    AveragePool {
        x: i64,
        out: i64,
        kernel: Vec<i64>,
        strides: Vec<i64>,
        pads: Vec<i64>,
        count_include_pad: bool,
    },
    BatchNormalization {
        x: i64,
        scale: i64,
        b: i64,
        mean: i64,
        var: i64,
        out: i64,
        epsilon: f32,
        momentum: f32,
    },
    BatchNormalizationGrad { y: i64, gy: i64, gx: i64, gscale: i64, gbias: i64 },

    // Sequences.
    SequenceCreate { out: i64 },
    SequenceAppend { seq: i64, value: i64 },
    SequenceLookup { seq: i64, index: i64, out: i64 },
    SequenceStack { seq: i64, out: i64 },
    SequencePad { seq: i64, out: i64 },
    SequenceClear { seq: i64 },
    SequenceCopy { seq: i64, out: i64 },
    SequenceMove { seq: i64, out: i64 },

    // Control flow is reserved in the artifact schema; the interpreter's
    // program counter is exposed for it, but executing these faults loudly
    // until branching lands.
    Jump { target: i64 },
    JumpIfTrue { cond: i64, target: i64 },
}

impl Instruction {
    /// Op kind label used in traces and fault reports.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::In { .. } => "In",
            Instruction::Out { .. } => "Out",
            Instruction::Free { .. } => "Free",
            Instruction::Ident { .. } => "Ident",
            Instruction::Add { .. } => "Add",
            Instruction::Sub { .. } => "Sub",
            Instruction::Mul { .. } => "Mul",
            Instruction::Div { .. } => "Div",
            Instruction::Neg { .. } => "Neg",
            Instruction::Exp { .. } => "Exp",
            Instruction::Log { .. } => "Log",
            Instruction::Sqrt { .. } => "Sqrt",
            Instruction::Sigmoid { .. } => "Sigmoid",
            Instruction::Relu { .. } => "Relu",
            Instruction::Tanh { .. } => "Tanh",
            Instruction::Greater { .. } => "Greater",
            Instruction::GreaterEqual { .. } => "GreaterEqual",
            Instruction::Equal { .. } => "Equal",
            Instruction::Not { .. } => "Not",
            Instruction::Softmax { .. } => "Softmax",
            Instruction::LogSoftmax { .. } => "LogSoftmax",
            Instruction::Reshape { .. } => "Reshape",
            Instruction::Squeeze { .. } => "Squeeze",
            Instruction::Unsqueeze { .. } => "Unsqueeze",
            Instruction::Slice { .. } => "Slice",
            Instruction::Gather { .. } => "Gather",
            Instruction::Expand { .. } => "Expand",
            Instruction::Shape { .. } => "Shape",
            Instruction::Size { .. } => "Size",
            Instruction::ReduceSum { .. } => "ReduceSum",
            Instruction::ReduceMean { .. } => "ReduceMean",
            Instruction::ReduceSumSquare { .. } => "ReduceSumSquare",
            Instruction::ReduceSumTo { .. } => "ReduceSumTo",
            Instruction::MatMul { .. } => "MatMul",
            Instruction::Gemm { .. } => "Gemm",
            Instruction::Conv { .. } => "Conv",
            Instruction::ConvTranspose { .. } => "ConvTranspose",
            Instruction::ConvGradWeight { .. } => "ConvGradWeight",
            Instruction::MaxPool { .. } => "MaxPool",
            Instruction::MaxPoolGrad { .. } => "MaxPoolGrad",
            Instruction::AveragePool { .. } => "AveragePool",
            Instruction::BatchNormalization { .. } => "BatchNormalization",
            Instruction::BatchNormalizationGrad { .. } => "BatchNormalizationGrad",
            Instruction::SequenceCreate { .. } => "SequenceCreate",
            Instruction::SequenceAppend { .. } => "SequenceAppend",
            Instruction::SequenceLookup { .. } => "SequenceLookup",
            Instruction::SequenceStack { .. } => "SequenceStack",
            Instruction::SequencePad { .. } => "SequencePad",
            Instruction::SequenceClear { .. } => "SequenceClear",
            Instruction::SequenceCopy { .. } => "SequenceCopy",
            Instruction::SequenceMove { .. } => "SequenceMove",
            Instruction::Jump { .. } => "Jump",
            Instruction::JumpIfTrue { .. } => "JumpIfTrue",
        }
    }

    /// Input and output register operands, in declaration order. Negative
    /// entries are absent optional operands and are kept as-is so fault
    /// reports show the instruction verbatim.
    pub fn registers(&self) -> (Vec<i64>, Vec<i64>) {
        match self {
            Instruction::In { out, .. } => (vec![], vec![*out]),
            Instruction::Out { input, .. } => (vec![*input], vec![]),
            Instruction::Free { reg } => (vec![*reg], vec![]),
            Instruction::Ident { input, out } => (vec![*input], vec![*out]),
            Instruction::Add { a, b, out }
            | Instruction::Sub { a, b, out }
            | Instruction::Mul { a, b, out }
            | Instruction::Div { a, b, out }
            | Instruction::Greater { a, b, out }
            | Instruction::GreaterEqual { a, b, out }
            | Instruction::Equal { a, b, out }
            | Instruction::MatMul { a, b, out } => (vec![*a, *b], vec![*out]),
            Instruction::Neg { input, out }
            | Instruction::Exp { input, out }
            | Instruction::Log { input, out }
            | Instruction::Sqrt { input, out }
            | Instruction::Sigmoid { input, out }
            | Instruction::Relu { input, out }
            | Instruction::Tanh { input, out }
            | Instruction::Not { input, out }
            | Instruction::Shape { input, out }
            | Instruction::Size { input, out } => (vec![*input], vec![*out]),
            Instruction::Reshape { data, shape, out }
            | Instruction::Expand { data, shape, out }
            | Instruction::ReduceSumTo { data, shape, out } => {
                (vec![*data, *shape], vec![*out])
            }
            Instruction::Softmax { input, out, .. }
            | Instruction::LogSoftmax { input, out, .. }
            | Instruction::Squeeze { input, out, .. }
            | Instruction::Unsqueeze { input, out, .. }
            | Instruction::Slice { input, out, .. }
            | Instruction::ReduceSum { input, out, .. }
            | Instruction::ReduceMean { input, out, .. }
            | Instruction::ReduceSumSquare { input, out, .. } => (vec![*input], vec![*out]),
            Instruction::Gather { data, indices, out, .. } => (vec![*data, *indices], vec![*out]),
            Instruction::Gemm { a, b, c, out, .. } => (vec![*a, *b, *c], vec![*out]),
            Instruction::Conv { x, w, b, out, .. } => (vec![*x, *w, *b], vec![*out]),
            Instruction::ConvTranspose { x, w, b, out, .. } => (vec![*x, *w, *b], vec![*out]),
            Instruction::ConvGradWeight { w, x, gy, out, .. } => {
                (vec![*w, *x, *gy], vec![*out])
            }
            Instruction::MaxPool { x, out, .. } => (vec![*x], vec![*out]),
            Instruction::MaxPoolGrad { y, gy, out } => (vec![*y, *gy], vec![*out]),
            Instruction::AveragePool { x, out, .. } => (vec![*x], vec![*out]),
            Instruction::BatchNormalization { x, scale, b, mean, var, out, .. } => {
                (vec![*x, *scale, *b, *mean, *var], vec![*out])
            }
            Instruction::BatchNormalizationGrad { y, gy, gx, gscale, gbias } => {
                (vec![*y, *gy], vec![*gx, *gscale, *gbias])
            }
            Instruction::SequenceCreate { out } => (vec![], vec![*out]),
            Instruction::SequenceAppend { seq, value } => (vec![*seq, *value], vec![]),
            Instruction::SequenceLookup { seq, index, out } => {
                (vec![*seq, *index], vec![*out])
            }
            Instruction::SequenceStack { seq, out }
            | Instruction::SequencePad { seq, out }
            | Instruction::SequenceCopy { seq, out }
            | Instruction::SequenceMove { seq, out } => (vec![*seq], vec![*out]),
            Instruction::SequenceClear { seq } => (vec![*seq], vec![]),
            Instruction::Jump { .. } => (vec![], vec![]),
            Instruction::JumpIfTrue { cond, .. } => (vec![*cond], vec![]),
        }
    }
}

/// Immutable program artifact. Loaded once, runnable many times against
/// fresh register files; safely shared read-only across threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    instructions: Vec<Instruction>,
    num_registers: usize,
}

impl Program {
    /// Builds a program, sizing the register file from the largest register
    /// index any instruction mentions.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        let mut max_register = -1i64;
        for instruction in &instructions {
            let (inputs, outputs) = instruction.registers();
            for reg in inputs.into_iter().chain(outputs) {
                max_register = max_register.max(reg);
            }
        }
        Program {
            instructions,
            num_registers: (max_register + 1) as usize,
        }
    }

    /// Builds a program with an explicit register file size. The count is a
    /// lower bound: it is grown to cover every register the instructions
    /// mention, so extra scratch registers can be reserved but never lost.
    pub fn with_register_count(instructions: Vec<Instruction>, num_registers: usize) -> Self {
        let inferred = Program::new(instructions);
        Program {
            num_registers: num_registers.max(inferred.num_registers),
            ..inferred
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn num_registers(&self) -> usize {
        self.num_registers
    }

    /// Names this program promises to bind as outputs, in program order.
    pub fn output_names(&self) -> Vec<&str> {
        self.instructions
            .iter()
            .filter_map(|inst| match inst {
                Instruction::Out { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn to_json_string(&self) -> Result<String, ProgramSerdeError> {
        serde_json::to_string_pretty(self).map_err(ProgramSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ProgramSerdeError> {
        serde_json::from_str(src).map_err(ProgramSerdeError::from)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, ProgramSerdeError> {
        bincode::serialize(self).map_err(ProgramSerdeError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, ProgramSerdeError> {
        bincode::deserialize(bytes).map_err(ProgramSerdeError::from)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ProgramIoError> {
        let contents = self.to_json_string()?;
        fs::write(path, contents).map_err(ProgramIoError::from)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ProgramIoError> {
        let contents = fs::read_to_string(path).map_err(ProgramIoError::from)?;
        Program::from_json_str(&contents).map_err(ProgramIoError::from)
    }

    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<(), ProgramIoError> {
        let bytes = self.to_bincode_bytes()?;
        fs::write(path, bytes).map_err(ProgramIoError::from)
    }

    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self, ProgramIoError> {
        let bytes = fs::read(path).map_err(ProgramIoError::from)?;
        Program::from_bincode_slice(&bytes).map_err(ProgramIoError::from)
    }
}

#[derive(Debug, Error)]
pub enum ProgramSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum ProgramIoError {
    #[error(transparent)]
    Serialization(#[from] ProgramSerdeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_count_inferred_from_instructions() {
        let program = Program::new(vec![
            Instruction::In { name: "x".into(), out: 0 },
            Instruction::Add { a: 0, b: 0, out: 5 },
            Instruction::Out { name: "y".into(), input: 5 },
        ]);
        assert_eq!(program.num_registers(), 6);
        assert_eq!(program.output_names(), vec!["y"]);
    }

    #[test]
    fn explicit_register_count_is_a_lower_bound() {
        let instructions = vec![Instruction::Add { a: 0, b: 1, out: 7 }];
        let grown = Program::with_register_count(instructions.clone(), 2);
        assert_eq!(grown.num_registers(), 8);
        let reserved = Program::with_register_count(instructions, 16);
        assert_eq!(reserved.num_registers(), 16);
    }

    #[test]
    fn absent_optional_operands_do_not_grow_the_file() {
        let program = Program::new(vec![Instruction::Conv {
            x: 0,
            w: 1,
            b: -1,
            out: 2,
            strides: vec![],
            pads: vec![],
        }]);
        assert_eq!(program.num_registers(), 3);
    }

    #[test]
    fn json_round_trip_preserves_instructions() {
        let program = Program::new(vec![
            Instruction::In { name: "in".into(), out: 0 },
            Instruction::Gemm {
                a: 0,
                b: 0,
                c: 0,
                out: 1,
                alpha: 1.5,
                beta: 0.0,
                trans_a: false,
                trans_b: true,
            },
            Instruction::Out { name: "out".into(), input: 1 },
        ]);
        let text = program.to_json_string().unwrap();
        let back = Program::from_json_str(&text).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.num_registers(), program.num_registers());
        match &back.instructions()[1] {
            Instruction::Gemm { alpha, beta, trans_b, .. } => {
                assert_eq!(*alpha, 1.5);
                assert_eq!(*beta, 0.0);
                assert!(*trans_b);
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn bincode_round_trip() {
        let program = Program::new(vec![Instruction::SequenceCreate { out: 3 }]);
        let bytes = program.to_bincode_bytes().unwrap();
        let back = Program::from_bincode_slice(&bytes).unwrap();
        assert_eq!(back.num_registers(), 4);
    }
}
