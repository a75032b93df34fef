//! End-to-end programs exercising binding, arithmetic, shape ops, and the
//! fault contract.

use anyhow::Result;
use tensorvm::{
    Array, Fault, InOuts, Instruction, Program, VirtualMachine, VmError, VmOptions,
};

fn run(program: Program, inputs: InOuts) -> std::result::Result<InOuts, Fault> {
    VirtualMachine::new(program).run(inputs, &VmOptions::default())
}

fn arr(shape: &[usize], data: &[f32]) -> Array {
    Array::from_vec(shape.to_vec(), data.to_vec()).unwrap()
}

#[test]
fn identity_program_passes_input_through() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::Out { name: "y".into(), input: 0 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), arr(&[2, 2], &[1.0, 2.0, 3.0, 4.0]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["y"].shape(), &[2, 2]);
    assert_eq!(outputs["y"].data(), &[1.0, 2.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn add_of_eye_and_ones() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "a".into(), out: 0 },
        Instruction::In { name: "b".into(), out: 1 },
        Instruction::Add { a: 0, b: 1, out: 2 },
        Instruction::Free { reg: 0 },
        Instruction::Free { reg: 1 },
        Instruction::Out { name: "sum".into(), input: 2 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("a".into(), arr(&[2, 2], &[1.0, 0.0, 0.0, 1.0]));
    inputs.insert("b".into(), Array::ones(vec![2, 2]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["sum"].data(), &[2.0, 1.0, 1.0, 2.0]);
    Ok(())
}

#[test]
fn reshape_through_shape_operand_round_trips() -> Result<()> {
    // Reshape x to the shape of r, then back via Shape of the original.
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::In { name: "target".into(), out: 1 },
        Instruction::Shape { input: 0, out: 2 },
        Instruction::Reshape { data: 0, shape: 1, out: 3 },
        Instruction::Reshape { data: 3, shape: 2, out: 4 },
        Instruction::Out { name: "y".into(), input: 4 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), arr(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    inputs.insert("target".into(), arr(&[2], &[3.0, 2.0]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["y"].shape(), &[2, 3]);
    assert_eq!(outputs["y"].data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn reshape_with_inferred_axis_that_does_not_divide_faults() {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::In { name: "target".into(), out: 1 },
        Instruction::Reshape { data: 0, shape: 1, out: 2 },
        Instruction::Out { name: "y".into(), input: 2 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), arr(&[6], &[0.0; 6]));
    inputs.insert("target".into(), arr(&[2], &[-1.0, 4.0]));
    let fault = run(program, inputs).unwrap_err();
    assert_eq!(fault.pc, 2);
    assert!(matches!(fault.source, VmError::Shape(_)));
}

#[test]
fn use_after_free_faults() {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::Free { reg: 0 },
        Instruction::Neg { input: 0, out: 1 },
        Instruction::Out { name: "y".into(), input: 1 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), Array::scalar(1.0));
    let fault = run(program, inputs).unwrap_err();
    assert_eq!(fault.pc, 2);
    assert_eq!(fault.op, "Neg");
    assert!(matches!(fault.source, VmError::UnboundRegister(0)));
}

#[test]
fn greater_equal_treats_nan_as_not_less() -> Result<()> {
    // GreaterEqual lowers to Not(Greater(b, a)), so a NaN operand yields 1.0.
    let program = Program::new(vec![
        Instruction::In { name: "a".into(), out: 0 },
        Instruction::In { name: "b".into(), out: 1 },
        Instruction::GreaterEqual { a: 0, b: 1, out: 2 },
        Instruction::Out { name: "mask".into(), input: 2 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("a".into(), arr(&[3], &[f32::NAN, 2.0, 1.0]));
    inputs.insert("b".into(), arr(&[3], &[0.0, 2.0, 5.0]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["mask"].data(), &[1.0, 1.0, 0.0]);
    Ok(())
}

#[test]
fn gemm_with_zero_beta_never_reads_the_bias_register() -> Result<()> {
    // Register 2 is never written; beta == 0 must not touch it.
    let program = Program::new(vec![
        Instruction::In { name: "a".into(), out: 0 },
        Instruction::In { name: "b".into(), out: 1 },
        Instruction::Gemm {
            a: 0,
            b: 1,
            c: 2,
            out: 3,
            alpha: 2.0,
            beta: 0.0,
            trans_a: false,
            trans_b: true,
        },
        Instruction::Out { name: "y".into(), input: 3 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("a".into(), arr(&[1, 2], &[1.0, 2.0]));
    inputs.insert("b".into(), arr(&[1, 2], &[3.0, 4.0]));
    let outputs = run(program, inputs)?;
    // 2 * (1*3 + 2*4) = 22
    assert_eq!(outputs["y"].shape(), &[1, 1]);
    assert_eq!(outputs["y"].data(), &[22.0]);
    Ok(())
}

#[test]
fn reduce_sum_to_inverts_a_broadcast() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "g".into(), out: 0 },
        Instruction::In { name: "target".into(), out: 1 },
        Instruction::ReduceSumTo { data: 0, shape: 1, out: 2 },
        Instruction::Out { name: "gb".into(), input: 2 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("g".into(), arr(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    inputs.insert("target".into(), arr(&[1], &[3.0]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["gb"].shape(), &[3]);
    assert_eq!(outputs["gb"].data(), &[5.0, 7.0, 9.0]);
    Ok(())
}

#[test]
fn softmax_normalizes_each_row() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::Softmax { input: 0, out: 1, axis: 1 },
        Instruction::Out { name: "p".into(), input: 1 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), arr(&[2, 2], &[0.0, 0.0, 1.0, 1.0]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["p"].shape(), &[2, 2]);
    for &p in outputs["p"].data() {
        assert!((p - 0.5).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn log_softmax_exponentiates_to_the_softmax() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::Softmax { input: 0, out: 1, axis: 1 },
        Instruction::LogSoftmax { input: 0, out: 2, axis: 1 },
        Instruction::Out { name: "p".into(), input: 1 },
        Instruction::Out { name: "logp".into(), input: 2 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), arr(&[1, 3], &[1.0, 2.0, 3.0]));
    let outputs = run(program, inputs)?;
    for (p, logp) in outputs["p"].iter().zip(outputs["logp"].iter()) {
        assert!((logp.exp() - p).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn reduce_over_a_zero_extent_input_completes() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::ReduceSum { input: 0, out: 1, axes: Some(vec![1]), keepdims: false },
        Instruction::Out { name: "y".into(), input: 1 },
    ]);
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), arr(&[0, 2], &[]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["y"].shape(), &[0]);
    assert!(outputs["y"].data().is_empty());
    Ok(())
}

#[test]
fn conv_with_omitted_strides_and_pads() -> Result<()> {
    let program = Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::In { name: "w".into(), out: 1 },
        Instruction::Conv {
            x: 0,
            w: 1,
            b: -1,
            out: 2,
            strides: vec![],
            pads: vec![],
        },
        Instruction::Out { name: "y".into(), input: 2 },
    ]);
    let mut inputs = InOuts::new();
    // 1x1x3x3 input, 1x1x2x2 all-ones kernel: each output is a 2x2 window sum.
    inputs.insert(
        "x".into(),
        arr(&[1, 1, 3, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]),
    );
    inputs.insert("w".into(), Array::ones(vec![1, 1, 2, 2]));
    let outputs = run(program, inputs)?;
    assert_eq!(outputs["y"].shape(), &[1, 1, 2, 2]);
    assert_eq!(outputs["y"].data(), &[12.0, 16.0, 24.0, 28.0]);
    Ok(())
}

#[test]
fn missing_input_faults_at_the_binding_instruction() {
    let program = Program::new(vec![
        Instruction::In { name: "absent".into(), out: 0 },
        Instruction::Out { name: "y".into(), input: 0 },
    ]);
    let fault = run(program, InOuts::new()).unwrap_err();
    assert_eq!(fault.pc, 0);
    assert!(matches!(fault.source, VmError::UnboundInput(_)));
}

#[test]
fn reserved_control_flow_faults_loudly() {
    let program = Program::new(vec![Instruction::Jump { target: 0 }]);
    let fault = run(program, InOuts::new()).unwrap_err();
    assert!(matches!(fault.source, VmError::Unimplemented("Jump")));
}
