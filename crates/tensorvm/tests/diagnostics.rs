//! Numeric diagnostics and trace configuration.

use tensorvm::{Array, InOuts, Instruction, Program, VirtualMachine, VmError, VmOptions};

fn nan_producing_program() -> Program {
    // log(-1) is NaN in the working precision.
    Program::new(vec![
        Instruction::In { name: "x".into(), out: 0 },
        Instruction::Log { input: 0, out: 1 },
        Instruction::Out { name: "y".into(), input: 1 },
    ])
}

fn negative_input() -> InOuts {
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), Array::scalar(-1.0));
    inputs
}

#[test]
fn fatal_nan_check_faults_at_the_producing_instruction() {
    let options = VmOptions {
        check_nans: true,
        diagnostics_fatal: true,
        ..VmOptions::default()
    };
    let fault = VirtualMachine::new(nan_producing_program())
        .run(negative_input(), &options)
        .unwrap_err();
    assert_eq!(fault.pc, 1);
    assert_eq!(fault.op, "Log");
    assert!(matches!(
        fault.source,
        VmError::NumericCheck { reg: 1, what: "NaN" }
    ));
}

#[test]
fn report_only_nan_check_lets_the_run_finish() {
    let _ = env_logger::builder().is_test(true).try_init();
    let options = VmOptions {
        check_nans: true,
        ..VmOptions::default()
    };
    let outputs = VirtualMachine::new(nan_producing_program())
        .run(negative_input(), &options)
        .unwrap();
    assert!(outputs["y"].data()[0].is_nan());
}

#[test]
fn inf_check_is_independent_of_the_nan_check() {
    let options = VmOptions {
        check_infs: true,
        diagnostics_fatal: true,
        ..VmOptions::default()
    };
    // log(0) is -Inf; with only the Inf check armed this must fault.
    let mut inputs = InOuts::new();
    inputs.insert("x".into(), Array::scalar(0.0));
    let fault = VirtualMachine::new(nan_producing_program())
        .run(inputs, &options)
        .unwrap_err();
    assert!(matches!(
        fault.source,
        VmError::NumericCheck { reg: 1, what: "Inf" }
    ));
}

#[test]
fn checks_disabled_by_default() {
    let outputs = VirtualMachine::new(nan_producing_program())
        .run(negative_input(), &VmOptions::default())
        .unwrap();
    assert!(outputs["y"].data()[0].is_nan());
}

#[test]
fn tracing_does_not_change_results() {
    let _ = env_logger::builder().is_test(true).try_init();
    let options = VmOptions {
        trace_level: 2,
        ..VmOptions::default()
    };
    let outputs = VirtualMachine::new(nan_producing_program())
        .run(negative_input(), &options)
        .unwrap();
    assert_eq!(outputs.len(), 1);
}
