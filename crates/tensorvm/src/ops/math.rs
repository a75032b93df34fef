//! Elementwise arithmetic, transcendentals, and comparisons. Binary ops
//! broadcast; comparisons produce 0.0/1.0 masks in the working precision.

use tensorvm_array::{elementwise, norm};

use crate::error::VmError;
use crate::state::VmState;

macro_rules! binary_op {
    ($name:ident) => {
        pub(crate) fn $name(st: &mut VmState, a: i64, b: i64, out: i64) -> Result<(), VmError> {
            let lhs = st.get_array(a)?;
            let rhs = st.get_array(b)?;
            let result = elementwise::$name(&lhs, &rhs)?;
            st.set_array(out, result)
        }
    };
}

macro_rules! unary_op {
    ($name:ident) => {
        pub(crate) fn $name(st: &mut VmState, input: i64, out: i64) -> Result<(), VmError> {
            let value = st.get_array(input)?;
            st.set_array(out, elementwise::$name(&value))
        }
    };
}

binary_op!(add);
binary_op!(sub);
binary_op!(mul);
binary_op!(div);
binary_op!(greater);
binary_op!(equal);

unary_op!(neg);
unary_op!(exp);
unary_op!(log);
unary_op!(sqrt);
unary_op!(sigmoid);
unary_op!(relu);
unary_op!(tanh);

/// `a >= b` computed as `!(b > a)`. NaN operands therefore compare as
/// "greater or equal", which compiled programs rely on staying stable.
pub(crate) fn greater_equal(st: &mut VmState, a: i64, b: i64, out: i64) -> Result<(), VmError> {
    let lhs = st.get_array(a)?;
    let rhs = st.get_array(b)?;
    let gt = elementwise::greater(&rhs, &lhs)?;
    st.set_array(out, elementwise::logical_not(&gt))
}

pub(crate) fn not(st: &mut VmState, input: i64, out: i64) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    st.set_array(out, elementwise::logical_not(&value))
}

pub(crate) fn softmax(st: &mut VmState, input: i64, out: i64, axis: i64) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = norm::softmax(&value, axis)?;
    st.set_array(out, result)
}

pub(crate) fn log_softmax(
    st: &mut VmState,
    input: i64,
    out: i64,
    axis: i64,
) -> Result<(), VmError> {
    let value = st.get_array(input)?;
    let result = norm::log_softmax(&value, axis)?;
    st.set_array(out, result)
}
