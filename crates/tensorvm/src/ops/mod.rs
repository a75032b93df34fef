//! Operation implementations, grouped the way the instruction taxonomy is.
//! Each function takes the register file and the instruction's destructured
//! operands; the dispatch match below is the only place that sees the whole
//! [`Instruction`] enum.

mod linalg;
mod math;
mod reduction;
mod sequence;
mod shape;
mod stateful;

use tensorvm_array::ArrayError;

use crate::error::VmError;
use crate::program::Instruction;
use crate::state::VmState;

/// Executes one instruction against `st`. I/O binding and register lifetime
/// are handled here; everything numeric lives in the submodules.
pub(crate) fn execute(inst: &Instruction, st: &mut VmState) -> Result<(), VmError> {
    use Instruction::*;
    match inst {
        In { name, out } => {
            let value = st.input(name)?;
            st.set_array(*out, value)
        }
        Out { name, input } => {
            let value = st.get_array(*input)?;
            st.bind_output(name, value);
            Ok(())
        }
        Free { reg } => st.free(*reg),
        Ident { input, out } => {
            let value = st.get_array(*input)?;
            st.set_array(*out, value)
        }

        Add { a, b, out } => math::add(st, *a, *b, *out),
        Sub { a, b, out } => math::sub(st, *a, *b, *out),
        Mul { a, b, out } => math::mul(st, *a, *b, *out),
        Div { a, b, out } => math::div(st, *a, *b, *out),
        Neg { input, out } => math::neg(st, *input, *out),
        Exp { input, out } => math::exp(st, *input, *out),
        Log { input, out } => math::log(st, *input, *out),
        Sqrt { input, out } => math::sqrt(st, *input, *out),
        Sigmoid { input, out } => math::sigmoid(st, *input, *out),
        Relu { input, out } => math::relu(st, *input, *out),
        Tanh { input, out } => math::tanh(st, *input, *out),
        Greater { a, b, out } => math::greater(st, *a, *b, *out),
        GreaterEqual { a, b, out } => math::greater_equal(st, *a, *b, *out),
        Equal { a, b, out } => math::equal(st, *a, *b, *out),
        Not { input, out } => math::not(st, *input, *out),
        Softmax { input, out, axis } => math::softmax(st, *input, *out, *axis),
        LogSoftmax { input, out, axis } => math::log_softmax(st, *input, *out, *axis),

        Reshape { data, shape, out } => shape::reshape(st, *data, *shape, *out),
        Squeeze { input, out, axes } => shape::squeeze(st, *input, *out, axes),
        Unsqueeze { input, out, axes } => shape::unsqueeze(st, *input, *out, axes),
        Slice { input, out, axes, starts, ends } => {
            shape::slice(st, *input, *out, axes, starts, ends)
        }
        Gather { data, indices, out, axis } => shape::gather(st, *data, *indices, *out, *axis),
        Expand { data, shape, out } => shape::expand(st, *data, *shape, *out),
        Shape { input, out } => shape::shape_of(st, *input, *out),
        Size { input, out } => shape::size_of(st, *input, *out),

        ReduceSum { input, out, axes, keepdims } => {
            reduction::sum(st, *input, *out, axes.as_deref(), *keepdims)
        }
        ReduceMean { input, out, axes, keepdims } => {
            reduction::mean(st, *input, *out, axes.as_deref(), *keepdims)
        }
        ReduceSumSquare { input, out, axes, keepdims } => {
            reduction::sum_square(st, *input, *out, axes.as_deref(), *keepdims)
        }
        ReduceSumTo { data, shape, out } => reduction::sum_to(st, *data, *shape, *out),

        MatMul { a, b, out } => linalg::matmul(st, *a, *b, *out),
        Gemm { a, b, c, out, alpha, beta, trans_a, trans_b } => {
            linalg::gemm(st, *a, *b, *c, *out, *alpha, *beta, *trans_a, *trans_b)
        }
        Conv { x, w, b, out, strides, pads } => linalg::conv(st, *x, *w, *b, *out, strides, pads),
        ConvTranspose { x, w, b, out, strides, pads, output_shape } => {
            linalg::conv_transpose(st, *x, *w, *b, *out, strides, pads, output_shape)
        }
        ConvGradWeight { w, x, gy, out, strides, pads } => {
            linalg::conv_grad_weight(st, *w, *x, *gy, *out, strides, pads)
        }

        MaxPool { x, out, kernel, strides, pads } => {
            stateful::max_pool(st, *x, *out, kernel, strides, pads)
        }
        MaxPoolGrad { y, gy, out } => stateful::max_pool_grad(st, *y, *gy, *out),
        AveragePool { x, out, kernel, strides, pads, count_include_pad } => {
            stateful::average_pool(st, *x, *out, kernel, strides, pads, *count_include_pad)
        }
        BatchNormalization { x, scale, b, mean, var, out, epsilon, .. } => {
            stateful::batch_normalization(st, *x, *scale, *b, *mean, *var, *out, *epsilon)
        }
        BatchNormalizationGrad { y, gy, gx, gscale, gbias } => {
            stateful::batch_normalization_grad(st, *y, *gy, *gx, *gscale, *gbias)
        }

        SequenceCreate { out } => st.create_sequence(*out),
        SequenceAppend { seq, value } => sequence::append(st, *seq, *value),
        SequenceLookup { seq, index, out } => sequence::lookup(st, *seq, *index, *out),
        SequenceStack { seq, out } => sequence::stack(st, *seq, *out),
        SequencePad { seq, out } => sequence::pad(st, *seq, *out),
        SequenceClear { seq } => sequence::clear(st, *seq),
        SequenceCopy { seq, out } => sequence::copy(st, *seq, *out),
        SequenceMove { seq, out } => sequence::move_(st, *seq, *out),

        Jump { .. } => Err(VmError::Unimplemented("Jump")),
        JumpIfTrue { .. } => Err(VmError::Unimplemented("JumpIfTrue")),
    }
}

/// Resolves a per-spatial-axis attribute, filling in `default` for both axes
/// when the compiler omitted it entirely.
fn spatial(name: &'static str, attr: &[i64], default: usize) -> Result<Vec<usize>, VmError> {
    if attr.is_empty() {
        return Ok(vec![default; 2]);
    }
    let mut resolved = Vec::with_capacity(attr.len());
    for &v in attr {
        if v < 0 {
            return Err(VmError::Shape(ArrayError::shape(format!(
                "{name} entries must be non-negative, found {attr:?}"
            ))));
        }
        resolved.push(v as usize);
    }
    Ok(resolved)
}
