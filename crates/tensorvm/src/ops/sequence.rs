//! Sequence operations. A sequence register is created explicitly and then
//! mutated in place; `move_` transfers ownership of the items and leaves the
//! source holding a live empty sequence.

use std::sync::Once;

use tensorvm_array::manip;

use crate::error::VmError;
use crate::state::VmState;

pub(crate) fn append(st: &mut VmState, seq: i64, value: i64) -> Result<(), VmError> {
    let item = st.get_array(value)?;
    st.sequence_mut(seq)?.push(item);
    Ok(())
}

pub(crate) fn lookup(st: &mut VmState, seq: i64, index: i64, out: i64) -> Result<(), VmError> {
    let requested = st.get_array(index)?.as_scalar()? as i64;
    let item = {
        let items = st.sequence(seq)?;
        let len = items.len();
        let resolved = if requested < 0 {
            requested + len as i64
        } else {
            requested
        };
        if resolved < 0 || resolved as usize >= len {
            return Err(VmError::SequenceIndexOutOfRange {
                index: requested,
                len,
            });
        }
        items[resolved as usize].clone()
    };
    st.set_array(out, item)
}

pub(crate) fn stack(st: &mut VmState, seq: i64, out: i64) -> Result<(), VmError> {
    let result = manip::stack(st.sequence(seq)?)?;
    st.set_array(out, result)
}

/// Padding to the largest element shape is not supported by the array
/// runtime; equal-shaped sequences degrade to a plain stack. The downgrade is
/// reported once per process.
pub(crate) fn pad(st: &mut VmState, seq: i64, out: i64) -> Result<(), VmError> {
    static WARN: Once = Once::new();
    WARN.call_once(|| {
        log::warn!("SequencePad runs as SequenceStack; ragged sequences will fail");
    });
    stack(st, seq, out)
}

pub(crate) fn clear(st: &mut VmState, seq: i64) -> Result<(), VmError> {
    st.sequence_mut(seq)?.clear();
    Ok(())
}

pub(crate) fn copy(st: &mut VmState, seq: i64, out: i64) -> Result<(), VmError> {
    let items = st.sequence(seq)?.to_vec();
    st.create_sequence(out)?;
    *st.sequence_mut(out)? = items;
    Ok(())
}

pub(crate) fn move_(st: &mut VmState, seq: i64, out: i64) -> Result<(), VmError> {
    let items = std::mem::take(st.sequence_mut(seq)?);
    st.create_sequence(out)?;
    *st.sequence_mut(out)? = items;
    Ok(())
}
