//! Response length estimation for serial framings
//!
//! Serial frames carry no length field, so the reader predicts how many bytes
//! a well-formed response to a given request occupies.

use crate::constants::{
    FC_MASK_WRITE_REGISTER, FC_READ_COILS, FC_READ_DISCRETE_INPUTS, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_READ_WRITE_MULTIPLE_REGISTERS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_COIL, FC_WRITE_SINGLE_REGISTER, RTU_MIN_SIZE,
};

/// Expected response size in bytes for a serial request frame
///
/// Falls back to the bare envelope (unit id + function + CRC) for functions
/// with variable or unknown response sizes and for requests too short to
/// carry a quantity.
pub fn response_length(request: &[u8]) -> usize {
    let Some(&function_code) = request.get(1) else {
        return RTU_MIN_SIZE;
    };

    let quantity = || match request.get(4..6) {
        Some(&[hi, lo]) => Some(usize::from(u16::from_be_bytes([hi, lo]))),
        _ => None,
    };

    let extra = match function_code {
        FC_READ_COILS | FC_READ_DISCRETE_INPUTS => quantity().map(|q| 1 + q.div_ceil(8)),
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS | FC_READ_WRITE_MULTIPLE_REGISTERS => {
            quantity().map(|q| 1 + 2 * q)
        },
        FC_WRITE_SINGLE_COIL
        | FC_WRITE_SINGLE_REGISTER
        | FC_WRITE_MULTIPLE_COILS
        | FC_WRITE_MULTIPLE_REGISTERS => Some(4),
        FC_MASK_WRITE_REGISTER => Some(6),
        _ => None,
    };

    RTU_MIN_SIZE + extra.unwrap_or(0)
}
