//! Vendor serial framing
//!
//! Same envelope as [`RtuPackager`](super::RtuPackager), but request and
//! response payloads carry an extra selector byte addressing one of several
//! devices (charging guns) behind a single unit id. Requests place it after
//! the register words; responses carry it at a function dependent offset and
//! it is removed before the PDU is handed back.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::rtu::{encode_frame, split_frame, verify_frame};
use super::Packager;
use crate::constants::{
    FC_READ_COILS, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_REGISTER,
};
use crate::error::{FieldbusError, Result};
use crate::pdu::ProtocolDataUnit;

/// How the selector byte is removed from a response payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorStrip {
    /// Remove the byte and shift the rest down
    #[default]
    Positional,
    /// Move the last byte into the removed slot (firmware compatible ordering)
    SwapRemove,
}

#[derive(Debug, Clone, Default)]
pub struct VendorRtuPackager {
    slave_id: u8,
    selector: u8,
    strip: SelectorStrip,
}

impl VendorRtuPackager {
    pub fn new(slave_id: u8, selector: u8) -> Self {
        Self {
            slave_id,
            selector,
            strip: SelectorStrip::default(),
        }
    }

    pub fn with_strip(mut self, strip: SelectorStrip) -> Self {
        self.strip = strip;
        self
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }

    pub fn selector(&self) -> u8 {
        self.selector
    }

    /// Big-endian words followed by the selector
    pub fn data_block(&self, values: &[u16]) -> Vec<u8> {
        let mut data = Vec::with_capacity(values.len() * 2 + 1);
        for value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        data.push(self.selector);
        data
    }

    /// Big-endian words, the selector, then a length-prefixed suffix
    pub fn data_block_suffix(&self, suffix: &[u8], values: &[u16]) -> Vec<u8> {
        let mut data = Vec::with_capacity(values.len() * 2 + 2 + suffix.len());
        for value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        data.push(self.selector);
        // Length byte wraps like any u8 field; payloads are bounded by the frame limit
        data.push(suffix.len() as u8);
        data.extend_from_slice(suffix);
        data
    }

    /// Payload offset of the selector byte in a response
    fn selector_offset(function_code: u8) -> Result<usize> {
        match function_code {
            FC_READ_COILS | FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => Ok(1),
            FC_WRITE_SINGLE_REGISTER => Ok(2),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(4),
            other => Err(FieldbusError::UnsupportedFunction(other)),
        }
    }
}

impl Packager for VendorRtuPackager {
    fn encode(&self, pdu: &ProtocolDataUnit) -> Result<Vec<u8>> {
        encode_frame(self.slave_id, pdu)
    }

    fn decode(&self, frame: &[u8]) -> Result<ProtocolDataUnit> {
        let (function_code, data) = split_frame(frame)?;
        let pdu = ProtocolDataUnit::new(function_code, data);
        if pdu.is_exception() {
            return Ok(pdu);
        }

        let offset = Self::selector_offset(function_code)?;
        if offset >= pdu.data.len() {
            return Err(FieldbusError::invalid_length(format!(
                "selector offset {offset} outside {} byte payload (fc {function_code:02X})",
                pdu.data.len()
            )));
        }

        let mut data = pdu.data;
        let selector = match self.strip {
            SelectorStrip::Positional => data.remove(offset),
            SelectorStrip::SwapRemove => data.swap_remove(offset),
        };
        if selector != self.selector {
            warn!(
                "Selector mismatch: expected {}, got {} (fc {:02X})",
                self.selector, selector, function_code
            );
        }

        Ok(ProtocolDataUnit::new(function_code, data))
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> Result<()> {
        verify_frame(request, response)
    }
}
