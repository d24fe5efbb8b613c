//! Serial framing (unit id + PDU + CRC)
//!
//! Used as-is on serial lines and for serial frames tunnelled over TCP.

use tracing::debug;

use super::Packager;
use crate::constants::{RTU_MAX_SIZE, RTU_MIN_SIZE};
use crate::crc::crc16;
use crate::error::{FieldbusError, Result};
use crate::pdu::ProtocolDataUnit;

#[derive(Debug, Clone, Default)]
pub struct RtuPackager {
    slave_id: u8,
}

impl RtuPackager {
    pub fn new(slave_id: u8) -> Self {
        Self { slave_id }
    }

    pub fn slave_id(&self) -> u8 {
        self.slave_id
    }
}

/// Build `unit id + function + data + CRC(lo, hi)`
pub(crate) fn encode_frame(slave_id: u8, pdu: &ProtocolDataUnit) -> Result<Vec<u8>> {
    let size = pdu.data.len() + RTU_MIN_SIZE;
    if size > RTU_MAX_SIZE {
        return Err(FieldbusError::FrameTooLarge {
            size,
            max: RTU_MAX_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(size);
    frame.push(slave_id);
    frame.push(pdu.function_code);
    frame.extend_from_slice(&pdu.data);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());

    debug!(
        "RTU frame: unit={} fc={:02X} len={} crc={:04X}",
        slave_id,
        pdu.function_code,
        frame.len(),
        crc
    );
    Ok(frame)
}

/// Check size and CRC, returning the function code and data slice
pub(crate) fn split_frame(frame: &[u8]) -> Result<(u8, &[u8])> {
    if frame.len() < RTU_MIN_SIZE {
        return Err(FieldbusError::FrameTooShort {
            actual: frame.len(),
            min: RTU_MIN_SIZE,
        });
    }

    let (body, trailer) = frame.split_at(frame.len() - 2);
    let actual = u16::from_le_bytes([trailer[0], trailer[1]]);
    let expected = crc16(body);
    if actual != expected {
        return Err(FieldbusError::CrcMismatch { expected, actual });
    }

    Ok((body[1], &body[2..]))
}

/// Minimum size and unit id correlation
pub(crate) fn verify_frame(request: &[u8], response: &[u8]) -> Result<()> {
    if response.len() < RTU_MIN_SIZE {
        return Err(FieldbusError::FrameTooShort {
            actual: response.len(),
            min: RTU_MIN_SIZE,
        });
    }
    let Some(&req_unit) = request.first() else {
        return Err(FieldbusError::FrameTooShort {
            actual: 0,
            min: RTU_MIN_SIZE,
        });
    };
    let resp_unit = response[0];
    if resp_unit != req_unit {
        return Err(FieldbusError::Mismatch {
            field: "unit id",
            request: u16::from(req_unit),
            response: u16::from(resp_unit),
        });
    }
    Ok(())
}

impl Packager for RtuPackager {
    fn encode(&self, pdu: &ProtocolDataUnit) -> Result<Vec<u8>> {
        encode_frame(self.slave_id, pdu)
    }

    fn decode(&self, frame: &[u8]) -> Result<ProtocolDataUnit> {
        let (function_code, data) = split_frame(frame)?;
        Ok(ProtocolDataUnit::new(function_code, data))
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> Result<()> {
        verify_frame(request, response)
    }
}
