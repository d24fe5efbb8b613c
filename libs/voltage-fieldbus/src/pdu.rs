//! Protocol data unit
//!
//! The transport-independent part of every request and response: a function
//! code followed by function specific data. Framing variants wrap it in their
//! own header and trailer.

use crate::constants::EXCEPTION_FLAG;

/// Function code + payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProtocolDataUnit {
    pub function_code: u8,
    pub data: Vec<u8>,
}

impl ProtocolDataUnit {
    pub fn new(function_code: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            function_code,
            data: data.into(),
        }
    }

    /// Build a request addressing `quantity` items from `address`
    ///
    /// Covers the read family (0x01-0x04) whose payload is address + count.
    pub fn read_request(function_code: u8, address: u16, quantity: u16) -> Self {
        let mut data = Vec::with_capacity(4);
        data.extend_from_slice(&address.to_be_bytes());
        data.extend_from_slice(&quantity.to_be_bytes());
        Self::new(function_code, data)
    }

    /// Encoded size: function code + data
    #[inline]
    pub fn encoded_len(&self) -> usize {
        1 + self.data.len()
    }

    /// True when the device answered with an exception
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_FLAG != 0
    }

    /// Exception code carried by an exception response
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() {
            self.data.first().copied()
        } else {
            None
        }
    }

    /// Function code with the exception flag cleared
    #[inline]
    pub fn base_function(&self) -> u8 {
        self.function_code & !EXCEPTION_FLAG
    }
}

/// Get exception code description
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_read_request_layout() {
        let pdu = ProtocolDataUnit::read_request(0x03, 0x006B, 3);
        assert_eq!(pdu.function_code, 0x03);
        assert_eq!(pdu.data, vec![0x00, 0x6B, 0x00, 0x03]);
        assert_eq!(pdu.encoded_len(), 5);
    }

    #[test]
    fn test_exception_response() {
        let pdu = ProtocolDataUnit::new(0x83, vec![0x02]);
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));
        assert_eq!(pdu.base_function(), 0x03);
    }

    #[test]
    fn test_normal_response_has_no_exception_code() {
        let pdu = ProtocolDataUnit::new(0x03, vec![0x02, 0x00, 0x0A]);
        assert!(!pdu.is_exception());
        assert_eq!(pdu.exception_code(), None);
    }

    #[test]
    fn test_exception_without_code_byte() {
        let pdu = ProtocolDataUnit::new(0x81, Vec::new());
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), None);
    }

    #[test]
    fn test_exception_descriptions() {
        assert_eq!(exception_description(0x01), "Illegal Function");
        assert_eq!(exception_description(0x06), "Slave Device Busy");
        assert_eq!(
            exception_description(0x0B),
            "Gateway Target Device Failed to Respond"
        );
        assert_eq!(exception_description(0x09), "Unknown Exception");
        assert_eq!(exception_description(0xFF), "Unknown Exception");
    }
}
