//! Modbus CRC-16
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF. The checksum is
//! appended to serial frames low byte first.

const POLYNOMIAL: u16 = 0xA001;
const INITIAL: u16 = 0xFFFF;

/// Running CRC-16 register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    register: u16,
}

impl Crc16 {
    /// Create a register in its initial state
    pub fn new() -> Self {
        Self { register: INITIAL }
    }

    /// Reset the register to its initial state
    pub fn reset(&mut self) -> &mut Self {
        self.register = INITIAL;
        self
    }

    /// Feed bytes into the register
    pub fn push(&mut self, data: &[u8]) -> &mut Self {
        for &byte in data {
            self.register ^= u16::from(byte);
            for _ in 0..8 {
                if self.register & 1 != 0 {
                    self.register >>= 1;
                    self.register ^= POLYNOMIAL;
                } else {
                    self.register >>= 1;
                }
            }
        }
        self
    }

    /// Current checksum
    pub fn value(&self) -> u16 {
        self.register
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot checksum of `data`
pub fn crc16(data: &[u8]) -> u16 {
    Crc16::new().push(data).value()
}
