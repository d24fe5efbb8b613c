//! Frame sizes, function codes and transport defaults

use std::time::Duration;

// ============================================================================
// TCP Framing
// ============================================================================

/// Header length: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1)
pub const TCP_HEADER_SIZE: usize = 7;

/// Maximum TCP frame: 7 byte header + 253 byte PDU
pub const TCP_MAX_LENGTH: usize = 260;

/// Largest value accepted in the length field (Unit ID + PDU)
pub const TCP_MAX_DECLARED_LENGTH: usize = TCP_MAX_LENGTH - (TCP_HEADER_SIZE - 1);

/// Protocol identifier, always zero for Modbus
pub const TCP_PROTOCOL_ID: u16 = 0x0000;

// ============================================================================
// Serial (RTU) Framing
// ============================================================================

/// Unit ID + Function + CRC(2)
pub const RTU_MIN_SIZE: usize = 4;

/// Maximum serial frame per the RS485 ADU limit
pub const RTU_MAX_SIZE: usize = 256;

/// Unit ID + Function + Exception code + CRC(2)
pub const RTU_EXCEPTION_SIZE: usize = 5;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Selector byte carried in every non-exception vendor response
pub const VENDOR_SELECTOR_SIZE: usize = 1;

// ============================================================================
// Function Codes
// ============================================================================

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const FC_MASK_WRITE_REGISTER: u8 = 0x16;
pub const FC_READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;
pub const FC_READ_FIFO_QUEUE: u8 = 0x18;

// ============================================================================
// Transport Defaults
// ============================================================================

/// Per-call deadline for TCP and serial-over-TCP sessions
pub const TCP_TIMEOUT: Duration = Duration::from_secs(10);

/// Inactivity before a TCP session is closed
pub const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-call deadline for serial sessions
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Inactivity before a serial port is closed
pub const SERIAL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Highest baud rate for which inter-frame timing scales with the line speed
pub const MAX_SCALED_BAUD_RATE: u32 = 19200;

/// Fixed character delay above [`MAX_SCALED_BAUD_RATE`], in microseconds
pub const FIXED_CHARACTER_DELAY_US: u64 = 750;

/// Fixed frame delay above [`MAX_SCALED_BAUD_RATE`], in microseconds
pub const FIXED_FRAME_DELAY_US: u64 = 1750;
