//! Fieldbus Error Types
//!
//! A single error enum covers the whole framing/transport core. Variants are
//! grouped by [`ErrorKind`] so callers can decide on retry policy without
//! string matching.

use thiserror::Error;

use crate::pdu::exception_description;

/// Result type for voltage-fieldbus operations
pub type Result<T> = std::result::Result<T, FieldbusError>;

/// Broad classification of a [`FieldbusError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request could not be framed (local, not retriable as-is)
    Encoding,
    /// Link failure; the session has been closed and the next send reconnects
    Transport,
    /// Response framing is invalid; the session stays open
    Framing,
    /// Response carries an unexpected or unsupported function code
    Function,
    /// Invalid configuration
    Config,
}

/// Fieldbus errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldbusError {
    // ======================================
    // Encoding
    // ======================================
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ======================================
    // Transport
    // ======================================
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // ======================================
    // Framing
    // ======================================
    #[error("Frame too short: {actual} bytes (min {min})")]
    FrameTooShort { actual: usize, min: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Response {field} '{response}' does not match request '{request}'")]
    Mismatch {
        field: &'static str,
        request: u16,
        response: u16,
    },

    #[error("Invalid length: {0}")]
    InvalidLength(String),

    // ======================================
    // Function
    // ======================================
    #[error("Unsupported function code: 0x{0:02X}")]
    UnsupportedFunction(u8),

    #[error("Unexpected function code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("Device exception 0x{code:02X} for function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    // ======================================
    // Configuration
    // ======================================
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for FieldbusError {
    fn from(err: std::io::Error) -> Self {
        FieldbusError::Io(err.to_string())
    }
}

impl From<figment::Error> for FieldbusError {
    fn from(err: figment::Error) -> Self {
        FieldbusError::Config(err.to_string())
    }
}

// Helper methods for creating errors
impl FieldbusError {
    pub fn connection(msg: impl Into<String>) -> Self {
        FieldbusError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        FieldbusError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        FieldbusError::Timeout(msg.into())
    }

    pub fn invalid_length(msg: impl Into<String>) -> Self {
        FieldbusError::InvalidLength(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FieldbusError::Config(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FieldbusError::FrameTooLarge { .. } => ErrorKind::Encoding,
            FieldbusError::Connection(_)
            | FieldbusError::NotConnected
            | FieldbusError::Io(_)
            | FieldbusError::Timeout(_) => ErrorKind::Transport,
            FieldbusError::FrameTooShort { .. }
            | FieldbusError::CrcMismatch { .. }
            | FieldbusError::Mismatch { .. }
            | FieldbusError::InvalidLength(_) => ErrorKind::Framing,
            FieldbusError::UnsupportedFunction(_)
            | FieldbusError::UnexpectedFunction { .. }
            | FieldbusError::Exception { .. } => ErrorKind::Function,
            FieldbusError::Config(_) => ErrorKind::Config,
        }
    }

    /// True when the link was dropped; re-issuing the request reconnects
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Human readable text for a device exception, if this is one
    pub fn exception_text(&self) -> Option<&'static str> {
        match self {
            FieldbusError::Exception { code, .. } => Some(exception_description(*code)),
            _ => None,
        }
    }
}
