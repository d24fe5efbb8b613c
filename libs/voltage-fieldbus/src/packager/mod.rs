//! Framing variants
//!
//! A [`Packager`] converts a [`ProtocolDataUnit`] into a wire frame and back.
//! It never touches I/O; the transporter moves the bytes.

mod rtu;
mod tcp;
mod vendor;

pub use rtu::RtuPackager;
pub use tcp::TcpPackager;
pub use vendor::{SelectorStrip, VendorRtuPackager};

use crate::error::Result;
use crate::pdu::ProtocolDataUnit;

/// Message <-> frame conversion for one framing variant
pub trait Packager: Send + Sync {
    /// Wrap `pdu` into a complete frame
    fn encode(&self, pdu: &ProtocolDataUnit) -> Result<Vec<u8>>;

    /// Extract the PDU from a response frame, checking integrity
    fn decode(&self, frame: &[u8]) -> Result<ProtocolDataUnit>;

    /// Check that `response` answers `request`
    fn verify(&self, request: &[u8], response: &[u8]) -> Result<()>;
}

impl<P: Packager + ?Sized> Packager for Box<P> {
    fn encode(&self, pdu: &ProtocolDataUnit) -> Result<Vec<u8>> {
        (**self).encode(pdu)
    }

    fn decode(&self, frame: &[u8]) -> Result<ProtocolDataUnit> {
        (**self).decode(frame)
    }

    fn verify(&self, request: &[u8], response: &[u8]) -> Result<()> {
        (**self).verify(request, response)
    }
}
