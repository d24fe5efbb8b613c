//! Client handler
//!
//! Pairs one packager with one transporter and runs a full exchange:
//! encode, send, verify, decode, then map device exceptions to errors.

use tracing::debug;

use crate::constants::{EXCEPTION_FLAG, VENDOR_SELECTOR_SIZE};
use crate::error::{FieldbusError, Result};
use crate::link::SerialConfig;
use crate::packager::{Packager, RtuPackager, TcpPackager, VendorRtuPackager};
use crate::pdu::ProtocolDataUnit;
use crate::transport::{RtuOverTcpTransporter, RtuTransporter, TcpTransporter, Transporter};

pub struct ClientHandler<P, T> {
    packager: P,
    transporter: T,
}

impl<P: Packager, T: Transporter> ClientHandler<P, T> {
    pub fn new(packager: P, transporter: T) -> Self {
        Self {
            packager,
            transporter,
        }
    }

    pub fn packager(&self) -> &P {
        &self.packager
    }

    pub fn transporter(&self) -> &T {
        &self.transporter
    }

    pub async fn connect(&self) -> Result<()> {
        self.transporter.connect().await
    }

    pub async fn close(&self) -> Result<()> {
        self.transporter.close().await
    }

    /// Send `pdu` and return the device's answer
    ///
    /// Exception responses come back as [`FieldbusError::Exception`].
    pub async fn request(&self, pdu: &ProtocolDataUnit) -> Result<ProtocolDataUnit> {
        let request = self.packager.encode(pdu)?;
        let response = self.transporter.send(&request).await?;
        self.packager.verify(&request, &response)?;
        let reply = self.packager.decode(&response)?;

        if reply.function_code != pdu.function_code {
            if reply.function_code == pdu.function_code | EXCEPTION_FLAG {
                let Some(code) = reply.exception_code() else {
                    return Err(FieldbusError::invalid_length(
                        "exception response without exception code",
                    ));
                };
                debug!("Exception: fc={:02X} code={:02X}", pdu.function_code, code);
                return Err(FieldbusError::Exception {
                    function: pdu.function_code,
                    code,
                });
            }
            return Err(FieldbusError::UnexpectedFunction {
                expected: pdu.function_code,
                actual: reply.function_code,
            });
        }
        if reply.data.is_empty() {
            return Err(FieldbusError::invalid_length("response data is empty"));
        }
        Ok(reply)
    }
}

// ============================================================================
// Preset pairings
// ============================================================================

impl ClientHandler<TcpPackager, TcpTransporter> {
    /// TCP framing over a TCP socket
    pub fn tcp(address: impl Into<String>, slave_id: u8) -> Self {
        Self::new(TcpPackager::new(slave_id), TcpTransporter::new(address))
    }
}

impl ClientHandler<RtuPackager, RtuTransporter> {
    /// Serial framing over a serial port
    pub fn rtu(config: SerialConfig, slave_id: u8) -> Self {
        Self::new(RtuPackager::new(slave_id), RtuTransporter::new(config))
    }
}

impl ClientHandler<RtuPackager, RtuOverTcpTransporter> {
    /// Serial framing through a TCP gateway
    pub fn rtu_over_tcp(address: impl Into<String>, slave_id: u8) -> Self {
        Self::new(RtuPackager::new(slave_id), RtuOverTcpTransporter::new(address))
    }
}

impl ClientHandler<VendorRtuPackager, RtuTransporter> {
    /// Vendor framing over a serial port
    pub fn vendor_rtu(config: SerialConfig, slave_id: u8, selector: u8) -> Self {
        Self::new(
            VendorRtuPackager::new(slave_id, selector),
            RtuTransporter::new(config).with_response_extra(VENDOR_SELECTOR_SIZE),
        )
    }
}

impl ClientHandler<VendorRtuPackager, RtuOverTcpTransporter> {
    /// Vendor framing through a TCP gateway
    pub fn vendor_rtu_over_tcp(address: impl Into<String>, slave_id: u8, selector: u8) -> Self {
        Self::new(
            VendorRtuPackager::new(slave_id, selector),
            RtuOverTcpTransporter::new(address).with_response_extra(VENDOR_SELECTOR_SIZE),
        )
    }
}
