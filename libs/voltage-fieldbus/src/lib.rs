//! VoltageEMS Fieldbus Client Core
//!
//! Client-side framing and transport for Modbus-family field buses: TCP
//! sockets, serial lines, serial frames tunnelled over TCP and a vendor
//! variant of serial framing that carries a device selector byte.
//!
//! # Architecture
//!
//! ```text
//! ClientHandler::request(pdu)
//!     ├── Packager     encode / verify / decode   (tcp, rtu, vendor)
//!     └── Transporter  send                        (tcp, rtu, rtu_over_tcp)
//!             └── Session  lazy connect, exclusive lock, idle close
//!                     └── Link  TCP socket / serial port
//! ```
//!
//! Packagers never touch I/O and transporters never interpret messages.
//! A failed send leaves the session closed; the next send reconnects.

pub mod config;
pub mod constants;
pub mod crc;
pub mod error;
pub mod handler;
pub mod length;
pub mod link;
pub mod logging;
pub mod packager;
pub mod pdu;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{DynClientHandler, Framing, HandlerConfig, TransportConfig};
pub use error::{ErrorKind, FieldbusError, Result};
pub use handler::ClientHandler;
pub use link::{Link, Parity, SerialConfig, SerialLink, TcpLink};
pub use logging::FrameLogger;
pub use packager::{Packager, RtuPackager, SelectorStrip, TcpPackager, VendorRtuPackager};
pub use pdu::ProtocolDataUnit;
pub use session::{Session, SessionGuard};
pub use transport::{RtuOverTcpTransporter, RtuTransporter, TcpTransporter, Transporter};
