//! Transporters
//!
//! A [`Transporter`] moves one request frame to the device and returns the
//! raw response frame. It never interprets the message; framing errors are
//! left to the packager.

mod rtu;
mod rtu_over_tcp;
mod tcp;

pub use rtu::RtuTransporter;
pub use rtu_over_tcp::{calculate_delay, RtuOverTcpTransporter};
pub use tcp::TcpTransporter;

use async_trait::async_trait;

use crate::error::Result;

/// Request/response exchange over one session
#[async_trait]
pub trait Transporter: Send + Sync {
    /// Open the link now instead of on the first send
    async fn connect(&self) -> Result<()>;

    /// Drop the link; the next send reconnects
    async fn close(&self) -> Result<()>;

    /// Send a request frame and read the response frame
    async fn send(&self, request: &[u8]) -> Result<Vec<u8>>;
}

#[async_trait]
impl<T: Transporter + ?Sized> Transporter for Box<T> {
    async fn connect(&self) -> Result<()> {
        (**self).connect().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }

    async fn send(&self, request: &[u8]) -> Result<Vec<u8>> {
        (**self).send(request).await
    }
}
