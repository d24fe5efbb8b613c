//! TCP transporter
//!
//! Reads the fixed header first, then exactly as many bytes as its length
//! field announces.

use std::time::Duration;

use async_trait::async_trait;

use super::Transporter;
use crate::constants::{TCP_HEADER_SIZE, TCP_IDLE_TIMEOUT, TCP_MAX_DECLARED_LENGTH, TCP_TIMEOUT};
use crate::error::{FieldbusError, Result};
use crate::link::{Link, TcpLink};
use crate::logging::FrameLogger;
use crate::session::Session;

pub struct TcpTransporter<L: Link = TcpLink> {
    session: Session<L>,
}

impl TcpTransporter<TcpLink> {
    /// Transporter for `host:port` with the default TCP timeouts
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_link(TcpLink::new(address))
    }
}

impl<L: Link> TcpTransporter<L> {
    pub fn with_link(link: L) -> Self {
        Self::from_session(Session::new(link, Some(TCP_TIMEOUT), Some(TCP_IDLE_TIMEOUT)))
    }

    pub fn from_session(session: Session<L>) -> Self {
        Self { session }
    }

    /// Override the per-request and idle timeouts (`None` or zero disables)
    pub fn with_timeouts(self, timeout: Option<Duration>, idle_timeout: Option<Duration>) -> Self {
        Self {
            session: self.session.with_timeouts(timeout, idle_timeout),
        }
    }

    pub fn with_logger(self, logger: FrameLogger) -> Self {
        Self {
            session: self.session.with_logger(logger),
        }
    }

    pub fn session(&self) -> &Session<L> {
        &self.session
    }
}

#[async_trait]
impl<L: Link> Transporter for TcpTransporter<L> {
    async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    async fn send(&self, request: &[u8]) -> Result<Vec<u8>> {
        let mut guard = self.session.lock().await;
        guard.begin().await?;

        guard.logger().log_tx(request);
        guard.write_all(request).await?;

        let mut header = [0u8; TCP_HEADER_SIZE];
        guard.read_exact(&mut header).await?;

        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        if length == 0 || length > TCP_MAX_DECLARED_LENGTH {
            guard.drain().await;
            return Err(FieldbusError::invalid_length(format!(
                "response length {length} outside 1..={TCP_MAX_DECLARED_LENGTH}"
            )));
        }

        // The unit id is already part of the header
        let mut response = vec![0u8; TCP_HEADER_SIZE + length - 1];
        response[..TCP_HEADER_SIZE].copy_from_slice(&header);
        guard.read_exact(&mut response[TCP_HEADER_SIZE..]).await?;

        guard.logger().log_rx(&response);
        guard.mark_activity();
        Ok(response)
    }
}
