//! Serial frames tunnelled over TCP
//!
//! The remote gateway forwards bytes to a serial bus, so after writing the
//! request the reader waits roughly as long as the bus needs to carry the
//! request and its response before it starts reading.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::rtu::{check_request, read_response};
use super::Transporter;
use crate::constants::{
    DEFAULT_BAUD_RATE, FIXED_CHARACTER_DELAY_US, FIXED_FRAME_DELAY_US, MAX_SCALED_BAUD_RATE,
    TCP_IDLE_TIMEOUT, TCP_TIMEOUT,
};
use crate::error::{FieldbusError, Result};
use crate::length::response_length;
use crate::link::{Link, TcpLink};
use crate::logging::FrameLogger;
use crate::session::Session;

/// Time for `chars` characters plus one inter-frame gap at `baud_rate`
///
/// Character time is 1.5 and frame gap 3.5 character lengths for rates up to
/// 19200 baud; faster or unknown rates use the fixed 750 / 1750 us values.
pub fn calculate_delay(baud_rate: u32, chars: usize) -> Duration {
    let (character_delay, frame_delay) = if baud_rate == 0 || baud_rate > MAX_SCALED_BAUD_RATE {
        (FIXED_CHARACTER_DELAY_US, FIXED_FRAME_DELAY_US)
    } else {
        let baud = u64::from(baud_rate);
        (15_000_000 / baud, 35_000_000 / baud)
    };
    Duration::from_micros(character_delay * chars as u64 + frame_delay)
}

pub struct RtuOverTcpTransporter<L: Link = TcpLink> {
    session: Session<L>,
    baud_rate: u32,
    query_delay: Option<Duration>,
    response_extra: usize,
}

impl RtuOverTcpTransporter<TcpLink> {
    /// Transporter for a gateway at `host:port` with the default TCP timeouts
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_link(TcpLink::new(address))
    }
}

impl<L: Link> RtuOverTcpTransporter<L> {
    pub fn with_link(link: L) -> Self {
        Self::from_session(Session::new(link, Some(TCP_TIMEOUT), Some(TCP_IDLE_TIMEOUT)))
    }

    pub fn from_session(session: Session<L>) -> Self {
        Self {
            session,
            baud_rate: DEFAULT_BAUD_RATE,
            query_delay: None,
            response_extra: 0,
        }
    }

    /// Baud rate of the serial bus behind the gateway
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Override the per-request and idle timeouts (`None` or zero disables)
    pub fn with_timeouts(mut self, timeout: Option<Duration>, idle_timeout: Option<Duration>) -> Self {
        self.session = self.session.with_timeouts(timeout, idle_timeout);
        self
    }

    /// Bus quiet time held after each exchange before the next request
    pub fn with_query_delay(mut self, delay: Option<Duration>) -> Self {
        self.query_delay = delay.filter(|d| !d.is_zero());
        self
    }

    /// Bytes a well-formed response carries beyond the standard layout
    ///
    /// Vendor framing adds its selector byte to every non-exception reply.
    pub fn with_response_extra(mut self, extra: usize) -> Self {
        self.response_extra = extra;
        self
    }

    pub fn with_logger(mut self, logger: FrameLogger) -> Self {
        self.session = self.session.with_logger(logger);
        self
    }

    pub fn session(&self) -> &Session<L> {
        &self.session
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn response_extra(&self) -> usize {
        self.response_extra
    }
}

#[async_trait]
impl<L: Link> Transporter for RtuOverTcpTransporter<L> {
    async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    async fn send(&self, request: &[u8]) -> Result<Vec<u8>> {
        check_request(request)?;
        let expected = response_length(request) + self.response_extra;

        let mut guard = self.session.lock().await;
        let result = async {
            guard.begin().await?;
            guard.logger().log_tx(request);
            guard.write_all(request).await?;

            sleep(calculate_delay(self.baud_rate, request.len() + expected)).await;

            let response = read_response(&mut guard, request, expected).await?;
            guard.logger().log_rx(&response);
            guard.mark_activity();
            Ok::<_, FieldbusError>(response)
        }
        .await;

        if let Some(delay) = self.query_delay {
            sleep(delay).await;
        }
        result
    }
}
