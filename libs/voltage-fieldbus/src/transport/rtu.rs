//! Serial line transporter
//!
//! Serial frames have no length field. The reader takes the minimum frame,
//! then completes it from the expected response size or, for an exception,
//! to the fixed exception size.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::Transporter;
use crate::constants::{
    EXCEPTION_FLAG, RTU_EXCEPTION_SIZE, RTU_MAX_SIZE, RTU_MIN_SIZE, SERIAL_IDLE_TIMEOUT,
    SERIAL_TIMEOUT,
};
use crate::error::{FieldbusError, Result};
use crate::length::response_length;
use crate::link::{Link, SerialConfig, SerialLink};
use crate::logging::FrameLogger;
use crate::session::{Session, SessionGuard};

/// Reject requests too short to carry a unit id and function code
pub(crate) fn check_request(request: &[u8]) -> Result<()> {
    if request.len() < RTU_MIN_SIZE {
        return Err(FieldbusError::FrameTooShort {
            actual: request.len(),
            min: RTU_MIN_SIZE,
        });
    }
    Ok(())
}

/// Read one serial response frame answering `request`
pub(crate) async fn read_response<L: Link>(
    guard: &mut SessionGuard<'_, L>,
    request: &[u8],
    expected: usize,
) -> Result<Vec<u8>> {
    let function = request[1];
    let mut buf = [0u8; RTU_MAX_SIZE];

    let mut n = guard.read_at_least(&mut buf, RTU_MIN_SIZE).await?;
    if buf[1] == function {
        if n < expected && expected > RTU_MIN_SIZE && expected <= RTU_MAX_SIZE {
            guard.read_exact(&mut buf[n..expected]).await?;
            n = expected;
        }
    } else if buf[1] == function | EXCEPTION_FLAG && n < RTU_EXCEPTION_SIZE {
        guard.read_exact(&mut buf[n..RTU_EXCEPTION_SIZE]).await?;
        n = RTU_EXCEPTION_SIZE;
    }

    Ok(buf[..n].to_vec())
}

pub struct RtuTransporter<L: Link = SerialLink> {
    session: Session<L>,
    query_delay: Option<Duration>,
    response_extra: usize,
}

impl RtuTransporter<SerialLink> {
    /// Transporter for a serial port with the default serial timeouts
    pub fn new(config: SerialConfig) -> Self {
        Self::with_link(SerialLink::new(config))
    }
}

impl<L: Link> RtuTransporter<L> {
    pub fn with_link(link: L) -> Self {
        Self::from_session(Session::new(
            link,
            Some(SERIAL_TIMEOUT),
            Some(SERIAL_IDLE_TIMEOUT),
        ))
    }

    pub fn from_session(session: Session<L>) -> Self {
        Self {
            session,
            query_delay: None,
            response_extra: 0,
        }
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

    pub fn query_delay(&self) -> Option<Duration> {
        self.query_delay
    }

    pub fn response_extra(&self) -> usize {
        self.response_extra
    }
}

#[async_trait]
impl<L: Link> Transporter for RtuTransporter<L> {
    async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    async fn send(&self, request: &[u8]) -> Result<Vec<u8>> {
        check_request(request)?;

        let mut guard = self.session.lock().await;
        let result = async {
            guard.begin().await?;
            guard.logger().log_tx(request);
            guard.write_all(request).await?;

            let expected = response_length(request) + self.response_extra;
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

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::testing::DuplexLink;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::Instant;

    const READ_TWO: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    /// Device that answers one request with `chunks`, written separately
    fn device(
        mut peers: tokio::sync::mpsc::UnboundedReceiver<tokio::io::DuplexStream>,
        request_len: usize,
        chunks: Vec<Vec<u8>>,
    ) -> tokio::task::JoinHandle<tokio::io::DuplexStream> {
        tokio::spawn(async move {
            let mut peer = peers.recv().await.unwrap();
            let mut request = vec![0u8; request_len];
            peer.read_exact(&mut request).await.unwrap();
            for chunk in chunks {
                peer.write_all(&chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            peer
        })
    }

    #[tokio::test]
    async fn test_reads_expected_length_in_pieces() {
        let (link, peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link);
        let response = with_crc(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B]);

        let device = device(
            peers,
            READ_TWO.len(),
            vec![response[..4].to_vec(), response[4..].to_vec()],
        );
        assert_eq!(transporter.send(&READ_TWO).await.unwrap(), response);
        let _peer = device.await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_exception_frame() {
        let (link, peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link);
        let response = with_crc(&[0x01, 0x83, 0x02]);

        let device = device(
            peers,
            READ_TWO.len(),
            vec![response[..4].to_vec(), response[4..].to_vec()],
        );
        assert_eq!(transporter.send(&READ_TWO).await.unwrap(), response);
        let _peer = device.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_function_returns_what_was_read() {
        let (link, peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link);

        let device = device(peers, READ_TWO.len(), vec![vec![0x01, 0x04, 0x02, 0x00]]);
        assert_eq!(
            transporter.send(&READ_TWO).await.unwrap(),
            vec![0x01, 0x04, 0x02, 0x00]
        );
        let _peer = device.await.unwrap();
    }

    #[tokio::test]
    async fn test_short_request_is_rejected_before_io() {
        let (link, _peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link.clone());
        assert!(matches!(
            transporter.send(&[0x01, 0x03]).await,
            Err(FieldbusError::FrameTooShort { actual: 2, .. })
        ));
        assert_eq!(link.opens(), 0);
    }

    #[tokio::test]
    async fn test_peer_hangup_closes_session() {
        let (link, peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link);

        let device = device(peers, READ_TWO.len(), vec![vec![0x01, 0x03]]);
        let _hangup = tokio::spawn(async move { drop(device.await.unwrap()) });

        let err = transporter.send(&READ_TWO).await.unwrap_err();
        assert!(err.is_transport());
        assert!(!transporter.session().is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_delay_holds_the_session() {
        let (link, peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link)
            .with_timeouts(None, None)
            .with_query_delay(Some(Duration::from_millis(100)));
        let response = with_crc(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03]);
        let request = with_crc(&[0x01, 0x06, 0x00, 0x01, 0x00, 0x03]);

        let device = device(peers, request.len(), vec![response.clone()]);
        let start = Instant::now();
        assert_eq!(transporter.send(&request).await.unwrap(), response);
        assert!(start.elapsed() >= Duration::from_millis(100));
        let _peer = device.await.unwrap();
    }

    #[test]
    fn test_zero_query_delay_disables() {
        let (link, _peers) = DuplexLink::new();
        let transporter = RtuTransporter::with_link(link).with_query_delay(Some(Duration::ZERO));
        assert_eq!(transporter.query_delay(), None);
    }
}
