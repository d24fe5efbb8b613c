//! In-memory link for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;

use crate::error::{FieldbusError, Result};
use crate::link::Link;

/// Each `open` creates a duplex pipe and hands the device end to the test
#[derive(Clone)]
pub(crate) struct DuplexLink {
    peers: mpsc::UnboundedSender<DuplexStream>,
    opens: Arc<AtomicUsize>,
    fail_next: Arc<AtomicBool>,
}

impl DuplexLink {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            peers: tx,
            opens: Arc::new(AtomicUsize::new(0)),
            fail_next: Arc::new(AtomicBool::new(false)),
        };
        (link, rx)
    }

    /// Number of successful opens so far
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Link for DuplexLink {
    type Stream = DuplexStream;

    async fn open(&self, _timeout: Option<Duration>) -> Result<DuplexStream> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(FieldbusError::connection("refused"));
        }
        let (client, device) = duplex(1024);
        self.peers
            .send(device)
            .map_err(|_| FieldbusError::connection("device end dropped"))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(client)
    }

    fn target(&self) -> String {
        "duplex".to_string()
    }
}
