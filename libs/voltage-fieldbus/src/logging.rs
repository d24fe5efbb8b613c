//! Transport logging
//!
//! [`FrameLogger`] tags every event with the session target so several
//! sessions can share one subscriber. Raw frame dumps are DEBUG and can be
//! switched off per logger; lifecycle events are always emitted.

use std::time::Duration;

use tracing::{debug, info, warn};

/// Format bytes as `01 03 00 ...`
pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Session scoped logger
#[derive(Debug, Clone)]
pub struct FrameLogger {
    target: String,
    frames: bool,
}

impl FrameLogger {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            frames: true,
        }
    }

    /// Enable or disable raw TX/RX dumps
    pub fn with_frames(mut self, enabled: bool) -> Self {
        self.frames = enabled;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn frames_enabled(&self) -> bool {
        self.frames
    }

    /// Log an outgoing frame
    pub fn log_tx(&self, data: &[u8]) {
        if self.frames {
            debug!("[TX] {} {} bytes: [{}]", self.target, data.len(), hex(data));
        }
    }

    /// Log an incoming frame
    pub fn log_rx(&self, data: &[u8]) {
        if self.frames {
            debug!("[RX] {} {} bytes: [{}]", self.target, data.len(), hex(data));
        }
    }

    /// Log bytes discarded while resynchronising the stream
    pub fn log_drain(&self, data: &[u8]) {
        if self.frames && !data.is_empty() {
            debug!("[DRAIN] {} {} bytes: [{}]", self.target, data.len(), hex(data));
        }
    }

    pub fn log_connect(&self) {
        debug!("[CONNECT] {}", self.target);
    }

    pub fn log_connect_failed(&self, reason: &str) {
        warn!("[CONNECT] {} failed: {}", self.target, reason);
    }

    pub fn log_close(&self, reason: &str) {
        debug!("[CLOSE] {} - {}", self.target, reason);
    }

    pub fn log_idle_close(&self, idle: Duration) {
        info!("[IDLE] {} closed after {:?} idle", self.target, idle);
    }
}
