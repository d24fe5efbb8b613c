//! Physical links
//!
//! A [`Link`] knows how to open one byte stream to a device. Sessions own
//! the resulting stream and decide when to open and drop it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use crate::constants::DEFAULT_BAUD_RATE;
use crate::error::{FieldbusError, Result};

/// Opens byte streams to a device
#[async_trait]
pub trait Link: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a fresh stream, bounded by `timeout` when given
    async fn open(&self, timeout: Option<Duration>) -> Result<Self::Stream>;

    /// Human readable target (address or device path)
    fn target(&self) -> String;
}

// ============================================================================
// TCP
// ============================================================================

/// TCP link to `host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpLink {
    address: String,
}

impl TcpLink {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Link for TcpLink {
    type Stream = TcpStream;

    async fn open(&self, limit: Option<Duration>) -> Result<TcpStream> {
        debug!("TCP connecting: {}", self.address);

        let connect = TcpStream::connect(self.address.as_str());
        let result = match limit {
            Some(limit) => match timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("TCP timeout: {}", self.address);
                    return Err(FieldbusError::timeout(format!(
                        "Connection to {} timed out",
                        self.address
                    )));
                },
            },
            None => connect.await,
        };

        match result {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("TCP connected: {}", self.address);
                Ok(stream)
            },
            Err(e) => {
                error!("TCP err: {} - {}", self.address, e);
                Err(FieldbusError::connection(format!(
                    "Failed to connect to {}: {e}",
                    self.address
                )))
            },
        }
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}

// ============================================================================
// Serial
// ============================================================================

/// Serial parity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N", alias = "none")]
    None,
    #[default]
    #[serde(rename = "E", alias = "even")]
    Even,
    #[serde(rename = "O", alias = "odd")]
    Odd,
}

impl FromStr for Parity {
    type Err = FieldbusError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "N" => Ok(Parity::None),
            "E" => Ok(Parity::Even),
            "O" => Ok(Parity::Odd),
            other => Err(FieldbusError::config(format!("invalid parity: {other}"))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
        };
        f.write_str(s)
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Serial line parameters
///
/// RS-485 direction control is left to the adapter or driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
}

impl SerialConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: u8) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Reject line settings the port cannot be opened with
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(FieldbusError::config("serial device must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(FieldbusError::config("baud rate must be positive"));
        }
        self.tokio_data_bits()?;
        self.tokio_stop_bits()?;
        Ok(())
    }

    fn tokio_data_bits(&self) -> Result<tokio_serial::DataBits> {
        match self.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(FieldbusError::config(format!("invalid data bits: {other}"))),
        }
    }

    fn tokio_stop_bits(&self) -> Result<tokio_serial::StopBits> {
        match self.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(FieldbusError::config(format!("invalid stop bits: {other}"))),
        }
    }
}

/// Serial port link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialLink {
    config: SerialConfig,
}

impl SerialLink {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait]
impl Link for SerialLink {
    type Stream = SerialStream;

    async fn open(&self, limit: Option<Duration>) -> Result<SerialStream> {
        let config = &self.config;
        debug!(
            "RTU: {} @{}baud {}{}{}",
            config.device, config.baud_rate, config.data_bits, config.parity, config.stop_bits
        );

        let mut builder = tokio_serial::new(config.device.as_str(), config.baud_rate)
            .data_bits(config.tokio_data_bits()?)
            .parity(config.parity.into())
            .stop_bits(config.tokio_stop_bits()?);
        if let Some(limit) = limit {
            builder = builder.timeout(limit);
        }

        match builder.open_native_async() {
            Ok(port) => {
                info!("RTU opened: {}", config.device);
                Ok(port)
            },
            Err(e) => {
                error!("RTU err: {} - {}", config.device, e);
                Err(FieldbusError::connection(format!(
                    "Failed to open serial port {}: {e}",
                    config.device
                )))
            },
        }
    }

    fn target(&self) -> String {
        self.config.device.clone()
    }
}
