//! Handler configuration
//!
//! A [`HandlerConfig`] names one framing and one transport. It is loaded from
//! YAML, TOML or JSON (chosen by file extension) with `FIELDBUS_` prefixed
//! environment variables layered on top, e.g. `FIELDBUS_SLAVE_ID=3` or
//! `FIELDBUS_TRANSPORT__ADDRESS=10.0.0.5:502`.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{
    DEFAULT_BAUD_RATE, SERIAL_IDLE_TIMEOUT, SERIAL_TIMEOUT, TCP_IDLE_TIMEOUT, TCP_TIMEOUT,
    VENDOR_SELECTOR_SIZE,
};
use crate::error::{FieldbusError, Result};
use crate::handler::ClientHandler;
use crate::link::SerialConfig;
use crate::logging::FrameLogger;
use crate::packager::{Packager, RtuPackager, SelectorStrip, TcpPackager, VendorRtuPackager};
use crate::transport::{RtuOverTcpTransporter, RtuTransporter, TcpTransporter, Transporter};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "FIELDBUS_";

/// Handler built from configuration
pub type DynClientHandler = ClientHandler<Box<dyn Packager>, Box<dyn Transporter>>;

/// Frame layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    #[default]
    Tcp,
    Rtu,
    VendorRtu,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Physical transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Tcp {
        address: String,
    },
    Serial(SerialConfig),
    RtuOverTcp {
        address: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

impl TransportConfig {
    fn name(&self) -> &'static str {
        match self {
            TransportConfig::Tcp { .. } => "tcp",
            TransportConfig::Serial(_) => "serial",
            TransportConfig::RtuOverTcp { .. } => "rtu_over_tcp",
        }
    }
}

fn default_slave_id() -> u8 {
    1
}

fn default_log_frames() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub framing: Framing,

    pub transport: TransportConfig,

    /// Unit id placed in every request
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,

    /// Vendor framing device selector
    #[serde(default)]
    pub selector: u8,

    /// Vendor framing selector removal
    #[serde(default)]
    pub strip: SelectorStrip,

    /// Per-request deadline; unset uses the transport default, 0 disables
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Inactivity before the link is closed; unset uses the default, 0 disables
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,

    /// Quiet time after each serial exchange
    #[serde(default)]
    pub query_delay_ms: u64,

    /// Emit raw TX/RX frame dumps at DEBUG
    #[serde(default = "default_log_frames")]
    pub log_frames: bool,
}

impl HandlerConfig {
    pub fn new(framing: Framing, transport: TransportConfig) -> Self {
        Self {
            framing,
            transport,
            slave_id: default_slave_id(),
            selector: 0,
            strip: SelectorStrip::default(),
            timeout_ms: None,
            idle_timeout_ms: None,
            query_delay_ms: 0,
            log_frames: default_log_frames(),
        }
    }

    /// Load from a file plus `FIELDBUS_` environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_env(path, ENV_PREFIX)
    }

    /// Load from a file plus environment overrides under `prefix`
    pub fn load_with_env<P: AsRef<Path>>(path: P, prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| FieldbusError::config("Config file must have an extension"))?;

        let figment = match extension {
            "toml" => Figment::new().merge(Toml::file(path)),
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            "json" => Figment::new().merge(Json::file(path)),
            _ => {
                return Err(FieldbusError::config(format!(
                    "Unsupported config file format: {}",
                    extension
                )))
            },
        };

        let config: Self = figment
            .merge(Env::prefixed(prefix).split("__"))
            .extract()?;
        config.validate()?;
        debug!(
            "Config loaded: {} ({:?} over {})",
            path.display(),
            config.framing,
            config.transport.name()
        );
        Ok(config)
    }

    /// Reject framing/transport pairs and line settings that cannot work
    pub fn validate(&self) -> Result<()> {
        match (&self.framing, &self.transport) {
            (Framing::Tcp, TransportConfig::Tcp { .. })
            | (Framing::Rtu | Framing::VendorRtu, TransportConfig::Serial(_))
            | (Framing::Rtu | Framing::VendorRtu, TransportConfig::RtuOverTcp { .. }) => {},
            (framing, transport) => {
                return Err(FieldbusError::config(format!(
                    "framing {:?} cannot run over {} transport",
                    framing,
                    transport.name()
                )))
            },
        }

        match &self.transport {
            TransportConfig::Tcp { address } | TransportConfig::RtuOverTcp { address, .. }
                if address.is_empty() =>
            {
                return Err(FieldbusError::config("transport address must not be empty"))
            },
            TransportConfig::Serial(serial) => serial.validate()?,
            _ => {},
        }

        if self.query_delay_ms > 0 && matches!(self.transport, TransportConfig::Tcp { .. }) {
            warn!("query_delay_ms ignored on tcp transport");
        }
        Ok(())
    }

    fn duration(value: Option<u64>, default: Duration) -> Option<Duration> {
        Some(value.map_or(default, Duration::from_millis))
    }

    fn logger(&self, target: &str) -> FrameLogger {
        FrameLogger::new(target).with_frames(self.log_frames)
    }

    fn build_packager(&self) -> Box<dyn Packager> {
        match self.framing {
            Framing::Tcp => Box::new(TcpPackager::new(self.slave_id)),
            Framing::Rtu => Box::new(RtuPackager::new(self.slave_id)),
            Framing::VendorRtu => Box::new(
                VendorRtuPackager::new(self.slave_id, self.selector).with_strip(self.strip),
            ),
        }
    }

    /// Response bytes the framing adds to the standard serial layout
    fn response_extra(&self) -> usize {
        match self.framing {
            Framing::VendorRtu => VENDOR_SELECTOR_SIZE,
            Framing::Tcp | Framing::Rtu => 0,
        }
    }

    fn build_transporter(&self) -> Box<dyn Transporter> {
        let query_delay = Some(Duration::from_millis(self.query_delay_ms));
        match &self.transport {
            TransportConfig::Tcp { address } => Box::new(
                TcpTransporter::new(address.as_str())
                    .with_timeouts(
                        Self::duration(self.timeout_ms, TCP_TIMEOUT),
                        Self::duration(self.idle_timeout_ms, TCP_IDLE_TIMEOUT),
                    )
                    .with_logger(self.logger(address)),
            ),
            TransportConfig::Serial(serial) => Box::new(
                RtuTransporter::new(serial.clone())
                    .with_timeouts(
                        Self::duration(self.timeout_ms, SERIAL_TIMEOUT),
                        Self::duration(self.idle_timeout_ms, SERIAL_IDLE_TIMEOUT),
                    )
                    .with_query_delay(query_delay)
                    .with_response_extra(self.response_extra())
                    .with_logger(self.logger(&serial.device)),
            ),
            TransportConfig::RtuOverTcp { address, baud_rate } => Box::new(
                RtuOverTcpTransporter::new(address.as_str())
                    .with_baud_rate(*baud_rate)
                    .with_timeouts(
                        Self::duration(self.timeout_ms, TCP_TIMEOUT),
                        Self::duration(self.idle_timeout_ms, TCP_IDLE_TIMEOUT),
                    )
                    .with_query_delay(query_delay)
                    .with_response_extra(self.response_extra())
                    .with_logger(self.logger(address)),
            ),
        }
    }

    /// Validate and construct the configured handler
    pub fn build(&self) -> Result<DynClientHandler> {
        self.validate()?;
        Ok(ClientHandler::new(
            self.build_packager(),
            self.build_transporter(),
        ))
    }
}
