//! Output stream selection

use crate::serial::{DEFAULT_BANNER, DEFAULT_BAUD_RATE, DEFAULT_DEVICE};
use crate::TelemetryError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, StopBits};
use tracing::info;

/// Per-write timeout on the serial port
const SERIAL_TIMEOUT_MS: u64 = 1000;

/// Where event lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Serial,
    Stdout,
    File,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub kind: OutputKind,
    /// Serial device path (e.g., "/dev/serial0" or "/dev/ttyUSB0")
    pub device: String,
    /// Baud rate for serial communication
    pub baud_rate: u32,
    /// Target file when `kind = "file"`
    pub path: Option<PathBuf>,
    /// Line written once before any event
    pub banner: Option<String>,
    /// Fixed decimals for coordinates
    pub decimals: Option<usize>,
    /// How long the transmitter waits for events before re-checking
    pub poll_interval_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::Serial,
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            path: None,
            banner: Some(DEFAULT_BANNER.to_string()),
            decimals: None,
            poll_interval_ms: 10,
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), TelemetryError> {
        match self.kind {
            OutputKind::Serial if self.baud_rate == 0 => {
                Err(TelemetryError::InvalidConfig("baud_rate must be positive".into()))
            }
            OutputKind::Serial if self.device.is_empty() => {
                Err(TelemetryError::InvalidConfig("serial device is empty".into()))
            }
            OutputKind::File if self.path.is_none() => {
                Err(TelemetryError::InvalidConfig("file output needs a path".into()))
            }
            _ => Ok(()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Open the configured output as a buffered byte sink
pub fn open_output(config: &OutputConfig) -> Result<Box<dyn Write + Send>, TelemetryError> {
    config.validate()?;
    match config.kind {
        OutputKind::Serial => {
            info!(
                "Opening serial port {} at {} baud",
                config.device, config.baud_rate
            );
            let port = tokio_serial::new(config.device.as_str(), config.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(SERIAL_TIMEOUT_MS))
                .open()?;
            Ok(Box::new(BufWriter::new(port)))
        }
        OutputKind::Stdout => {
            info!("Writing telemetry to stdout");
            Ok(Box::new(BufWriter::new(std::io::stdout())))
        }
        OutputKind::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| TelemetryError::InvalidConfig("file output needs a path".into()))?;
            info!("Appending telemetry to {}", path.display());
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Box::new(BufWriter::new(file)))
        }
    }
}
