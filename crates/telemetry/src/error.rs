//! Telemetry Error Types

use thiserror::Error;

/// Errors that can occur while transmitting events
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Write to the output stream failed
    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line formatting failed
    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    /// 5x5 mode requires corner diagnostics on every event
    #[error("Event at ({x}, {y}) has no corner diagnostics")]
    MissingCorners { x: f32, y: f32 },

    /// Output configuration is incomplete
    #[error("Invalid output configuration: {0}")]
    InvalidConfig(String),
}

impl From<tokio_serial::Error> for TelemetryError {
    fn from(err: tokio_serial::Error) -> Self {
        TelemetryError::SerialError(err.to_string())
    }
}
