//! Centroid Telemetry
//!
//! Drains the shared event buffer and writes one ASCII line per event to a
//! serial port (or any other byte sink):
//! - 3x3 mode: `x,y`
//! - 5x5 mode: `x,y,cornerMax,cornerMin`

mod encoder;
mod error;
mod output;
mod transmitter;

pub use encoder::LineEncoder;
pub use error::TelemetryError;
pub use output::{open_output, OutputConfig, OutputKind};
pub use transmitter::{Transmitter, TransmitterStats};

/// Serial link defaults of the reference readout
pub mod serial {
    /// Raspberry Pi primary UART
    pub const DEFAULT_DEVICE: &str = "/dev/serial0";
    /// Baud rate
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;
    /// Line sent once when the link comes up
    pub const DEFAULT_BANNER: &str = "system on";
}
