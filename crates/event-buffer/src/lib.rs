//! Shared Event Buffer
//!
//! Fixed-capacity hand-off point between the frame processing thread and the
//! telemetry transmitter.

mod buffer;

pub use buffer::{BufferStats, Drain, PushBurst, SharedEventBuffer, DEFAULT_CAPACITY};

use serde::{Deserialize, Serialize};

/// Extrema of the four outer corners of a 5x5 centroiding window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerStats {
    pub max: u8,
    pub min: u8,
}

/// One detected photon event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentroidEvent {
    /// Sub-pixel row position, sent first on the wire
    pub x: f32,
    /// Sub-pixel column position
    pub y: f32,
    /// Corner diagnostics, only produced by 5x5 centroiding
    pub corners: Option<CornerStats>,
}

impl CentroidEvent {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, corners: None }
    }

    pub fn with_corners(x: f32, y: f32, corners: CornerStats) -> Self {
        Self {
            x,
            y,
            corners: Some(corners),
        }
    }
}

/// Destination for detected events
pub trait EventSink {
    /// Store `event`; `false` means the sink is full and the event was dropped
    fn offer(&mut self, event: CentroidEvent) -> bool;
}

/// Unbounded sink for offline tools and tests
impl EventSink for Vec<CentroidEvent> {
    fn offer(&mut self, event: CentroidEvent) -> bool {
        self.push(event);
        true
    }
}
