//! Frame Capture Library for Intensified Detector Readout
//!
//! Provides raw frame ingestion from a byte stream and circular masking of the
//! phosphor screen region.
//! Supports:
//! - Sequential reads (every frame in order)
//! - Latest-frame reads (seek to the tail, drop any backlog)
//! - Precomputed aperture masks with no per-frame allocation

pub mod aperture;
pub mod frame;
pub mod source;

pub use aperture::{Aperture, ApertureMask, NEIGHBORHOOD_MARGIN};
pub use frame::FrameBuffer;
pub use source::{FrameRead, FrameSource, LatestFrameSource, SequentialSource};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Frame source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Aperture does not fit the frame: {0}")]
    Aperture(String),

    #[error("Buffer length {actual} does not match frame size {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Frame width (columns)
    pub width: usize,
    /// Frame height (rows)
    pub height: usize,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of bytes in one 8-bit frame
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Geometry(format!(
                "{}x{} has no pixels",
                self.width, self.height
            )));
        }
        Ok(())
    }
}
