//! Photon Event Detection and Centroiding
//!
//! Finds photon-event flashes in a masked phosphor-screen frame:
//! - Event threshold on the centre pixel (fast reject)
//! - Strict local maximum against all 8 neighbours
//! - Energy threshold on the 3x3 or 5x5 neighbourhood sum
//! - Sub-pixel centroid from row/column marginal sums

pub mod detector;
pub mod window;

pub use detector::{EventDetector, FrameReport};
pub use window::{centroid_3x3, centroid_5x5, is_local_max};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Detection error types
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Frame is {actual} bytes, detector expects {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error(transparent)]
    Aperture(#[from] frame_capture::CaptureError),
}

/// Centroiding window, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// 3x3 window, `x,y` output
    #[serde(rename = "3x3", alias = "three_by_three")]
    ThreeByThree,
    /// 5x5 window with corner diagnostics, `x,y,max,min` output
    #[serde(rename = "5x5", alias = "five_by_five")]
    FiveByFive,
}

impl Mode {
    /// Map the hardware mode signal: high selects 5x5
    pub fn from_signal(high: bool) -> Self {
        if high {
            Mode::FiveByFive
        } else {
            Mode::ThreeByThree
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::ThreeByThree => write!(f, "3x3"),
            Mode::FiveByFive => write!(f, "5x5"),
        }
    }
}

/// Detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Centre pixel must exceed this to be a candidate
    pub threshold: u8,
    /// 3x3 neighbourhood sum must exceed this
    pub energy_threshold_3x3: u32,
    /// 5x5 neighbourhood sum must exceed this
    pub energy_threshold_5x5: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 20,
            energy_threshold_3x3: 50,
            energy_threshold_5x5: 500,
        }
    }
}

impl DetectorConfig {
    pub fn energy_threshold(&self, mode: Mode) -> u32 {
        match mode {
            Mode::ThreeByThree => self.energy_threshold_3x3,
            Mode::FiveByFive => self.energy_threshold_5x5,
        }
    }
}
