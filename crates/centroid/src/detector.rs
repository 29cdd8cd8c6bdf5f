//! Per-frame event scan

use crate::window::{centroid_3x3, centroid_5x5, is_local_max};
use crate::{DetectError, DetectorConfig, Mode};
use event_buffer::EventSink;
use frame_capture::{Aperture, FrameBuffer, FrameGeometry};
use std::ops::Range;
use tracing::{debug, info};

/// Outcome of scanning one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Pixels above the event threshold that were strict local maxima
    pub candidates: usize,
    /// Local maxima rejected by the energy threshold
    pub below_energy: usize,
    /// Events accepted by the sink
    pub emitted: usize,
    /// The sink filled up and the scan stopped early
    pub overflowed: bool,
}

/// Event detector bound to one mode, aperture, and frame geometry
#[derive(Debug, Clone)]
pub struct EventDetector {
    mode: Mode,
    threshold: u8,
    energy_threshold: u32,
    geometry: FrameGeometry,
    rows: Range<usize>,
    cols: Range<usize>,
}

impl EventDetector {
    /// Create a detector; rejects apertures whose windows would leave the grid
    pub fn new(
        mode: Mode,
        config: &DetectorConfig,
        aperture: &Aperture,
        geometry: FrameGeometry,
    ) -> Result<Self, DetectError> {
        aperture.validate(&geometry)?;
        let (rows, cols) = aperture.scan_window(&geometry);

        info!(
            "Event detector: mode {}, threshold {}, energy > {}, scan rows {:?} cols {:?}",
            mode,
            config.threshold,
            config.energy_threshold(mode),
            rows,
            cols
        );

        Ok(Self {
            mode,
            threshold: config.threshold,
            energy_threshold: config.energy_threshold(mode),
            geometry,
            rows,
            cols,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Scan the masked grid of `frame`
    pub fn detect_frame<S: EventSink + ?Sized>(
        &self,
        frame: &FrameBuffer,
        sink: &mut S,
    ) -> Result<FrameReport, DetectError> {
        self.detect(frame.masked(), sink)
    }

    /// Scan a masked row-major grid, pushing events in row-major order.
    ///
    /// Stops at the first event the sink refuses and marks the report
    /// overflowed; the remainder of the frame is not scanned.
    pub fn detect<S: EventSink + ?Sized>(
        &self,
        masked: &[u8],
        sink: &mut S,
    ) -> Result<FrameReport, DetectError> {
        let expected = self.geometry.frame_len();
        if masked.len() != expected {
            return Err(DetectError::FrameSize {
                expected,
                actual: masked.len(),
            });
        }

        let width = self.geometry.width;
        let mut report = FrameReport::default();

        'scan: for i in self.rows.clone() {
            let base = i * width;
            for j in self.cols.clone() {
                // fast reject before touching any neighbour
                if masked[base + j] <= self.threshold {
                    continue;
                }
                if !is_local_max(masked, width, i, j) {
                    continue;
                }
                report.candidates += 1;

                let event = match self.mode {
                    Mode::ThreeByThree => centroid_3x3(masked, width, i, j, self.energy_threshold),
                    Mode::FiveByFive => centroid_5x5(masked, width, i, j, self.energy_threshold),
                };
                let Some(event) = event else {
                    report.below_energy += 1;
                    continue;
                };

                if !sink.offer(event) {
                    report.overflowed = true;
                    debug!("Sink full after {} events, stopping at row {}", report.emitted, i);
                    break 'scan;
                }
                report.emitted += 1;
            }
        }

        Ok(report)
    }
}
