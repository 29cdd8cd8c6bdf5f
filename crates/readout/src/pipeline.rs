//! Acquisition pipeline
//!
//! The calling thread acquires, masks and scans frames; a `telemetry-tx`
//! thread drains the shared buffer to the output. Within a frame the
//! detector holds the buffer lock for the whole scan.

use crate::{ReadoutConfig, ReadoutError};
use centroid::{EventDetector, FrameReport, Mode};
use event_buffer::SharedEventBuffer;
use frame_capture::{ApertureMask, FrameBuffer, FrameRead, FrameSource};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use telemetry::{LineEncoder, TelemetryError, Transmitter, TransmitterStats};
use tracing::{debug, error, info, warn};

type TransmitterOutcome = (TransmitterStats, Option<TelemetryError>);

/// Why acquisition ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The source ran out of complete frames
    EndOfStream,
    /// The stop flag was raised
    Stopped,
    /// Reading a frame failed
    SourceError(String),
    /// The transmitter thread exited before acquisition finished
    TransmitterExited,
}

/// Totals for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub mode: Mode,
    pub frames: u64,
    pub events_emitted: u64,
    pub overflowed_frames: u64,
    /// Events refused by the full buffer
    pub events_dropped: u64,
    pub lines_written: u64,
    pub stop_reason: StopReason,
    /// Set when the transmitter stopped on an output error
    pub transmit_error: Option<String>,
}

impl RunSummary {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            frames: 0,
            events_emitted: 0,
            overflowed_frames: 0,
            events_dropped: 0,
            lines_written: 0,
            stop_reason: StopReason::EndOfStream,
            transmit_error: None,
        }
    }

    fn record(&mut self, sequence: u64, report: &FrameReport) {
        self.frames += 1;
        self.events_emitted += report.emitted as u64;
        metrics::counter!("readout_frames_total").increment(1);
        metrics::counter!("readout_events_total").increment(report.emitted as u64);

        if report.overflowed {
            self.overflowed_frames += 1;
            metrics::counter!("readout_overflow_frames_total").increment(1);
            warn!(
                "Frame {}: event buffer full after {} events, rest of frame skipped",
                sequence, report.emitted
            );
        } else {
            debug!(
                "Frame {}: {} candidates, {} below energy, {} events",
                sequence, report.candidates, report.below_energy, report.emitted
            );
        }
    }
}

/// Frame-to-telemetry pipeline for one fixed mode
pub struct Pipeline {
    detector: EventDetector,
    mask: ApertureMask,
    frame: FrameBuffer,
    buffer: Arc<SharedEventBuffer>,
    encoder: LineEncoder,
    banner: Option<String>,
    tx_poll_interval: Duration,
}

impl Pipeline {
    pub fn new(config: &ReadoutConfig, mode: Mode) -> Result<Self, ReadoutError> {
        config.validate()?;
        let geometry = config.frame.geometry();
        let detector = EventDetector::new(mode, &config.detector, &config.aperture, geometry)?;
        let mask = ApertureMask::new(&config.aperture, geometry);
        info!(
            "Aperture ({}, {}) r={} covers {} pixels",
            config.aperture.cen_x,
            config.aperture.cen_y,
            config.aperture.radius,
            mask.inside_count()
        );

        Ok(Self {
            detector,
            mask,
            frame: FrameBuffer::new(geometry),
            buffer: Arc::new(SharedEventBuffer::new(config.buffer.capacity)),
            encoder: LineEncoder::new(mode).with_decimals(config.output.decimals),
            banner: config.output.banner.clone(),
            tx_poll_interval: config.output.poll_interval(),
        })
    }

    pub fn mode(&self) -> Mode {
        self.detector.mode()
    }

    /// Shared buffer between the scan and the transmitter
    pub fn buffer(&self) -> Arc<SharedEventBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Run until the source ends, `stop` is raised, or the transmitter fails.
    ///
    /// Pending events are drained to `out` before this returns.
    pub fn run<S, W>(
        mut self,
        source: &mut S,
        out: W,
        stop: &AtomicBool,
    ) -> Result<RunSummary, ReadoutError>
    where
        S: FrameSource + ?Sized,
        W: Write + Send + 'static,
    {
        let mut summary = RunSummary::new(self.mode());
        let transmitter = self.spawn_transmitter(out)?;

        let outcome = self.acquire(source, stop, &transmitter, &mut summary);

        self.buffer.close();
        let (tx_stats, tx_error) = transmitter
            .join()
            .map_err(|_| ReadoutError::TransmitterPanicked)?;

        let stop_reason = outcome?;
        summary.stop_reason = stop_reason;
        summary.lines_written = tx_stats.lines_written;
        summary.events_dropped = self.buffer.stats().dropped as u64;
        if let Some(e) = tx_error {
            error!("Telemetry transmitter failed: {}", e);
            summary.transmit_error = Some(e.to_string());
        }

        info!(
            "Pipeline stopped ({:?}): {} frames, {} events, {} lines, {} overflowed frames",
            summary.stop_reason,
            summary.frames,
            summary.events_emitted,
            summary.lines_written,
            summary.overflowed_frames
        );
        Ok(summary)
    }

    fn spawn_transmitter<W>(&self, out: W) -> Result<JoinHandle<TransmitterOutcome>, ReadoutError>
    where
        W: Write + Send + 'static,
    {
        let buffer = Arc::clone(&self.buffer);
        let mut transmitter = Transmitter::new(out, self.encoder, self.buffer.capacity())
            .with_banner(self.banner.clone())
            .with_poll_interval(self.tx_poll_interval);

        let handle = thread::Builder::new()
            .name("telemetry-tx".into())
            .spawn(move || {
                let result = transmitter.run(&buffer);
                (transmitter.stats(), result.err())
            })?;
        Ok(handle)
    }

    fn acquire<S>(
        &mut self,
        source: &mut S,
        stop: &AtomicBool,
        transmitter: &JoinHandle<TransmitterOutcome>,
        summary: &mut RunSummary,
    ) -> Result<StopReason, ReadoutError>
    where
        S: FrameSource + ?Sized,
    {
        loop {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested");
                return Ok(StopReason::Stopped);
            }
            if transmitter.is_finished() {
                return Ok(StopReason::TransmitterExited);
            }

            match self.frame.fill_from(source) {
                Ok(FrameRead::Complete) => {}
                Ok(FrameRead::EndOfStream) => {
                    info!("Frame source exhausted");
                    return Ok(StopReason::EndOfStream);
                }
                Err(e) => {
                    error!("Frame read failed: {}", e);
                    return Ok(StopReason::SourceError(e.to_string()));
                }
            }

            self.frame.apply_mask(&self.mask)?;

            let report = {
                let mut burst = self.buffer.lock_burst();
                self.detector.detect_frame(&self.frame, &mut burst)?
            };
            summary.record(self.frame.sequence(), &report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadPolicy;
    use frame_capture::SequentialSource;
    use std::io::Cursor;

    fn small_config() -> ReadoutConfig {
        let mut config = ReadoutConfig::default();
        config.frame.width = 16;
        config.frame.height = 16;
        config.frame.read_policy = ReadPolicy::Sequential;
        config.aperture.cen_x = 8;
        config.aperture.cen_y = 8;
        config.aperture.radius = 5;
        config.output.banner = None;
        config
    }

    #[test]
    fn test_new_rejects_bad_aperture() {
        let mut config = small_config();
        config.aperture.radius = 7;
        assert!(Pipeline::new(&config, Mode::ThreeByThree).is_err());
    }

    #[test]
    fn test_empty_source_ends_immediately() {
        let config = small_config();
        let pipeline = Pipeline::new(&config, Mode::ThreeByThree).unwrap();
        let mut source = SequentialSource::new(Cursor::new(Vec::new()), config.frame.geometry());
        let stop = AtomicBool::new(false);

        let summary = pipeline.run(&mut source, Vec::new(), &stop).unwrap();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.stop_reason, StopReason::EndOfStream);
        assert_eq!(summary.lines_written, 0);
    }

    #[test]
    fn test_dark_frames_emit_nothing() {
        let config = small_config();
        let pipeline = Pipeline::new(&config, Mode::FiveByFive).unwrap();
        let frames = vec![0u8; 16 * 16 * 3];
        let mut source = SequentialSource::new(Cursor::new(frames), config.frame.geometry());
        let stop = AtomicBool::new(false);

        let summary = pipeline.run(&mut source, Vec::new(), &stop).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.events_emitted, 0);
        assert_eq!(summary.overflowed_frames, 0);
    }
}
