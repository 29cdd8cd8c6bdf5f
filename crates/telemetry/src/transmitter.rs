//! Telemetry Transmitter
//!
//! Drains the shared buffer into a local batch, then writes the batch without
//! holding the buffer lock.

use crate::{LineEncoder, TelemetryError};
use event_buffer::{CentroidEvent, Drain, SharedEventBuffer};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default wait for new events before re-checking the buffer
const DEFAULT_POLL_MS: u64 = 10;

/// Transmission counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitterStats {
    /// Event lines written
    pub lines_written: u64,
    /// Drained batches written
    pub batches: u64,
    /// Events that could not be encoded
    pub skipped: u64,
}

/// Writes drained centroid events to an output stream
pub struct Transmitter<W: Write> {
    out: W,
    encoder: LineEncoder,
    banner: Option<String>,
    poll_interval: Duration,
    /// Local snapshot of one drain, sized to the buffer capacity
    batch: Vec<CentroidEvent>,
    line: String,
    stats: TransmitterStats,
}

impl<W: Write> Transmitter<W> {
    /// Create a transmitter whose snapshot holds up to `capacity` events
    pub fn new(out: W, encoder: LineEncoder, capacity: usize) -> Self {
        Self {
            out,
            encoder,
            banner: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            batch: Vec::with_capacity(capacity),
            line: String::with_capacity(48),
            stats: TransmitterStats::default(),
        }
    }

    /// Line to send once before the first event
    pub fn with_banner(mut self, banner: Option<String>) -> Self {
        self.banner = banner;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn stats(&self) -> TransmitterStats {
        self.stats
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Transmit until the buffer is closed and empty
    pub fn run(&mut self, buffer: &SharedEventBuffer) -> Result<TransmitterStats, TelemetryError> {
        info!("Telemetry transmitter started ({} mode)", self.encoder.mode());

        if let Some(banner) = self.banner.take() {
            self.out.write_all(banner.as_bytes())?;
            self.out.write_all(b"\n")?;
            self.out.flush()?;
        }

        loop {
            self.batch.clear();
            match buffer.wait_drain_into(&mut self.batch, self.poll_interval) {
                Drain::Events(count) => {
                    debug!("Drained {} events", count);
                    self.write_batch()?;
                }
                Drain::TimedOut => continue,
                Drain::Closed => break,
            }
        }

        self.out.flush()?;
        info!(
            "Telemetry transmitter stopped: {} lines in {} batches, {} skipped",
            self.stats.lines_written, self.stats.batches, self.stats.skipped
        );
        Ok(self.stats)
    }

    /// Drain whatever is pending right now and write it; never waits
    pub fn transmit_pending(&mut self, buffer: &SharedEventBuffer) -> Result<usize, TelemetryError> {
        self.batch.clear();
        let count = buffer.drain_into(&mut self.batch);
        if count > 0 {
            self.write_batch()?;
        }
        Ok(count)
    }

    fn write_batch(&mut self) -> Result<(), TelemetryError> {
        let mut written = 0u64;
        for event in &self.batch {
            match self.encoder.encode_into(event, &mut self.line) {
                Ok(()) => {
                    self.out.write_all(self.line.as_bytes())?;
                    written += 1;
                }
                Err(e @ TelemetryError::MissingCorners { .. }) => {
                    warn!("Skipping event: {}", e);
                    self.stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        self.out.flush()?;

        self.stats.lines_written += written;
        self.stats.batches += 1;
        metrics::counter!("readout_lines_written_total").increment(written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use centroid::Mode;
    use event_buffer::CornerStats;
    use std::io;
    use std::sync::Arc;
    use std::thread;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drains_remaining_after_close() {
        let buffer = SharedEventBuffer::new(8);
        buffer.push(CentroidEvent::new(1.5, 2.0));
        buffer.push(CentroidEvent::new(3.0, 4.25));
        buffer.close();

        let mut tx = Transmitter::new(Vec::new(), LineEncoder::new(Mode::ThreeByThree), 8)
            .with_banner(Some("system on".into()));
        let stats = tx.run(&buffer).unwrap();

        assert_eq!(stats.lines_written, 2);
        let text = String::from_utf8(tx.into_inner()).unwrap();
        assert_eq!(text, "system on\n1.5,2\n3,4.25\n");
    }

    #[test]
    fn test_runs_alongside_producer() {
        let buffer = Arc::new(SharedEventBuffer::new(4));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut sent = 0;
                while sent < 50 {
                    if buffer.push(CentroidEvent::with_corners(
                        sent as f32,
                        0.5,
                        CornerStats { max: 2, min: 1 },
                    )) {
                        sent += 1;
                    } else {
                        thread::yield_now();
                    }
                }
                buffer.close();
            })
        };

        let mut tx = Transmitter::new(Vec::new(), LineEncoder::new(Mode::FiveByFive), 4)
            .with_poll_interval(Duration::from_millis(1));
        let stats = tx.run(&buffer).unwrap();
        producer.join().unwrap();

        assert_eq!(stats.lines_written, 50);
        let text = String::from_utf8(tx.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0], "0,0.5,2,1");
        assert_eq!(lines[49], "49,0.5,2,1");
    }

    #[test]
    fn test_skips_event_without_corners() {
        let buffer = SharedEventBuffer::new(4);
        buffer.push(CentroidEvent::new(1.0, 1.0));
        buffer.push(CentroidEvent::with_corners(2.0, 2.0, CornerStats { max: 5, min: 0 }));

        let mut tx = Transmitter::new(Vec::new(), LineEncoder::new(Mode::FiveByFive), 4);
        assert_eq!(tx.transmit_pending(&buffer).unwrap(), 2);
        assert_eq!(tx.stats().skipped, 1);
        assert_eq!(String::from_utf8(tx.into_inner()).unwrap(), "2,2,5,0\n");
    }

    #[test]
    fn test_write_failure_stops_transmitter() {
        let buffer = SharedEventBuffer::new(4);
        buffer.push(CentroidEvent::new(1.0, 1.0));

        let mut tx = Transmitter::new(BrokenPipe, LineEncoder::new(Mode::ThreeByThree), 4);
        assert!(matches!(tx.run(&buffer), Err(TelemetryError::Io(_))));
    }
}
