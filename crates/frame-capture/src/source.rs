//! Frame sources
//!
//! A source hands out exactly one `width * height` byte frame per call. A
//! short read, including zero bytes, is end of stream.

use crate::{CaptureError, FrameGeometry};
use std::io::{self, Read, Seek, SeekFrom};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome of a frame read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRead {
    /// The buffer now holds a full frame
    Complete,
    /// The source ran out before a full frame was available
    EndOfStream,
}

/// Anything that can fill a frame buffer
pub trait FrameSource {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<FrameRead, CaptureError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<FrameRead, CaptureError> {
        (**self).read_frame(buf)
    }
}

fn check_len(geometry: &FrameGeometry, buf: &[u8]) -> Result<(), CaptureError> {
    if buf.len() != geometry.frame_len() {
        return Err(CaptureError::BufferSize {
            expected: geometry.frame_len(),
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Read until `buf` is full or the reader reports EOF; returns bytes read
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_sequential<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<FrameRead, CaptureError> {
    let filled = fill(reader, buf)?;
    if filled < buf.len() {
        debug!("Short read: {} of {} bytes", filled, buf.len());
        return Ok(FrameRead::EndOfStream);
    }
    Ok(FrameRead::Complete)
}

/// Consumes every frame in order
pub struct SequentialSource<R> {
    reader: R,
    geometry: FrameGeometry,
}

impl<R: Read> SequentialSource<R> {
    pub fn new(reader: R, geometry: FrameGeometry) -> Self {
        Self { reader, geometry }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> FrameSource for SequentialSource<R> {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<FrameRead, CaptureError> {
        check_len(&self.geometry, buf)?;
        read_sequential(&mut self.reader, buf)
    }
}

/// Always reads the most recently completed frame at the tail of the stream,
/// discarding any backlog the processing loop did not keep up with.
pub struct LatestFrameSource<R> {
    reader: R,
    geometry: FrameGeometry,
    /// Cleared the first time a seek fails (pipes)
    seekable: bool,
    /// Frame-aligned stream length at the previous read
    last_end: Option<u64>,
    poll_interval: Duration,
    stale_timeout: Duration,
}

impl<R: Read + Seek> LatestFrameSource<R> {
    pub fn new(reader: R, geometry: FrameGeometry) -> Self {
        Self {
            reader,
            geometry,
            seekable: true,
            last_end: None,
            poll_interval: Duration::from_millis(5),
            stale_timeout: Duration::from_secs(1),
        }
    }

    /// How long to wait for a new frame to land before calling it end of stream
    pub fn with_stale_timeout(mut self, poll_interval: Duration, stale_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.stale_timeout = stale_timeout;
        self
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }
}

impl<R: Read + Seek> FrameSource for LatestFrameSource<R> {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<FrameRead, CaptureError> {
        check_len(&self.geometry, buf)?;
        if !self.seekable {
            return read_sequential(&mut self.reader, buf);
        }

        self.geometry.validate()?;
        let frame_len = buf.len() as u64;
        let deadline = Instant::now() + self.stale_timeout;
        loop {
            let end = match self.reader.seek(SeekFrom::End(0)) {
                Ok(end) => end,
                Err(e) => {
                    warn!("Frame source is not seekable ({}), reading sequentially", e);
                    self.seekable = false;
                    return read_sequential(&mut self.reader, buf);
                }
            };

            // a trailing partial frame is still being written
            let aligned = end - end % frame_len;
            let fresh = aligned >= frame_len && self.last_end != Some(aligned);
            if fresh {
                self.reader.seek(SeekFrom::Start(aligned - frame_len))?;
                let outcome = read_sequential(&mut self.reader, buf)?;
                self.last_end = Some(aligned);
                return Ok(outcome);
            }

            if Instant::now() >= deadline {
                debug!("No new frame after {:?}, treating as end of stream", self.stale_timeout);
                return Ok(FrameRead::EndOfStream);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    /// Hands out at most three bytes per read call
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }
    }

    /// Reader whose seeks always fail, like a pipe
    struct Pipe(Cursor<Vec<u8>>);

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for Pipe {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "illegal seek"))
        }
    }

    fn frames(count: u8, geometry: FrameGeometry) -> Vec<u8> {
        (0..count)
            .flat_map(|f| std::iter::repeat(f + 1).take(geometry.frame_len()))
            .collect()
    }

    #[test]
    fn test_sequential_handles_partial_reads() {
        let geometry = FrameGeometry::new(4, 4);
        let mut source = SequentialSource::new(Trickle(Cursor::new(frames(2, geometry))), geometry);
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 1));
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 2));
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::EndOfStream);
    }

    #[test]
    fn test_short_read_is_end_of_stream() {
        let geometry = FrameGeometry::new(4, 4);
        let mut source = SequentialSource::new(Cursor::new(vec![7u8; 10]), geometry);
        let mut buf = vec![0u8; 16];
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::EndOfStream);
    }

    #[test]
    fn test_wrong_buffer_size() {
        let geometry = FrameGeometry::new(4, 4);
        let mut source = SequentialSource::new(Cursor::new(vec![0u8; 32]), geometry);
        let mut buf = vec![0u8; 8];
        assert!(matches!(
            source.read_frame(&mut buf),
            Err(CaptureError::BufferSize { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn test_latest_skips_backlog() {
        let geometry = FrameGeometry::new(4, 4);
        let mut source = LatestFrameSource::new(Cursor::new(frames(3, geometry)), geometry)
            .with_stale_timeout(Duration::from_millis(1), Duration::ZERO);
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 3));
        // nothing new since the last read
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::EndOfStream);
    }

    #[test]
    fn test_latest_waits_for_growing_file() {
        let geometry = FrameGeometry::new(4, 4);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&frames(1, geometry)).unwrap();

        let mut source = LatestFrameSource::new(file.reopen().unwrap(), geometry)
            .with_stale_timeout(Duration::from_millis(1), Duration::from_millis(20));
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 1));

        file.write_all(&[9u8; 16]).unwrap();
        file.flush().unwrap();

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 9));
    }

    #[test]
    fn test_latest_ignores_partially_written_frame() {
        let geometry = FrameGeometry::new(4, 4);
        let mut stream = frames(1, geometry);
        stream.extend([9u8; 8]);
        let mut source = LatestFrameSource::new(Cursor::new(stream), geometry)
            .with_stale_timeout(Duration::from_millis(1), Duration::ZERO);
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 1));
        // the half frame alone is not new
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::EndOfStream);
    }

    #[test]
    fn test_latest_picks_up_frame_once_completed() {
        let geometry = FrameGeometry::new(4, 4);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&frames(1, geometry)).unwrap();
        file.write_all(&[9u8; 8]).unwrap();
        file.flush().unwrap();

        let mut source = LatestFrameSource::new(file.reopen().unwrap(), geometry)
            .with_stale_timeout(Duration::from_millis(1), Duration::from_millis(20));
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 1));

        file.write_all(&[9u8; 8]).unwrap();
        file.flush().unwrap();

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 9));
    }

    #[test]
    fn test_latest_falls_back_when_not_seekable() {
        let geometry = FrameGeometry::new(4, 4);
        let mut source = LatestFrameSource::new(Pipe(Cursor::new(frames(2, geometry))), geometry);
        let mut buf = vec![0u8; 16];

        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(!source.is_seekable());
        assert!(buf.iter().all(|&b| b == 1));
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::Complete);
        assert!(buf.iter().all(|&b| b == 2));
        assert_eq!(source.read_frame(&mut buf).unwrap(), FrameRead::EndOfStream);
    }
}
