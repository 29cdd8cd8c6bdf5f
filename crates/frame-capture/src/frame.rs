//! Frame buffer holding one raw grid and its masked derivative

use crate::aperture::ApertureMask;
use crate::source::{FrameRead, FrameSource};
use crate::{CaptureError, FrameGeometry};

/// Raw and masked 8-bit grids, allocated once and overwritten every cycle
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    geometry: FrameGeometry,
    /// Row-major samples exactly as read from the source
    raw: Vec<u8>,
    /// `raw` with everything outside the aperture forced to zero
    masked: Vec<u8>,
    /// Completed reads so far
    sequence: u64,
}

impl FrameBuffer {
    pub fn new(geometry: FrameGeometry) -> Self {
        let len = geometry.frame_len();
        Self {
            geometry,
            raw: vec![0; len],
            masked: vec![0; len],
            sequence: 0,
        }
    }

    /// Build a buffer around an existing row-major frame (tests, replay tools)
    pub fn from_raw(geometry: FrameGeometry, raw: Vec<u8>) -> Result<Self, CaptureError> {
        if raw.len() != geometry.frame_len() {
            return Err(CaptureError::BufferSize {
                expected: geometry.frame_len(),
                actual: raw.len(),
            });
        }
        let masked = vec![0; raw.len()];
        Ok(Self {
            geometry,
            raw,
            masked,
            sequence: 0,
        })
    }

    /// Overwrite the raw grid with the next frame from `source`
    pub fn fill_from<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<FrameRead, CaptureError> {
        let outcome = source.read_frame(&mut self.raw)?;
        if outcome == FrameRead::Complete {
            self.sequence += 1;
        }
        Ok(outcome)
    }

    /// Refresh the masked grid from the raw grid
    pub fn apply_mask(&mut self, mask: &ApertureMask) -> Result<(), CaptureError> {
        if mask.geometry() != self.geometry {
            return Err(CaptureError::Geometry(format!(
                "mask built for {}x{}, frame is {}x{}",
                mask.geometry().width,
                mask.geometry().height,
                self.geometry.width,
                self.geometry.height
            )));
        }
        mask.apply(&self.raw, &mut self.masked)
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn masked(&self) -> &[u8] {
        &self.masked
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Masked sample at (row, col)
    pub fn masked_pixel(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.geometry.height || col >= self.geometry.width {
            return None;
        }
        Some(self.masked[row * self.geometry.width + col])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Aperture, SequentialSource};
    use std::io::Cursor;

    #[test]
    fn test_fill_and_mask() {
        let geometry = FrameGeometry::new(8, 8);
        let bytes: Vec<u8> = (0..64).map(|v| v as u8 + 1).collect();
        let mut source = SequentialSource::new(Cursor::new(bytes), geometry);
        let mut frame = FrameBuffer::new(geometry);

        assert_eq!(frame.fill_from(&mut source).unwrap(), FrameRead::Complete);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.raw()[9], 10);

        let mask = ApertureMask::new(&Aperture::new(4, 4, 2), geometry);
        frame.apply_mask(&mask).unwrap();
        assert_eq!(frame.masked_pixel(4, 4), Some(37));
        assert_eq!(frame.masked_pixel(0, 0), Some(0));
        assert_eq!(frame.masked_pixel(8, 0), None);

        assert_eq!(frame.fill_from(&mut source).unwrap(), FrameRead::EndOfStream);
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn test_mask_geometry_mismatch() {
        let mut frame = FrameBuffer::new(FrameGeometry::new(8, 8));
        let mask = ApertureMask::new(&Aperture::new(4, 4, 2), FrameGeometry::new(10, 8));
        assert!(matches!(frame.apply_mask(&mask), Err(CaptureError::Geometry(_))));
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(FrameBuffer::from_raw(FrameGeometry::new(4, 4), vec![0; 15]).is_err());
        assert!(FrameBuffer::from_raw(FrameGeometry::new(4, 4), vec![0; 16]).is_ok());
    }
}
