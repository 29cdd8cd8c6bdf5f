//! Circular aperture of the phosphor screen

use crate::{CaptureError, FrameGeometry};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Pixels kept clear of every border so a 5x5 window around any scanned
/// pixel stays inside the grid.
pub const NEIGHBORHOOD_MARGIN: usize = 2;

/// Circular region of the image plane covered by the phosphor screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aperture {
    /// Centre column
    pub cen_x: usize,
    /// Centre row
    pub cen_y: usize,
    /// Radius in pixels
    pub radius: usize,
}

impl Default for Aperture {
    fn default() -> Self {
        Self {
            cen_x: 800,
            cen_y: 400,
            radius: 300,
        }
    }
}

impl Aperture {
    pub fn new(cen_x: usize, cen_y: usize, radius: usize) -> Self {
        Self {
            cen_x,
            cen_y,
            radius,
        }
    }

    /// True when `(row, col)` lies strictly inside the circle
    pub fn contains(&self, row: usize, col: usize) -> bool {
        let dy = row as i64 - self.cen_y as i64;
        let dx = col as i64 - self.cen_x as i64;
        let r = self.radius as i64;
        dy * dy + dx * dx < r * r
    }

    /// Reject apertures whose scan window would reach past the neighborhood margin
    pub fn validate(&self, geometry: &FrameGeometry) -> Result<(), CaptureError> {
        geometry.validate()?;

        if self.radius == 0 {
            return Err(CaptureError::Aperture("radius must be positive".into()));
        }

        let check = |centre: usize, extent: usize, axis: &str| {
            if centre < self.radius + NEIGHBORHOOD_MARGIN {
                return Err(CaptureError::Aperture(format!(
                    "{axis} centre {centre} with radius {} comes within {NEIGHBORHOOD_MARGIN} px of the low border",
                    self.radius
                )));
            }
            if centre + self.radius + NEIGHBORHOOD_MARGIN > extent {
                return Err(CaptureError::Aperture(format!(
                    "{axis} centre {centre} with radius {} extends past {extent} - {NEIGHBORHOOD_MARGIN}",
                    self.radius
                )));
            }
            Ok(())
        };

        check(self.cen_y, geometry.height, "row")?;
        check(self.cen_x, geometry.width, "column")?;
        Ok(())
    }

    /// Rows and columns the detector visits, clamped to the neighborhood margin
    pub fn scan_window(&self, geometry: &FrameGeometry) -> (Range<usize>, Range<usize>) {
        let clamp = |centre: usize, extent: usize| {
            let start = centre.saturating_sub(self.radius).max(NEIGHBORHOOD_MARGIN);
            let end = (centre + self.radius).min(extent.saturating_sub(NEIGHBORHOOD_MARGIN));
            start..end.max(start)
        };
        (
            clamp(self.cen_y, geometry.height),
            clamp(self.cen_x, geometry.width),
        )
    }
}

/// Per-row column spans of an aperture, computed once per geometry
#[derive(Debug, Clone)]
pub struct ApertureMask {
    geometry: FrameGeometry,
    /// `spans[row]` is the half-open column range inside the circle
    spans: Vec<Option<Range<usize>>>,
    inside: usize,
}

impl ApertureMask {
    pub fn new(aperture: &Aperture, geometry: FrameGeometry) -> Self {
        let r2 = (aperture.radius as i64).pow(2);
        let cx = aperture.cen_x as i64;
        let width = geometry.width as i64;

        let spans: Vec<Option<Range<usize>>> = (0..geometry.height)
            .map(|row| {
                let dy = row as i64 - aperture.cen_y as i64;
                let remaining = r2 - dy * dy;
                if remaining <= 0 {
                    return None;
                }
                // largest d with d^2 < remaining
                let half = isqrt(remaining - 1);
                let start = (cx - half).max(0);
                let end = (cx + half + 1).min(width);
                (start < end).then(|| start as usize..end as usize)
            })
            .collect();

        let inside: usize = spans.iter().flatten().map(|s| s.len()).sum();
        debug!(
            "Aperture mask built: {} of {} pixels inside",
            inside,
            geometry.frame_len()
        );

        Self {
            geometry,
            spans,
            inside,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Number of pixels inside the aperture
    pub fn inside_count(&self) -> usize {
        self.inside
    }

    /// Column span inside the aperture for `row`
    pub fn row_span(&self, row: usize) -> Option<Range<usize>> {
        self.spans.get(row).cloned().flatten()
    }

    /// Copy `raw` into `masked`, zeroing every pixel outside the aperture
    pub fn apply(&self, raw: &[u8], masked: &mut [u8]) -> Result<(), CaptureError> {
        let expected = self.geometry.frame_len();
        for len in [raw.len(), masked.len()] {
            if len != expected {
                return Err(CaptureError::BufferSize {
                    expected,
                    actual: len,
                });
            }
        }

        masked.fill(0);
        let width = self.geometry.width;
        for (row, span) in self.spans.iter().enumerate() {
            if let Some(span) = span {
                let base = row * width;
                let cols = base + span.start..base + span.end;
                masked[cols.clone()].copy_from_slice(&raw[cols]);
            }
        }
        Ok(())
    }
}

fn isqrt(n: i64) -> i64 {
    let mut r = (n as f64).sqrt() as i64;
    while r * r > n {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_aperture_fits_default_geometry() {
        let aperture = Aperture::default();
        assert!(aperture.validate(&FrameGeometry::default()).is_ok());
    }

    #[test]
    fn test_aperture_too_close_to_border() {
        let geometry = FrameGeometry::new(64, 48);
        assert!(Aperture::new(32, 24, 23).validate(&geometry).is_err());
        assert!(Aperture::new(32, 24, 22).validate(&geometry).is_ok());
        assert!(Aperture::new(3, 24, 2).validate(&geometry).is_err());
        assert!(Aperture::new(32, 24, 0).validate(&geometry).is_err());
    }

    #[test]
    fn test_scan_window_is_clamped() {
        let geometry = FrameGeometry::new(20, 10);
        let (rows, cols) = Aperture::new(10, 5, 50).scan_window(&geometry);
        assert_eq!(rows, 2..8);
        assert_eq!(cols, 2..18);
    }

    #[test]
    fn test_row_span_matches_contains() {
        let aperture = Aperture::new(10, 10, 6);
        let mask = ApertureMask::new(&aperture, FrameGeometry::new(24, 24));

        assert_eq!(mask.row_span(10), Some(5..16));
        assert_eq!(mask.row_span(4), None); // dy == radius is outside
        assert_eq!(mask.row_span(5), Some(7..14));
    }

    #[test]
    fn test_apply_rejects_wrong_length() {
        let mask = ApertureMask::new(&Aperture::new(4, 4, 2), FrameGeometry::new(8, 8));
        let raw = vec![1u8; 63];
        let mut masked = vec![0u8; 64];
        assert!(matches!(
            mask.apply(&raw, &mut masked),
            Err(CaptureError::BufferSize { expected: 64, actual: 63 })
        ));
    }

    proptest! {
        #[test]
        fn prop_mask_zeroes_outside_and_keeps_inside(
            width in 1usize..40,
            height in 1usize..40,
            cen_x in 0usize..40,
            cen_y in 0usize..40,
            radius in 0usize..30,
            seed in any::<u64>(),
        ) {
            let geometry = FrameGeometry::new(width, height);
            let aperture = Aperture::new(cen_x, cen_y, radius);
            let mask = ApertureMask::new(&aperture, geometry);

            let raw: Vec<u8> = (0..geometry.frame_len())
                .map(|i| (seed.wrapping_mul(6364136223846793005).wrapping_add(i as u64) >> 33) as u8)
                .collect();
            let mut masked = vec![0xAAu8; geometry.frame_len()];
            mask.apply(&raw, &mut masked).unwrap();

            for row in 0..height {
                for col in 0..width {
                    let idx = row * width + col;
                    if aperture.contains(row, col) {
                        prop_assert_eq!(masked[idx], raw[idx]);
                    } else {
                        prop_assert_eq!(masked[idx], 0);
                    }
                }
            }
        }
    }
}
