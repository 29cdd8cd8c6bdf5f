//! Neighbourhood tests and centroid interpolation
//!
//! All functions index `grid` as a row-major frame of `width` columns and
//! assume the caller keeps `(row, col)` at least the window half-width away
//! from every border.
//!
//! REF: Hutchings et al., "Photon Event Centroiding with UV Photon-counting
//! Detectors".

use event_buffer::{CentroidEvent, CornerStats};

/// Copy the `N x N` block centred on `(row, col)`
#[inline]
fn window<const N: usize>(grid: &[u8], width: usize, row: usize, col: usize) -> [[u32; N]; N] {
    let half = N / 2;
    let mut block = [[0u32; N]; N];
    for (r, block_row) in block.iter_mut().enumerate() {
        let base = (row + r - half) * width + col - half;
        for (c, value) in block_row.iter_mut().enumerate() {
            *value = grid[base + c] as u32;
        }
    }
    block
}

fn row_sums<const N: usize>(block: &[[u32; N]; N]) -> [i32; N] {
    let mut sums = [0i32; N];
    for (sum, row) in sums.iter_mut().zip(block) {
        *sum = row.iter().sum::<u32>() as i32;
    }
    sums
}

fn col_sums<const N: usize>(block: &[[u32; N]; N]) -> [i32; N] {
    let mut sums = [0i32; N];
    for row in block {
        for (sum, value) in sums.iter_mut().zip(row) {
            *sum += *value as i32;
        }
    }
    sums
}

/// True when the pixel is strictly brighter than all 8 neighbours.
/// Ties disqualify, so a flat-topped blob never yields two events.
#[inline]
pub fn is_local_max(grid: &[u8], width: usize, row: usize, col: usize) -> bool {
    let centre = grid[row * width + col];
    let above = (row - 1) * width + col;
    let here = row * width + col;
    let below = (row + 1) * width + col;

    centre > grid[above - 1]
        && centre > grid[above]
        && centre > grid[above + 1]
        && centre > grid[here - 1]
        && centre > grid[here + 1]
        && centre > grid[below - 1]
        && centre > grid[below]
        && centre > grid[below + 1]
}

/// 3x3 centroid, or `None` if the 9-pixel sum does not exceed `energy_threshold`.
///
/// `x` is the row coordinate and `y` the column coordinate. Offsets use only
/// the outer row and column sums:
/// `x = row + (R3 - R1) / sum`, `y = col + (C3 - C1) / sum`.
pub fn centroid_3x3(
    grid: &[u8],
    width: usize,
    row: usize,
    col: usize,
    energy_threshold: u32,
) -> Option<CentroidEvent> {
    let block = window::<3>(grid, width, row, col);
    let rows = row_sums(&block);
    let sum: i32 = rows.iter().sum();
    if sum as u32 <= energy_threshold {
        return None;
    }
    let cols = col_sums(&block);

    let sum = sum as f32;
    let x = row as f32 + (rows[2] - rows[0]) as f32 / sum;
    let y = col as f32 + (cols[2] - cols[0]) as f32 / sum;
    Some(CentroidEvent::new(x, y))
}

/// 5x5 centroid with corner diagnostics, or `None` if the 25-pixel sum does
/// not exceed `energy_threshold`.
///
/// The outer ring carries double weight:
/// `x = row + (2*R5 + R4 - R2 - 2*R1) / sum`, same for columns into `y`. The
/// centre row and column have no first moment and are skipped.
pub fn centroid_5x5(
    grid: &[u8],
    width: usize,
    row: usize,
    col: usize,
    energy_threshold: u32,
) -> Option<CentroidEvent> {
    let block = window::<5>(grid, width, row, col);
    let rows = row_sums(&block);
    let sum: i32 = rows.iter().sum();
    if sum as u32 <= energy_threshold {
        return None;
    }
    let cols = col_sums(&block);

    let moment = |s: &[i32; 5]| 2 * s[4] + s[3] - s[1] - 2 * s[0];
    let sum_f = sum as f32;
    let x = row as f32 + moment(&rows) as f32 / sum_f;
    let y = col as f32 + moment(&cols) as f32 / sum_f;

    let corners = [block[0][0], block[0][4], block[4][0], block[4][4]];
    let stats = CornerStats {
        max: corners.iter().copied().max().unwrap_or(0) as u8,
        min: corners.iter().copied().min().unwrap_or(0) as u8,
    };
    Some(CentroidEvent::with_corners(x, y, stats))
}
