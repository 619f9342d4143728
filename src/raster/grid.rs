// src/raster/grid.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

const ALIGNMENT_TOLERANCE: f64 = 1e-9;

/// Pixel grid of a raster: dimensions plus a GDAL-ordered affine transform
/// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub geo_transform: [f64; 6],
}

/// Rectangular pixel window inside a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl GridSpec {
    /// North-up grid with square-ish pixels anchored at the upper-left corner.
    pub fn north_up(
        width: usize,
        height: usize,
        origin_x: f64,
        origin_y: f64,
        pixel_width: f64,
        pixel_height: f64,
    ) -> Self {
        Self {
            width,
            height,
            geo_transform: [origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height.abs()],
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Same dimensions, extent, resolution and alignment.
    pub fn aligned_with(&self, other: &GridSpec) -> bool {
        self.width == other.width
            && self.height == other.height
            && self
                .geo_transform
                .iter()
                .zip(other.geo_transform.iter())
                .all(|(a, b)| (a - b).abs() <= ALIGNMENT_TOLERANCE * a.abs().max(b.abs()).max(1.0))
    }

    /// Geographic coordinates of the centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let gt = &self.geo_transform;
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            gt[0] + c * gt[1] + r * gt[2],
            gt[3] + c * gt[4] + r * gt[5],
        )
    }

    fn corner(&self, col: usize, row: usize) -> (f64, f64) {
        let gt = &self.geo_transform;
        let c = col as f64;
        let r = row as f64;
        (gt[0] + c * gt[1] + r * gt[2], gt[3] + c * gt[4] + r * gt[5])
    }

    /// Extent of the grid in geographic coordinates.
    pub fn bounds(&self) -> BoundingBox {
        let corners = [
            self.corner(0, 0),
            self.corner(self.width, 0),
            self.corner(0, self.height),
            self.corner(self.width, self.height),
        ];
        let mut bbox = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }

    /// Smallest pixel window whose pixels intersect `bbox`, or `None` when the
    /// box lies outside the grid. Only defined for rotation-free grids.
    pub fn window_for(&self, bbox: &BoundingBox) -> Option<PixelWindow> {
        let gt = &self.geo_transform;
        if gt[2] != 0.0 || gt[4] != 0.0 || gt[1] == 0.0 || gt[5] == 0.0 {
            return None;
        }

        let to_col = |x: f64| (x - gt[0]) / gt[1];
        let to_row = |y: f64| (y - gt[3]) / gt[5];

        let (c0, c1) = (to_col(bbox.min_x), to_col(bbox.max_x));
        let (r0, r1) = (to_row(bbox.min_y), to_row(bbox.max_y));

        let col_start = c0.min(c1).floor().max(0.0);
        let col_end = c0.max(c1).ceil().min(self.width as f64);
        let row_start = r0.min(r1).floor().max(0.0);
        let row_end = r0.max(r1).ceil().min(self.height as f64);

        if col_end <= col_start || row_end <= row_start {
            return None;
        }

        Some(PixelWindow {
            col_off: col_start as usize,
            row_off: row_start as usize,
            width: (col_end - col_start) as usize,
            height: (row_end - row_start) as usize,
        })
    }

    /// Grid covering `window`, sharing this grid's resolution and alignment.
    pub fn sub_grid(&self, window: &PixelWindow) -> GridSpec {
        let (x, y) = self.corner(window.col_off, window.row_off);
        let mut geo_transform = self.geo_transform;
        geo_transform[0] = x;
        geo_transform[3] = y;
        GridSpec {
            width: window.width,
            height: window.height,
            geo_transform,
        }
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gt = &self.geo_transform;
        write!(
            f,
            "{}x{} grid at ({}, {}) step ({}, {})",
            self.width, self.height, gt[0], gt[3], gt[1], gt[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::north_up(10, 10, 0.0, 10.0, 1.0, 1.0)
    }

    #[test]
    fn test_pixel_center() {
        let (x, y) = grid().pixel_center(2, 3);
        assert_relative_eq!(x, 2.5);
        assert_relative_eq!(y, 6.5);
    }

    #[test]
    fn test_bounds() {
        let b = grid().bounds();
        assert_relative_eq!(b.min_x, 0.0);
        assert_relative_eq!(b.min_y, 0.0);
        assert_relative_eq!(b.max_x, 10.0);
        assert_relative_eq!(b.max_y, 10.0);
    }

    #[test]
    fn test_alignment() {
        let a = grid();
        let mut b = grid();
        assert!(a.aligned_with(&b));
        b.geo_transform[0] += 0.5;
        assert!(!a.aligned_with(&b));
        let c = GridSpec::north_up(10, 11, 0.0, 10.0, 1.0, 1.0);
        assert!(!a.aligned_with(&c));
    }

    #[test]
    fn test_window_for_bbox() {
        let window = grid()
            .window_for(&BoundingBox::new(2.2, 3.5, 4.1, 7.0))
            .unwrap();
        assert_eq!(window.col_off, 2);
        assert_eq!(window.width, 3);
        // rows count down from y = 10
        assert_eq!(window.row_off, 3);
        assert_eq!(window.height, 4);

        let sub = grid().sub_grid(&window);
        assert_relative_eq!(sub.geo_transform[0], 2.0);
        assert_relative_eq!(sub.geo_transform[3], 7.0);
    }

    #[test]
    fn test_window_outside() {
        assert!(grid()
            .window_for(&BoundingBox::new(20.0, 20.0, 30.0, 30.0))
            .is_none());
    }
}
