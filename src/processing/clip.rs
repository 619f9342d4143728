// src/processing/clip.rs
use rayon::prelude::*;

use super::change::ChangeRaster;
use super::indices::IndexRaster;
use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::raster::{BandBuffer, GridSpec, MultiBandRaster, PixelWindow, NODATA};

/// Pixels of a grid whose centres fall inside a region (boundary inclusive).
#[derive(Debug, Clone)]
pub struct RegionMask {
    grid: GridSpec,
    inside: Vec<bool>,
}

impl RegionMask {
    pub fn new(grid: &GridSpec, region: &Region) -> Self {
        let mut inside = vec![false; grid.width * grid.height];
        let bbox = region.bbox();

        if grid.width > 0 {
            inside
                .par_chunks_mut(grid.width)
                .enumerate()
                .for_each(|(row, cells)| {
                    for (col, cell) in cells.iter_mut().enumerate() {
                        let (x, y) = grid.pixel_center(col, row);
                        *cell = x >= bbox.min_x
                            && x <= bbox.max_x
                            && y >= bbox.min_y
                            && y <= bbox.max_y
                            && region.contains(x, y);
                    }
                });
        }

        Self { grid: *grid, inside }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn inside_count(&self) -> usize {
        self.inside.iter().filter(|inside| **inside).count()
    }

    /// Copy of `band` with every pixel outside the region set to no data.
    /// The band must have the shape of the mask's grid.
    pub fn apply(&self, band: &BandBuffer) -> Result<BandBuffer> {
        if band.shape() != (self.grid.width, self.grid.height) {
            let (width, height) = band.shape();
            return Err(Error::GridMismatch {
                left: self.grid,
                right: GridSpec {
                    width,
                    height,
                    geo_transform: self.grid.geo_transform,
                },
            });
        }
        let mut data = band.data().to_vec();
        data.par_iter_mut()
            .zip(self.inside.par_iter())
            .for_each(|(value, inside)| {
                if !inside {
                    *value = NODATA;
                }
            });
        Ok(BandBuffer::new(band.shape(), data))
    }

    /// `GridMismatch` unless `grid` is the grid this mask was built on.
    fn check_grid(&self, grid: &GridSpec) -> Result<()> {
        if self.grid.aligned_with(grid) {
            Ok(())
        } else {
            Err(Error::GridMismatch {
                left: self.grid,
                right: *grid,
            })
        }
    }
}

/// Rasters that can be restricted to a region without changing their grid.
pub trait Clip: Sized {
    /// Apply a precomputed mask; the mask must share this raster's grid.
    fn clip_with(&self, mask: &RegionMask) -> Result<Self>;

    fn grid(&self) -> &GridSpec;

    fn clip(&self, region: &Region) -> Result<Self> {
        self.clip_with(&RegionMask::new(self.grid(), region))
    }
}

impl Clip for MultiBandRaster {
    fn clip_with(&self, mask: &RegionMask) -> Result<Self> {
        mask.check_grid(MultiBandRaster::grid(self))?;
        let mut clipped = MultiBandRaster::new(*MultiBandRaster::grid(self));
        for (name, band) in self.bands() {
            clipped.insert_band(name, mask.apply(band)?)?;
        }
        Ok(clipped)
    }

    fn grid(&self) -> &GridSpec {
        MultiBandRaster::grid(self)
    }
}

impl Clip for IndexRaster {
    fn clip_with(&self, mask: &RegionMask) -> Result<Self> {
        mask.check_grid(&self.grid)?;
        Ok(IndexRaster {
            kind: self.kind,
            epoch: self.epoch,
            grid: self.grid,
            values: mask.apply(&self.values)?,
        })
    }

    fn grid(&self) -> &GridSpec {
        &self.grid
    }
}

impl Clip for ChangeRaster {
    fn clip_with(&self, mask: &RegionMask) -> Result<Self> {
        mask.check_grid(&self.grid)?;
        Ok(ChangeRaster {
            kind: self.kind,
            grid: self.grid,
            values: mask.apply(&self.values)?,
        })
    }

    fn grid(&self) -> &GridSpec {
        &self.grid
    }
}

/// Restrict `raster` to the interior of `region`; outside pixels become no data.
pub fn clip<T: Clip>(raster: &T, region: &Region) -> Result<T> {
    raster.clip(region)
}

/// Pixel window covering the region's bounding box, used to crop exports.
pub fn export_window(grid: &GridSpec, region: &Region) -> Result<PixelWindow> {
    grid.window_for(region.bbox())
        .ok_or_else(|| Error::InvalidRegion {
            name: region.name().to_string(),
            reason: format!("does not overlap {}", grid),
        })
}
