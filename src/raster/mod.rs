// src/raster/mod.rs
pub mod band;
pub mod grid;

use chrono::{DateTime, Utc};

pub use band::{is_nodata, BandBuffer, SpectralBand, NODATA};
pub use grid::{GridSpec, PixelWindow};

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;

/// Multi-band raster on a single grid. Bands keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiBandRaster {
    grid: GridSpec,
    bands: Vec<(SpectralBand, BandBuffer)>,
}

impl MultiBandRaster {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            bands: Vec::new(),
        }
    }

    /// Add or replace a band; its shape must match the grid.
    pub fn insert_band(&mut self, band: SpectralBand, buffer: BandBuffer) -> Result<()> {
        if buffer.shape() != (self.grid.width, self.grid.height) {
            let (width, height) = buffer.shape();
            return Err(Error::GridMismatch {
                left: self.grid,
                right: GridSpec {
                    width,
                    height,
                    geo_transform: self.grid.geo_transform,
                },
            });
        }
        match self.bands.iter_mut().find(|(name, _)| *name == band) {
            Some(slot) => slot.1 = buffer,
            None => self.bands.push((band, buffer)),
        }
        Ok(())
    }

    pub fn with_band(mut self, band: SpectralBand, buffer: BandBuffer) -> Result<Self> {
        self.insert_band(band, buffer)?;
        Ok(self)
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn band(&self, band: SpectralBand) -> Result<&BandBuffer> {
        self.bands
            .iter()
            .find(|(name, _)| *name == band)
            .map(|(_, buffer)| buffer)
            .ok_or_else(|| Error::MissingBand {
                band,
                context: format!("raster on {}", self.grid),
            })
    }

    pub fn has_band(&self, band: SpectralBand) -> bool {
        self.bands.iter().any(|(name, _)| *name == band)
    }

    pub fn band_names(&self) -> impl Iterator<Item = SpectralBand> + '_ {
        self.bands.iter().map(|(name, _)| *name)
    }

    pub fn bands(&self) -> impl Iterator<Item = (SpectralBand, &BandBuffer)> + '_ {
        self.bands.iter().map(|(name, buffer)| (*name, buffer))
    }

    /// New raster holding only `bands`, in the requested order.
    pub fn select(&self, bands: &[SpectralBand]) -> Result<MultiBandRaster> {
        let mut selected = MultiBandRaster::new(self.grid);
        for &band in bands {
            selected.insert_band(band, self.band(band)?.clone())?;
        }
        Ok(selected)
    }
}

/// One acquisition as delivered by a raster source.
#[derive(Debug, Clone)]
pub struct RasterScene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Scene-level cloudy pixel percentage
    pub cloud_cover: f32,
    pub footprint: BoundingBox,
    pub raster: MultiBandRaster,
}

impl RasterScene {
    /// Scene whose footprint is the extent of its raster.
    pub fn new(
        id: impl Into<String>,
        acquired: DateTime<Utc>,
        cloud_cover: f32,
        raster: MultiBandRaster,
    ) -> Self {
        Self {
            id: id.into(),
            acquired,
            cloud_cover,
            footprint: raster.grid().bounds(),
            raster,
        }
    }
}
