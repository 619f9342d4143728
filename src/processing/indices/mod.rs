// src/processing/indices/mod.rs
pub mod ndi;

pub use ndi::{normalized_difference, NormalizedDifference};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processing::compositor::Composite;
use crate::raster::{BandBuffer, GridSpec, SpectralBand};
use crate::temporal::Epoch;

/// Trait for spectral index calculators
pub trait IndexCalculator: Send + Sync {
    /// Calculate the index from input bands given in `required_bands` order
    fn calculate(&self, inputs: &[&BandBuffer]) -> BandBuffer;

    /// Bands the calculator reads
    fn required_bands(&self) -> &[SpectralBand];

    /// Return the name of the index
    fn name(&self) -> &str;
}

/// Indices the change detector knows how to difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Normalized Burn Ratio: (NIR - SWIR2) / (NIR + SWIR2)
    #[serde(alias = "nbr")]
    Burn,
    /// NDVI: (NIR - Red) / (NIR + Red)
    #[serde(alias = "ndvi")]
    Vegetation,
}

impl IndexKind {
    pub fn bands(&self) -> (SpectralBand, SpectralBand) {
        match self {
            IndexKind::Burn => (SpectralBand::Nir, SpectralBand::Swir2),
            IndexKind::Vegetation => (SpectralBand::Nir, SpectralBand::Red),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Burn => "NBR",
            IndexKind::Vegetation => "NDVI",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Single-band index raster derived from one composite. Values lie in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRaster {
    pub kind: IndexKind,
    pub epoch: Epoch,
    pub grid: GridSpec,
    pub values: BandBuffer,
}

impl IndexRaster {
    pub fn new(kind: IndexKind, epoch: Epoch, grid: GridSpec, values: BandBuffer) -> Result<Self> {
        if values.shape() != (grid.width, grid.height) {
            let (width, height) = values.shape();
            return Err(Error::GridMismatch {
                left: grid,
                right: GridSpec {
                    width,
                    height,
                    geo_transform: grid.geo_transform,
                },
            });
        }
        Ok(Self {
            kind,
            epoch,
            grid,
            values,
        })
    }
}

/// Run `calculator` over a composite. An empty composite propagates
/// [`Error::EmptyComposite`] instead of producing index values.
pub fn apply_index(composite: &Composite, calculator: &dyn IndexCalculator) -> Result<BandBuffer> {
    let raster = composite.raster()?;
    let inputs = calculator
        .required_bands()
        .iter()
        .map(|band| raster.band(*band))
        .collect::<Result<Vec<_>>>()?;
    Ok(calculator.calculate(&inputs))
}

/// Normalized difference of an arbitrary band pair, still on the composite grid.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRaster {
    pub bands: (SpectralBand, SpectralBand),
    pub grid: GridSpec,
    pub values: BandBuffer,
}

/// `(band_a - band_b) / (band_a + band_b)` over a composite.
pub fn normalized_index(
    composite: &Composite,
    band_a: SpectralBand,
    band_b: SpectralBand,
) -> Result<NormalizedRaster> {
    let values = apply_index(composite, &NormalizedDifference::new(band_a, band_b, None))?;
    Ok(NormalizedRaster {
        bands: (band_a, band_b),
        grid: *composite.raster()?.grid(),
        values,
    })
}

/// Index of `kind` for the composite of `epoch`.
pub fn compute_index(composite: &Composite, kind: IndexKind, epoch: Epoch) -> Result<IndexRaster> {
    let (band_a, band_b) = kind.bands();
    let raster = normalized_index(composite, band_a, band_b)?;
    IndexRaster::new(kind, epoch, raster.grid, raster.values)
}

pub fn burn_index(composite: &Composite, epoch: Epoch) -> Result<IndexRaster> {
    compute_index(composite, IndexKind::Burn, epoch)
}

pub fn vegetation_index(composite: &Composite, epoch: Epoch) -> Result<IndexRaster> {
    compute_index(composite, IndexKind::Vegetation, epoch)
}
