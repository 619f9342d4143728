// src/raster/band.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::grid::PixelWindow;
use crate::error::Error;

/// No-data sentinel shared by every raster in the pipeline.
pub const NODATA: f32 = -999.0;

/// True for the sentinel and for anything non-finite read from inputs.
#[inline]
pub fn is_nodata(value: f32) -> bool {
    value == NODATA || !value.is_finite()
}

/// Fixed band vocabulary exposed by raster sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralBand {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl SpectralBand {
    pub const ALL: [SpectralBand; 6] = [
        SpectralBand::Blue,
        SpectralBand::Green,
        SpectralBand::Red,
        SpectralBand::Nir,
        SpectralBand::Swir1,
        SpectralBand::Swir2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SpectralBand::Blue => "blue",
            SpectralBand::Green => "green",
            SpectralBand::Red => "red",
            SpectralBand::Nir => "nir",
            SpectralBand::Swir1 => "swir1",
            SpectralBand::Swir2 => "swir2",
        }
    }

    /// Sentinel-2 MSI band code
    pub fn sentinel2_code(&self) -> &'static str {
        match self {
            SpectralBand::Blue => "B2",
            SpectralBand::Green => "B3",
            SpectralBand::Red => "B4",
            SpectralBand::Nir => "B8",
            SpectralBand::Swir1 => "B11",
            SpectralBand::Swir2 => "B12",
        }
    }
}

impl fmt::Display for SpectralBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpectralBand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        SpectralBand::ALL
            .into_iter()
            .find(|band| {
                band.name() == normalized || band.sentinel2_code().eq_ignore_ascii_case(&normalized)
            })
            .or(match normalized.as_str() {
                "near-infrared" | "near_infrared" | "b08" => Some(SpectralBand::Nir),
                "shortwave-infrared-1" | "b11" => Some(SpectralBand::Swir1),
                "shortwave-infrared-2" | "b12" => Some(SpectralBand::Swir2),
                "b02" => Some(SpectralBand::Blue),
                "b03" => Some(SpectralBand::Green),
                "b04" => Some(SpectralBand::Red),
                _ => None,
            })
            .ok_or_else(|| Error::invalid_parameter("band", s, "unknown band name"))
    }
}

/// Single band of pixel values in row-major order.
///
/// `shape` follows GDAL buffer ordering: `(width, height)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandBuffer {
    shape: (usize, usize),
    data: Vec<f32>,
}

impl BandBuffer {
    pub fn new(shape: (usize, usize), data: Vec<f32>) -> Self {
        assert_eq!(
            shape.0 * shape.1,
            data.len(),
            "buffer of {} values cannot hold a {}x{} band",
            data.len(),
            shape.0,
            shape.1
        );
        Self { shape, data }
    }

    pub fn filled(shape: (usize, usize), value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.0 * shape.1],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn width(&self) -> usize {
        self.shape.0
    }

    pub fn height(&self) -> usize {
        self.shape.1
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Value at (col, row); `None` outside the band or on no data.
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.shape.0 || row >= self.shape.1 {
            return None;
        }
        let value = self.data[row * self.shape.0 + col];
        (!is_nodata(value)).then_some(value)
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !is_nodata(**v)).count()
    }

    /// Copy of the pixels inside `window`.
    pub fn crop(&self, window: &PixelWindow) -> BandBuffer {
        let mut data = Vec::with_capacity(window.width * window.height);
        for row in window.row_off..window.row_off + window.height {
            let start = row * self.shape.0 + window.col_off;
            data.extend_from_slice(&self.data[start..start + window.width]);
        }
        BandBuffer::new((window.width, window.height), data)
    }
}
