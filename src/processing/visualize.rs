// src/processing/visualize.rs
//! Display renderings. These never feed back into analytical values.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{is_nodata, BandBuffer, GridSpec, MultiBandRaster, PixelWindow, SpectralBand};

/// 8-bit RGBA rendering on a raster grid. No-data pixels are transparent.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaImage {
    pub grid: GridSpec,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    pub fn pixel(&self, col: usize, row: usize) -> [u8; 4] {
        let offset = (row * self.grid.width + col) * 4;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ]
    }

    pub fn crop(&self, window: &PixelWindow) -> RgbaImage {
        let mut pixels = Vec::with_capacity(window.width * window.height * 4);
        for row in window.row_off..window.row_off + window.height {
            let start = (row * self.grid.width + window.col_off) * 4;
            pixels.extend_from_slice(&self.pixels[start..start + window.width * 4]);
        }
        RgbaImage {
            grid: self.grid.sub_grid(window),
            pixels,
        }
    }
}

fn default_gamma() -> f32 {
    1.0
}

/// Linear min/max stretch followed by gamma correction.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Stretch {
    pub min: f32,
    pub max: f32,
    #[serde(default = "default_gamma")]
    pub gamma: f32,
}

impl Stretch {
    pub fn new(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            gamma: 1.0,
        }
    }

    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max > self.min) {
            return Err(Error::invalid_parameter(
                "max",
                self.max,
                format!("must exceed min {}", self.min),
            ));
        }
        if !(self.gamma > 0.0) || !self.gamma.is_finite() {
            return Err(Error::invalid_parameter("gamma", self.gamma, "must be positive"));
        }
        Ok(())
    }

    /// Position of `value` in [0, 1] after stretch and gamma.
    pub fn normalize(&self, value: f32) -> f32 {
        let t = ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        if self.gamma == 1.0 {
            t
        } else {
            t.powf(1.0 / self.gamma)
        }
    }

    pub fn to_byte(&self, value: f32) -> u8 {
        (self.normalize(value) * 255.0).round() as u8
    }
}

/// Three bands mapped to red, green and blue.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RgbVisualization {
    pub bands: [SpectralBand; 3],
    #[serde(flatten)]
    pub stretch: Stretch,
}

impl RgbVisualization {
    /// Red, green, blue reflectance, 0..3000
    pub fn true_color() -> Self {
        Self {
            bands: [SpectralBand::Red, SpectralBand::Green, SpectralBand::Blue],
            stretch: Stretch::new(0.0, 3000.0),
        }
    }

    /// SWIR2, SWIR1, red, 0..10000 with gamma 2.5; burnt structures stand out
    pub fn urban_false_color() -> Self {
        Self {
            bands: [SpectralBand::Swir2, SpectralBand::Swir1, SpectralBand::Red],
            stretch: Stretch::new(0.0, 10000.0).with_gamma(2.5),
        }
    }

    pub fn render(&self, raster: &MultiBandRaster) -> Result<RgbaImage> {
        self.stretch.validate()?;
        let channels = [
            raster.band(self.bands[0])?.data(),
            raster.band(self.bands[1])?.data(),
            raster.band(self.bands[2])?.data(),
        ];
        let stretch = self.stretch;
        let grid = *raster.grid();
        let mut pixels = vec![0u8; grid.width * grid.height * 4];

        pixels
            .par_chunks_mut(4)
            .enumerate()
            .for_each(|(i, rgba)| {
                let values = [channels[0][i], channels[1][i], channels[2][i]];
                if values.iter().any(|v| is_nodata(*v)) {
                    return;
                }
                for (out, value) in rgba.iter_mut().zip(values) {
                    *out = stretch.to_byte(value);
                }
                rgba[3] = 255;
            });

        Ok(RgbaImage { grid, pixels })
    }
}

/// RGB colour parsed from a CSS name or `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl TryFrom<String> for Color {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        let named = match value.to_lowercase().as_str() {
            "black" => Some(Color::new(0, 0, 0)),
            "white" => Some(Color::new(255, 255, 255)),
            "red" => Some(Color::new(255, 0, 0)),
            "green" => Some(Color::new(0, 128, 0)),
            "blue" => Some(Color::new(0, 0, 255)),
            "yellow" => Some(Color::new(255, 255, 0)),
            "orange" => Some(Color::new(255, 165, 0)),
            "pink" => Some(Color::new(255, 192, 203)),
            "purple" => Some(Color::new(128, 0, 128)),
            _ => None,
        };
        if let Some(color) = named {
            return Ok(color);
        }

        let hex = value.trim_start_matches('#');
        if hex.len() == 6 {
            if let Ok(rgb) = u32::from_str_radix(hex, 16) {
                return Ok(Color::new((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8));
            }
        }
        Err(Error::invalid_parameter("color", value, "expected a CSS name or #rrggbb"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Single band rendered through an evenly spaced colour ramp.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PaletteVisualization {
    pub palette: Vec<Color>,
    pub min: f32,
    pub max: f32,
}

impl PaletteVisualization {
    /// dNBR: yellow to red over 0..0.5
    pub fn burn_severity() -> Self {
        Self {
            palette: vec![
                Color::new(255, 255, 0),
                Color::new(255, 165, 0),
                Color::new(255, 0, 0),
            ],
            min: 0.0,
            max: 0.5,
        }
    }

    /// dNDVI: white to purple over -0.5..0.5
    pub fn vegetation_loss() -> Self {
        Self {
            palette: vec![
                Color::new(255, 255, 255),
                Color::new(255, 192, 203),
                Color::new(128, 0, 128),
            ],
            min: -0.5,
            max: 0.5,
        }
    }

    /// Colour for stretch position `t` in [0, 1].
    pub fn color_at(&self, t: f32) -> Color {
        match self.palette.len() {
            0 => Color::new(0, 0, 0),
            1 => self.palette[0],
            n => {
                let scaled = t.clamp(0.0, 1.0) * (n - 1) as f32;
                let lower = (scaled.floor() as usize).min(n - 2);
                let frac = scaled - lower as f32;
                let (a, b) = (self.palette[lower], self.palette[lower + 1]);
                let lerp = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * frac).round() as u8;
                Color::new(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b))
            }
        }
    }

    pub fn render(&self, grid: &GridSpec, band: &BandBuffer) -> Result<RgbaImage> {
        let stretch = Stretch::new(self.min, self.max);
        stretch.validate()?;
        if self.palette.is_empty() {
            return Err(Error::invalid_parameter("palette", "[]", "needs at least one colour"));
        }

        let values = band.data();
        let mut pixels = vec![0u8; grid.width * grid.height * 4];
        pixels
            .par_chunks_mut(4)
            .enumerate()
            .for_each(|(i, rgba)| {
                let value = values[i];
                if is_nodata(value) {
                    return;
                }
                let color = self.color_at(stretch.normalize(value));
                rgba.copy_from_slice(&[color.r, color.g, color.b, 255]);
            });

        Ok(RgbaImage {
            grid: *grid,
            pixels,
        })
    }
}
