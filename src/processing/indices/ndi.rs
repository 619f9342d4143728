// src/processing/indices/ndi.rs
use rayon::prelude::*;

use super::IndexCalculator;
use crate::raster::{is_nodata, BandBuffer, SpectralBand, NODATA};

/// Normalized Difference Index (NDI) calculator: (A - B) / (A + B)
pub struct NormalizedDifference {
    band_a: SpectralBand,
    band_b: SpectralBand,
    bands: [SpectralBand; 2],
    name: String,
}

impl NormalizedDifference {
    pub fn new(band_a: SpectralBand, band_b: SpectralBand, name: Option<String>) -> Self {
        Self {
            band_a,
            band_b,
            bands: [band_a, band_b],
            name: name.unwrap_or_else(|| "NDI".to_string()),
        }
    }

    pub fn band_a(&self) -> SpectralBand {
        self.band_a
    }

    pub fn band_b(&self) -> SpectralBand {
        self.band_b
    }
}

/// Normalized difference of one pixel pair. A vanishing denominator, a
/// missing input, or a ratio outside [-1, 1] (negative reflectance) gives no data.
#[inline]
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    if is_nodata(a) || is_nodata(b) {
        return NODATA;
    }
    let sum = a + b;
    if sum == 0.0 {
        return NODATA;
    }
    let ratio = (a - b) / sum;
    if (-1.0..=1.0).contains(&ratio) {
        ratio
    } else {
        NODATA
    }
}

impl IndexCalculator for NormalizedDifference {
    fn calculate(&self, inputs: &[&BandBuffer]) -> BandBuffer {
        let band_a = inputs[0];
        let band_b = inputs[1];
        let shape = band_a.shape();
        let a_data = band_a.data();
        let b_data = band_b.data();

        let mut result_data = vec![NODATA; shape.0 * shape.1];

        result_data
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, result)| {
                *result = normalized_difference(a_data[i], b_data[i]);
            });

        BandBuffer::new(shape, result_data)
    }

    fn required_bands(&self) -> &[SpectralBand] {
        &self.bands
    }

    fn name(&self) -> &str {
        &self.name
    }
}
