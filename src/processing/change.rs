// src/processing/change.rs
use std::fmt;

use itertools::{Itertools, MinMaxResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::indices::{IndexKind, IndexRaster};
use crate::error::{Error, Result};
use crate::raster::{is_nodata, BandBuffer, GridSpec, NODATA};

/// What a difference raster measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// dNBR
    BurnSeverity,
    /// dNDVI
    VegetationLoss,
}

impl ChangeKind {
    pub fn from_index(kind: IndexKind) -> Self {
        match kind {
            IndexKind::Burn => ChangeKind::BurnSeverity,
            IndexKind::Vegetation => ChangeKind::VegetationLoss,
        }
    }

    /// Band label used on export
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::BurnSeverity => "dNBR",
            ChangeKind::VegetationLoss => "dNDVI",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `pre - post` of one index, pixel aligned. Positive values mean loss.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRaster {
    pub kind: ChangeKind,
    pub grid: GridSpec,
    pub values: BandBuffer,
}

/// Difference two index rasters on the same grid.
///
/// No resampling happens here: rasters on different grids are a
/// [`Error::GridMismatch`]. No data in either input stays no data.
pub fn difference(index_pre: &IndexRaster, index_post: &IndexRaster) -> Result<ChangeRaster> {
    if index_pre.kind != index_post.kind {
        return Err(Error::invalid_parameter(
            "index_post",
            index_post.kind,
            format!("cannot difference {} against {}", index_pre.kind, index_post.kind),
        ));
    }
    if !index_pre.grid.aligned_with(&index_post.grid) {
        return Err(Error::GridMismatch {
            left: index_pre.grid,
            right: index_post.grid,
        });
    }

    let shape = index_pre.values.shape();
    let pre = index_pre.values.data();
    let post = index_post.values.data();
    let mut result_data = vec![NODATA; shape.0 * shape.1];

    result_data
        .par_iter_mut()
        .enumerate()
        .for_each(|(i, result)| {
            let (a, b) = (pre[i], post[i]);
            if !is_nodata(a) && !is_nodata(b) {
                *result = a - b;
            }
        });

    Ok(ChangeRaster {
        kind: ChangeKind::from_index(index_pre.kind),
        grid: index_pre.grid,
        values: BandBuffer::new(shape, result_data),
    })
}

/// USGS burn severity classes for dNBR (Key & Benson thresholds, unscaled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnSeverityClass {
    EnhancedRegrowthHigh,
    EnhancedRegrowthLow,
    Unburned,
    Low,
    ModerateLow,
    ModerateHigh,
    High,
}

impl BurnSeverityClass {
    pub const ALL: [BurnSeverityClass; 7] = [
        BurnSeverityClass::EnhancedRegrowthHigh,
        BurnSeverityClass::EnhancedRegrowthLow,
        BurnSeverityClass::Unburned,
        BurnSeverityClass::Low,
        BurnSeverityClass::ModerateLow,
        BurnSeverityClass::ModerateHigh,
        BurnSeverityClass::High,
    ];

    pub fn classify(dnbr: f32) -> Option<Self> {
        if is_nodata(dnbr) {
            return None;
        }
        Some(match dnbr {
            v if v < -0.25 => BurnSeverityClass::EnhancedRegrowthHigh,
            v if v < -0.1 => BurnSeverityClass::EnhancedRegrowthLow,
            v if v < 0.1 => BurnSeverityClass::Unburned,
            v if v < 0.27 => BurnSeverityClass::Low,
            v if v < 0.44 => BurnSeverityClass::ModerateLow,
            v if v < 0.66 => BurnSeverityClass::ModerateHigh,
            _ => BurnSeverityClass::High,
        })
    }
}

/// Statistics over the valid pixels of a change raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSummary {
    pub kind: ChangeKind,
    pub valid_pixels: usize,
    pub nodata_pixels: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
    /// Pixel count per class, burn severity rasters only
    pub severity: Vec<(BurnSeverityClass, usize)>,
}

impl ChangeRaster {
    pub fn summarize(&self) -> ChangeSummary {
        let valid = self
            .values
            .data()
            .iter()
            .copied()
            .filter(|v| !is_nodata(*v))
            .collect::<Vec<_>>();

        let (min, max) = match valid.iter().copied().minmax() {
            MinMaxResult::NoElements => (None, None),
            MinMaxResult::OneElement(v) => (Some(v), Some(v)),
            MinMaxResult::MinMax(lo, hi) => (Some(lo), Some(hi)),
        };
        let mean = (!valid.is_empty())
            .then(|| valid.iter().map(|v| *v as f64).sum::<f64>() / valid.len() as f64);

        let severity = match self.kind {
            ChangeKind::BurnSeverity => {
                let counts = valid
                    .iter()
                    .filter_map(|v| BurnSeverityClass::classify(*v))
                    .counts();
                BurnSeverityClass::ALL
                    .iter()
                    .map(|class| (*class, counts.get(class).copied().unwrap_or(0)))
                    .collect()
            }
            ChangeKind::VegetationLoss => Vec::new(),
        };

        ChangeSummary {
            kind: self.kind,
            valid_pixels: valid.len(),
            nodata_pixels: self.values.data().len() - valid.len(),
            min,
            max,
            mean,
            severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(
            BurnSeverityClass::classify(-0.3),
            Some(BurnSeverityClass::EnhancedRegrowthHigh)
        );
        assert_eq!(BurnSeverityClass::classify(0.0), Some(BurnSeverityClass::Unburned));
        assert_eq!(BurnSeverityClass::classify(0.1), Some(BurnSeverityClass::Low));
        assert_eq!(BurnSeverityClass::classify(0.5), Some(BurnSeverityClass::ModerateHigh));
        assert_eq!(BurnSeverityClass::classify(0.9), Some(BurnSeverityClass::High));
        assert_eq!(BurnSeverityClass::classify(NODATA), None);
    }

    #[test]
    fn test_summary() {
        let change = ChangeRaster {
            kind: ChangeKind::BurnSeverity,
            grid: GridSpec::north_up(2, 2, 0.0, 2.0, 1.0, 1.0),
            values: BandBuffer::new((2, 2), vec![0.0, 0.5, 0.7, NODATA]),
        };
        let summary = change.summarize();
        assert_eq!(summary.valid_pixels, 3);
        assert_eq!(summary.nodata_pixels, 1);
        assert_eq!(summary.min, Some(0.0));
        assert_eq!(summary.max, Some(0.7));
        let high = summary
            .severity
            .iter()
            .find(|(class, _)| *class == BurnSeverityClass::High)
            .map(|(_, count)| *count);
        assert_eq!(high, Some(1));
    }
}
