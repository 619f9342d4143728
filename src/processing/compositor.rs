// src/processing/compositor.rs
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::io::{RasterSource, SceneQuery};
use crate::raster::{is_nodata, BandBuffer, MultiBandRaster, RasterScene, SpectralBand, NODATA};
use crate::temporal::TimeWindow;

/// Per-pixel median of every scene matching a window, region and cloud ceiling.
///
/// Scene identity does not survive: only the window and the number of
/// contributing scenes are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    window: TimeWindow,
    cloud_ceiling: f32,
    scene_count: usize,
    raster: Option<MultiBandRaster>,
}

impl Composite {
    /// Composite of a query that matched nothing.
    pub fn empty(window: TimeWindow, cloud_ceiling: f32) -> Self {
        Self {
            window,
            cloud_ceiling,
            scene_count: 0,
            raster: None,
        }
    }

    pub fn from_raster(
        window: TimeWindow,
        cloud_ceiling: f32,
        scene_count: usize,
        raster: MultiBandRaster,
    ) -> Self {
        Self {
            window,
            cloud_ceiling,
            scene_count,
            raster: Some(raster),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raster.is_none()
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn scene_count(&self) -> usize {
        self.scene_count
    }

    /// Pixels of the composite, or [`Error::EmptyComposite`] when no scene matched.
    pub fn raster(&self) -> Result<&MultiBandRaster> {
        self.raster.as_ref().ok_or(Error::EmptyComposite {
            window: self.window,
            cloud_ceiling: self.cloud_ceiling,
        })
    }
}

/// Builds composites from a raster source.
pub struct TemporalCompositor<'a> {
    source: &'a dyn RasterSource,
    bands: Vec<SpectralBand>,
}

impl<'a> TemporalCompositor<'a> {
    pub fn new(source: &'a dyn RasterSource) -> Self {
        Self {
            source,
            bands: SpectralBand::ALL.to_vec(),
        }
    }

    /// Restrict the composite to `bands`.
    pub fn with_bands(mut self, bands: &[SpectralBand]) -> Self {
        self.bands = bands.to_vec();
        self
    }

    pub fn composite(
        &self,
        window: TimeWindow,
        region: &Region,
        cloud_ceiling: f32,
    ) -> Result<Composite> {
        validate_cloud_ceiling(cloud_ceiling)?;

        let query = SceneQuery {
            window,
            region,
            cloud_ceiling,
            bands: self.bands.clone(),
        };
        // Source failures go up untouched
        let scenes = self.source.query(&query)?;

        debug!(
            "{} scenes for {} over {} below {}% cloud: {}",
            scenes.len(),
            window,
            region.name(),
            cloud_ceiling,
            scenes.iter().map(|scene| scene.id.as_str()).join(", ")
        );

        match median_composite(&scenes, &self.bands)? {
            Some(raster) => {
                info!(
                    "Composited {} scenes for {} ({})",
                    scenes.len(),
                    window,
                    raster.grid()
                );
                Ok(Composite::from_raster(
                    window,
                    cloud_ceiling,
                    scenes.len(),
                    raster,
                ))
            }
            None => {
                warn!(
                    "No scenes matched {} over {} below {}% cloud",
                    window,
                    region.name(),
                    cloud_ceiling
                );
                Ok(Composite::empty(window, cloud_ceiling))
            }
        }
    }
}

pub fn validate_cloud_ceiling(cloud_ceiling: f32) -> Result<()> {
    if !(0.0..100.0).contains(&cloud_ceiling) {
        return Err(Error::invalid_parameter(
            "cloud_ceiling",
            cloud_ceiling,
            "must be a percentage in [0, 100)",
        ));
    }
    Ok(())
}

/// Band-wise per-pixel median of `scenes`; `None` for an empty collection.
///
/// All scenes must share one grid and carry every band in `bands`.
pub fn median_composite(
    scenes: &[RasterScene],
    bands: &[SpectralBand],
) -> Result<Option<MultiBandRaster>> {
    let Some(first) = scenes.first() else {
        return Ok(None);
    };
    let grid = *first.raster.grid();

    for scene in &scenes[1..] {
        if !scene.raster.grid().aligned_with(&grid) {
            return Err(Error::GridMismatch {
                left: grid,
                right: *scene.raster.grid(),
            });
        }
    }

    let mut composite = MultiBandRaster::new(grid);
    for &band in bands {
        let inputs = scenes
            .iter()
            .map(|scene| {
                scene.raster.band(band).map_err(|_| Error::MissingBand {
                    band,
                    context: format!("scene {}", scene.id),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        composite.insert_band(band, median_band(&inputs))?;
    }

    Ok(Some(composite))
}

/// Median across aligned buffers, ignoring no-data samples.
fn median_band(inputs: &[&BandBuffer]) -> BandBuffer {
    let shape = inputs[0].shape();
    let mut result_data = vec![NODATA; shape.0 * shape.1];

    result_data.par_iter_mut().enumerate().for_each_init(
        || Vec::with_capacity(inputs.len()),
        |samples, (i, result)| {
            samples.clear();
            samples.extend(
                inputs
                    .iter()
                    .map(|buffer| buffer.data()[i])
                    .filter(|value| !is_nodata(*value)),
            );
            *result = median(samples).unwrap_or(NODATA);
        },
    );

    BandBuffer::new(shape, result_data)
}

/// Deterministic median; the mean of the two middle values for even counts.
fn median(samples: &mut [f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable_by(f32::total_cmp);
    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        Some(samples[mid])
    } else {
        Some((samples[mid - 1] + samples[mid]) / 2.0)
    }
}
