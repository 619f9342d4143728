// src/io/catalog.rs
//! Scene catalog backed by per-band GeoTIFF files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::reader::read_band;
use super::{RasterSource, SceneQuery};
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::raster::{MultiBandRaster, RasterScene, SpectralBand};
use crate::utils::cache::BandCache;

/// One acquisition and the files holding its bands.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SceneEntry {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Cloud cover in percent
    pub cloud_cover: f32,
    /// Defaults to the extent of the band grids
    #[serde(default)]
    pub footprint: Option<BoundingBox>,
    /// Band file paths, relative to the catalog file
    pub bands: BTreeMap<SpectralBand, PathBuf>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SceneCatalog {
    pub scenes: Vec<SceneEntry>,
}

impl SceneCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Raster source over a [`SceneCatalog`]. Metadata filters run before any
/// pixels load; recently decoded bands are cached across queries.
pub struct CatalogSource {
    catalog: SceneCatalog,
    base_dir: PathBuf,
    cache: BandCache,
}

impl CatalogSource {
    pub fn new(catalog: SceneCatalog, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            base_dir: base_dir.into(),
            cache: BandCache::new(),
        }
    }

    /// Load a catalog file; relative band paths resolve against its directory.
    pub fn open(path: &Path) -> Result<Self> {
        let context = || format!("loading catalog {}", path.display());
        let json = fs::read_to_string(path).map_err(|e| Error::source_unavailable(context(), e))?;
        let catalog: SceneCatalog =
            serde_json::from_str(&json).map_err(|e| Error::source_unavailable(context(), e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        info!("Loaded {} scenes from {}", catalog.scenes.len(), path.display());
        Ok(Self::new(catalog, base_dir))
    }

    /// Keep at most `capacity` decoded bands between queries.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = BandCache::with_capacity(capacity);
        self
    }

    pub fn catalog(&self) -> &SceneCatalog {
        &self.catalog
    }

    pub fn cached_bands(&self) -> usize {
        self.cache.len()
    }

    fn load_scene(&self, entry: &SceneEntry, bands: &[SpectralBand]) -> Result<RasterScene> {
        let mut raster: Option<MultiBandRaster> = None;
        for &band in bands {
            let relative = entry.bands.get(&band).ok_or_else(|| Error::MissingBand {
                band,
                context: format!("catalog entry {}", entry.id),
            })?;
            let path = self.base_dir.join(relative);
            let cached = self.cache.get_or_load(&path, read_band)?;
            let (grid, buffer) = (&cached.0, &cached.1);

            let raster = raster.get_or_insert_with(|| MultiBandRaster::new(*grid));
            if !raster.grid().aligned_with(grid) {
                return Err(Error::GridMismatch {
                    left: *raster.grid(),
                    right: *grid,
                });
            }
            raster.insert_band(band, buffer.clone())?;
        }

        let raster = raster.ok_or_else(|| {
            Error::invalid_parameter("bands", &entry.id, "query requested no bands")
        })?;
        let mut scene = RasterScene::new(entry.id.clone(), entry.acquired, entry.cloud_cover, raster);
        if let Some(footprint) = entry.footprint {
            scene.footprint = footprint;
        }
        Ok(scene)
    }
}

impl RasterSource for CatalogSource {
    fn query(&self, query: &SceneQuery<'_>) -> Result<Vec<RasterScene>> {
        let candidates = self
            .catalog
            .scenes
            .iter()
            .filter(|entry| query.matches_metadata(&entry.acquired, entry.cloud_cover))
            .filter(|entry| {
                entry
                    .footprint
                    .map_or(true, |footprint| query.matches_footprint(&footprint))
            })
            .collect::<Vec<_>>();
        debug!(
            "{} of {} catalog entries pass the date and cloud filters",
            candidates.len(),
            self.catalog.scenes.len()
        );

        let scenes = candidates
            .par_iter()
            .map(|entry| self.load_scene(entry, &query.bands))
            .collect::<Result<Vec<_>>>()?;

        Ok(scenes
            .into_iter()
            .filter(|scene| query.matches_footprint(&scene.footprint))
            .collect())
    }
}
