// src/io/mod.rs
pub mod artifact;
pub mod catalog;
pub mod memory;
pub mod reader;
pub mod sink;
pub mod vector;
pub mod writer;

pub use artifact::{Artifact, ArtifactPayload, ExportOptions, LabeledRaster, StoredArtifact, VectorFormat};
pub use catalog::{CatalogSource, SceneCatalog, SceneEntry};
pub use memory::{MemorySink, MemorySource};
pub use reader::read_band;
pub use sink::DirectorySink;
pub use writer::write_raster;

use crate::error::Result;
use crate::geometry::{BoundingBox, Region};
use crate::raster::{RasterScene, SpectralBand};
use crate::temporal::TimeWindow;
use chrono::{DateTime, Utc};

/// Filter handed to a raster source.
#[derive(Debug, Clone)]
pub struct SceneQuery<'a> {
    pub window: TimeWindow,
    pub region: &'a Region,
    /// Scenes must be strictly below this cloud-cover percentage
    pub cloud_ceiling: f32,
    /// Bands the caller will read; sources may skip loading the rest
    pub bands: Vec<SpectralBand>,
}

impl SceneQuery<'_> {
    /// Date and cloud-cover part of the filter, checkable before any pixels load.
    pub fn matches_metadata(&self, acquired: &DateTime<Utc>, cloud_cover: f32) -> bool {
        self.window.contains(acquired) && cloud_cover < self.cloud_ceiling
    }

    pub fn matches_footprint(&self, footprint: &BoundingBox) -> bool {
        self.region.intersects_bbox(footprint)
    }

    pub fn matches(&self, scene: &RasterScene) -> bool {
        self.matches_metadata(&scene.acquired, scene.cloud_cover)
            && self.matches_footprint(&scene.footprint)
    }
}

/// Supplier of multi-band scenes.
///
/// Failures are reported as [`crate::Error::SourceUnavailable`]; callers do not retry.
pub trait RasterSource: Send + Sync {
    fn query(&self, query: &SceneQuery<'_>) -> Result<Vec<RasterScene>>;
}

/// Persistence target for finished artifacts.
///
/// Failures are reported as [`crate::Error::SinkUnavailable`]; callers do not retry.
pub trait ArtifactSink: Send + Sync {
    fn store(&self, artifact: &Artifact, options: &ExportOptions) -> Result<StoredArtifact>;

    /// Remove an artifact this sink stored earlier with the same `options`.
    fn discard(&self, stored: &StoredArtifact, options: &ExportOptions) -> Result<()>;
}
