// src/io/artifact.rs
use serde::{Deserialize, Serialize};

use crate::geometry::Region;
use crate::processing::visualize::RgbaImage;
use crate::raster::{BandBuffer, GridSpec, MultiBandRaster};

/// Raster payload with output band labels, in export order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRaster {
    pub grid: GridSpec,
    pub bands: Vec<(String, BandBuffer)>,
}

impl LabeledRaster {
    pub fn single(grid: GridSpec, label: impl Into<String>, band: BandBuffer) -> Self {
        Self {
            grid,
            bands: vec![(label.into(), band)],
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.grid.pixel_count()
    }
}

impl From<&MultiBandRaster> for LabeledRaster {
    fn from(raster: &MultiBandRaster) -> Self {
        Self {
            grid: *raster.grid(),
            bands: raster
                .bands()
                .map(|(band, buffer)| (band.sentinel2_code().to_string(), buffer.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    /// Analytical raster: float values, `NODATA` outside the region
    Raster(LabeledRaster),
    /// Display rendering of a raster
    Visualization(RgbaImage),
    /// Region boundary exported for auditability
    Boundary(Region),
}

/// Named output bound for an artifact sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub description: String,
    pub payload: ArtifactPayload,
}

impl Artifact {
    pub fn raster(name: impl Into<String>, description: impl Into<String>, raster: LabeledRaster) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            payload: ArtifactPayload::Raster(raster),
        }
    }

    pub fn visualization(
        name: impl Into<String>,
        description: impl Into<String>,
        image: RgbaImage,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            payload: ArtifactPayload::Visualization(image),
        }
    }

    pub fn boundary(name: impl Into<String>, region: Region) -> Self {
        let description = format!("Boundary of {}", region.name());
        Self {
            name: name.into(),
            description,
            payload: ArtifactPayload::Boundary(region),
        }
    }

    /// Pixel footprint of raster payloads; `None` for vectors.
    pub fn pixel_count(&self) -> Option<u64> {
        match &self.payload {
            ArtifactPayload::Raster(raster) => Some(raster.pixel_count()),
            ArtifactPayload::Visualization(image) => Some(image.grid.pixel_count()),
            ArtifactPayload::Boundary(_) => None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorFormat {
    #[default]
    Kml,
    GeoJson,
}

impl VectorFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VectorFormat::Kml => "kml",
            VectorFormat::GeoJson => "geojson",
        }
    }
}

/// Export settings shared by every artifact of a deployment.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Folder under the sink root
    #[serde(default = "default_destination")]
    pub destination: String,
    /// Ground sample distance recorded with raster artifacts
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    #[serde(default)]
    pub vector_format: VectorFormat,
    /// Store analytical rasters as int16 scaled by `scale_factor`
    #[serde(default)]
    pub fixed_point: bool,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: i32,
}

fn default_destination() -> String {
    "LA Wildfire".to_string()
}

fn default_scale() -> f64 {
    10.0
}

fn default_max_pixels() -> u64 {
    10_000_000_000_000
}

fn default_scale_factor() -> i32 {
    10000
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            scale: default_scale(),
            max_pixels: default_max_pixels(),
            vector_format: VectorFormat::default(),
            fixed_point: false,
            scale_factor: default_scale_factor(),
        }
    }
}

/// Where a sink put an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub name: String,
    pub location: String,
}
