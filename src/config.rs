// src/config.rs
//! JSON analysis configuration. The default reproduces the Los Angeles
//! January 2025 deployment.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::geometry::Region;
use crate::io::ExportOptions;
use crate::processing::compositor::validate_cloud_ceiling;
use crate::processing::{IndexKind, Product, RgbVisualization, RunSpec};
use crate::raster::SpectralBand;
use crate::temporal::{Epoch, EventWindows};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    #[serde(default = "default_event_date")]
    pub event_date: NaiveDate,
    /// Day offsets from the event, end exclusive
    #[serde(default = "default_pre_window")]
    pub pre_window: WindowOffsets,
    #[serde(default = "default_post_window")]
    pub post_window: WindowOffsets,
    #[serde(default = "default_cloud_ceiling")]
    pub cloud_ceiling: f32,
    #[serde(default)]
    pub export: ExportOptions,
    #[serde(default = "default_runs")]
    pub runs: Vec<RunConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOffsets {
    pub start: i64,
    pub end: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub name: String,
    pub region: RegionConfig,
    pub boundary_artifact: String,
    pub products: Vec<Product>,
}

/// A region given either as `bbox: [min_lon, min_lat, max_lon, max_lat]`
/// or as a closed `vertices` ring of `[lon, lat]` pairs.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RegionConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<[f64; 2]>>,
}

fn default_event_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).unwrap_or_default()
}

fn default_pre_window() -> WindowOffsets {
    WindowOffsets { start: -10, end: -1 }
}

fn default_post_window() -> WindowOffsets {
    WindowOffsets { start: 0, end: 10 }
}

fn default_cloud_ceiling() -> f32 {
    20.0
}

fn default_runs() -> Vec<RunConfig> {
    vec![regional_run(), urban_run()]
}

fn regional_run() -> RunConfig {
    let true_color = vec![SpectralBand::Red, SpectralBand::Green, SpectralBand::Blue];
    RunConfig {
        name: "regional".to_string(),
        region: RegionConfig {
            name: "LA Main".to_string(),
            bbox: Some([
                -119.28679363256086,
                33.89937835176071,
                -117.98766033177961,
                34.50814643679167,
            ]),
            vertices: None,
        },
        boundary_artifact: "LA_MainBoundary".to_string(),
        products: vec![
            Product::Composite {
                epoch: Epoch::Pre,
                bands: true_color.clone(),
                artifact: "LA_PreEvent_TrueColor".to_string(),
                visualization: None,
            },
            Product::Composite {
                epoch: Epoch::Post,
                bands: true_color,
                artifact: "LA_PostEvent_TrueColor".to_string(),
                visualization: None,
            },
            Product::Change {
                index: IndexKind::Burn,
                artifact: "LA_Burn_Severity_dNBR".to_string(),
                preview: None,
            },
            Product::Change {
                index: IndexKind::Vegetation,
                artifact: "LA_Vegetation_Loss_dNDVI".to_string(),
                preview: None,
            },
        ],
    }
}

fn urban_run() -> RunConfig {
    let false_color = RgbVisualization::urban_false_color();
    RunConfig {
        name: "urban".to_string(),
        region: RegionConfig {
            name: "LA Urban".to_string(),
            bbox: Some([
                -118.57881690373861,
                34.03323595790945,
                -118.51719046941244,
                34.057771917726015,
            ]),
            vertices: None,
        },
        boundary_artifact: "LA_UrbanBoundary".to_string(),
        products: vec![
            Product::Composite {
                epoch: Epoch::Pre,
                bands: false_color.bands.to_vec(),
                artifact: "LA_PreEvent_UrbanDamage_FalseColor".to_string(),
                visualization: Some(false_color.clone()),
            },
            Product::Composite {
                epoch: Epoch::Post,
                bands: false_color.bands.to_vec(),
                artifact: "LA_PostEvent_UrbanDamage_FalseColor".to_string(),
                visualization: Some(false_color),
            },
        ],
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            event_date: default_event_date(),
            pre_window: default_pre_window(),
            post_window: default_post_window(),
            cloud_ceiling: default_cloud_ceiling(),
            export: ExportOptions::default(),
            runs: default_runs(),
        }
    }
}

impl RegionConfig {
    pub fn to_region(&self) -> crate::Result<Region> {
        match (&self.bbox, &self.vertices) {
            (Some([min_lon, min_lat, max_lon, max_lat]), None) => {
                Region::rectangle(self.name.clone(), *min_lon, *min_lat, *max_lon, *max_lat)
            }
            (None, Some(vertices)) => Region::new(
                self.name.clone(),
                vertices.iter().map(|[lon, lat]| (*lon, *lat)).collect(),
            ),
            _ => Err(Error::InvalidRegion {
                name: self.name.clone(),
                reason: "give exactly one of bbox or vertices".to_string(),
            }),
        }
    }
}

impl RunConfig {
    pub fn to_spec(&self) -> crate::Result<RunSpec> {
        Ok(RunSpec {
            name: self.name.clone(),
            region: self.region.to_region()?,
            boundary_artifact: self.boundary_artifact.clone(),
            products: self.products.clone(),
        })
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn windows(&self) -> crate::Result<EventWindows> {
        EventWindows::around(
            self.event_date,
            (self.pre_window.start, self.pre_window.end),
            (self.post_window.start, self.post_window.end),
        )
    }

    pub fn run_specs(&self) -> crate::Result<Vec<RunSpec>> {
        self.runs.iter().map(RunConfig::to_spec).collect()
    }

    /// Reject configurations that cannot run, before anything touches a source.
    pub fn validate(&self) -> crate::Result<()> {
        validate_cloud_ceiling(self.cloud_ceiling)?;
        self.windows()?;
        if self.runs.is_empty() {
            return Err(Error::invalid_parameter("runs", "[]", "no runs configured"));
        }
        if self.export.scale_factor <= 0 {
            return Err(Error::invalid_parameter(
                "scale_factor",
                self.export.scale_factor,
                "must be positive",
            ));
        }

        let mut names = HashSet::new();
        for spec in self.run_specs()? {
            spec.validate()?;
            for name in spec.artifact_names() {
                if !names.insert(name.clone()) {
                    return Err(Error::invalid_parameter("artifact", name, "used by more than one run"));
                }
            }
        }
        Ok(())
    }
}
