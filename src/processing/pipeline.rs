// src/processing/pipeline.rs
//! Run orchestration: composite, derive, clip, stage, export.
//!
//! A run either stores every artifact it declares or none of them: a store
//! failure discards what the run already stored. Runs share nothing mutable
//! and can execute concurrently.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::thread;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::change::{difference, ChangeKind, ChangeSummary};
use super::clip::{export_window, Clip, RegionMask};
use super::compositor::{validate_cloud_ceiling, Composite, TemporalCompositor};
use super::indices::{compute_index, IndexKind};
use super::visualize::{PaletteVisualization, RgbVisualization};
use crate::error::{Error, Result};
use crate::geometry::Region;
use crate::io::{
    Artifact, ArtifactPayload, ArtifactSink, ExportOptions, LabeledRaster, RasterSource,
    StoredArtifact,
};
use crate::raster::{GridSpec, SpectralBand};
use crate::temporal::{Epoch, EventWindows};

/// One output a run derives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Product {
    /// Clipped composite bands of one epoch
    Composite {
        epoch: Epoch,
        bands: Vec<SpectralBand>,
        artifact: String,
        #[serde(default)]
        visualization: Option<RgbVisualization>,
    },
    /// Clipped `pre - post` difference of one index
    Change {
        index: IndexKind,
        artifact: String,
        #[serde(default)]
        preview: Option<PaletteVisualization>,
    },
}

impl Product {
    pub fn artifact(&self) -> &str {
        match self {
            Product::Composite { artifact, .. } | Product::Change { artifact, .. } => artifact,
        }
    }

    /// Name of the visualized copy, when there is one.
    pub fn visualization_artifact(&self) -> Option<String> {
        let visualized = match self {
            Product::Composite { visualization, .. } => visualization.is_some(),
            Product::Change { preview, .. } => preview.is_some(),
        };
        visualized.then(|| format!("{}_vis", self.artifact()))
    }

    fn epochs(&self) -> Vec<Epoch> {
        match self {
            Product::Composite { epoch, .. } => vec![*epoch],
            Product::Change { .. } => vec![Epoch::Pre, Epoch::Post],
        }
    }

    fn bands(&self) -> Vec<SpectralBand> {
        match self {
            Product::Composite { bands, .. } => bands.clone(),
            Product::Change { index, .. } => {
                let (a, b) = index.bands();
                vec![a, b]
            }
        }
    }
}

/// A named region and the products to derive over it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub name: String,
    pub region: Region,
    /// Artifact name of the exported region boundary
    pub boundary_artifact: String,
    pub products: Vec<Product>,
}

impl RunSpec {
    /// Every artifact name the run will store, boundary last.
    pub fn artifact_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for product in &self.products {
            names.push(product.artifact().to_string());
            names.extend(product.visualization_artifact());
        }
        names.push(self.boundary_artifact.clone());
        names
    }

    pub fn validate(&self) -> Result<()> {
        if self.products.is_empty() {
            return Err(Error::invalid_parameter(
                "products",
                &self.name,
                "a run needs at least one product",
            ));
        }

        let mut seen = HashSet::new();
        for name in self.artifact_names() {
            if name.trim().is_empty() {
                return Err(Error::invalid_parameter("artifact", &self.name, "empty artifact name"));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::invalid_parameter("artifact", name, "duplicate artifact name"));
            }
        }

        for product in &self.products {
            if let Product::Composite {
                bands,
                visualization,
                artifact,
                ..
            } = product
            {
                if bands.is_empty() {
                    return Err(Error::invalid_parameter("bands", artifact, "no bands selected"));
                }
                if let Some(vis) = visualization {
                    vis.stretch.validate()?;
                    if let Some(band) = vis.bands.iter().find(|band| !bands.contains(band)) {
                        return Err(Error::MissingBand {
                            band: *band,
                            context: format!("bands of {}", artifact),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pipeline stage a run failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validate,
    Composite,
    Index,
    Change,
    Clip,
    Visualize,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Composite => "composite",
            Stage::Index => "index",
            Stage::Change => "change",
            Stage::Clip => "clip",
            Stage::Visualize => "visualize",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: Error,
    /// Artifacts stored before an export failure that the sink could not discard
    pub orphaned: Vec<StoredArtifact>,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|error| StageFailure {
            stage,
            error,
            orphaned: Vec::new(),
        })
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub stored: Vec<StoredArtifact>,
    /// Scenes behind each composite
    pub scene_counts: Vec<(Epoch, usize)>,
    pub summaries: Vec<ChangeSummary>,
}

#[derive(Debug)]
pub struct RunReport {
    pub run: String,
    pub outcome: std::result::Result<RunOutput, StageFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    #[default]
    Concurrent,
    Sequential,
}

/// Shared context every run executes against.
pub struct Pipeline<'a> {
    source: &'a dyn RasterSource,
    sink: &'a dyn ArtifactSink,
    windows: EventWindows,
    cloud_ceiling: f32,
    export: ExportOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn RasterSource,
        sink: &'a dyn ArtifactSink,
        windows: EventWindows,
        cloud_ceiling: f32,
    ) -> Self {
        Self {
            source,
            sink,
            windows,
            cloud_ceiling,
            export: ExportOptions::default(),
        }
    }

    pub fn with_export(mut self, export: ExportOptions) -> Self {
        self.export = export;
        self
    }

    pub fn windows(&self) -> &EventWindows {
        &self.windows
    }

    /// Execute `specs`, returning one report per spec in input order.
    pub fn run_all(&self, specs: &[RunSpec], schedule: Schedule) -> Vec<RunReport> {
        let reports: Vec<RunReport> = match schedule {
            Schedule::Sequential => specs.iter().map(|spec| self.run(spec)).collect(),
            Schedule::Concurrent => {
                let (tx, rx) = flume::unbounded();
                thread::scope(|scope| {
                    for (i, spec) in specs.iter().enumerate() {
                        let tx = tx.clone();
                        scope.spawn(move || {
                            // Receiver outlives the scope
                            let _ = tx.send((i, self.run(spec)));
                        });
                    }
                });
                drop(tx);

                let mut indexed = rx.iter().collect::<Vec<_>>();
                indexed.sort_by_key(|(i, _)| *i);
                indexed.into_iter().map(|(_, report)| report).collect()
            }
        };

        for report in &reports {
            if let Some(failure) = report.failure() {
                warn!("Run {} failed at {}: {}", report.run, failure.stage, failure.error);
            }
        }
        reports
    }

    /// Execute one run. Nothing is stored unless every product derived.
    pub fn run(&self, spec: &RunSpec) -> RunReport {
        info!("Starting run {} over {}", spec.name, spec.region.name());
        let outcome = self.execute(spec);
        if let Ok(output) = &outcome {
            info!("Run {} stored {} artifacts", spec.name, output.stored.len());
        }
        RunReport {
            run: spec.name.clone(),
            outcome,
        }
    }

    fn execute(&self, spec: &RunSpec) -> std::result::Result<RunOutput, StageFailure> {
        validate_cloud_ceiling(self.cloud_ceiling).at(Stage::Validate)?;
        spec.validate().at(Stage::Validate)?;

        let composites = self.composite_epochs(spec)?;
        let scene_counts = [Epoch::Pre, Epoch::Post]
            .into_iter()
            .filter_map(|epoch| {
                composites
                    .get(&epoch)
                    .map(|composite| (epoch, composite.scene_count()))
            })
            .collect::<Vec<_>>();

        let mut staged = Vec::new();
        let mut summaries = Vec::new();
        let mut masks: HashMap<GridKey, RegionMask> = HashMap::new();

        for product in &spec.products {
            match product {
                Product::Composite {
                    epoch,
                    bands,
                    artifact,
                    visualization,
                } => {
                    let composite = &composites[epoch];
                    let raster = composite
                        .raster()
                        .and_then(|raster| raster.select(bands))
                        .at(Stage::Composite)?;
                    let mask = cached_mask(&mut masks, raster.grid(), &spec.region);
                    let clipped = raster.clip_with(mask).at(Stage::Clip)?;

                    if let Some(vis) = visualization {
                        let image = vis.render(&clipped).at(Stage::Visualize)?;
                        staged.push(Artifact::visualization(
                            format!("{}_vis", artifact),
                            format!("{} composite of {}, visualized", epoch, spec.region.name()),
                            image,
                        ));
                    }
                    staged.push(Artifact::raster(
                        artifact.clone(),
                        format!(
                            "Median composite, {} window {} ({} scenes)",
                            epoch,
                            composite.window(),
                            composite.scene_count()
                        ),
                        LabeledRaster::from(&clipped),
                    ));
                }
                Product::Change {
                    index,
                    artifact,
                    preview,
                } => {
                    let pre = compute_index(&composites[&Epoch::Pre], *index, Epoch::Pre)
                        .at(Stage::Index)?;
                    let post = compute_index(&composites[&Epoch::Post], *index, Epoch::Post)
                        .at(Stage::Index)?;
                    let change = difference(&pre, &post).at(Stage::Change)?;
                    let mask = cached_mask(&mut masks, &change.grid, &spec.region);
                    let clipped = change.clip_with(mask).at(Stage::Clip)?;

                    let summary = clipped.summarize();
                    info!(
                        "{} over {}: {} valid pixels, mean {:?}, range {:?}..{:?}",
                        clipped.kind,
                        spec.region.name(),
                        summary.valid_pixels,
                        summary.mean,
                        summary.min,
                        summary.max
                    );
                    summaries.push(summary);

                    if let Some(palette) = preview {
                        let image = palette
                            .render(&clipped.grid, &clipped.values)
                            .at(Stage::Visualize)?;
                        staged.push(Artifact::visualization(
                            format!("{}_vis", artifact),
                            format!("{} preview of {}", clipped.kind, spec.region.name()),
                            image,
                        ));
                    }
                    staged.push(Artifact::raster(
                        artifact.clone(),
                        change_description(clipped.kind, *index),
                        LabeledRaster::single(clipped.grid, clipped.kind.label(), clipped.values),
                    ));
                }
            }
        }

        let staged = staged
            .into_iter()
            .map(|artifact| crop_to_region(artifact, &spec.region))
            .collect::<Result<Vec<_>>>()
            .at(Stage::Clip)?;

        for artifact in &staged {
            self.check_size(artifact).at(Stage::Export)?;
        }

        debug!("Run {} staged {} artifacts", spec.name, staged.len());
        let boundary = Artifact::boundary(spec.boundary_artifact.clone(), spec.region.clone());
        let mut stored = Vec::with_capacity(staged.len() + 1);
        for artifact in staged.iter().chain(std::iter::once(&boundary)) {
            match self.sink.store(artifact, &self.export) {
                Ok(location) => {
                    debug!("Stored {} at {}", location.name, location.location);
                    stored.push(location);
                }
                Err(error) => {
                    warn!(
                        "Run {} failed to store {}; discarding {} stored artifacts",
                        spec.name,
                        artifact.name,
                        stored.len()
                    );
                    return Err(StageFailure {
                        stage: Stage::Export,
                        error,
                        orphaned: self.discard_all(stored),
                    });
                }
            }
        }

        Ok(RunOutput {
            stored,
            scene_counts,
            summaries,
        })
    }

    /// Composite each epoch the run needs, once, with the union of required bands.
    fn composite_epochs(
        &self,
        spec: &RunSpec,
    ) -> std::result::Result<HashMap<Epoch, Composite>, StageFailure> {
        let epochs = spec
            .products
            .iter()
            .flat_map(|product| product.epochs())
            .collect::<HashSet<_>>();
        let bands = spec
            .products
            .iter()
            .flat_map(|product| product.bands())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let compositor = TemporalCompositor::new(self.source).with_bands(&bands);
        let mut composites = HashMap::new();
        for epoch in [Epoch::Pre, Epoch::Post] {
            if !epochs.contains(&epoch) {
                continue;
            }
            let window = self.windows.window(epoch);
            info!("Compositing {} window {} for {}", epoch, window, spec.name);
            let composite = compositor
                .composite(window, &spec.region, self.cloud_ceiling)
                .at(Stage::Composite)?;
            // An empty composite aborts the run here rather than at first use
            composite.raster().at(Stage::Composite)?;
            composites.insert(epoch, composite);
        }
        Ok(composites)
    }

    /// Discard `stored`, newest first; returns the artifacts the sink kept.
    fn discard_all(&self, stored: Vec<StoredArtifact>) -> Vec<StoredArtifact> {
        stored
            .into_iter()
            .rev()
            .filter(|artifact| match self.sink.discard(artifact, &self.export) {
                Ok(()) => false,
                Err(e) => {
                    warn!("Could not discard {}: {}", artifact.name, e);
                    true
                }
            })
            .collect()
    }

    fn check_size(&self, artifact: &Artifact) -> Result<()> {
        match artifact.pixel_count() {
            Some(pixels) if pixels > self.export.max_pixels => Err(Error::ExportTooLarge {
                name: artifact.name.clone(),
                pixels,
                max_pixels: self.export.max_pixels,
            }),
            _ => Ok(()),
        }
    }
}

/// Dimensions plus the exact bits of every geotransform coefficient.
type GridKey = (usize, usize, [u64; 6]);

fn grid_key(grid: &GridSpec) -> GridKey {
    (grid.width, grid.height, grid.geo_transform.map(f64::to_bits))
}

fn cached_mask<'m>(
    masks: &'m mut HashMap<GridKey, RegionMask>,
    grid: &GridSpec,
    region: &Region,
) -> &'m RegionMask {
    masks
        .entry(grid_key(grid))
        .or_insert_with(|| RegionMask::new(grid, region))
}

fn change_description(kind: ChangeKind, index: IndexKind) -> String {
    format!(
        "{} = pre-event {} - post-event {}; positive values indicate loss",
        kind, index, index
    )
}

/// Crop raster payloads to the pixel window of the region's bounding box.
fn crop_to_region(artifact: Artifact, region: &Region) -> Result<Artifact> {
    let payload = match artifact.payload {
        ArtifactPayload::Raster(raster) => {
            let window = export_window(&raster.grid, region)?;
            ArtifactPayload::Raster(LabeledRaster {
                grid: raster.grid.sub_grid(&window),
                bands: raster
                    .bands
                    .iter()
                    .map(|(label, band)| (label.clone(), band.crop(&window)))
                    .collect(),
            })
        }
        ArtifactPayload::Visualization(image) => {
            let window = export_window(&image.grid, region)?;
            ArtifactPayload::Visualization(image.crop(&window))
        }
        boundary @ ArtifactPayload::Boundary(_) => boundary,
    };
    Ok(Artifact { payload, ..artifact })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_cache_separates_rotated_grids() {
        let region = Region::rectangle("box", 0.0, 0.0, 2.0, 2.0).unwrap();
        let north_up = GridSpec::north_up(4, 4, 0.0, 4.0, 1.0, 1.0);
        let mut rotated = north_up;
        rotated.geo_transform[2] = 0.25;

        let mut masks = HashMap::new();
        let first = cached_mask(&mut masks, &north_up, &region).clone();
        let second = cached_mask(&mut masks, &rotated, &region).clone();
        assert_eq!(masks.len(), 2);
        assert_eq!(first.grid(), &north_up);
        assert_eq!(second.grid(), &rotated);

        cached_mask(&mut masks, &north_up, &region);
        assert_eq!(masks.len(), 2);
    }
}
