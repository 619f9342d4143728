// src/processing/mod.rs
pub mod change;
pub mod clip;
pub mod compositor;
pub mod indices;
pub mod pipeline;
pub mod visualize;

// Re-export main components
pub use change::{difference, BurnSeverityClass, ChangeKind, ChangeRaster, ChangeSummary};
pub use clip::{clip, export_window, Clip, RegionMask};
pub use compositor::{median_composite, Composite, TemporalCompositor};
pub use indices::{
    burn_index, compute_index, normalized_index, vegetation_index, IndexCalculator, IndexKind,
    IndexRaster, NormalizedDifference, NormalizedRaster,
};
pub use pipeline::{Pipeline, Product, RunOutput, RunReport, RunSpec, Schedule, Stage, StageFailure};
pub use visualize::{Color, PaletteVisualization, RgbVisualization, RgbaImage, Stretch};
