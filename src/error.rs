// src/error.rs
use thiserror::Error;

use crate::raster::{GridSpec, SpectralBand};
use crate::temporal::TimeWindow;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the change-detection pipeline.
///
/// Per-pixel division singularities are not represented here: the index engine
/// marks those pixels as no data and carries on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no scenes matched {window} with cloud cover below {cloud_ceiling}%")]
    EmptyComposite {
        window: TimeWindow,
        cloud_ceiling: f32,
    },

    #[error("grid mismatch: {left} vs {right}")]
    GridMismatch { left: GridSpec, right: GridSpec },

    #[error("band {band} missing from {context}")]
    MissingBand { band: SpectralBand, context: String },

    #[error("raster source unavailable: {context}")]
    SourceUnavailable {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("artifact sink unavailable: {context}")]
    SinkUnavailable {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid region {name}: {reason}")]
    InvalidRegion { name: String, reason: String },

    #[error("invalid time window: {start} must precede {end}")]
    InvalidWindow {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("export of {name} needs {pixels} pixels, above the ceiling of {max_pixels}")]
    ExportTooLarge {
        name: String,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn source_unavailable(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::SourceUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn sink_unavailable(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::SinkUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the "widen the window or relax the ceiling" condition.
    pub fn is_empty_composite(&self) -> bool {
        matches!(self, Error::EmptyComposite { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
