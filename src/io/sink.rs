// src/io/sink.rs
//! Artifact sink writing GeoTIFFs, boundary vectors and JSON sidecars.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::artifact::{Artifact, ArtifactPayload, ExportOptions, StoredArtifact, VectorFormat};
use super::vector::encode_region;
use super::writer::{write_raster, write_rgba, RasterEncoding};
use super::ArtifactSink;
use crate::error::{Error, Result};
use crate::raster::{GridSpec, NODATA};
use crate::utils::fixed_point::FIXED_POINT_NODATA;

/// Writes artifacts under `<root>/<destination>/`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

/// Metadata written next to every artifact as `<name>.json`.
#[derive(Serialize, Debug)]
struct Sidecar<'a> {
    name: &'a str,
    description: &'a str,
    destination: &'a str,
    format: &'static str,
    files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    grid: Option<GridSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bands: Vec<String>,
    scale: f64,
    max_pixels: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodata: Option<f64>,
    /// Multiply stored integers by this to recover values
    #[serde(skip_serializing_if = "Option::is_none")]
    value_scale: Option<f64>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the payload files, recording each one in `files` before it is written.
    fn write_payload<'a>(
        &self,
        dir: &Path,
        artifact: &'a Artifact,
        options: &'a ExportOptions,
        files: &mut Vec<String>,
    ) -> Result<Sidecar<'a>> {
        let sidecar = match &artifact.payload {
            ArtifactPayload::Raster(raster) => {
                let encoding = if options.fixed_point {
                    RasterEncoding::FixedPoint {
                        scale_factor: options.scale_factor,
                    }
                } else {
                    RasterEncoding::Float32
                };
                for (label, band) in &raster.bands {
                    let file = if raster.bands.len() == 1 {
                        format!("{}.tif", artifact.name)
                    } else {
                        format!("{}_{}.tif", artifact.name, label)
                    };
                    files.push(file.clone());
                    write_raster(&dir.join(&file), &raster.grid, band, encoding)?;
                }
                Sidecar {
                    format: if options.fixed_point { "GTiff/Int16" } else { "GTiff/Float32" },
                    grid: Some(raster.grid),
                    bands: raster.bands.iter().map(|(label, _)| label.clone()).collect(),
                    nodata: Some(if options.fixed_point {
                        FIXED_POINT_NODATA as f64
                    } else {
                        NODATA as f64
                    }),
                    value_scale: options
                        .fixed_point
                        .then(|| 1.0 / options.scale_factor as f64),
                    ..Sidecar::new(artifact, options, files.clone())
                }
            }
            ArtifactPayload::Visualization(image) => {
                let file = format!("{}.tif", artifact.name);
                files.push(file.clone());
                write_rgba(&dir.join(&file), image)?;
                Sidecar {
                    format: "GTiff/RGBA8",
                    grid: Some(image.grid),
                    bands: ["R", "G", "B", "A"].iter().map(|b| b.to_string()).collect(),
                    ..Sidecar::new(artifact, options, files.clone())
                }
            }
            ArtifactPayload::Boundary(region) => {
                let file = format!("{}.{}", artifact.name, options.vector_format.extension());
                let document = encode_region(region, &artifact.name, &artifact.description, options.vector_format)?;
                files.push(file.clone());
                fs::write(dir.join(&file), document)
                    .map_err(|e| Error::sink_unavailable(format!("writing {}", file), e))?;
                Sidecar {
                    format: match options.vector_format {
                        VectorFormat::Kml => "KML",
                        VectorFormat::GeoJson => "GeoJSON",
                    },
                    ..Sidecar::new(artifact, options, files.clone())
                }
            }
        };
        Ok(sidecar)
    }
}

impl<'a> Sidecar<'a> {
    fn new(artifact: &'a Artifact, options: &'a ExportOptions, files: Vec<String>) -> Self {
        Sidecar {
            name: &artifact.name,
            description: &artifact.description,
            destination: &options.destination,
            format: "",
            files,
            grid: None,
            bands: Vec::new(),
            scale: options.scale,
            max_pixels: options.max_pixels,
            nodata: None,
            value_scale: None,
        }
    }
}

impl ArtifactSink for DirectorySink {
    fn store(&self, artifact: &Artifact, options: &ExportOptions) -> Result<StoredArtifact> {
        let dir = self.root.join(&options.destination);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::sink_unavailable(format!("creating {}", dir.display()), e))?;

        let mut files = Vec::new();
        let sidecar_path = dir.join(format!("{}.json", artifact.name));
        let written = self
            .write_payload(&dir, artifact, options, &mut files)
            .and_then(|sidecar| {
                let json = serde_json::to_string_pretty(&sidecar)?;
                fs::write(&sidecar_path, json).map_err(|e| {
                    Error::sink_unavailable(format!("writing {}", sidecar_path.display()), e)
                })?;
                Ok(sidecar)
            });
        let sidecar = match written {
            Ok(sidecar) => sidecar,
            Err(err) => {
                // Leave no half-written artifact behind
                remove_files(&dir, &files)?;
                return Err(err);
            }
        };

        debug!("Sidecar for {} at {}", artifact.name, sidecar_path.display());
        let location = sidecar
            .files
            .first()
            .map_or_else(|| sidecar_path.clone(), |file| dir.join(file));
        info!("Exported {} to {}", artifact.name, location.display());
        Ok(StoredArtifact {
            name: artifact.name.clone(),
            location: location.display().to_string(),
        })
    }

    /// Remove the files listed in the artifact's sidecar, then the sidecar.
    fn discard(&self, stored: &StoredArtifact, options: &ExportOptions) -> Result<()> {
        let dir = self.root.join(&options.destination);
        let sidecar_path = dir.join(format!("{}.json", stored.name));
        let context = || format!("discarding {}", sidecar_path.display());

        let json = match fs::read_to_string(&sidecar_path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::sink_unavailable(context(), e)),
        };
        let listed: SidecarFiles =
            serde_json::from_str(&json).map_err(|e| Error::sink_unavailable(context(), e))?;
        remove_files(&dir, &listed.files)?;
        remove_files(&dir, &[format!("{}.json", stored.name)])?;
        info!("Discarded {} from {}", stored.name, dir.display());
        Ok(())
    }
}

/// The part of a sidecar needed to find an artifact's files again.
#[derive(Deserialize)]
struct SidecarFiles {
    files: Vec<String>,
}

/// Delete `files` under `dir`; files that are already gone are fine.
fn remove_files(dir: &Path, files: &[String]) -> Result<()> {
    for file in files {
        let path = dir.join(file);
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::sink_unavailable(format!("removing {}", path.display()), e))
            }
        }
    }
    Ok(())
}
