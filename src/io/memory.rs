// src/io/memory.rs
//! In-process source and sink, for tests and for embedding the pipeline.

use log::debug;
use parking_lot::Mutex;

use super::{Artifact, ArtifactSink, ExportOptions, RasterSource, SceneQuery, StoredArtifact};
use crate::error::Result;
use crate::raster::RasterScene;

/// Serves scenes held in memory, filtered exactly like a remote source would.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    scenes: Vec<RasterScene>,
}

impl MemorySource {
    pub fn new(scenes: Vec<RasterScene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: RasterScene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl RasterSource for MemorySource {
    fn query(&self, query: &SceneQuery<'_>) -> Result<Vec<RasterScene>> {
        let scenes = self
            .scenes
            .iter()
            .filter(|scene| query.matches(scene))
            .cloned()
            .collect::<Vec<_>>();
        debug!("Memory source matched {} of {} scenes", scenes.len(), self.scenes.len());
        Ok(scenes)
    }
}

/// Keeps every stored artifact, in store order.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<Vec<(Artifact, ExportOptions)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of stored artifacts, in store order.
    pub fn names(&self) -> Vec<String> {
        self.stored
            .lock()
            .iter()
            .map(|(artifact, _)| artifact.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Artifact> {
        self.stored
            .lock()
            .iter()
            .find(|(artifact, _)| artifact.name == name)
            .map(|(artifact, _)| artifact.clone())
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.stored
            .lock()
            .iter()
            .map(|(artifact, _)| artifact.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.lock().is_empty()
    }
}

impl ArtifactSink for MemorySink {
    fn store(&self, artifact: &Artifact, options: &ExportOptions) -> Result<StoredArtifact> {
        let location = format!("memory://{}/{}", options.destination, artifact.name);
        self.stored.lock().push((artifact.clone(), options.clone()));
        Ok(StoredArtifact {
            name: artifact.name.clone(),
            location,
        })
    }

    fn discard(&self, stored: &StoredArtifact, options: &ExportOptions) -> Result<()> {
        self.stored.lock().retain(|(artifact, kept_options)| {
            artifact.name != stored.name || kept_options.destination != options.destination
        });
        Ok(())
    }
}
