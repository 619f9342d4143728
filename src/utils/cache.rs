// src/utils/cache.rs
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::raster::{BandBuffer, GridSpec};

pub type CachedBand = Arc<(GridSpec, BandBuffer)>;

/// Bands kept by [`BandCache::new`]: six bands for ten scenes and a few spare.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

#[derive(Default)]
struct Entries {
    bands: HashMap<PathBuf, CachedBand>,
    /// Least recently used first
    order: VecDeque<PathBuf>,
}

impl Entries {
    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.order.iter().position(|p| p == path) {
            if let Some(entry) = self.order.remove(pos) {
                self.order.push_back(entry);
            }
        }
    }
}

/// Thread-safe cache of decoded bands, keyed by file path. Holds at most
/// `capacity` bands and evicts the least recently used one beyond that.
pub struct BandCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for BandCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BandCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// A capacity of zero disables caching.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached band for `path`, decoding it with `load` on a miss.
    ///
    /// The lock is not held while loading; concurrent misses on one path may
    /// both decode, and the first insert wins.
    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<CachedBand>
    where
        F: FnOnce(&Path) -> Result<(GridSpec, BandBuffer)>,
    {
        {
            let mut entries = self.entries.lock();
            if let Some(band) = entries.bands.get(path).cloned() {
                entries.touch(path);
                return Ok(band);
            }
        }

        let band = Arc::new(load(path)?);
        if self.capacity == 0 {
            return Ok(band);
        }

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.bands.get(path).cloned() {
            entries.touch(path);
            return Ok(existing);
        }
        while entries.bands.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.bands.remove(&oldest);
        }
        entries.bands.insert(path.to_path_buf(), Arc::clone(&band));
        entries.order.push_back(path.to_path_buf());
        Ok(band)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.bands.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().bands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn loader(loads: &AtomicUsize) -> impl Fn(&Path) -> Result<(GridSpec, BandBuffer)> + '_ {
        move |_| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok((
                GridSpec::north_up(1, 1, 0.0, 1.0, 1.0, 1.0),
                BandBuffer::filled((1, 1), 1.0),
            ))
        }
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let loads = AtomicUsize::new(0);
        let cache = BandCache::with_capacity(2);
        let (a, b, c) = (Path::new("a.tif"), Path::new("b.tif"), Path::new("c.tif"));

        cache.get_or_load(a, loader(&loads)).unwrap();
        cache.get_or_load(b, loader(&loads)).unwrap();
        // Touch a so b becomes the oldest
        cache.get_or_load(a, loader(&loads)).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        cache.get_or_load(c, loader(&loads)).unwrap();
        assert_eq!(cache.len(), 2);

        cache.get_or_load(a, loader(&loads)).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        cache.get_or_load(b, loader(&loads)).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 4);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let loads = AtomicUsize::new(0);
        let cache = BandCache::with_capacity(0);
        cache.get_or_load(Path::new("a.tif"), loader(&loads)).unwrap();
        cache.get_or_load(Path::new("a.tif"), loader(&loads)).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}
