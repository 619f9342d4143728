// src/geometry.rs
use geo::{Area, Intersects, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis-aligned bounding box in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

/// Closed polygon of (longitude, latitude) vertices used as a spatial filter
/// and as a clip mask. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    name: String,
    vertices: Vec<(f64, f64)>,
    polygon: Polygon<f64>,
    bbox: BoundingBox,
}

impl Region {
    /// Validate and build a region. The ring must be explicitly closed.
    pub fn new(name: impl Into<String>, vertices: Vec<(f64, f64)>) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| Error::InvalidRegion {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if vertices.len() < 4 {
            return Err(invalid("a closed polygon needs at least four vertices"));
        }
        if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(invalid("vertices must be finite"));
        }
        if vertices.first() != vertices.last() {
            return Err(invalid("first and last vertex must coincide"));
        }

        let polygon = Polygon::new(LineString::from(vertices.clone()), vec![]);
        if polygon.unsigned_area() <= 0.0 {
            return Err(invalid("polygon has zero area"));
        }

        let mut bbox = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for &(x, y) in &vertices {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }

        Ok(Self {
            name,
            vertices,
            polygon,
            bbox,
        })
    }

    /// Closed axis-aligned rectangle.
    pub fn rectangle(
        name: impl Into<String>,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Self> {
        Self::new(
            name,
            vec![
                (min_lon, min_lat),
                (max_lon, min_lat),
                (max_lon, max_lat),
                (min_lon, max_lat),
                (min_lon, min_lat),
            ],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Point test, boundary inclusive.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.polygon.intersects(&Point::new(lon, lat))
    }

    pub fn intersects_bbox(&self, other: &BoundingBox) -> bool {
        self.bbox.intersects(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_contains() {
        let region = Region::rectangle("box", 0.0, 0.0, 2.0, 1.0).unwrap();
        assert!(region.contains(1.0, 0.5));
        assert!(region.contains(2.0, 0.5));
        assert!(!region.contains(2.5, 0.5));
        assert_eq!(region.bbox(), &BoundingBox::new(0.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn test_open_ring_rejected() {
        let err = Region::new("open", vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRegion { .. }));
    }

    #[test]
    fn test_degenerate_rejected() {
        let line = vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 0.0)];
        assert!(Region::new("line", line).is_err());
        assert!(Region::new("short", vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).is_err());
        let nan = vec![(0.0, 0.0), (f64::NAN, 0.0), (1.0, 1.0), (0.0, 0.0)];
        assert!(Region::new("nan", nan).is_err());
    }

    #[test]
    fn test_triangle() {
        let tri = Region::new("tri", vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (0.0, 0.0)]).unwrap();
        assert!(tri.contains(1.0, 1.0));
        assert!(!tri.contains(3.0, 3.0));
    }
}
