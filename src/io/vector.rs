// src/io/vector.rs
//! Region boundaries as vector interchange documents.

use serde_json::json;

use super::artifact::VectorFormat;
use crate::error::Result;
use crate::geometry::Region;

pub fn encode_region(region: &Region, name: &str, description: &str, format: VectorFormat) -> Result<String> {
    match format {
        VectorFormat::Kml => Ok(region_to_kml(region, name, description)),
        VectorFormat::GeoJson => region_to_geojson(region, name, description),
    }
}

/// KML document with one placemark holding the region polygon.
pub fn region_to_kml(region: &Region, name: &str, description: &str) -> String {
    let coordinates = region
        .vertices()
        .iter()
        .map(|(lon, lat)| format!("{},{}", lon, lat))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>{name}</name>
    <Placemark>
      <name>{region}</name>
      <description>{description}</description>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing>
            <coordinates>{coordinates}</coordinates>
          </LinearRing>
        </outerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>
"#,
        name = escape_xml(name),
        region = escape_xml(region.name()),
        description = escape_xml(description),
        coordinates = coordinates,
    )
}

/// GeoJSON FeatureCollection with one polygon feature.
pub fn region_to_geojson(region: &Region, name: &str, description: &str) -> Result<String> {
    let ring = region
        .vertices()
        .iter()
        .map(|(lon, lat)| [*lon, *lat])
        .collect::<Vec<_>>();
    let document = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {
                "name": name,
                "region": region.name(),
                "description": description,
            },
            "geometry": {
                "type": "Polygon",
                "coordinates": [ring],
            },
        }],
    });
    Ok(serde_json::to_string_pretty(&document)?)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kml_ring() {
        let region = Region::rectangle("Urban", 0.0, 0.0, 1.0, 2.0).unwrap();
        let kml = region_to_kml(&region, "LA_UrbanBoundary", "Boundary of Urban");
        assert!(kml.contains("<name>LA_UrbanBoundary</name>"));
        assert!(kml.contains("<coordinates>0,0 "));
    }

    #[test]
    fn test_geojson_polygon() {
        let region = Region::rectangle("Main", 0.0, 0.0, 1.0, 1.0).unwrap();
        let text = region_to_geojson(&region, "LA_MainBoundary", "Boundary of Main").unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let ring = &value["features"][0]["geometry"]["coordinates"][0];
        assert_eq!(ring.as_array().unwrap().len(), 5);
        assert_eq!(ring[0], ring[4]);
    }
}
