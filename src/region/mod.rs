//! Named administrative region used to restrict a proximity search.
//!
//! Parcels must fall inside the region polygon before distance filtering.

mod boundary;

pub use boundary::parse_geojson_boundary;

use anyhow::{Context, Result};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

use crate::models::GeoPoint;

/// A region boundary polygon with its name
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(name: &str, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.to_string(),
            geometry,
        }
    }

    /// Load a region from a GeoJSON file (geometry, feature or collection)
    pub fn load<P: AsRef<Path>>(name: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read region file {}", path.display()))?;
        let geometry = parse_geojson_boundary(&content, Some(name))
            .with_context(|| format!("Failed to parse region file {}", path.display()))?;

        let region = Self::new(name, geometry);
        info!(
            "Loaded region '{}' with {} polygon(s), bbox {:?}",
            region.name,
            region.geometry.0.len(),
            region.bbox()
        );
        Ok(region)
    }

    /// Get the bounding box of this region
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.geometry.contains(&Point::new(point.lon, point.lat))
    }

    /// GeoJSON MultiPolygon for an Elasticsearch `geo_shape` filter
    pub fn to_geojson(&self) -> Value {
        let polygons: Vec<Value> = self
            .geometry
            .0
            .iter()
            .map(|polygon| {
                let rings: Vec<Value> = std::iter::once(polygon.exterior())
                    .chain(polygon.interiors().iter())
                    .map(|ring| {
                        Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
                    })
                    .collect();
                Value::Array(rings)
            })
            .collect();

        json!({
            "type": "MultiPolygon",
            "coordinates": polygons
        })
    }
}
