//! GeoJSON boundary parsing.

use anyhow::{bail, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJson {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
    Feature {
        geometry: Option<Box<GeoJson>>,
        #[serde(default)]
        properties: Option<serde_json::Value>,
    },
    FeatureCollection {
        features: Vec<GeoJson>,
    },
}

/// Parse a boundary from GeoJSON text.
///
/// For a FeatureCollection, features whose `name` property equals `name` are
/// used when present; otherwise every polygon in the collection is.
pub fn parse_geojson_boundary(content: &str, name: Option<&str>) -> Result<MultiPolygon<f64>> {
    let doc: GeoJson = serde_json::from_str(content)?;

    let mut polygons = Vec::new();
    match doc {
        GeoJson::FeatureCollection { features } => {
            let named: Vec<&GeoJson> = features
                .iter()
                .filter(|f| feature_name(f).is_some() && feature_name(f) == name)
                .collect();
            if named.is_empty() {
                for feature in &features {
                    collect_polygons(feature, &mut polygons)?;
                }
            } else {
                debug!("Using {} feature(s) named {:?}", named.len(), name);
                for feature in named {
                    collect_polygons(feature, &mut polygons)?;
                }
            }
        }
        other => collect_polygons(&other, &mut polygons)?,
    }

    if polygons.is_empty() {
        bail!("No polygon geometry found");
    }
    Ok(MultiPolygon::new(polygons))
}

fn feature_name(feature: &GeoJson) -> Option<&str> {
    match feature {
        GeoJson::Feature {
            properties: Some(props),
            ..
        } => props.get("name").and_then(|v| v.as_str()),
        _ => None,
    }
}

fn collect_polygons(doc: &GeoJson, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match doc {
        GeoJson::Polygon { coordinates } => out.push(to_polygon(coordinates)?),
        GeoJson::MultiPolygon { coordinates } => {
            for rings in coordinates {
                out.push(to_polygon(rings)?);
            }
        }
        GeoJson::Feature { geometry, .. } => {
            if let Some(geometry) = geometry {
                collect_polygons(geometry, out)?;
            }
        }
        GeoJson::FeatureCollection { features } => {
            for feature in features {
                collect_polygons(feature, out)?;
            }
        }
    }
    Ok(())
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| to_line_string(ring));
    let Some(exterior) = rings.next() else {
        bail!("Polygon without rings");
    };
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior?, interiors))
}

fn to_line_string(ring: &[Vec<f64>]) -> Result<LineString<f64>> {
    let coords = ring
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => bail!("Position needs at least two values"),
        })
        .collect::<Result<Vec<_>>>()?;
    // Polygon::new closes open rings
    Ok(LineString::new(coords))
}
