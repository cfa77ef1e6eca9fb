//! Origin point of a canvassing search.

use geo::{Distance, Haversine};
use geo_types::Point;
use serde::{Deserialize, Serialize};

/// Geographic point (lat/lon)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in metres on the mean-radius sphere.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(self.to_point(), other.to_point())
    }

    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// The geocoded starting location plus the raw input it came from.
///
/// Created once per submission and dropped with the request.
#[derive(Debug, Clone, Serialize)]
pub struct OriginPoint {
    pub point: GeoPoint,
    pub street: String,
    pub city: String,
    pub zip: String,
    /// Free-text address sent to the geocoder; used as the display label.
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_great_circle() {
        // One degree of latitude on the mean sphere is ~111.2 km.
        let a = GeoPoint::new(29.0, -95.0);
        let b = GeoPoint::new(30.0, -95.0);
        let d = a.distance_m(&b);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = GeoPoint::new(29.7604, -95.3698);
        assert_eq!(a.distance_m(&a), 0.0);
    }
}
