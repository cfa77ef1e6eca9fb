//! In-process parcel store backed by an R-tree.

use anyhow::Result;
use async_trait::async_trait;
use rstar::{RTree, RTreeObject, AABB};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ProximityQuery, Warehouse};
use crate::models::{ParcelDoc, RankKey};
use crate::postprocess::RawRow;

/// Metres per degree of latitude on the mean-radius sphere
const METERS_PER_DEGREE: f64 = 111_195.0;

/// Wrapper for R-tree indexing of parcels
#[derive(Clone)]
struct IndexedParcel {
    parcel: Arc<ParcelDoc>,
    point: [f64; 2],
}

impl RTreeObject for IndexedParcel {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Parcel warehouse held in memory.
///
/// Candidates come from an envelope query around the origin; exact filtering
/// uses haversine distance.
pub struct MemoryWarehouse {
    tree: RTree<IndexedParcel>,
}

impl MemoryWarehouse {
    /// Build spatial index from parcels
    pub fn build(parcels: Vec<ParcelDoc>) -> Self {
        let indexed: Vec<IndexedParcel> = parcels
            .into_iter()
            .filter(|p| p.location.lat.is_finite() && p.location.lon.is_finite())
            .map(|p| IndexedParcel {
                point: [p.location.lon, p.location.lat],
                parcel: Arc::new(p),
            })
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("In-memory parcel index built with {} entries", tree.size());
        Self { tree }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Degree envelopes that together contain every point within the bound.
    ///
    /// A circle crossing the antimeridian is split in two; one reaching a pole
    /// covers every longitude.
    fn search_envelopes(query: &ProximityQuery) -> Vec<AABB<[f64; 2]>> {
        // 5% slack over the spherical approximation
        let lat_delta = query.bound_m / METERS_PER_DEGREE * 1.05;
        let min_lat = (query.origin.lat - lat_delta).max(-90.0);
        let max_lat = (query.origin.lat + lat_delta).min(90.0);

        // Longitude degrees are shortest at the poleward edge
        let edge_lat = min_lat.abs().max(max_lat.abs());
        let cos_lat = edge_lat.to_radians().cos();
        if min_lat <= -90.0 || max_lat >= 90.0 || cos_lat <= 1e-9 {
            return vec![AABB::from_corners([-180.0, min_lat], [180.0, max_lat])];
        }

        let lon_delta = lat_delta / cos_lat;
        if lon_delta >= 180.0 {
            return vec![AABB::from_corners([-180.0, min_lat], [180.0, max_lat])];
        }

        let west = query.origin.lon - lon_delta;
        let east = query.origin.lon + lon_delta;
        if west < -180.0 {
            vec![
                AABB::from_corners([west + 360.0, min_lat], [180.0, max_lat]),
                AABB::from_corners([-180.0, min_lat], [east, max_lat]),
            ]
        } else if east > 180.0 {
            vec![
                AABB::from_corners([west, min_lat], [180.0, max_lat]),
                AABB::from_corners([-180.0, min_lat], [east - 360.0, max_lat]),
            ]
        } else {
            vec![AABB::from_corners([west, min_lat], [east, max_lat])]
        }
    }

    /// Evaluate the query in process
    pub fn run(&self, query: &ProximityQuery) -> Vec<RawRow> {
        if query.is_unsatisfiable() {
            return Vec::new();
        }

        let envelopes = Self::search_envelopes(query);
        let mut hits: Vec<(f64, &ParcelDoc)> = envelopes
            .iter()
            .flat_map(|envelope| self.tree.locate_in_envelope(envelope))
            .map(|ip| ip.parcel.as_ref())
            .filter(|p| p.partisanship_range == query.band)
            .filter(|p| query.category.admits(p.category))
            .filter(|p| {
                query
                    .region
                    .as_ref()
                    .map_or(true, |region| region.contains(&p.location))
            })
            .map(|p| (query.origin.distance_m(&p.location), p))
            .filter(|(distance, _)| *distance <= query.bound_m)
            .collect();

        hits.sort_by(|(da, a), (db, b)| {
            RankKey::new(*da, &a.address, a.unit.as_deref())
                .cmp(&RankKey::new(*db, &b.address, b.unit.as_deref()))
        });
        hits.truncate(query.limit);

        debug!(
            "In-memory search within {}m returned {} rows",
            query.bound_m,
            hits.len()
        );

        hits.into_iter()
            .map(|(distance, p)| RawRow {
                unit_acct_id: json!(p.unit_acct_id),
                lat: json!(p.location.lat),
                lon: json!(p.location.lon),
                address: json!(p.address),
                unit_type: json!(p.unit_type),
                unit: json!(p.unit),
                city: json!(p.city),
                zip: json!(p.zip),
                distance_m: json!(distance),
            })
            .collect()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch(&self, query: &ProximityQuery) -> Result<Vec<RawRow>> {
        Ok(self.run(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use crate::search::CategoryFilter;

    fn parcel(id: &str, lat: f64, lon: f64, unit: Option<&str>, band: &str) -> ParcelDoc {
        ParcelDoc::new(
            id.to_string(),
            GeoPoint::new(lat, lon),
            format!("{} DART ST", id),
            unit.map(|_| "APT".to_string()),
            unit.map(String::from),
            "HOUSTON".to_string(),
            "77007".to_string(),
            band.to_string(),
            "test.csv",
        )
    }

    fn origin() -> GeoPoint {
        GeoPoint::new(29.7700, -95.3900)
    }

    #[test]
    fn test_band_and_bound_filters() {
        let store = MemoryWarehouse::build(vec![
            parcel("100", 29.7701, -95.3900, None, "70-100"),
            parcel("200", 29.7701, -95.3901, None, "30-70"),
            parcel("300", 29.8000, -95.3900, None, "70-100"),
        ]);
        let rows = store.run(&ProximityQuery::new(origin(), 802.0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unit_acct_id, "100");
    }

    #[test]
    fn test_category_filter_drops_rows() {
        let store = MemoryWarehouse::build(vec![
            parcel("100", 29.7701, -95.3900, None, "70-100"),
            parcel("200", 29.7702, -95.3900, Some("4"), "70-100"),
        ]);
        let q = ProximityQuery::new(origin(), 802.0).with_category(CategoryFilter::MultiUnit);
        let rows = store.run(&q);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unit, "4");
    }

    #[test]
    fn test_limit_keeps_nearest() {
        let parcels = (0..80)
            .map(|i| parcel(&format!("{:03}", i), 29.7700 + i as f64 * 0.00005, -95.39, None, "70-100"))
            .collect();
        let store = MemoryWarehouse::build(parcels);
        let rows = store.run(&ProximityQuery::new(origin(), 5_000.0));
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0].unit_acct_id, "000");
        assert_eq!(rows[49].unit_acct_id, "049");
    }

    #[test]
    fn test_zero_bound_is_empty() {
        let store = MemoryWarehouse::build(vec![parcel("100", 29.77, -95.39, None, "70-100")]);
        assert!(store.run(&ProximityQuery::new(origin(), 0.0)).is_empty());
    }

    #[test]
    fn test_envelope_covers_bound_at_high_latitude() {
        // At 60N a degree of longitude is half as long; the envelope must widen.
        let far_north = GeoPoint::new(60.0, 10.0);
        let east = GeoPoint::new(60.0, 10.0 + 1_000.0 / (METERS_PER_DEGREE * 0.5) * 0.99);
        assert!(far_north.distance_m(&east) <= 1_000.0);

        let store = MemoryWarehouse::build(vec![parcel("100", east.lat, east.lon, None, "70-100")]);
        assert_eq!(store.run(&ProximityQuery::new(far_north, 1_000.0)).len(), 1);
    }

    #[test]
    fn test_bound_across_antimeridian() {
        let west_of_line = GeoPoint::new(-17.0, 179.999);
        let store = MemoryWarehouse::build(vec![
            parcel("100", -17.0, -179.999, None, "70-100"),
            parcel("200", -17.0, 179.0, None, "70-100"),
        ]);
        let rows = store.run(&ProximityQuery::new(west_of_line, 802.0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unit_acct_id, "100");
    }

    #[test]
    fn test_bound_over_pole() {
        let near_pole = GeoPoint::new(89.999, 0.0);
        let store = MemoryWarehouse::build(vec![parcel("100", 89.999, 180.0, None, "70-100")]);
        assert_eq!(store.run(&ProximityQuery::new(near_pole, 802.0)).len(), 1);
    }
}
