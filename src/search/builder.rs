//! Proximity query object and its Elasticsearch rendering.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{GeoPoint, UnitCategory};
use crate::region::Region;

/// Default result cap
pub const DEFAULT_LIMIT: usize = 50;

/// Default qualifying-score band
pub const DEFAULT_BAND: &str = "70-100";

/// Which housing categories to keep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryFilter {
    SingleFamily,
    MultiUnit,
    #[default]
    Both,
}

impl CategoryFilter {
    pub fn admits(&self, category: UnitCategory) -> bool {
        match self {
            CategoryFilter::Both => true,
            CategoryFilter::SingleFamily => category == UnitCategory::SingleFamily,
            CategoryFilter::MultiUnit => category == UnitCategory::MultiUnit,
        }
    }

    /// The single category to filter on, if any
    pub fn only(&self) -> Option<UnitCategory> {
        match self {
            CategoryFilter::Both => None,
            CategoryFilter::SingleFamily => Some(UnitCategory::SingleFamily),
            CategoryFilter::MultiUnit => Some(UnitCategory::MultiUnit),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-family" | "single_family" | "single" => Ok(CategoryFilter::SingleFamily),
            "multi-unit" | "multi_unit" | "multi" => Ok(CategoryFilter::MultiUnit),
            "both" | "" => Ok(CategoryFilter::Both),
            other => Err(format!("unknown category filter '{}'", other)),
        }
    }
}

/// Fields fetched from the parcel index
const SOURCE_FIELDS: &[&str] = &[
    "unit_acct_id",
    "location",
    "address",
    "unit_type",
    "unit",
    "city",
    "zip",
];

/// Proximity search over qualifying parcels.
///
/// All values are typed fields; backends render them into structured request
/// bodies rather than query text.
#[derive(Debug, Clone)]
pub struct ProximityQuery {
    pub origin: GeoPoint,
    /// Maximum great-circle distance in metres, inclusive
    pub bound_m: f64,
    pub category: CategoryFilter,
    pub band: String,
    pub limit: usize,
    pub region: Option<Arc<Region>>,
}

impl ProximityQuery {
    pub fn new(origin: GeoPoint, bound_m: f64) -> Self {
        Self {
            origin,
            bound_m,
            category: CategoryFilter::Both,
            band: DEFAULT_BAND.to_string(),
            limit: DEFAULT_LIMIT,
            region: None,
        }
    }

    pub fn with_category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }

    pub fn with_band(mut self, band: &str) -> Self {
        self.band = band.to_string();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_region(mut self, region: Option<Arc<Region>>) -> Self {
        self.region = region;
        self
    }

    /// Same query with a different bound
    pub fn widened(&self, bound_m: f64) -> Self {
        Self {
            bound_m,
            ..self.clone()
        }
    }

    /// A non-positive or non-finite bound can never match
    pub fn is_unsatisfiable(&self) -> bool {
        !(self.bound_m.is_finite() && self.bound_m > 0.0) || self.limit == 0
    }

    /// Render as an Elasticsearch search body.
    ///
    /// Band, bound, category and region are filters; hits are sorted by arc
    /// distance with address and unit as tie-breakers, so `sort[0]` of each hit
    /// is its distance in metres.
    pub fn to_es_body(&self) -> Value {
        let origin = json!({ "lat": self.origin.lat, "lon": self.origin.lon });

        let mut filters = vec![
            json!({ "term": { "partisanship_range": &self.band } }),
            json!({
                "geo_distance": {
                    "distance": format!("{}m", self.bound_m),
                    "distance_type": "arc",
                    "location": origin
                }
            }),
        ];

        if let Some(category) = self.category.only() {
            filters.push(json!({ "term": { "category": category.as_str() } }));
        }

        if let Some(ref region) = self.region {
            filters.push(json!({
                "geo_shape": {
                    "location": {
                        "shape": region.to_geojson(),
                        "relation": "intersects"
                    }
                }
            }));
        }

        json!({
            "query": { "bool": { "filter": filters } },
            "sort": [
                {
                    "_geo_distance": {
                        "location": origin,
                        "order": "asc",
                        "unit": "m",
                        "distance_type": "arc"
                    }
                },
                { "address": { "order": "asc" } },
                { "unit": { "order": "asc", "missing": "_first" } }
            ],
            "size": self.limit,
            "_source": SOURCE_FIELDS,
            "track_total_hits": false
        })
    }
}
