//! Parcel document structure for Elasticsearch indexing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, UnitCategory};

/// One residential unit with its precomputed partisanship band.
///
/// `category` is derived from `unit` at load time so the warehouse can filter
/// on it without scripting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelDoc {
    /// Appraisal district unit account id
    pub unit_acct_id: String,

    /// Parcel centroid for geospatial queries
    pub location: GeoPoint,

    /// Street address of the parcel
    pub address: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    pub city: String,

    pub zip: String,

    /// Opaque upstream classification, e.g. "70-100"
    pub partisanship_range: String,

    pub category: UnitCategory,

    /// Source file name for refresh tracking
    pub source_file: String,

    /// Import timestamp for refresh tracking
    pub import_timestamp: DateTime<Utc>,
}

impl ParcelDoc {
    /// Create a parcel, deriving its category from the unit label
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        unit_acct_id: String,
        location: GeoPoint,
        address: String,
        unit_type: Option<String>,
        unit: Option<String>,
        city: String,
        zip: String,
        partisanship_range: String,
        source_file: &str,
    ) -> Self {
        let unit = unit.filter(|u| !u.trim().is_empty());
        let unit_type = unit_type.filter(|u| !u.trim().is_empty());
        Self {
            category: UnitCategory::classify(unit.as_deref()),
            unit_acct_id,
            location,
            address,
            unit_type,
            unit,
            city,
            zip,
            partisanship_range,
            source_file: source_file.to_string(),
            import_timestamp: Utc::now(),
        }
    }
}
