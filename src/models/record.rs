//! Address records returned by a proximity search.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::GeoPoint;

/// Housing category derived from the unit label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitCategory {
    SingleFamily,
    MultiUnit,
}

impl UnitCategory {
    /// Empty or absent unit label means a single-family parcel.
    pub fn classify(unit: Option<&str>) -> Self {
        match unit.map(str::trim) {
            None | Some("") => UnitCategory::SingleFamily,
            Some(_) => UnitCategory::MultiUnit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitCategory::SingleFamily => "single-family",
            UnitCategory::MultiUnit => "multi-unit",
        }
    }
}

impl std::fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate address, after type coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressRecord {
    pub unit_acct_id: String,
    pub location: GeoPoint,
    pub address: String,
    pub unit_type: Option<String>,
    pub unit: Option<String>,
    pub city: String,
    pub zip: String,
    pub category: UnitCategory,
    pub distance_m: f64,
}

impl AddressRecord {
    pub fn rank_key(&self) -> RankKey<'_> {
        RankKey::new(self.distance_m, &self.address, self.unit.as_deref())
    }
}

/// Result ordering: distance, then address, then unit label.
///
/// A missing unit sorts as the empty string.
#[derive(Debug, Clone, Copy)]
pub struct RankKey<'a> {
    pub distance_m: f64,
    pub address: &'a str,
    pub unit: &'a str,
}

impl<'a> RankKey<'a> {
    pub fn new(distance_m: f64, address: &'a str, unit: Option<&'a str>) -> Self {
        Self {
            distance_m,
            address,
            unit: unit.unwrap_or(""),
        }
    }
}

impl Ord for RankKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_m
            .total_cmp(&other.distance_m)
            .then_with(|| self.address.cmp(other.address))
            .then_with(|| self.unit.cmp(other.unit))
    }
}

impl PartialOrd for RankKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey<'_> {}
