//! Result postprocessing: coercion, ranking, and display shaping.
//!
//! Warehouse rows arrive with mixed string/number types. They are coerced into
//! [`AddressRecord`]s, ranked by (distance, address, unit), and split into the
//! display table and the map points.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::models::{AddressRecord, GeoPoint, UnitCategory};

/// A row as returned by the warehouse, before coercion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRow {
    pub unit_acct_id: Value,
    pub lat: Value,
    pub lon: Value,
    pub address: Value,
    #[serde(default)]
    pub unit_type: Value,
    #[serde(default)]
    pub unit: Value,
    #[serde(default)]
    pub city: Value,
    #[serde(default)]
    pub zip: Value,
    pub distance_m: Value,
}

/// Table row shown to the canvasser; internal columns are dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRow {
    pub address: String,
    pub unit_type: Option<String>,
    pub unit: Option<String>,
    pub city: String,
    pub zip: String,
    pub category: UnitCategory,
}

/// Map marker position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Display-ready result set
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTable {
    pub rows: Vec<DisplayRow>,
    pub points: Vec<MapPoint>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Numbers pass through; numeric strings are parsed
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Strings pass through; numbers are rendered without a fraction when whole
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerce one row. Rows without usable coordinates, distance or unit id are
/// rejected; a missing address becomes empty.
pub fn coerce_row(row: &RawRow) -> Option<AddressRecord> {
    let lat = coerce_f64(&row.lat)?;
    let lon = coerce_f64(&row.lon)?;
    let distance_m = coerce_f64(&row.distance_m)?;
    let unit_acct_id = coerce_string(&row.unit_acct_id)?;
    let unit = coerce_string(&row.unit);

    Some(AddressRecord {
        unit_acct_id,
        location: GeoPoint::new(lat, lon),
        address: coerce_string(&row.address).unwrap_or_default(),
        unit_type: coerce_string(&row.unit_type),
        category: UnitCategory::classify(unit.as_deref()),
        unit,
        city: coerce_string(&row.city).unwrap_or_default(),
        zip: coerce_string(&row.zip).unwrap_or_default(),
        distance_m,
    })
}

/// Coerce and rank raw rows
pub fn normalize(rows: Vec<RawRow>) -> Vec<AddressRecord> {
    let total = rows.len();
    let mut records: Vec<AddressRecord> = rows.iter().filter_map(coerce_row).collect();

    if records.len() < total {
        warn!(
            "Dropped {} of {} rows with missing coordinates",
            total - records.len(),
            total
        );
    }

    sort_records(&mut records);
    records
}

/// Stable sort by (distance, address, unit)
pub fn sort_records(records: &mut [AddressRecord]) {
    records.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
}

/// Split ranked records into the display table and map points
pub fn present(records: &[AddressRecord]) -> ResultTable {
    let rows = records
        .iter()
        .map(|r| DisplayRow {
            address: r.address.clone(),
            unit_type: r.unit_type.clone(),
            unit: r.unit.clone(),
            city: r.city.clone(),
            zip: r.zip.clone(),
            category: r.category,
        })
        .collect();

    let points = records
        .iter()
        .map(|r| MapPoint {
            lat: r.location.lat,
            lon: r.location.lon,
        })
        .collect();

    ResultTable { rows, points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: &str, address: &str, unit: Value, distance: Value) -> RawRow {
        RawRow {
            unit_acct_id: json!(id),
            lat: json!("29.77"),
            lon: json!(-95.39),
            address: json!(address),
            unit_type: Value::Null,
            unit,
            city: json!("HOUSTON"),
            zip: json!(77007),
            distance_m: distance,
        }
    }

    #[test]
    fn test_coerce_mixed_types() {
        let record = coerce_row(&raw("1", "927 DART ST", Value::Null, json!("12.5"))).unwrap();
        assert_eq!(record.location, GeoPoint::new(29.77, -95.39));
        assert_eq!(record.distance_m, 12.5);
        assert_eq!(record.zip, "77007");
        assert_eq!(record.category, UnitCategory::SingleFamily);
    }

    #[test]
    fn test_rows_without_coordinates_dropped() {
        let mut row = raw("1", "927 DART ST", Value::Null, json!(3.0));
        row.lat = Value::Null;
        let mut bad_lon = raw("2", "929 DART ST", Value::Null, json!(4.0));
        bad_lon.lon = json!("n/a");
        let good = raw("3", "931 DART ST", json!("2"), json!(5.0));

        let records = normalize(vec![row, bad_lon, good]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].unit_acct_id, "3");
        assert_eq!(records[0].category, UnitCategory::MultiUnit);
    }

    #[test]
    fn test_row_without_address_is_kept() {
        let mut row = raw("7", "", Value::Null, json!(20.0));
        row.address = Value::Null;

        let records = normalize(vec![row]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, "");

        let table = present(&records);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.points, vec![MapPoint { lat: 29.77, lon: -95.39 }]);
    }

    #[test]
    fn test_normalize_orders_by_distance_address_unit() {
        let rows = vec![
            raw("a", "200 ELM ST", Value::Null, json!(50.0)),
            raw("b", "100 ELM ST", json!("2"), json!(10.0)),
            raw("c", "100 ELM ST", json!("1"), json!(10.0)),
            raw("d", "090 ELM ST", Value::Null, json!("10.0")),
        ];
        let ids: Vec<String> = normalize(rows).into_iter().map(|r| r.unit_acct_id).collect();
        assert_eq!(ids, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_present_drops_internal_columns() {
        let records = normalize(vec![raw("a", "927 DART ST", json!("4"), json!(1.0))]);
        let table = present(&records);
        let row = serde_json::to_value(&table.rows[0]).unwrap();
        assert!(row.get("unit_acct_id").is_none());
        assert!(row.get("lat").is_none());
        assert!(row.get("distance_m").is_none());
        assert_eq!(row["unit"], "4");
        assert_eq!(table.points, vec![MapPoint { lat: 29.77, lon: -95.39 }]);
    }

    #[test]
    fn test_empty_input_is_empty_table() {
        assert!(present(&normalize(Vec::new())).is_empty());
    }
}
