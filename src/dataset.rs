//! Parcel CSV loading.
//!
//! Expected columns (header names, any order): `unit_acct_id`, `latitude` or
//! `lat`, `longitude` or `lon`, `address`, `unit_type`, `unit`, `city`, `zip`,
//! `partisanship_range`. `unit_type` and `unit` may be absent.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{GeoPoint, ParcelDoc};

/// Parcels read from a file plus the number of rows skipped
#[derive(Debug)]
pub struct ParcelLoad {
    pub parcels: Vec<ParcelDoc>,
    pub skipped: usize,
}

struct Columns {
    id: usize,
    lat: usize,
    lon: usize,
    address: usize,
    unit_type: Option<usize>,
    unit: Option<usize>,
    city: usize,
    zip: usize,
    band: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).with_context(|| format!("Column '{}' not found", names[0]))
        };

        Ok(Self {
            id: require(&["unit_acct_id"])?,
            lat: require(&["latitude", "lat"])?,
            lon: require(&["longitude", "lon"])?,
            address: require(&["address", "appraisal_addr_parcel"])?,
            unit_type: find(&["unit_type"]),
            unit: find(&["unit"]),
            city: require(&["city"])?,
            zip: require(&["zip"])?,
            band: require(&["partisanship_range", "predicted_tdp_partisanship_range"])?,
        })
    }
}

fn field(record: &StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn coordinate(record: &StringRecord, idx: usize) -> Option<f64> {
    field(record, idx)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Read parcels from any CSV reader
pub fn read_parcels<R: Read>(reader: R, source_file: &str) -> Result<ParcelLoad> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let cols = Columns::locate(&headers)?;

    let mut parcels = Vec::new();
    let mut skipped = 0;

    for result in csv_reader.records() {
        let record = result?;

        let lat = coordinate(&record, cols.lat);
        let lon = coordinate(&record, cols.lon);
        let (Some(lat), Some(lon), Some(id)) = (lat, lon, field(&record, cols.id)) else {
            skipped += 1;
            continue;
        };

        parcels.push(ParcelDoc::new(
            id,
            GeoPoint::new(lat, lon),
            field(&record, cols.address).unwrap_or_default(),
            cols.unit_type.and_then(|i| field(&record, i)),
            cols.unit.and_then(|i| field(&record, i)),
            field(&record, cols.city).unwrap_or_default(),
            field(&record, cols.zip).unwrap_or_default(),
            field(&record, cols.band).unwrap_or_default(),
            source_file,
        ));
    }

    if skipped > 0 {
        warn!("Skipped {} rows without coordinates or unit id", skipped);
    }

    Ok(ParcelLoad { parcels, skipped })
}

/// Load parcels from a CSV file
pub fn load_parcels_csv(path: &Path) -> Result<ParcelLoad> {
    info!("Loading parcels from {}", path.display());

    let source_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string();

    let file = File::open(path).context("Failed to open parcel file")?;
    let load = read_parcels(file, &source_file)?;

    info!("Loaded {} parcels from {}", load.parcels.len(), source_file);
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitCategory;

    const SAMPLE: &str = "\
unit_acct_id,latitude,longitude,address,unit_type,unit,city,zip,partisanship_range
0660640130020,29.7741,-95.3902,927 DART ST,,,HOUSTON,77007,70-100
0660640130021,29.7742,-95.3903,929 DART ST,APT,2B,HOUSTON,77007,70-100
0660640130022,,,931 DART ST,,,HOUSTON,77007,70-100
0660640130023,not-a-number,-95.39,933 DART ST,,,HOUSTON,77007,30-70
";

    #[test]
    fn test_read_parcels() {
        let load = read_parcels(SAMPLE.as_bytes(), "sample.csv").unwrap();
        assert_eq!(load.parcels.len(), 2);
        assert_eq!(load.skipped, 2);

        let house = &load.parcels[0];
        assert_eq!(house.category, UnitCategory::SingleFamily);
        assert!(house.unit.is_none());
        assert_eq!(house.source_file, "sample.csv");

        let apt = &load.parcels[1];
        assert_eq!(apt.category, UnitCategory::MultiUnit);
        assert_eq!(apt.unit.as_deref(), Some("2B"));
        assert_eq!(apt.partisanship_range, "70-100");
    }

    #[test]
    fn test_alternate_headers_and_missing_unit_columns() {
        let text = "unit_acct_id,lat,lon,appraisal_addr_parcel,city,zip,predicted_tdp_partisanship_range\n\
                    1,29.7,-95.3,1 MAIN ST,HOUSTON,77002,70-100\n";
        let load = read_parcels(text.as_bytes(), "alt.csv").unwrap();
        assert_eq!(load.parcels.len(), 1);
        assert_eq!(load.parcels[0].category, UnitCategory::SingleFamily);
    }

    #[test]
    fn test_parcel_without_address_is_kept() {
        let text = "unit_acct_id,lat,lon,address,city,zip,partisanship_range\n\
                    9,29.7,-95.3,,HOUSTON,77002,70-100\n";
        let load = read_parcels(text.as_bytes(), "blank.csv").unwrap();
        assert_eq!(load.parcels.len(), 1);
        assert_eq!(load.parcels[0].address, "");
        assert_eq!(load.skipped, 0);
    }

    #[test]
    fn test_missing_required_column() {
        let err = read_parcels("unit_acct_id,lat\n1,2\n".as_bytes(), "bad.csv").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
