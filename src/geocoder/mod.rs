//! Address geocoding.
//!
//! Validates the submitted form fields, builds the free-text lookup string and
//! resolves it through a [`Geocoder`] backend. Lookups are never cached.

mod nominatim;
mod throttle;

pub use nominatim::NominatimClient;
pub use throttle::Throttle;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::CanvassError;
use crate::models::{GeoPoint, OriginPoint};

/// Free-text address lookup
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve an address string. `Ok(None)` means the service had no match.
    async fn lookup(&self, query: &str) -> Result<Option<GeoPoint>>;
}

/// Zip must be exactly five ASCII digits
pub fn validate_zip(zip: &str) -> Result<(), CanvassError> {
    let zip = zip.trim();
    if zip.len() == 5 && zip.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(CanvassError::InvalidZip)
    }
}

/// Check required fields before any network call
pub fn validate_fields(street: &str, city: &str, zip: &str) -> Result<(), CanvassError> {
    if street.trim().is_empty() {
        return Err(CanvassError::EmptyStreet);
    }
    if city.trim().is_empty() {
        return Err(CanvassError::EmptyCity);
    }
    validate_zip(zip)
}

/// Build the lookup string, e.g. "927 Dart St Houston, TX 77007"
pub fn format_query(street: &str, city: &str, state: &str, zip: &str) -> String {
    format!("{} {}, {} {}", street.trim(), city.trim(), state, zip.trim())
}

/// Validate and geocode a submission into an origin point
pub async fn geocode(
    geocoder: &dyn Geocoder,
    street: &str,
    city: &str,
    zip: &str,
    state: &str,
) -> Result<OriginPoint, CanvassError> {
    validate_fields(street, city, zip)?;

    let label = format_query(street, city, state, zip);
    debug!("Geocoding '{}'", label);

    let point = match geocoder.lookup(&label).await {
        Ok(Some(point)) => point,
        Ok(None) => return Err(CanvassError::AddressNotFound),
        Err(e) => {
            warn!("Geocoder lookup failed for '{}': {:#}", label, e);
            return Err(CanvassError::upstream("geocoder", &e));
        }
    };

    Ok(OriginPoint {
        point,
        street: street.trim().to_string(),
        city: city.trim().to_string(),
        zip: zip.trim().to_string(),
        label,
    })
}
