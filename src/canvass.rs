//! Submission handling: validate → geocode → search → render model.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CanvassError;
use crate::geocoder::{geocode, Geocoder};
use crate::models::{AddressRecord, GeoPoint, OriginPoint};
use crate::postprocess::{present, DisplayRow, MapPoint};
use crate::search::{execute_proximity_search, CategoryFilter, SearchPolicy, Warehouse};

const METERS_PER_MILE: f64 = 1609.344;

/// Collaborators for one submission
pub struct SearchContext<'a> {
    pub geocoder: &'a dyn Geocoder,
    pub warehouse: &'a dyn Warehouse,
    pub policy: &'a SearchPolicy,
    /// State appended to the geocoder lookup string
    pub state: &'a str,
}

/// Form fields submitted by the canvasser
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub street: String,
    pub city: String,
    pub zip: String,
    #[serde(default)]
    pub category: CategoryFilter,
}

/// Map centre and label for the origin
#[derive(Debug, Clone, Serialize)]
pub struct OriginView {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
}

impl From<&OriginPoint> for OriginView {
    fn from(origin: &OriginPoint) -> Self {
        Self {
            lat: origin.point.lat,
            lon: origin.point.lon,
            label: origin.label.clone(),
        }
    }
}

/// What the presentation layer should draw
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderModel {
    Results {
        origin: OriginView,
        heading: String,
        widened: bool,
        rows: Vec<DisplayRow>,
        points: Vec<MapPoint>,
    },
    NoResults {
        origin: OriginView,
        message: String,
    },
    /// Recoverable input problem; re-prompt
    InputError { message: String },
    /// Backend outage; the same submission may be retried
    Unavailable { message: String },
}

/// Geocoded origin plus ranked records
#[derive(Debug, Clone)]
pub struct CanvassResult {
    pub origin: OriginPoint,
    pub records: Vec<AddressRecord>,
    pub widened: bool,
    pub bound_m: f64,
}

/// Run the pipeline and return ranked records
pub async fn search(
    ctx: &SearchContext<'_>,
    submission: &Submission,
) -> Result<CanvassResult, CanvassError> {
    let origin = geocode(
        ctx.geocoder,
        &submission.street,
        &submission.city,
        &submission.zip,
        ctx.state,
    )
    .await?;

    let outcome =
        execute_proximity_search(ctx.warehouse, ctx.policy, origin.point, submission.category)
            .await?;

    info!(
        "Found {} addresses near {} ({})",
        outcome.records.len(),
        origin.label,
        submission.category.only().map_or("both", |c| c.as_str())
    );

    Ok(CanvassResult {
        origin,
        records: outcome.records,
        widened: outcome.widened,
        bound_m: outcome.bound_m,
    })
}

fn heading(label: &str, bound_m: f64, widened: bool) -> String {
    let miles = bound_m / METERS_PER_MILE;
    if widened {
        format!(
            "Few addresses nearby; showing addresses within {:.1} miles of {}",
            miles, label
        )
    } else {
        format!("Addresses within {:.1} miles of {}", miles, label)
    }
}

/// Handle one submission end to end
pub async fn handle_submission(ctx: &SearchContext<'_>, submission: Submission) -> RenderModel {
    match search(ctx, &submission).await {
        Ok(result) => render(result),
        Err(err) if err.is_input_error() => RenderModel::InputError {
            message: err.to_string(),
        },
        Err(err) => {
            warn!("Submission failed: {}", err);
            RenderModel::Unavailable {
                message: err.to_string(),
            }
        }
    }
}

fn render(result: CanvassResult) -> RenderModel {
    let origin = OriginView::from(&result.origin);

    if result.records.is_empty() {
        return RenderModel::NoResults {
            message: format!("No addresses found near {}.", origin.label),
            origin,
        };
    }

    let table = present(&result.records);
    RenderModel::Results {
        heading: heading(&origin.label, result.bound_m, result.widened),
        origin,
        widened: result.widened,
        rows: table.rows,
        points: table.points,
    }
}

impl RenderModel {
    /// Centre for the map, when there is one
    pub fn map_center(&self) -> Option<GeoPoint> {
        match self {
            RenderModel::Results { origin, .. } | RenderModel::NoResults { origin, .. } => {
                Some(GeoPoint::new(origin.lat, origin.lon))
            }
            _ => None,
        }
    }
}
