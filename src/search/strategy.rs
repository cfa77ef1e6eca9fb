//! Primary bounded search with an optional widened fallback.

use hashbrown::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CategoryFilter, ProximityQuery, Warehouse, DEFAULT_BAND, DEFAULT_LIMIT};
use crate::error::CanvassError;
use crate::models::{AddressRecord, GeoPoint};
use crate::postprocess::{normalize, sort_records};
use crate::region::Region;

/// Search bound and fallback configuration
#[derive(Debug, Clone)]
pub struct SearchPolicy {
    /// Primary bound in metres
    pub bound_m: f64,
    /// Wider bound queried when the primary search returns fewer than
    /// `limit` rows
    pub fallback_bound_m: Option<f64>,
    pub limit: usize,
    pub band: String,
    pub region: Option<Arc<Region>>,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            // half a mile
            bound_m: 802.0,
            fallback_bound_m: None,
            limit: DEFAULT_LIMIT,
            band: DEFAULT_BAND.to_string(),
            region: None,
        }
    }
}

impl SearchPolicy {
    /// Primary query for an origin. The limit never exceeds [`DEFAULT_LIMIT`].
    pub fn query(&self, origin: GeoPoint, category: CategoryFilter) -> ProximityQuery {
        ProximityQuery::new(origin, self.bound_m)
            .with_category(category)
            .with_band(&self.band)
            .with_limit(self.limit.min(DEFAULT_LIMIT))
            .with_region(self.region.clone())
    }
}

/// Ranked records of one search
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub records: Vec<AddressRecord>,
    /// True when fallback rows beyond the primary bound were added
    pub widened: bool,
    /// Largest bound that contributed rows
    pub bound_m: f64,
}

impl SearchOutcome {
    fn empty(bound_m: f64) -> Self {
        Self {
            records: Vec::new(),
            widened: false,
            bound_m,
        }
    }
}

async fn fetch_records(
    warehouse: &dyn Warehouse,
    query: &ProximityQuery,
) -> Result<Vec<AddressRecord>, CanvassError> {
    let rows = warehouse.fetch(query).await.map_err(|e| {
        warn!("Warehouse '{}' query failed: {:#}", warehouse.name(), e);
        CanvassError::upstream("warehouse", &e)
    })?;
    Ok(normalize(rows))
}

/// Run the bounded search and, when it is sparse, union it with the widened
/// search. Primary rows win on duplicate unit ids; the union is re-ranked and
/// capped at the limit.
pub async fn execute_proximity_search(
    warehouse: &dyn Warehouse,
    policy: &SearchPolicy,
    origin: GeoPoint,
    category: CategoryFilter,
) -> Result<SearchOutcome, CanvassError> {
    let primary = policy.query(origin, category);
    if primary.is_unsatisfiable() {
        debug!("Bound {}m cannot match any parcel", primary.bound_m);
        return Ok(SearchOutcome::empty(primary.bound_m));
    }

    let mut records = fetch_records(warehouse, &primary).await?;
    let mut outcome_bound = primary.bound_m;
    let mut widened = false;

    let fallback = policy
        .fallback_bound_m
        .filter(|wide| wide.is_finite() && *wide > primary.bound_m);

    if let (true, Some(wide)) = (records.len() < primary.limit, fallback) {
        info!(
            "Primary search returned {} rows, widening to {}m",
            records.len(),
            wide
        );

        let extra = fetch_records(warehouse, &primary.widened(wide)).await?;
        let seen: HashSet<String> = records.iter().map(|r| r.unit_acct_id.clone()).collect();
        let before = records.len();
        records.extend(
            extra
                .into_iter()
                .filter(|r| !seen.contains(&r.unit_acct_id)),
        );

        if records.len() > before {
            widened = true;
            outcome_bound = wide;
            sort_records(&mut records);
        }
    }

    records.truncate(primary.limit);

    Ok(SearchOutcome {
        records,
        widened,
        bound_m: outcome_bound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::RawRow;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns canned rows per bound and records the bounds it was asked for
    struct ScriptedWarehouse {
        calls: Mutex<Vec<f64>>,
        rows: Vec<(f64, &'static str)>,
    }

    impl ScriptedWarehouse {
        fn new(rows: Vec<(f64, &'static str)>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                rows,
            }
        }
    }

    #[async_trait]
    impl Warehouse for ScriptedWarehouse {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, query: &ProximityQuery) -> Result<Vec<RawRow>> {
            self.calls.lock().unwrap().push(query.bound_m);
            Ok(self
                .rows
                .iter()
                .filter(|(d, _)| *d <= query.bound_m)
                .take(query.limit)
                .map(|(d, id)| RawRow {
                    unit_acct_id: json!(id),
                    lat: json!(29.77),
                    lon: json!(-95.39),
                    address: json!(format!("{} MAIN ST", id)),
                    unit_type: json!(null),
                    unit: json!(null),
                    city: json!("HOUSTON"),
                    zip: json!("77007"),
                    distance_m: json!(d),
                })
                .collect())
        }
    }

    struct DownWarehouse;

    #[async_trait]
    impl Warehouse for DownWarehouse {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn fetch(&self, _query: &ProximityQuery) -> Result<Vec<RawRow>> {
            anyhow::bail!("403 Forbidden")
        }
    }

    fn policy(fallback: Option<f64>) -> SearchPolicy {
        SearchPolicy {
            fallback_bound_m: fallback,
            ..SearchPolicy::default()
        }
    }

    fn origin() -> GeoPoint {
        GeoPoint::new(29.77, -95.39)
    }

    #[tokio::test]
    async fn test_sparse_primary_is_widened() {
        let wh = ScriptedWarehouse::new(vec![(100.0, "a"), (5_000.0, "b"), (20_000.0, "c")]);
        let outcome = execute_proximity_search(&wh, &policy(Some(16_093.0)), origin(), CategoryFilter::Both)
            .await
            .unwrap();

        let ids: Vec<&str> = outcome.records.iter().map(|r| r.unit_acct_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(outcome.widened);
        assert_eq!(outcome.bound_m, 16_093.0);
        assert_eq!(*wh.calls.lock().unwrap(), vec![802.0, 16_093.0]);
    }

    #[tokio::test]
    async fn test_full_primary_skips_fallback() {
        let rows: Vec<(f64, &'static str)> = (0..60).map(|i| (i as f64, "x")).collect();
        let wh = ScriptedWarehouse::new(rows);
        let outcome = execute_proximity_search(&wh, &policy(Some(16_093.0)), origin(), CategoryFilter::Both)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 50);
        assert!(!outcome.widened);
        assert_eq!(wh.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_limit_is_capped() {
        let rows: Vec<(f64, &'static str)> = (0..200).map(|i| (i as f64, "x")).collect();
        let wh = ScriptedWarehouse::new(rows);
        let mut p = policy(None);
        p.limit = 500;
        let outcome = execute_proximity_search(&wh, &p, origin(), CategoryFilter::Both)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 50);
    }

    #[tokio::test]
    async fn test_no_fallback_configured() {
        let wh = ScriptedWarehouse::new(vec![(5_000.0, "b")]);
        let outcome = execute_proximity_search(&wh, &policy(None), origin(), CategoryFilter::Both)
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
        assert!(!outcome.widened);
    }

    #[tokio::test]
    async fn test_zero_bound_never_queries() {
        let wh = ScriptedWarehouse::new(vec![(0.0, "a")]);
        let mut p = policy(Some(16_093.0));
        p.bound_m = 0.0;
        let outcome = execute_proximity_search(&wh, &p, origin(), CategoryFilter::Both)
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
        assert!(wh.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warehouse_failure_is_upstream() {
        let err = execute_proximity_search(&DownWarehouse, &policy(None), origin(), CategoryFilter::Both)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CanvassError::UpstreamUnavailable {
                service: "warehouse",
                ..
            }
        ));
    }
}
