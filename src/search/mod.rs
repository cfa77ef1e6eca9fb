//! Proximity search: query construction, warehouse backends and the
//! bounded-then-widened search strategy.

mod builder;
mod memory;
mod strategy;

pub use builder::{CategoryFilter, ProximityQuery, DEFAULT_BAND, DEFAULT_LIMIT};
pub use memory::MemoryWarehouse;
pub use strategy::{execute_proximity_search, SearchOutcome, SearchPolicy};

use anyhow::Result;
use async_trait::async_trait;

use crate::postprocess::RawRow;

/// A data store that can answer a [`ProximityQuery`].
///
/// Backends apply every predicate of the query (band, distance bound,
/// category, region, ordering, limit) and report each row's distance.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    async fn fetch(&self, query: &ProximityQuery) -> Result<Vec<RawRow>>;

    async fn is_healthy(&self) -> bool {
        true
    }
}
