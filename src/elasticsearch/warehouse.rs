//! Proximity search against the parcel index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::EsClient;
use crate::postprocess::RawRow;
use crate::search::{ProximityQuery, Warehouse};

#[async_trait]
impl Warehouse for EsClient {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn is_healthy(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }

    async fn fetch(&self, query: &ProximityQuery) -> Result<Vec<RawRow>> {
        if query.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let body = query.to_es_body();
        debug!("Proximity query: {}", serde_json::to_string_pretty(&body)?);

        let response = self
            .client()
            .search(elasticsearch::SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await
            .context("Search request failed")?;

        if !response.status_code().is_success() {
            let status = response.status_code();
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search returned {}: {}", status, error_body);
        }

        let response_body = response.json::<Value>().await?;
        Ok(parse_hits(&response_body))
    }
}

/// Turn search hits into raw rows. The first sort value is the arc distance
/// in metres.
fn parse_hits(response_body: &Value) -> Vec<RawRow> {
    let Some(hits) = response_body["hits"]["hits"].as_array() else {
        return Vec::new();
    };

    hits.iter()
        .map(|hit| {
            let source = &hit["_source"];
            RawRow {
                unit_acct_id: source["unit_acct_id"].clone(),
                lat: source["location"]["lat"].clone(),
                lon: source["location"]["lon"].clone(),
                address: source["address"].clone(),
                unit_type: source["unit_type"].clone(),
                unit: source["unit"].clone(),
                city: source["city"].clone(),
                zip: source["zip"].clone(),
                distance_m: hit["sort"][0].clone(),
            }
        })
        .collect()
}
