//! Parcel index schema management.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use elasticsearch::indices::{IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts};
use tracing::info;

use super::EsClient;

/// Schema JSON embedded at compile time
const PARCELS_MAPPING: &str = include_str!("../../schema/parcels_mapping.json");

/// Create the parcel index with proper mapping
pub async fn create_index(client: &EsClient, delete_existing: bool) -> Result<()> {
    let es = client.client();
    let index_name = &client.index_name;

    let exists = es
        .indices()
        .exists(IndicesExistsParts::Index(&[index_name]))
        .send()
        .await?
        .status_code()
        .is_success();

    if exists {
        if delete_existing {
            info!("Deleting existing index: {}", index_name);
            es.indices()
                .delete(IndicesDeleteParts::Index(&[index_name]))
                .send()
                .await
                .context("Failed to delete existing index")?;
        } else {
            info!("Index {} already exists, skipping creation", index_name);
            return Ok(());
        }
    }

    let mapping: serde_json::Value =
        serde_json::from_str(PARCELS_MAPPING).context("Failed to parse parcels_mapping.json")?;

    info!("Creating index: {}", index_name);
    let response = es
        .indices()
        .create(IndicesCreateParts::Index(index_name))
        .body(mapping)
        .send()
        .await
        .context("Failed to create index")?;

    if !response.status_code().is_success() {
        let error_body = response.text().await?;
        anyhow::bail!("Failed to create index: {}", error_body);
    }

    info!("Index {} created successfully", index_name);
    Ok(())
}

/// Delete parcels loaded from `source_file` before `import_start`
pub async fn delete_stale_documents(
    client: &EsClient,
    source_file: &str,
    import_start: DateTime<Utc>,
) -> Result<u64> {
    let query = serde_json::json!({
        "query": {
            "bool": {
                "must": [
                    { "term": { "source_file": source_file } }
                ],
                "filter": [
                    { "range": { "import_timestamp": { "lt": import_start.to_rfc3339() } } }
                ]
            }
        }
    });

    let response = client
        .client()
        .delete_by_query(elasticsearch::DeleteByQueryParts::Index(&[
            &client.index_name
        ]))
        .body(query)
        .send()
        .await
        .context("Delete-by-query request failed")?;

    let body = response.json::<serde_json::Value>().await?;
    let deleted = body["deleted"].as_u64().unwrap_or(0);

    info!("Deleted {} stale parcels", deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_declares_query_fields() {
        let mapping: serde_json::Value = serde_json::from_str(PARCELS_MAPPING).unwrap();
        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["location"]["type"], "geo_point");
        assert_eq!(props["partisanship_range"]["type"], "keyword");
        assert_eq!(props["category"]["type"], "keyword");
        assert_eq!(props["address"]["type"], "keyword");
        assert_eq!(props["unit"]["type"], "keyword");
    }
}
