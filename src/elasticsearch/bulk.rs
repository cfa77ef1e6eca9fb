//! Bulk indexing of parcel documents.

use anyhow::{Context, Result};
use elasticsearch::http::request::JsonBody;
use elasticsearch::BulkParts;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::EsClient;
use crate::models::ParcelDoc;

/// Buffers parcels and flushes them in batches
pub struct BulkIndexer {
    client: EsClient,
    batch_size: usize,
    buffer: Vec<ParcelDoc>,
    total_indexed: usize,
    total_errors: usize,
}

impl BulkIndexer {
    pub fn new(client: EsClient, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            client,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            total_indexed: 0,
            total_errors: 0,
        }
    }

    /// Add a parcel to the buffer, flushing if batch is full
    pub async fn add(&mut self, parcel: ParcelDoc) -> Result<()> {
        self.buffer.push(parcel);

        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }

        Ok(())
    }

    /// Flush the buffer to Elasticsearch
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let docs = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let count = docs.len();

        debug!("Flushing {} parcels to Elasticsearch", count);

        let body = bulk_body(&docs)?;

        let response = self
            .client
            .client()
            .bulk(BulkParts::Index(&self.client.index_name))
            .body(body)
            .send()
            .await
            .context("Bulk request failed")?;

        let response_body = response.json::<Value>().await?;

        let error_count = count_item_errors(&response_body);
        if error_count > 0 {
            self.total_errors += error_count;
            warn!(
                "Bulk request had {} errors out of {} parcels",
                error_count, count
            );
        }

        self.total_indexed += count - error_count;
        Ok(())
    }

    /// Finish indexing and return (indexed, errors)
    pub async fn finish(mut self) -> Result<(usize, usize)> {
        self.flush().await?;
        Ok((self.total_indexed, self.total_errors))
    }
}

/// Action and document lines, keyed by unit account id so reloads overwrite
fn bulk_body(docs: &[ParcelDoc]) -> Result<Vec<JsonBody<Value>>> {
    let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(docs.len() * 2);
    for doc in docs {
        body.push(json!({ "index": { "_id": &doc.unit_acct_id } }).into());
        body.push(serde_json::to_value(doc)?.into());
    }
    Ok(body)
}

fn count_item_errors(response_body: &Value) -> usize {
    if !response_body["errors"].as_bool().unwrap_or(false) {
        return 0;
    }
    response_body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item["index"]["error"].is_object())
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_item_errors() {
        let ok = json!({ "errors": false, "items": [] });
        assert_eq!(count_item_errors(&ok), 0);

        let partial = json!({
            "errors": true,
            "items": [
                { "index": { "status": 201 } },
                { "index": { "status": 400, "error": { "type": "mapper_parsing_exception" } } }
            ]
        });
        assert_eq!(count_item_errors(&partial), 1);
    }
}
