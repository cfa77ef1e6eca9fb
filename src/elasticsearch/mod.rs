//! Elasticsearch parcel index: client, schema, bulk loading and search.

mod bulk;
mod client;
mod schema;
mod warehouse;

pub use bulk::BulkIndexer;
pub use client::EsClient;
pub use schema::{create_index, delete_stale_documents};
