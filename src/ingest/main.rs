//! Parcel ingest pipeline.
//!
//! Reads the enriched parcel CSV and bulk indexes it into Elasticsearch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use canvass::dataset::load_parcels_csv;
use canvass::elasticsearch::{create_index, delete_stale_documents, BulkIndexer, EsClient};

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest parcel CSV data into Elasticsearch")]
struct Args {
    /// Parcel CSV file to import
    #[arg(short, long)]
    file: PathBuf,

    /// Elasticsearch URL
    #[arg(long, default_value = "http://localhost:9200")]
    es_url: String,

    /// Elasticsearch index name
    #[arg(long, default_value = "parcels")]
    index: String,

    /// Delete stale documents from previous import
    #[arg(long)]
    refresh: bool,

    /// Create/recreate index before import
    #[arg(long)]
    create_index: bool,

    /// Batch size for bulk indexing
    #[arg(long, default_value = "5000")]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Canvass Ingest Pipeline");
    info!("File: {}", args.file.display());

    let es_client = EsClient::new(&args.es_url, &args.index)
        .context("Failed to connect to Elasticsearch")?;

    if !es_client.health_check().await? {
        anyhow::bail!("Elasticsearch cluster is not healthy");
    }
    info!("Connected to Elasticsearch");

    if args.create_index {
        create_index(&es_client, true).await?;
    }

    // Parcels are stamped at load time, so this must come first
    let import_start = Utc::now();

    let load = load_parcels_csv(&args.file)?;
    if load.parcels.is_empty() {
        warn!("No parcels to index");
        return Ok(());
    }
    let source_file = load.parcels[0].source_file.clone();

    let pb = ProgressBar::new(load.parcels.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )?
            .progress_chars("#>-"),
    );

    let mut indexer = BulkIndexer::new(es_client.clone(), args.batch_size);

    for parcel in load.parcels {
        indexer.add(parcel).await?;
        pb.inc(1);
    }

    pb.finish_with_message("Processing complete");

    let (indexed, errors) = indexer.finish().await?;
    info!(
        "Indexed {} parcels ({} errors, {} rows skipped)",
        indexed, errors, load.skipped
    );

    if args.refresh {
        info!("Deleting stale parcels from previous import...");
        let deleted = delete_stale_documents(&es_client, &source_file, import_start).await?;
        info!("Deleted {} stale parcels", deleted);
    }

    let doc_count = es_client.doc_count().await?;
    info!("Total parcels in index: {}", doc_count);

    Ok(())
}
