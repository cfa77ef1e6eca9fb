//! Allow-list snapshots and the sources they are fetched from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use hashbrown::HashSet;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Immutable set of authorized identifiers, stamped with its fetch time
#[derive(Debug, Clone)]
pub struct AllowList {
    members: HashSet<String>,
    fetched_at: DateTime<Utc>,
}

/// Identifiers compare trimmed and ASCII case-insensitive
fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_ascii_lowercase()
}

impl AllowList {
    pub fn new<I, S>(identifiers: I, fetched_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members = identifiers
            .into_iter()
            .map(|s| normalize_identifier(s.as_ref()))
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            members,
            fetched_at,
        }
    }

    /// Parse a sheet CSV export; identifiers are in the first column
    pub fn from_csv(text: &str, has_headers: bool, fetched_at: DateTime<Utc>) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut identifiers = Vec::new();
        for record in reader.records() {
            let record = record.context("Malformed allow-list row")?;
            if let Some(first) = record.get(0) {
                identifiers.push(first.to_string());
            }
        }

        Ok(Self::new(identifiers, fetched_at))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.members.contains(&normalize_identifier(identifier))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Where allow-list snapshots come from
#[async_trait]
pub trait AllowListSource: Send + Sync {
    async fn fetch(&self) -> Result<AllowList>;
}

/// Fixed list, e.g. from the config file
pub struct StaticSource {
    identifiers: Vec<String>,
}

impl StaticSource {
    pub fn new(identifiers: Vec<String>) -> Self {
        Self { identifiers }
    }
}

#[async_trait]
impl AllowListSource for StaticSource {
    async fn fetch(&self) -> Result<AllowList> {
        Ok(AllowList::new(&self.identifiers, Utc::now()))
    }
}

/// CSV export of a spreadsheet, fetched over HTTP
pub struct SheetSource {
    client: Client,
    url: Url,
    has_headers: bool,
}

impl SheetSource {
    pub fn new(url: &str, has_headers: bool, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).context("Invalid allow-list sheet URL")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url,
            has_headers,
        })
    }
}

#[async_trait]
impl AllowListSource for SheetSource {
    async fn fetch(&self) -> Result<AllowList> {
        debug!("Fetching allow-list from {}", self.url.host_str().unwrap_or("sheet"));

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("Allow-list request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Allow-list sheet returned status {}", response.status());
        }

        let text = response.text().await.context("Failed to read allow-list sheet")?;
        let list = AllowList::from_csv(&text, self.has_headers, Utc::now())?;

        info!("Fetched allow-list with {} identifiers", list.len());
        Ok(list)
    }
}
