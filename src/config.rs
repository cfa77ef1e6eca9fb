//! TOML configuration.
//!
//! Every section has defaults, so an empty file (or no file) is a valid
//! configuration for a local run.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::region::Region;
use crate::search::{SearchPolicy, DEFAULT_BAND, DEFAULT_LIMIT};

/// Environment variable overriding `allowlist.url`
pub const ALLOWLIST_URL_ENV: &str = "CANVASS_ALLOWLIST_URL";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub geocoder: GeocoderConfig,
    pub search: SearchConfig,
    pub allowlist: Option<AllowListConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub log_level: String,
    /// Open sessions kept before the least recently used is evicted
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            log_level: "info".to_string(),
            max_sessions: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "parcels".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Base URL of a Nominatim-compatible service
    pub endpoint: String,
    pub user_agent: String,
    /// State appended to the lookup string
    pub state: String,
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/".to_string(),
            user_agent: "canvass/0.1 (address_nearby)".to_string(),
            state: "TX".to_string(),
            min_interval_ms: 1000,
            timeout_secs: 10,
        }
    }
}

impl GeocoderConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub bound_m: f64,
    pub fallback_bound_m: Option<f64>,
    pub limit: usize,
    pub band: String,
    pub region: Option<RegionConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bound_m: 802.0,
            fallback_bound_m: None,
            limit: DEFAULT_LIMIT,
            band: DEFAULT_BAND.to_string(),
            region: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegionConfig {
    pub name: String,
    /// GeoJSON file holding the boundary
    pub boundary_file: PathBuf,
}

impl SearchConfig {
    /// Build the runtime policy, loading the region boundary if configured
    pub fn to_policy(&self) -> Result<SearchPolicy> {
        if !self.bound_m.is_finite() || self.bound_m < 0.0 {
            anyhow::bail!("search.bound_m must be a non-negative number");
        }
        if let Some(wide) = self.fallback_bound_m {
            if !wide.is_finite() || wide < self.bound_m {
                anyhow::bail!("search.fallback_bound_m must be at least search.bound_m");
            }
        }
        if self.limit == 0 || self.limit > DEFAULT_LIMIT {
            anyhow::bail!("search.limit must be between 1 and {}", DEFAULT_LIMIT);
        }

        let region = self
            .region
            .as_ref()
            .map(|r| Region::load(&r.name, &r.boundary_file).map(Arc::new))
            .transpose()?;

        Ok(SearchPolicy {
            bound_m: self.bound_m,
            fallback_bound_m: self.fallback_bound_m,
            limit: self.limit,
            band: self.band.clone(),
            region,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AllowListConfig {
    /// CSV export URL of the allow-list sheet
    pub url: Option<String>,
    /// Inline identifiers, used when no URL is set
    pub members: Vec<String>,
    pub has_headers: bool,
    pub ttl_secs: u64,
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            url: None,
            members: Vec::new(),
            has_headers: true,
            ttl_secs: 600,
        }
    }
}

impl AllowListConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load the file if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::var(ALLOWLIST_URL_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, allowlist_url: Option<String>) {
        if let Some(url) = allowlist_url.filter(|u| !u.trim().is_empty()) {
            self.allowlist.get_or_insert_with(AllowListConfig::default).url = Some(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.search.bound_m, 802.0);
        assert_eq!(config.search.limit, 50);
        assert_eq!(config.search.band, "70-100");
        assert_eq!(config.geocoder.state, "TX");
        assert_eq!(config.server.max_sessions, 10_000);
        assert!(config.allowlist.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[search]
bound_m = 10000
fallback_bound_m = 16093

[allowlist]
members = ["a@x.com"]
ttl_secs = 60
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.search.bound_m, 10_000.0);
        assert_eq!(config.search.fallback_bound_m, Some(16_093.0));
        let allowlist = config.allowlist.unwrap();
        assert_eq!(allowlist.members, vec!["a@x.com"]);
        assert_eq!(allowlist.ttl(), Duration::from_secs(60));
        assert!(allowlist.has_headers);
    }

    #[test]
    fn test_env_overrides_allowlist_url() {
        let mut config = Config::default();
        config.apply_env(Some("https://sheets.example/export?format=csv".to_string()));
        assert_eq!(
            config.allowlist.unwrap().url.as_deref(),
            Some("https://sheets.example/export?format=csv")
        );
    }

    #[test]
    fn test_invalid_fallback_rejected() {
        let config = Config::from_toml("[search]\nbound_m = 1000\nfallback_bound_m = 500\n").unwrap();
        assert!(config.search.to_policy().is_err());
    }

    #[test]
    fn test_limit_above_cap_rejected() {
        let config = Config::from_toml("[search]\nlimit = 500\n").unwrap();
        assert!(config.search.to_policy().is_err());

        let config = Config::from_toml("[search]\nlimit = 0\n").unwrap();
        assert!(config.search.to_policy().is_err());

        let config = Config::from_toml("[search]\nlimit = 20\n").unwrap();
        assert_eq!(config.search.to_policy().unwrap().limit, 20);
    }
}
