//! Nominatim forward geocoding client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Geocoder, Throttle};
use crate::models::GeoPoint;

/// One entry of a `/search?format=jsonv2` response. Nominatim returns
/// coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// HTTP client for a Nominatim-compatible search endpoint
pub struct NominatimClient {
    client: Client,
    search_url: Url,
    country_codes: String,
    throttle: Throttle,
}

impl NominatimClient {
    pub fn new(
        endpoint: &str,
        user_agent: &str,
        min_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let search_url = search_url(endpoint)
            .with_context(|| format!("Invalid geocoder endpoint '{}'", endpoint))?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            search_url,
            country_codes: "us".to_string(),
            throttle: Throttle::new(min_interval),
        })
    }

    fn request_url(&self, query: &str) -> Url {
        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "jsonv2")
            .append_pair("limit", "1")
            .append_pair("countrycodes", &self.country_codes);
        url
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn lookup(&self, query: &str) -> Result<Option<GeoPoint>> {
        self.throttle.acquire().await;

        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .await
            .context("Geocoder request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Geocoder returned status {}", response.status());
        }

        let body = response.text().await.context("Failed to read geocoder response")?;
        parse_search_response(&body)
    }
}

/// `search` under the endpoint, keeping any path prefix
fn search_url(endpoint: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(endpoint)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("search")
}

/// Take the first match of a search response
fn parse_search_response(body: &str) -> Result<Option<GeoPoint>> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).context("Failed to parse geocoder response")?;

    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };

    let lat = place.lat.trim().parse::<f64>().context("Invalid latitude")?;
    let lon = place.lon.trim().parse::<f64>().context("Invalid longitude")?;

    debug!(
        "Geocoded to ({}, {}) {}",
        lat,
        lon,
        place.display_name.as_deref().unwrap_or("")
    );

    Ok(Some(GeoPoint::new(lat, lon)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_match() {
        let body = r#"[
            {"lat": "29.7742", "lon": "-95.3905", "display_name": "927, Dart Street, Houston"},
            {"lat": "1.0", "lon": "2.0"}
        ]"#;
        let point = parse_search_response(body).unwrap().unwrap();
        assert_eq!(point, GeoPoint::new(29.7742, -95.3905));
    }

    #[test]
    fn test_parse_empty_is_no_match() {
        assert!(parse_search_response("[]").unwrap().is_none());
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(parse_search_response("<html>busy</html>").is_err());
        assert!(parse_search_response(r#"[{"lat": "north", "lon": "1"}]"#).is_err());
    }

    #[test]
    fn test_request_url_encodes_query() {
        let client = NominatimClient::new(
            "https://nominatim.example.org/",
            "canvass-test",
            Duration::from_millis(0),
            Duration::from_secs(1),
        )
        .unwrap();
        let url = client.request_url("927 Dart St Houston, TX 77007");
        assert_eq!(url.path(), "/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "927 Dart St Houston, TX 77007".into())));
        assert!(pairs.contains(&("format".into(), "jsonv2".into())));
        assert!(pairs.contains(&("limit".into(), "1".into())));
    }

    #[test]
    fn test_endpoint_path_prefix_is_kept() {
        let with_slash = search_url("https://host.example/nominatim/").unwrap();
        let without_slash = search_url("https://host.example/nominatim").unwrap();
        assert_eq!(with_slash.as_str(), "https://host.example/nominatim/search");
        assert_eq!(without_slash, with_slash);
        assert_eq!(search_url("https://host.example").unwrap().path(), "/search");
    }
}
