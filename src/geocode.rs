//! Reverse geocoding of a fix into a short place name.
//!
//! Best-effort only: the location tracker calls this after a fix succeeds
//! and keeps a placeholder when it fails. Nothing waits on it to resolve a
//! location for an alert.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DEFAULT_HTTP_TIMEOUT;
use crate::model::GeoPoint;

/// Base URL for the OpenStreetMap Nominatim API.
const NOMINATIM_API_BASE: &str = "https://nominatim.openstreetmap.org";

/// Nominatim asks every client to identify itself.
const USER_AGENT: &str = concat!("suraksha/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// A short place name such as "Indirapuram, Ghaziabad".
    async fn place_name(&self, point: GeoPoint) -> anyhow::Result<String>;
}

/// Client for Nominatim's reverse endpoint.
#[derive(Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for NominatimClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NominatimClient {
    pub fn new() -> Self {
        Self::with_base_url(NOMINATIM_API_BASE)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: build_client(DEFAULT_HTTP_TIMEOUT),
            base_url: base_url.to_string(),
        }
    }

    /// Give up on a lookup after `timeout` instead of the default.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            ..self
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn place_name(&self, point: GeoPoint) -> anyhow::Result<String> {
        let url = format!(
            "{}/reverse?format=json&lat={}&lon={}",
            self.base_url, point.lat, point.lng
        );

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let data = response.json::<NominatimReverse>().await?;
        Ok(data.address.short_name())
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NominatimReverse {
    #[serde(default)]
    pub address: NominatimAddress,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimAddress {
    pub suburb: Option<String>,
    pub neighbourhood: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
}

impl NominatimAddress {
    /// "area, city" when an area is known, else just the city.
    pub fn short_name(&self) -> String {
        let city = self
            .city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
            .unwrap_or("Unknown City");
        match self.suburb.as_deref().or(self.neighbourhood.as_deref()) {
            Some(area) if !area.is_empty() => format!("{area}, {city}"),
            _ => city.to_string(),
        }
    }
}
