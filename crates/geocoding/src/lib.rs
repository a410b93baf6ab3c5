//! Place-name search used by the shell's search box.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim refuses anonymous clients.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Best match for a query, in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub display_name: String,
    pub lon: f64,
    pub lat: f64,
    pub licence: Option<String>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service knows no place matching `query`.
    async fn search(&self, query: &str) -> Result<Option<GeocodeHit>>;
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    http: Client,
    base: Url,
}

impl NominatimGeocoder {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid geocoder url: {base}"))?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build geocoder http client")?;
        Ok(Self { http, base })
    }

    pub fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("geocoder url cannot be a base: {}", self.base))?
            .pop_if_empty()
            .push("search");
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("limit", "1")
            .append_pair("q", query);
        Ok(url)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Option<GeocodeHit>> {
        let url = self.search_url(query)?;
        debug!(%url, "geocoding query");
        let body = self
            .http
            .get(url)
            .send()
            .await
            .context("nominatim request failed")?
            .error_for_status()?
            .text()
            .await?;
        let hit = parse_search_response(&body)?;
        info!(query, found = hit.is_some(), "geocoding finished");
        Ok(hit)
    }
}

#[derive(Deserialize)]
struct Place {
    display_name: String,
    lat: String,
    lon: String,
    #[serde(default)]
    licence: Option<String>,
}

/// Picks the first place of a Nominatim `format=json` answer.
pub fn parse_search_response(body: &str) -> Result<Option<GeocodeHit>> {
    let places: Vec<Place> =
        serde_json::from_str(body).context("unexpected nominatim response")?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let lon = place
        .lon
        .trim()
        .parse()
        .with_context(|| format!("bad longitude '{}'", place.lon))?;
    let lat = place
        .lat
        .trim()
        .parse()
        .with_context(|| format!("bad latitude '{}'", place.lat))?;
    Ok(Some(GeocodeHit {
        display_name: place.display_name,
        lon,
        lat,
        licence: place.licence,
    }))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
