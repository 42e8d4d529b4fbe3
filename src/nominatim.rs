//! Nominatim HTTP adapter for geocoding.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::GeocodeError;
use crate::model::Coordinate;
use crate::traits::{GeocodeMatch, Geocoder};

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    /// Nominatim's usage policy requires an identifying user agent.
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Candidates requested per address; the first one is used.
    pub candidates: u32,
    pub country_codes: Option<String>,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("distribution-planner/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
            candidates: 5,
            country_codes: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    config: NominatimConfig,
    client: reqwest::blocking::Client,
}

impl NominatimClient {
    pub fn new(config: NominatimConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { config, client })
    }
}

impl Geocoder for NominatimClient {
    fn geocode(&self, address: &str) -> Result<GeocodeMatch, GeocodeError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let limit = self.config.candidates.max(1).to_string();

        let mut request = self
            .client
            .get(url)
            .query(&[("q", address), ("format", "jsonv2"), ("limit", limit.as_str())]);
        if let Some(country_codes) = &self.config.country_codes {
            request = request.query(&[("countrycodes", country_codes.as_str())]);
        }

        let response = request.send().map_err(classify_request_error)?;
        let status = response.status();
        if let Some(err) = classify_status(status) {
            return Err(err);
        }

        let body = response.text().map_err(classify_request_error)?;
        parse_search_response(address, &body)
    }
}

/// Maps a non-success status to the error taxonomy; `None` for success.
pub fn classify_status(status: StatusCode) -> Option<GeocodeError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(GeocodeError::RateLimited(status.to_string()))
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Some(GeocodeError::Transient(status.to_string()))
    } else {
        Some(GeocodeError::Malformed(format!("unexpected status {status}")))
    }
}

fn classify_request_error(err: reqwest::Error) -> GeocodeError {
    if err.is_decode() {
        GeocodeError::Malformed(err.to_string())
    } else {
        // timeouts, refused connections and dropped bodies are worth another try
        GeocodeError::Transient(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SearchCandidate {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    importance: Option<f64>,
}

/// Picks the best-ranked candidate from a `format=jsonv2` search response.
pub fn parse_search_response(address: &str, body: &str) -> Result<GeocodeMatch, GeocodeError> {
    let candidates: Vec<SearchCandidate> =
        serde_json::from_str(body).map_err(|err| GeocodeError::Malformed(err.to_string()))?;

    let best = candidates
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NotFound(address.to_string()))?;

    let latitude: f64 = best
        .lat
        .parse()
        .map_err(|_| GeocodeError::Malformed(format!("latitude {:?}", best.lat)))?;
    let longitude: f64 = best
        .lon
        .parse()
        .map_err(|_| GeocodeError::Malformed(format!("longitude {:?}", best.lon)))?;
    let coordinate = Coordinate::new(latitude, longitude)
        .map_err(|err| GeocodeError::Malformed(err.to_string()))?;

    Ok(GeocodeMatch {
        coordinate,
        formatted_address: best.display_name,
        confidence: best.importance.unwrap_or(0.0),
    })
}
