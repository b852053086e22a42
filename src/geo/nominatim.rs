// Nominatim geocoder (OpenStreetMap).
//
// One `/search` request per place name, first hit only, restricted to the
// configured country. Calls are spaced one second apart by the rate limiter.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::resolver::GeoResolver;
use crate::db::Coordinates;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest place name worth sending. NER spans past this are noise.
const MAX_PLACE_LEN: usize = 200;

pub struct NominatimResolver {
    client: reqwest::Client,
    base_url: String,
    country_codes: String,
    limiter: RateLimiter,
}

/// Nominatim returns coordinates as strings.
#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

impl NominatimResolver {
    pub fn new(base_url: &str, country_codes: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("disaster-watch/0.1 (disaster post monitoring)")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build geocoder HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            country_codes: country_codes.to_string(),
            limiter: RateLimiter::new(1.0),
        })
    }
}

#[async_trait]
impl GeoResolver for NominatimResolver {
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>> {
        let place = place.trim();
        if place.is_empty() || place.len() > MAX_PLACE_LEN {
            return Ok(None);
        }

        self.limiter.acquire().await;

        let url = format!("{}/search", self.base_url);
        let mut params = vec![("q", place), ("format", "json"), ("limit", "1")];
        if !self.country_codes.is_empty() {
            params.push(("countrycodes", self.country_codes.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("Geocoder request failed for '{place}'"))?;

        if !response.status().is_success() {
            anyhow::bail!("Geocoder returned {} for '{}'", response.status(), place);
        }

        let hits: Vec<NominatimHit> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse geocoder response for '{place}'"))?;

        let coordinates = first_hit(hits)?;
        debug!(place, found = coordinates.is_some(), "Geocoded place");
        Ok(coordinates)
    }
}

/// Coordinates of the first hit. An empty list or an out-of-range pair is
/// "not found"; a number that doesn't parse is an error.
fn first_hit(hits: Vec<NominatimHit>) -> Result<Option<Coordinates>> {
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };
    let latitude: f64 = hit
        .lat
        .parse()
        .with_context(|| format!("Invalid latitude from geocoder: {}", hit.lat))?;
    let longitude: f64 = hit
        .lon
        .parse()
        .with_context(|| format!("Invalid longitude from geocoder: {}", hit.lon))?;
    Ok(Coordinates::new(latitude, longitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(json: &str) -> Vec<NominatimHit> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_first_hit_parses_string_coordinates() {
        let found = first_hit(hits(
            r#"[{"place_id":1,"lat":"30.2711286","lon":"-97.7436995","display_name":"Austin, Texas"},
                {"place_id":2,"lat":"1.0","lon":"2.0"}]"#,
        ))
        .unwrap()
        .unwrap();
        assert!((found.latitude - 30.2711286).abs() < 1e-9);
        assert!((found.longitude + 97.7436995).abs() < 1e-9);
    }

    #[test]
    fn test_empty_result_is_not_found() {
        assert_eq!(first_hit(hits("[]")).unwrap(), None);
    }

    #[test]
    fn test_out_of_range_is_not_found() {
        assert_eq!(first_hit(hits(r#"[{"lat":"91.0","lon":"0.0"}]"#)).unwrap(), None);
    }

    #[test]
    fn test_garbage_coordinates_are_an_error() {
        assert!(first_hit(hits(r#"[{"lat":"north","lon":"0.0"}]"#)).is_err());
    }

    #[tokio::test]
    async fn test_blank_place_short_circuits() {
        // No request is made, so an unroutable base URL is fine.
        let resolver = NominatimResolver::new("http://127.0.0.1:9", "us").unwrap();
        assert_eq!(resolver.resolve("   ").await.unwrap(), None);
        assert_eq!(resolver.resolve(&"x".repeat(300)).await.unwrap(), None);
    }
}
