use anyhow::Result;
use async_trait::async_trait;

use crate::db::Coordinates;

/// Place name → coordinates.
///
/// `Ok(None)` means the geocoder answered and found nothing. `Err` is a
/// transient failure (network, HTTP status, unparseable body); the ingestion
/// cycle logs it and moves on to the next candidate.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>>;
}
