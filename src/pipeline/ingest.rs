// Ingestion cycle: search → dedup → locate → geocode → insert.
//
// One pass walks every keyword once. For each returned post the canonical
// link is checked against the store first, so posts already stored never
// cost an NER run or a geocoder call. Every failure below the pass level
// (one keyword's search, one post's enrichment, one candidate's geocode) is
// logged and skipped; a pass never aborts half way through the keyword list.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::bluesky::{PostSource, SearchQuery, SearchWindow, SourcePost};
use crate::db::{is_duplicate, Coordinates, NewRecord, RecordStore};
use crate::geo::GeoResolver;
use crate::nlp::{location_candidates, EntityLocator};

/// What to search for on every pass.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub keywords: Vec<String>,
    /// Window length; each query covers `now - lookback .. now`.
    pub lookback: chrono::Duration,
    pub limit: u32,
    pub lang: String,
}

/// Counters for one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub keywords_searched: usize,
    pub keywords_failed: usize,
    pub fetched: usize,
    pub inserted: usize,
    /// Inserted records that carry coordinates.
    pub located: usize,
    pub duplicates: usize,
    /// Posts whose identifier couldn't be turned into a link, or whose store
    /// write failed.
    pub skipped: usize,
}

enum PostOutcome {
    Inserted { located: bool },
    Duplicate,
    Skipped,
}

pub struct IngestionCycle {
    source: Arc<dyn PostSource>,
    /// `None` when the NER model failed to load: records are still stored,
    /// just without a location.
    locator: Option<Arc<dyn EntityLocator>>,
    geocoder: Arc<dyn GeoResolver>,
    store: Arc<dyn RecordStore>,
    settings: IngestSettings,
}

impl IngestionCycle {
    pub fn new(
        source: Arc<dyn PostSource>,
        locator: Option<Arc<dyn EntityLocator>>,
        geocoder: Arc<dyn GeoResolver>,
        store: Arc<dyn RecordStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            locator,
            geocoder,
            store,
            settings,
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.settings.keywords
    }

    /// Run one full pass over every keyword.
    pub async fn run_pass(&self) -> IngestReport {
        let mut report = IngestReport::default();

        for keyword in &self.settings.keywords {
            let query = SearchQuery {
                keyword: keyword.clone(),
                limit: self.settings.limit,
                window: SearchWindow::ending_now(self.settings.lookback),
                lang: self.settings.lang.clone(),
            };

            let posts = match self.source.search(&query).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(keyword = %keyword, error = %e, "Search failed, skipping keyword this pass");
                    report.keywords_failed += 1;
                    continue;
                }
            };
            report.keywords_searched += 1;
            report.fetched += posts.len();

            for post in &posts {
                match self.ingest_post(keyword, post).await {
                    Ok(PostOutcome::Inserted { located }) => {
                        report.inserted += 1;
                        if located {
                            report.located += 1;
                        }
                    }
                    Ok(PostOutcome::Duplicate) => report.duplicates += 1,
                    Ok(PostOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        warn!(keyword = %keyword, uri = %post.uri, error = %e, "Failed to store post");
                        report.skipped += 1;
                    }
                }
            }
        }

        info!(
            keywords = report.keywords_searched,
            failed = report.keywords_failed,
            fetched = report.fetched,
            inserted = report.inserted,
            located = report.located,
            duplicates = report.duplicates,
            "Ingestion pass complete"
        );

        report
    }

    async fn ingest_post(&self, keyword: &str, post: &SourcePost) -> Result<PostOutcome> {
        let Some(url) = self.source.canonical_link(post) else {
            warn!(uri = %post.uri, "Post identifier has no canonical link, skipping");
            return Ok(PostOutcome::Skipped);
        };

        if self.store.exists(&url).await? {
            debug!(url = %url, "Already stored");
            return Ok(PostOutcome::Duplicate);
        }

        let mut record = NewRecord::new(
            url,
            post.author_handle.clone(),
            post.text.clone(),
            keyword,
            post.created_at.clone(),
        );

        let candidates = self.place_candidates(record.text()).await;
        if let Some((place, coordinates)) =
            resolve_location(self.geocoder.as_ref(), &candidates).await
        {
            record = record.with_location(place, coordinates);
        }
        let located = record.coordinates.is_some();

        // A concurrent writer can still win the race between exists() and here
        match self.store.insert(&record).await {
            Ok(id) => {
                debug!(id, url = %record.url, located, "Stored post");
                Ok(PostOutcome::Inserted { located })
            }
            Err(e) if is_duplicate(&e) => Ok(PostOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    async fn place_candidates(&self, cleaned_text: &str) -> Vec<String> {
        let Some(locator) = &self.locator else {
            return Vec::new();
        };
        match locator.locate(cleaned_text).await {
            Ok(entities) => location_candidates(&entities),
            Err(e) => {
                warn!(error = %e, "Entity extraction failed, storing post without location");
                Vec::new()
            }
        }
    }
}

/// Geocode candidates in order and stop at the first that resolves.
///
/// A geocoder error on one candidate is logged and the next one is tried.
/// Returns the name that actually resolved alongside its coordinates.
pub async fn resolve_location(
    geocoder: &dyn GeoResolver,
    candidates: &[String],
) -> Option<(String, Coordinates)> {
    for place in candidates {
        match geocoder.resolve(place).await {
            Ok(Some(coordinates)) => return Some((place.clone(), coordinates)),
            Ok(None) => debug!(place = %place, "No geocoder match"),
            Err(e) => warn!(place = %place, error = %e, "Geocoder error, trying next candidate"),
        }
    }
    None
}
