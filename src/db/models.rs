// Data models: Rust structs that map to `records` rows.
//
// These are the types that flow between the cycles. They're separate from
// the database queries so other modules can use them without depending on
// a particular backend.

use serde::{Deserialize, Serialize};

use crate::text::normalize;

/// Classifier label meaning "not about a disaster". A record that receives
/// this label is deleted instead of being stored with it.
pub const IRRELEVANT_LABEL: i64 = 0;

/// A resolved point. Latitude and longitude only ever travel together, so a
/// record either has both or neither.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build a coordinate pair, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    /// Rebuild from two nullable columns. Only a complete pair survives.
    pub fn from_columns(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Some(Self {
                latitude: lat,
                longitude: lon,
            }),
            _ => None,
        }
    }
}

/// A post that passed deduplication and is about to be inserted.
///
/// The cleaned text is always derived from the original text inside the
/// constructor, so the two can never diverge.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub url: String,
    pub author: String,
    pub keyword: String,
    /// Creation time exactly as the source reported it.
    pub created_at: String,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    text: String,
    original_text: String,
}

impl NewRecord {
    pub fn new(
        url: impl Into<String>,
        author: impl Into<String>,
        original_text: impl Into<String>,
        keyword: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        let original_text = original_text.into();
        Self {
            url: url.into(),
            author: author.into(),
            keyword: keyword.into(),
            created_at: created_at.into(),
            location: None,
            coordinates: None,
            text: normalize(&original_text),
            original_text,
        }
    }

    /// Attach the place name that resolved and its coordinates.
    pub fn with_location(mut self, name: impl Into<String>, coordinates: Coordinates) -> Self {
        self.location = Some(name.into());
        self.coordinates = Some(coordinates);
        self
    }

    /// Lowercased, punctuation-stripped text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }
}

/// A stored record. `score == None` means it is still waiting for the
/// scoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub url: String,
    pub author: String,
    pub text: String,
    pub original_text: String,
    pub keyword: String,
    pub created_at: String,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub score: Option<i64>,
}

impl Record {
    pub fn is_unscored(&self) -> bool {
        self.score.is_none()
    }
}

/// What `apply_scores` did with a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Records that received a non-irrelevant label.
    pub scored: usize,
    /// Records removed because their label was the irrelevant sentinel.
    pub deleted: usize,
    /// Records that were already gone or already scored.
    pub skipped: usize,
}

/// Aggregate record counts for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub total: i64,
    pub unscored: i64,
    pub scored: i64,
    pub located: i64,
    /// Stored rows carrying the irrelevant label. Always zero unless the
    /// table predates the pruning rule.
    pub irrelevant: i64,
}
