use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pipeline::{CyclePolicy, IngestSettings};

/// Keywords searched when DISASTER_KEYWORDS is unset.
pub const DEFAULT_KEYWORDS: [&str; 13] = [
    "avalanche",
    "blizzard",
    "drought",
    "duststorm",
    "earthquake",
    "eruption",
    "flood",
    "flooding",
    "hailstorm",
    "hurricane",
    "landslide",
    "tornado",
    "wildfire",
];

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Nothing here
/// is required: with no environment at all the pipeline searches anonymously
/// and writes to ./disaster-watch.db.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional; with an app password, searches go through a PDS session.
    pub bluesky_handle: String,
    pub bluesky_app_password: String,
    /// XRPC host for anonymous requests.
    pub public_api_url: String,
    /// Host for createSession and authenticated requests.
    pub pds_url: String,
    pub db_path: String,
    /// PostgreSQL connection URL (when set and starts with postgres://, uses Postgres backend)
    pub database_url: Option<String>,
    pub keywords: Vec<String>,
    pub lookback_secs: u64,
    pub search_limit: u32,
    pub search_lang: String,
    pub ingest_pause_secs: u64,
    pub score_idle_secs: u64,
    pub score_error_secs: u64,
    pub ready_poll_secs: u64,
    pub nominatim_url: String,
    /// Geocoder country filter; empty searches worldwide.
    pub geo_country: String,
    /// Root directory holding `ner/` and `classifier/`.
    pub model_dir: PathBuf,
    /// Base URL `download-model` fetches from.
    pub model_url: Option<String>,
    /// Origin allowed by CORS on the read API.
    #[cfg(feature = "web")]
    pub web_origin: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key → value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let get_u64 = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a whole number, got '{v}'")),
                None => Ok(default),
            }
        };

        let keywords = match get("DISASTER_KEYWORDS") {
            Some(raw) => parse_keywords(&raw),
            None => DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        let search_limit = get_u64("DISASTER_SEARCH_LIMIT", 100)?;
        let score_idle_secs = get_u64("DISASTER_SCORE_IDLE_SECS", 60)?;

        let model_dir = get("DISASTER_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(crate::nlp::download::default_model_dir);

        Ok(Self {
            bluesky_handle: get_or("BLUESKY_HANDLE", ""),
            bluesky_app_password: get_or("BLUESKY_APP_PASSWORD", ""),
            public_api_url: get_or(
                "BLUESKY_API_URL",
                crate::bluesky::client::DEFAULT_PUBLIC_API_URL,
            ),
            pds_url: get_or("BLUESKY_PDS_URL", crate::bluesky::client::DEFAULT_PDS_URL),
            db_path: get_or("DISASTER_DB_PATH", "./disaster-watch.db"),
            database_url: get("DATABASE_URL"),
            keywords,
            lookback_secs: get_u64("DISASTER_LOOKBACK_SECS", 60)?,
            search_limit: u32::try_from(search_limit)
                .context("DISASTER_SEARCH_LIMIT is out of range")?,
            search_lang: get_or("DISASTER_SEARCH_LANG", "en"),
            ingest_pause_secs: get_u64("DISASTER_INGEST_PAUSE_SECS", 15)?,
            score_idle_secs,
            score_error_secs: get_u64("DISASTER_SCORE_ERROR_SECS", score_idle_secs * 5)?,
            ready_poll_secs: get_u64("DISASTER_READY_POLL_SECS", 10)?,
            nominatim_url: get_or(
                "NOMINATIM_URL",
                crate::geo::nominatim::DEFAULT_NOMINATIM_URL,
            ),
            geo_country: get_or("DISASTER_GEO_COUNTRY", "us"),
            model_dir,
            model_url: get("DISASTER_MODEL_URL"),
            #[cfg(feature = "web")]
            web_origin: get_or("DISASTER_WEB_ORIGIN", "http://localhost:5173"),
        })
    }

    /// True when DATABASE_URL selects the PostgreSQL backend.
    pub fn uses_postgres(&self) -> bool {
        self.database_url
            .as_deref()
            .is_some_and(|url| url.starts_with("postgres://") || url.starts_with("postgresql://"))
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            keywords: self.keywords.clone(),
            lookback: chrono::Duration::seconds(self.lookback_secs as i64),
            limit: self.search_limit,
            lang: self.search_lang.clone(),
        }
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        CyclePolicy {
            ingest_pause: Duration::from_secs(self.ingest_pause_secs),
            score_idle: Duration::from_secs(self.score_idle_secs),
            score_error: Duration::from_secs(self.score_error_secs),
            readiness_poll: Duration::from_secs(self.ready_poll_secs),
        }
    }

    /// Check there is at least one keyword to search.
    pub fn require_keywords(&self) -> Result<()> {
        if self.keywords.is_empty() {
            anyhow::bail!(
                "DISASTER_KEYWORDS is set but contains no keywords.\n\
                 Unset it to use the built-in disaster keyword list."
            );
        }
        Ok(())
    }

    /// Check that both ONNX models are on disk.
    pub fn require_models(&self) -> Result<()> {
        use crate::nlp::download::{classifier_files_present, ner_files_present};

        let mut missing = Vec::new();
        if !ner_files_present(&self.model_dir) {
            missing.push("named-entity model");
        }
        if !classifier_files_present(&self.model_dir) {
            missing.push("relevance classifier");
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "Missing {} in {}\n\
                 Run `disaster-watch download-model` to download them.",
                missing.join(" and "),
                self.model_dir.display()
            );
        }
        Ok(())
    }
}

/// Split a comma-separated keyword list. Blank entries and repeats are dropped.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keywords.iter().any(|k| k == keyword) {
            keywords.push(keyword.to_string());
        }
    }
    keywords
}
