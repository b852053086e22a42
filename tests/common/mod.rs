// Scripted collaborators shared by the integration tests.
//
// Each fake answers from a fixed script and records how it was called, so
// tests can assert on both the stored result and the calls that produced it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use disaster_watch::bluesky::search::at_uri_to_link;
use disaster_watch::bluesky::{PostSource, SearchQuery, SourcePost};
use disaster_watch::classify::RelevanceClassifier;
use disaster_watch::db::Coordinates;
use disaster_watch::geo::GeoResolver;
use disaster_watch::nlp::{Entity, EntityLocator};
use disaster_watch::pipeline::IngestSettings;

pub fn post(rkey: &str, text: &str) -> SourcePost {
    SourcePost {
        uri: format!("at://did:plc:reporter/app.bsky.feed.post/{rkey}"),
        author_handle: "reporter.bsky.social".to_string(),
        text: text.to_string(),
        created_at: "2025-03-01T12:00:00.000Z".to_string(),
    }
}

pub fn link(rkey: &str) -> String {
    format!("https://bsky.app/profile/did:plc:reporter/post/{rkey}")
}

pub fn settings(keywords: &[&str]) -> IngestSettings {
    IngestSettings {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        lookback: chrono::Duration::seconds(60),
        limit: 100,
        lang: "en".to_string(),
    }
}

// ============================================================
// Post source
// ============================================================

/// Returns the same posts for a keyword on every search. Keywords listed in
/// `failing` return an error instead.
#[derive(Default)]
pub struct ScriptedSource {
    posts: HashMap<String, Vec<SourcePost>>,
    failing: Vec<String>,
    delay: Option<Duration>,
    pub queries: Mutex<Vec<SearchQuery>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, keyword: &str, posts: Vec<SourcePost>) -> Self {
        self.posts.insert(keyword.to_string(), posts);
        self
    }

    pub fn failing(mut self, keyword: &str) -> Self {
        self.failing.push(keyword.to_string());
        self
    }

    /// Make every search take this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn searched_keywords(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.keyword.clone())
            .collect()
    }
}

#[async_trait]
impl PostSource for ScriptedSource {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SourcePost>> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&query.keyword) {
            anyhow::bail!("429 Too Many Requests");
        }
        Ok(self.posts.get(&query.keyword).cloned().unwrap_or_default())
    }

    fn canonical_link(&self, post: &SourcePost) -> Option<String> {
        at_uri_to_link(&post.uri)
    }
}

// ============================================================
// Entity locator
// ============================================================

/// Returns the scripted entities for any text containing the trigger word.
#[derive(Default)]
pub struct ScriptedLocator {
    rules: Vec<(String, Vec<Entity>)>,
    pub calls: AtomicUsize,
}

impl ScriptedLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when_contains(mut self, trigger: &str, entities: Vec<Entity>) -> Self {
        self.rules.push((trigger.to_string(), entities));
        self
    }
}

#[async_trait]
impl EntityLocator for ScriptedLocator {
    async fn locate(&self, text: &str) -> Result<Vec<Entity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rules
            .iter()
            .find(|(trigger, _)| text.contains(trigger.as_str()))
            .map(|(_, entities)| entities.clone())
            .unwrap_or_default())
    }
}

// ============================================================
// Geocoder
// ============================================================

/// Knows a fixed set of places. Names in `failing` raise a transient error.
#[derive(Default)]
pub struct ScriptedGeocoder {
    places: HashMap<String, (f64, f64)>,
    failing: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knows(mut self, place: &str, latitude: f64, longitude: f64) -> Self {
        self.places.insert(place.to_string(), (latitude, longitude));
        self
    }

    pub fn failing(mut self, place: &str) -> Self {
        self.failing.push(place.to_string());
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeoResolver for ScriptedGeocoder {
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>> {
        self.calls.lock().unwrap().push(place.to_string());
        if self.failing.iter().any(|f| f == place) {
            anyhow::bail!("geocoder timed out");
        }
        Ok(self
            .places
            .get(place)
            .and_then(|(lat, lon)| Coordinates::new(*lat, *lon)))
    }
}

// ============================================================
// Classifier
// ============================================================

pub enum ClassifierScript {
    /// Label decided per text: first matching substring wins, else the default.
    ByText {
        rules: Vec<(String, i64)>,
        default: i64,
    },
    /// Always return this many labels of 1, whatever the input length.
    FixedCount(usize),
    Fail,
}

pub struct ScriptedClassifier {
    script: ClassifierScript,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn by_text(rules: &[(&str, i64)], default: i64) -> Self {
        Self::new(ClassifierScript::ByText {
            rules: rules.iter().map(|(t, l)| (t.to_string(), *l)).collect(),
            default,
        })
    }

    pub fn new(script: ClassifierScript) -> Self {
        Self {
            script,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl RelevanceClassifier for ScriptedClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<i64>> {
        self.batches.lock().unwrap().push(texts.to_vec());
        match &self.script {
            ClassifierScript::ByText { rules, default } => Ok(texts
                .iter()
                .map(|text| {
                    rules
                        .iter()
                        .find(|(needle, _)| text.contains(needle.as_str()))
                        .map(|(_, label)| *label)
                        .unwrap_or(*default)
                })
                .collect()),
            ClassifierScript::FixedCount(n) => Ok(vec![1; *n]),
            ClassifierScript::Fail => anyhow::bail!("model session crashed"),
        }
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
