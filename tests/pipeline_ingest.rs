// Ingestion cycle tests: scripted source, locator and geocoder against an
// in-memory SQLite store.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{link, post, settings, ScriptedGeocoder, ScriptedLocator, ScriptedSource};
use disaster_watch::db::{in_memory_sqlite, NewRecord, RecordStore};
use disaster_watch::nlp::{Entity, EntityLocator};
use disaster_watch::pipeline::IngestionCycle;

fn cycle(
    source: &Arc<ScriptedSource>,
    locator: Option<&Arc<ScriptedLocator>>,
    geocoder: &Arc<ScriptedGeocoder>,
    store: &Arc<dyn RecordStore>,
    keywords: &[&str],
) -> IngestionCycle {
    IngestionCycle::new(
        source.clone(),
        locator.map(|l| l.clone() as Arc<dyn EntityLocator>),
        geocoder.clone(),
        Arc::clone(store),
        settings(keywords),
    )
}

// ============================================================
// End-to-end
// ============================================================

#[tokio::test]
async fn flood_post_in_austin_is_stored_located_and_unscored() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("flood", vec![post("p1", "Flood hits Austin today!")]),
    );
    let locator = Arc::new(
        ScriptedLocator::new().when_contains("austin", vec![Entity::new("Austin", "GPE")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new().knows("Austin", 30.27, -97.74));

    let report = cycle(&source, Some(&locator), &geocoder, &store, &["flood"])
        .run_pass()
        .await;
    assert_eq!(report.inserted, 1);
    assert_eq!(report.located, 1);

    let records = store.list_all().await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.url, link("p1"));
    assert_eq!(record.text, "flood hits austin today");
    assert_eq!(record.original_text, "Flood hits Austin today!");
    assert_eq!(record.keyword, "flood");
    assert_eq!(record.author, "reporter.bsky.social");
    assert_eq!(record.created_at, "2025-03-01T12:00:00.000Z");
    assert_eq!(record.location.as_deref(), Some("Austin"));
    let coords = record.coordinates.unwrap();
    assert_eq!(coords.latitude, 30.27);
    assert_eq!(coords.longitude, -97.74);
    assert_eq!(record.score, None);
}

#[tokio::test]
async fn search_uses_configured_window_limit_and_language() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(ScriptedSource::new());
    let geocoder = Arc::new(ScriptedGeocoder::new());

    cycle(&source, None, &geocoder, &store, &["tornado"])
        .run_pass()
        .await;

    let queries = source.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].keyword, "tornado");
    assert_eq!(queries[0].limit, 100);
    assert_eq!(queries[0].lang, "en");
    assert_eq!(
        queries[0].window.until - queries[0].window.since,
        chrono::Duration::seconds(60)
    );
}

// ============================================================
// Geolocation
// ============================================================

#[tokio::test]
async fn first_resolvable_candidate_wins() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("flood", vec![post("p1", "Flooding near A, B and C")]),
    );
    let locator = Arc::new(ScriptedLocator::new().when_contains(
        "flooding",
        vec![
            Entity::new("A", "GPE"),
            Entity::new("B", "LOC"),
            Entity::new("C", "FAC"),
        ],
    ));
    let geocoder = Arc::new(
        ScriptedGeocoder::new()
            .knows("B", 10.0, 20.0)
            .knows("C", 30.0, 40.0),
    );

    cycle(&source, Some(&locator), &geocoder, &store, &["flood"])
        .run_pass()
        .await;

    let record = &store.list_all().await.unwrap()[0];
    assert_eq!(record.location.as_deref(), Some("B"));
    assert_eq!(record.coordinates.unwrap().latitude, 10.0);
    // C never reaches the geocoder
    assert_eq!(geocoder.asked(), vec!["A", "B"]);
}

#[tokio::test]
async fn geocoder_error_moves_on_to_next_candidate() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("wildfire", vec![post("p1", "Wildfire spreading")]),
    );
    let locator = Arc::new(ScriptedLocator::new().when_contains(
        "wildfire",
        vec![Entity::new("Malibu", "GPE"), Entity::new("Ventura", "GPE")],
    ));
    let geocoder = Arc::new(
        ScriptedGeocoder::new()
            .failing("Malibu")
            .knows("Ventura", 34.27, -119.23),
    );

    cycle(&source, Some(&locator), &geocoder, &store, &["wildfire"])
        .run_pass()
        .await;

    let record = &store.list_all().await.unwrap()[0];
    assert_eq!(record.location.as_deref(), Some("Ventura"));
}

#[tokio::test]
async fn non_place_entities_are_never_geocoded() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("hurricane", vec![post("p1", "Hurricane update from FEMA")]),
    );
    let locator = Arc::new(ScriptedLocator::new().when_contains(
        "fema",
        vec![Entity::new("FEMA", "ORG"), Entity::new("Monday", "DATE")],
    ));
    let geocoder = Arc::new(ScriptedGeocoder::new().knows("FEMA", 1.0, 1.0));

    cycle(&source, Some(&locator), &geocoder, &store, &["hurricane"])
        .run_pass()
        .await;

    assert!(geocoder.asked().is_empty());
    let record = &store.list_all().await.unwrap()[0];
    assert!(record.location.is_none());
    assert!(record.coordinates.is_none());
}

#[tokio::test]
async fn unresolved_post_is_stored_without_location() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("drought", vec![post("p1", "Drought in Nowhereville")]),
    );
    let locator = Arc::new(ScriptedLocator::new().when_contains(
        "nowhereville",
        vec![Entity::new("Nowhereville", "GPE")],
    ));
    let geocoder = Arc::new(ScriptedGeocoder::new());

    let report = cycle(&source, Some(&locator), &geocoder, &store, &["drought"])
        .run_pass()
        .await;
    assert_eq!(report.inserted, 1);
    assert_eq!(report.located, 0);

    let record = &store.list_all().await.unwrap()[0];
    assert!(record.location.is_none());
    assert!(record.coordinates.is_none());
}

#[tokio::test]
async fn missing_locator_still_stores_posts() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("flood", vec![post("p1", "Flood hits Austin today!")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new().knows("Austin", 30.27, -97.74));

    let report = cycle(&source, None, &geocoder, &store, &["flood"])
        .run_pass()
        .await;

    assert_eq!(report.inserted, 1);
    assert!(geocoder.asked().is_empty());
    assert!(store.list_all().await.unwrap()[0].location.is_none());
}

#[tokio::test]
async fn coordinates_are_always_paired() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(ScriptedSource::new().with_posts(
        "tornado",
        vec![
            post("p1", "Tornado touched down in Moore"),
            post("p2", "Tornado watch for the whole state"),
            post("p3", "Tornado sirens in Atlantis"),
        ],
    ));
    let locator = Arc::new(
        ScriptedLocator::new()
            .when_contains("moore", vec![Entity::new("Moore", "GPE")])
            .when_contains("atlantis", vec![Entity::new("Atlantis", "GPE")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new().knows("Moore", 35.34, -97.49));

    cycle(&source, Some(&locator), &geocoder, &store, &["tornado"])
        .run_pass()
        .await;

    let records = store.list_all().await.unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.location.is_some(), record.coordinates.is_some());
    }
    assert_eq!(store.list_located().await.unwrap().len(), 1);
}

// ============================================================
// Deduplication
// ============================================================

#[tokio::test]
async fn second_pass_skips_already_stored_posts() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new().with_posts("flood", vec![post("p1", "Flood hits Austin today!")]),
    );
    let locator = Arc::new(
        ScriptedLocator::new().when_contains("austin", vec![Entity::new("Austin", "GPE")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new().knows("Austin", 30.27, -97.74));
    let ingest = cycle(&source, Some(&locator), &geocoder, &store, &["flood"]);

    let first = ingest.run_pass().await;
    let second = ingest.run_pass().await;

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(store.list_all().await.unwrap().len(), 1);
    // The duplicate is caught before any enrichment work
    assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(geocoder.asked().len(), 1);
}

#[tokio::test]
async fn same_post_under_two_keywords_is_stored_once() {
    let store = in_memory_sqlite().unwrap();
    let shared = post("p1", "Flooding after the hurricane");
    let source = Arc::new(
        ScriptedSource::new()
            .with_posts("flood", vec![shared.clone()])
            .with_posts("hurricane", vec![shared]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new());

    let report = cycle(&source, None, &geocoder, &store, &["flood", "hurricane"])
        .run_pass()
        .await;

    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    let records = store.list_all().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].keyword, "flood");
}

#[tokio::test]
async fn post_already_inserted_elsewhere_is_a_silent_duplicate() {
    let store = in_memory_sqlite().unwrap();
    store
        .insert(&NewRecord::new(
            link("p1"),
            "someone.bsky.social",
            "Earlier copy",
            "earthquake",
            "2025-03-01T11:00:00Z",
        ))
        .await
        .unwrap();

    let source = Arc::new(
        ScriptedSource::new().with_posts("earthquake", vec![post("p1", "Earthquake felt downtown")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new());

    let report = cycle(&source, None, &geocoder, &store, &["earthquake"])
        .run_pass()
        .await;

    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(store.list_all().await.unwrap()[0].original_text, "Earlier copy");
}

// ============================================================
// Partial failure
// ============================================================

#[tokio::test]
async fn failing_keyword_does_not_stop_the_pass() {
    let store = in_memory_sqlite().unwrap();
    let source = Arc::new(
        ScriptedSource::new()
            .failing("blizzard")
            .with_posts("flood", vec![post("p1", "Flood warning")])
            .with_posts("tornado", vec![post("p2", "Tornado warning")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new());

    let report = cycle(
        &source,
        None,
        &geocoder,
        &store,
        &["flood", "blizzard", "tornado"],
    )
    .run_pass()
    .await;

    assert_eq!(source.searched_keywords(), vec!["flood", "blizzard", "tornado"]);
    assert_eq!(report.keywords_searched, 2);
    assert_eq!(report.keywords_failed, 1);
    assert_eq!(report.inserted, 2);
}

#[tokio::test]
async fn malformed_post_uri_is_skipped() {
    let store = in_memory_sqlite().unwrap();
    let mut bad = post("p1", "Avalanche closes the pass");
    bad.uri = "not-an-at-uri".to_string();
    let source = Arc::new(
        ScriptedSource::new()
            .with_posts("avalanche", vec![bad, post("p2", "Avalanche warning issued")]),
    );
    let geocoder = Arc::new(ScriptedGeocoder::new());

    let report = cycle(&source, None, &geocoder, &store, &["avalanche"])
        .run_pass()
        .await;

    assert_eq!(report.skipped, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(store.list_all().await.unwrap()[0].url, link("p2"));
}
