// Entity locator trait: text in, typed entity spans out.
//
// The ingestion cycle only cares about places, so the geography filter lives
// here beside the trait rather than inside any one implementation.

use anyhow::Result;
use async_trait::async_trait;

/// Entity types that name somewhere a geocoder can find. Covers both
/// OntoNotes-style labels (GPE, LOC, FAC) and CoNLL-style LOCATION.
const GEOGRAPHIC_KINDS: [&str; 4] = ["GPE", "LOC", "FAC", "LOCATION"];

/// One named-entity span as it appeared in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub text: String,
    /// Entity type without any B-/I- tagging prefix, e.g. "GPE".
    pub kind: String,
}

impl Entity {
    pub fn new(text: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: kind.into(),
        }
    }
}

#[async_trait]
pub trait EntityLocator: Send + Sync {
    /// Extract entities from `text`, in the order they occur.
    async fn locate(&self, text: &str) -> Result<Vec<Entity>>;
}

pub fn is_geographic(kind: &str) -> bool {
    GEOGRAPHIC_KINDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(kind))
}

/// Place names worth geocoding, in source order. A place mentioned twice is
/// only tried once, at its first position.
pub fn location_candidates(entities: &[Entity]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for entity in entities {
        let name = entity.text.trim();
        if name.is_empty() || !is_geographic(&entity.kind) {
            continue;
        }
        if !candidates.iter().any(|c| c == name) {
            candidates.push(name.to_string());
        }
    }
    candidates
}
