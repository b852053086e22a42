// Scoring cycle: classify every unscored record, then store or prune.
//
// The whole unscored backlog goes to the classifier in one call. If that call
// fails, or returns the wrong number of labels, nothing is written and every
// row stays unscored for the next pass.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info};

use crate::classify::RelevanceClassifier;
use crate::db::{ApplySummary, Record, RecordStore};
use crate::text::normalize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("classifier returned {labels} labels for {texts} texts")]
    LengthMismatch { texts: usize, labels: usize },
}

/// How a scoring pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringOutcome {
    /// Nothing was waiting.
    Idle,
    /// Labels were applied to the backlog.
    Applied(ApplySummary),
    /// No classifier is loaded, so the cycle does nothing.
    Unavailable,
}

pub struct ScoringCycle {
    store: Arc<dyn RecordStore>,
    classifier: Option<Arc<dyn RelevanceClassifier>>,
}

impl ScoringCycle {
    pub fn new(
        store: Arc<dyn RecordStore>,
        classifier: Option<Arc<dyn RelevanceClassifier>>,
    ) -> Self {
        Self { store, classifier }
    }

    pub async fn run_pass(&self) -> Result<ScoringOutcome> {
        let Some(classifier) = &self.classifier else {
            return Ok(ScoringOutcome::Unavailable);
        };

        let pending = self.store.list_unscored().await?;
        if pending.is_empty() {
            debug!("No unscored records");
            return Ok(ScoringOutcome::Idle);
        }

        // Stored text is already clean; normalize is idempotent, so this only
        // matters for rows written by something other than this pipeline.
        let texts: Vec<String> = pending.iter().map(|r| normalize(&r.text)).collect();

        let labels = classifier.classify(&texts).await?;
        let batch = pair_labels(pending, labels)?;

        let summary = self.store.apply_scores(&batch).await?;
        info!(
            scored = summary.scored,
            deleted = summary.deleted,
            skipped = summary.skipped,
            "Scoring pass complete"
        );

        Ok(ScoringOutcome::Applied(summary))
    }
}

/// Zip records with their labels, refusing to guess when the counts differ.
fn pair_labels(
    records: Vec<Record>,
    labels: Vec<i64>,
) -> std::result::Result<Vec<(Record, i64)>, ScoringError> {
    if records.len() != labels.len() {
        return Err(ScoringError::LengthMismatch {
            texts: records.len(),
            labels: labels.len(),
        });
    }
    Ok(records.into_iter().zip(labels).collect())
}
