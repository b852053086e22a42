// Coordinator: runs the ingestion and scoring cycles as two independent
// tokio tasks, forever, until shutdown is signalled.
//
// The only coupling between the two loops (besides the store) is the
// readiness latch. Ingestion opens it after its first full pass; scoring
// polls it and does not touch the store until it is open. After that the
// loops never wait on each other.
//
// Shutdown is checked between passes and interrupts sleeps, but a pass that
// has started always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::ingest::IngestionCycle;
use super::score::{ScoringCycle, ScoringError, ScoringOutcome};

/// One-way "first ingestion pass finished" flag.
///
/// It starts closed and can only be opened. There is no reset: once scoring
/// has been released it stays released for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct ReadinessLatch(Arc<AtomicBool>);

impl ReadinessLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sleep intervals for both loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePolicy {
    /// Pause between ingestion passes.
    pub ingest_pause: Duration,
    /// Scoring wait after a pass that succeeded or found nothing to do.
    pub score_idle: Duration,
    /// Scoring wait after a failed pass. Longer than `score_idle` so a broken
    /// classifier or store isn't hammered.
    pub score_error: Duration,
    /// How often scoring checks the readiness latch before its first pass.
    pub readiness_poll: Duration,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        let score_idle = Duration::from_secs(60);
        Self {
            ingest_pause: Duration::from_secs(15),
            score_idle,
            score_error: score_idle * 5,
            readiness_poll: Duration::from_secs(10),
        }
    }
}

pub struct Coordinator {
    ingest: Arc<IngestionCycle>,
    score: Arc<ScoringCycle>,
    policy: CyclePolicy,
    latch: ReadinessLatch,
}

impl Coordinator {
    pub fn new(ingest: IngestionCycle, score: ScoringCycle, policy: CyclePolicy) -> Self {
        Self {
            ingest: Arc::new(ingest),
            score: Arc::new(score),
            policy,
            latch: ReadinessLatch::new(),
        }
    }

    /// A handle to the readiness latch, for status reporting.
    pub fn latch(&self) -> ReadinessLatch {
        self.latch.clone()
    }

    /// Start both loops and wait until both have stopped. They only stop once
    /// `shutdown` carries `true`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            keywords = self.ingest.keywords().len(),
            ingest_pause = ?self.policy.ingest_pause,
            score_idle = ?self.policy.score_idle,
            score_error = ?self.policy.score_error,
            "Starting ingestion and scoring loops"
        );

        let ingest = tokio::spawn(run_ingestion_loop(
            Arc::clone(&self.ingest),
            self.latch.clone(),
            self.policy,
            shutdown.clone(),
        ));
        let score = tokio::spawn(run_scoring_loop(
            Arc::clone(&self.score),
            self.latch.clone(),
            self.policy,
            shutdown,
        ));

        let (ingest_result, score_result) = tokio::join!(ingest, score);
        ingest_result.context("Ingestion loop panicked")?;
        score_result.context("Scoring loop panicked")?;

        info!("Pipeline stopped");
        Ok(())
    }
}

/// Ingest forever: one pass, open the latch, pause, repeat.
pub async fn run_ingestion_loop(
    cycle: Arc<IngestionCycle>,
    latch: ReadinessLatch,
    policy: CyclePolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        cycle.run_pass().await;

        // A pass where every keyword failed still counts: scoring has work
        // from earlier runs, and holding it back would gain nothing.
        if !latch.is_open() {
            latch.open();
            info!("First ingestion pass complete, scoring released");
        }

        if sleep_or_shutdown(policy.ingest_pause, &mut shutdown).await {
            break;
        }
    }
    info!("Ingestion loop stopped");
}

/// Score forever, once the latch is open. Failed passes back off for
/// `score_error` instead of `score_idle`.
pub async fn run_scoring_loop(
    cycle: Arc<ScoringCycle>,
    latch: ReadinessLatch,
    policy: CyclePolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    while !latch.is_open() {
        if sleep_or_shutdown(policy.readiness_poll, &mut shutdown).await {
            info!("Scoring loop stopped before first pass");
            return;
        }
    }

    let mut reported_unavailable = false;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let wait = match cycle.run_pass().await {
            Ok(ScoringOutcome::Applied(_)) | Ok(ScoringOutcome::Idle) => policy.score_idle,
            Ok(ScoringOutcome::Unavailable) => {
                if !reported_unavailable {
                    warn!("No relevance classifier loaded, scoring is disabled");
                    reported_unavailable = true;
                }
                policy.score_idle
            }
            Err(e) => {
                if let Some(mismatch) = e.downcast_ref::<ScoringError>() {
                    error!(error = %mismatch, "Classifier broke its contract, pass abandoned");
                } else {
                    warn!(error = %e, "Scoring pass failed, backing off");
                }
                policy.score_error
            }
        };

        if sleep_or_shutdown(wait, &mut shutdown).await {
            break;
        }
    }
    info!("Scoring loop stopped");
}

/// Sleep for `duration` unless shutdown arrives first. Returns true when the
/// caller should stop.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            // Sender gone: no shutdown can ever arrive, so just wait it out
            Err(_) => {
                tokio::time::sleep(duration).await;
                false
            }
        },
    }
}
