// The two cooperating cycles and the coordinator that runs them.

pub mod coordinator;
pub mod ingest;
pub mod score;

pub use coordinator::{Coordinator, CyclePolicy, ReadinessLatch};
pub use ingest::{IngestReport, IngestSettings, IngestionCycle};
pub use score::{ScoringCycle, ScoringError, ScoringOutcome};
