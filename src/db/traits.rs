// RecordStore trait: backend-agnostic async interface for all record I/O.
//
// Implementors: SqliteRecordStore (wraps rusqlite), PgRecordStore (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface.
//
// Every write is durable before the method returns. The source link (`url`)
// is the natural key; the numeric id is only used to address rows.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{ApplySummary, NewRecord, Record, StoreCounts};

#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Pipeline surface ---

    /// True iff a record with this source link is currently stored.
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Insert a new record and return its storage id.
    ///
    /// Fails with `StoreError::DuplicateKey` when the link is already stored.
    /// The uniqueness check and the insert are one atomic statement.
    async fn insert(&self, record: &NewRecord) -> Result<i64>;

    /// All records with no score yet, oldest first.
    async fn list_unscored(&self) -> Result<Vec<Record>>;

    /// Resolve each record: the irrelevant label deletes it, any other label
    /// is stored as its score. Each record's transition commits on its own.
    /// Records that are no longer unscored are left untouched.
    async fn apply_scores(&self, batch: &[(Record, i64)]) -> Result<ApplySummary>;

    // --- Read API ---

    async fn list_all(&self) -> Result<Vec<Record>>;

    async fn list_by_keyword(&self, keyword: &str) -> Result<Vec<Record>>;

    /// Records with both coordinates present.
    async fn list_located(&self) -> Result<Vec<Record>>;

    /// Records that already carry a score.
    async fn list_scored(&self) -> Result<Vec<Record>>;

    // --- Maintenance ---

    async fn counts(&self) -> Result<StoreCounts>;

    /// Number of stored records per keyword, most frequent first.
    async fn keyword_counts(&self) -> Result<Vec<(String, i64)>>;

    /// Delete rows stored with the irrelevant label (left over from tables
    /// written before pruning happened at scoring time). Returns rows removed.
    async fn delete_irrelevant(&self) -> Result<usize>;
}
