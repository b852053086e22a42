// SqliteRecordStore: rusqlite backend implementing the RecordStore trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// Holding the lock for the whole statement also serializes the two cycles'
// writes, so an insert can never interleave with a score update.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{ApplySummary, NewRecord, Record, StoreCounts};
use super::traits::RecordStore;

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::record_exists(&conn, url)
    }

    async fn insert(&self, record: &NewRecord) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_record(&conn, record)
    }

    async fn list_unscored(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock().await;
        super::queries::list_unscored(&conn)
    }

    async fn apply_scores(&self, batch: &[(Record, i64)]) -> Result<ApplySummary> {
        let conn = self.conn.lock().await;
        super::queries::apply_scores(&conn, batch)
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock().await;
        super::queries::list_all(&conn)
    }

    async fn list_by_keyword(&self, keyword: &str) -> Result<Vec<Record>> {
        let conn = self.conn.lock().await;
        super::queries::list_by_keyword(&conn, keyword)
    }

    async fn list_located(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock().await;
        super::queries::list_located(&conn)
    }

    async fn list_scored(&self) -> Result<Vec<Record>> {
        let conn = self.conn.lock().await;
        super::queries::list_scored(&conn)
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.lock().await;
        super::queries::counts(&conn)
    }

    async fn keyword_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock().await;
        super::queries::keyword_counts(&conn)
    }

    async fn delete_irrelevant(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::delete_irrelevant(&conn)
    }
}
