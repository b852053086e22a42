// Database layer: persistent store for harvested disaster posts.
//
// SQLite (rusqlite, bundled) is the default backend; PostgreSQL is available
// behind the `postgres` feature. Both implement the RecordStore trait, and the
// rest of the app only ever sees `Arc<dyn RecordStore>`.

pub mod models;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod queries;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use models::{ApplySummary, Coordinates, NewRecord, Record, StoreCounts, IRRELEVANT_LABEL};
pub use traits::RecordStore;

#[cfg(feature = "sqlite")]
use anyhow::Context;
use anyhow::Result;
#[cfg(feature = "sqlite")]
use rusqlite::Connection;
#[cfg(feature = "sqlite")]
use std::path::Path;
use std::sync::Arc;

/// Expected store outcomes that callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a record with source link {url} already exists")]
    DuplicateKey { url: String },
}

/// True when the error is a `StoreError::DuplicateKey`.
pub fn is_duplicate(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::DuplicateKey { .. })
    )
}

/// Open (or create) the SQLite database and run migrations.
#[cfg(feature = "sqlite")]
pub fn initialize(db_path: &str) -> Result<Connection> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL lets the read API query while a cycle is writing
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing SQLite database (fails if it doesn't exist yet).
#[cfg(feature = "sqlite")]
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `disaster-watch init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Pick up migrations added since the file was created
    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Create or migrate the SQLite database and wrap it as a RecordStore.
#[cfg(feature = "sqlite")]
pub fn initialize_sqlite(db_path: &str) -> Result<Arc<dyn RecordStore>> {
    let conn = initialize(db_path)?;
    Ok(Arc::new(sqlite::SqliteRecordStore::new(conn)))
}

/// Open an existing SQLite database as a RecordStore.
#[cfg(feature = "sqlite")]
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn RecordStore>> {
    let conn = open(db_path)?;
    Ok(Arc::new(sqlite::SqliteRecordStore::new(conn)))
}

/// A throwaway in-memory store. Nothing survives the process.
#[cfg(feature = "sqlite")]
pub fn in_memory_sqlite() -> Result<Arc<dyn RecordStore>> {
    let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
    schema::create_tables(&conn)?;
    Ok(Arc::new(sqlite::SqliteRecordStore::new(conn)))
}

#[cfg(not(feature = "sqlite"))]
pub fn initialize_sqlite(_db_path: &str) -> Result<Arc<dyn RecordStore>> {
    anyhow::bail!(
        "SQLite support is not compiled in. Set DATABASE_URL to a postgres:// URL \
         or rebuild with the `sqlite` feature."
    )
}

#[cfg(not(feature = "sqlite"))]
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn RecordStore>> {
    initialize_sqlite(db_path)
}

/// Connect to PostgreSQL, run migrations, and wrap the pool as a RecordStore.
#[cfg(feature = "postgres")]
pub async fn connect_postgres(database_url: &str) -> Result<Arc<dyn RecordStore>> {
    let db = postgres::PgRecordStore::connect(database_url).await?;
    Ok(Arc::new(db))
}
