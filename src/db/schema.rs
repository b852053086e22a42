// Database schema: table creation and migrations.
//
// A `schema_version` table tracks which migrations have run, and each
// migration is a function that executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent: safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per harvested post. url is the natural key.
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,           -- canonical bsky.app link
            author TEXT NOT NULL,               -- author handle
            text TEXT NOT NULL,                 -- normalized text
            original_text TEXT NOT NULL,
            keyword TEXT NOT NULL,              -- keyword whose search returned the post
            created_at TEXT NOT NULL,           -- as reported by the source
            location TEXT,
            latitude REAL,
            longitude REAL,
            score INTEGER,                      -- NULL until classified
            ingested_at TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK ((latitude IS NULL) = (longitude IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_records_keyword
            ON records(keyword);

        -- The scoring cycle's queue
        CREATE INDEX IF NOT EXISTS idx_records_unscored
            ON records(id) WHERE score IS NULL;
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: partial index backing the heatmap query
    // (records with coordinates).
    run_migration(conn, 2, |c| {
        c.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_records_located
                ON records(id) WHERE latitude IS NOT NULL;",
        )
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        let versions: Vec<i64> = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_table_count() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        // schema_version, records
        assert_eq!(table_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_half_coordinates_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO records (url, author, text, original_text, keyword, created_at, latitude)
             VALUES ('u', 'a', 't', 'T', 'flood', '2025-01-01T00:00:00Z', 30.0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_url_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let insert = "INSERT INTO records (url, author, text, original_text, keyword, created_at)
                      VALUES ('u', 'a', 't', 'T', 'flood', '2025-01-01T00:00:00Z')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
