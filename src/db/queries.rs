// Database queries: CRUD operations on the `records` table.
//
// Every SQLite interaction goes through this module. This keeps SQL contained
// in one place and gives the rest of the app clean Rust interfaces.

use anyhow::Result;
use rusqlite::{params, Connection, Row};

use super::models::{
    ApplySummary, Coordinates, NewRecord, Record, StoreCounts, IRRELEVANT_LABEL,
};
use super::StoreError;

const RECORD_COLUMNS: &str = "id, url, author, text, original_text, keyword, created_at,
                              location, latitude, longitude, score";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let latitude: Option<f64> = row.get(8)?;
    let longitude: Option<f64> = row.get(9)?;
    Ok(Record {
        id: row.get(0)?,
        url: row.get(1)?,
        author: row.get(2)?,
        text: row.get(3)?,
        original_text: row.get(4)?,
        keyword: row.get(5)?,
        created_at: row.get(6)?,
        location: row.get(7)?,
        coordinates: Coordinates::from_columns(latitude, longitude),
        score: row.get(10)?,
    })
}

/// Run a SELECT over `records` with the given WHERE/ORDER tail.
fn select_records(
    conn: &Connection,
    tail: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Record>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records {tail}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, record_from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

// --- Pipeline surface ---

/// Whether a record with this source link is stored.
pub fn record_exists(conn: &Connection, url: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM records WHERE url = ?1)",
        params![url],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert a record. `ON CONFLICT DO NOTHING` makes the uniqueness check and
/// the write a single statement; zero affected rows means the link exists.
pub fn insert_record(conn: &Connection, record: &NewRecord) -> Result<i64> {
    let (latitude, longitude) = match record.coordinates {
        Some(c) => (Some(c.latitude), Some(c.longitude)),
        None => (None, None),
    };

    let inserted = conn.execute(
        "INSERT INTO records (url, author, text, original_text, keyword, created_at,
                              location, latitude, longitude)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(url) DO NOTHING",
        params![
            record.url,
            record.author,
            record.text(),
            record.original_text(),
            record.keyword,
            record.created_at,
            record.location,
            latitude,
            longitude,
        ],
    )?;

    if inserted == 0 {
        return Err(StoreError::DuplicateKey {
            url: record.url.clone(),
        }
        .into());
    }

    Ok(conn.last_insert_rowid())
}

/// All records still waiting for a score, oldest first.
pub fn list_unscored(conn: &Connection) -> Result<Vec<Record>> {
    select_records(conn, "WHERE score IS NULL ORDER BY id", [])
}

/// Apply classifier labels one record at a time. Each statement commits on
/// its own, and the `score IS NULL` guard keeps resolved rows untouched.
pub fn apply_scores(conn: &Connection, batch: &[(Record, i64)]) -> Result<ApplySummary> {
    let mut summary = ApplySummary::default();

    for (record, label) in batch {
        if *label == IRRELEVANT_LABEL {
            let deleted = conn.execute(
                "DELETE FROM records WHERE id = ?1 AND score IS NULL",
                params![record.id],
            )?;
            if deleted > 0 {
                summary.deleted += 1;
            } else {
                summary.skipped += 1;
            }
        } else {
            let updated = conn.execute(
                "UPDATE records SET score = ?2 WHERE id = ?1 AND score IS NULL",
                params![record.id, label],
            )?;
            if updated > 0 {
                summary.scored += 1;
            } else {
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

// --- Read API ---

pub fn list_all(conn: &Connection) -> Result<Vec<Record>> {
    select_records(conn, "ORDER BY id", [])
}

pub fn list_by_keyword(conn: &Connection, keyword: &str) -> Result<Vec<Record>> {
    select_records(conn, "WHERE keyword = ?1 ORDER BY id", params![keyword])
}

pub fn list_located(conn: &Connection) -> Result<Vec<Record>> {
    select_records(
        conn,
        "WHERE latitude IS NOT NULL AND longitude IS NOT NULL ORDER BY id",
        [],
    )
}

pub fn list_scored(conn: &Connection) -> Result<Vec<Record>> {
    select_records(conn, "WHERE score IS NOT NULL ORDER BY id", [])
}

// --- Maintenance ---

pub fn counts(conn: &Connection) -> Result<StoreCounts> {
    let counts = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN score IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN score IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN latitude IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN score = ?1 THEN 1 ELSE 0 END), 0)
         FROM records",
        params![IRRELEVANT_LABEL],
        |row| {
            Ok(StoreCounts {
                total: row.get(0)?,
                unscored: row.get(1)?,
                scored: row.get(2)?,
                located: row.get(3)?,
                irrelevant: row.get(4)?,
            })
        },
    )?;
    Ok(counts)
}

pub fn keyword_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT keyword, COUNT(*) AS n FROM records
         GROUP BY keyword
         ORDER BY n DESC, keyword ASC",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut counts = Vec::new();
    for row in rows {
        counts.push(row?);
    }
    Ok(counts)
}

pub fn delete_irrelevant(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM records WHERE score = ?1",
        params![IRRELEVANT_LABEL],
    )?;
    Ok(deleted)
}
