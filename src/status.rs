// System status display: record counts, per-keyword totals, sample rows.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::RecordStore;
use crate::output::terminal;

/// Display store status to the terminal.
///
/// `db_file` is the SQLite path when that backend is in use; for PostgreSQL
/// pass `None` and the file line is skipped.
pub async fn show(store: &Arc<dyn RecordStore>, db_file: Option<&str>) -> Result<()> {
    if let Some(path) = db_file {
        let file_size = std::fs::metadata(Path::new(path))
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|_| "unknown".to_string());
        println!("Database: {} ({})", path, file_size);
    } else {
        println!("Database: PostgreSQL");
    }
    println!("Tables: {}", store.table_count().await?);

    let counts = store.counts().await?;
    terminal::display_counts(&counts);
    terminal::display_keyword_counts(&store.keyword_counts().await?);

    if let Some(record) = store.list_unscored().await?.first() {
        terminal::display_record("Oldest unscored", record);
    }
    if let Some(record) = store.list_scored().await?.last() {
        terminal::display_record("Latest scored", record);
    }

    if counts.total == 0 {
        println!("\nNo records yet. Run `disaster-watch ingest` or `disaster-watch run`.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
