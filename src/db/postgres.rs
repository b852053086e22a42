// PgRecordStore: PostgreSQL backend implementing the RecordStore trait.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Every statement runs on the pool outside an explicit transaction, so each
// insert and each score transition commits on its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{
    ApplySummary, Coordinates, NewRecord, Record, StoreCounts, IRRELEVANT_LABEL,
};
use super::traits::RecordStore;
use super::StoreError;

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

const RECORD_COLUMNS: &str = "id, url, author, text, original_text, keyword, created_at,
                              location, latitude, longitude, score";

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations under a session-level advisory lock so two
    /// processes starting together don't race to apply the same migration.
    ///
    /// The lock and unlock must run on the same physical connection, so a
    /// dedicated connection holds the lock for the whole sequence. The unlock
    /// always runs, even when a migration fails.
    async fn run_migrations(&self) -> Result<()> {
        // ASCII "DISASTER" as a big-endian i64.
        const MIGRATION_LOCK_KEY: i64 = 0x4449534153544552_u64 as i64;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [
                (1, include_str!("../../migrations/postgres/0001_initial.sql")),
                (2, include_str!("../../migrations/postgres/0002_located_index.sql")),
            ];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // Schema change and schema_version insert commit together
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        // Migration error takes priority over unlock error.
        migration_result?;
        unlock_result?;

        Ok(())
    }

    async fn select_records(&self, tail: &str) -> Result<Vec<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records {tail}");
        let rows = sqlx_core::query::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}

fn record_from_row(row: &PgRow) -> Record {
    Record {
        id: row.get(0),
        url: row.get(1),
        author: row.get(2),
        text: row.get(3),
        original_text: row.get(4),
        keyword: row.get(5),
        created_at: row.get(6),
        location: row.get(7),
        coordinates: Coordinates::from_columns(row.get(8), row.get(9)),
        score: row.get(10),
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let row = sqlx_core::query::query("SELECT EXISTS(SELECT 1 FROM records WHERE url = $1)")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<bool, _>(0))
    }

    async fn insert(&self, record: &NewRecord) -> Result<i64> {
        let (latitude, longitude) = match record.coordinates {
            Some(c) => (Some(c.latitude), Some(c.longitude)),
            None => (None, None),
        };

        let row = sqlx_core::query::query(
            "INSERT INTO records (url, author, text, original_text, keyword, created_at,
                                  location, latitude, longitude)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (url) DO NOTHING
             RETURNING id",
        )
        .bind(&record.url)
        .bind(&record.author)
        .bind(record.text())
        .bind(record.original_text())
        .bind(&record.keyword)
        .bind(&record.created_at)
        .bind(&record.location)
        .bind(latitude)
        .bind(longitude)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.get::<i64, _>(0)),
            None => Err(StoreError::DuplicateKey {
                url: record.url.clone(),
            }
            .into()),
        }
    }

    async fn list_unscored(&self) -> Result<Vec<Record>> {
        self.select_records("WHERE score IS NULL ORDER BY id").await
    }

    async fn apply_scores(&self, batch: &[(Record, i64)]) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();

        for (record, label) in batch {
            if *label == IRRELEVANT_LABEL {
                let result =
                    sqlx_core::query::query("DELETE FROM records WHERE id = $1 AND score IS NULL")
                        .bind(record.id)
                        .execute(&self.pool)
                        .await?;
                if result.rows_affected() > 0 {
                    summary.deleted += 1;
                } else {
                    summary.skipped += 1;
                }
            } else {
                let result = sqlx_core::query::query(
                    "UPDATE records SET score = $2 WHERE id = $1 AND score IS NULL",
                )
                .bind(record.id)
                .bind(*label)
                .execute(&self.pool)
                .await?;
                if result.rows_affected() > 0 {
                    summary.scored += 1;
                } else {
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        self.select_records("ORDER BY id").await
    }

    async fn list_by_keyword(&self, keyword: &str) -> Result<Vec<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE keyword = $1 ORDER BY id");
        let rows = sqlx_core::query::query(&sql)
            .bind(keyword)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn list_located(&self) -> Result<Vec<Record>> {
        self.select_records("WHERE latitude IS NOT NULL AND longitude IS NOT NULL ORDER BY id")
            .await
    }

    async fn list_scored(&self) -> Result<Vec<Record>> {
        self.select_records("WHERE score IS NOT NULL ORDER BY id")
            .await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint,
                    COUNT(*) FILTER (WHERE score IS NULL)::bigint,
                    COUNT(*) FILTER (WHERE score IS NOT NULL)::bigint,
                    COUNT(*) FILTER (WHERE latitude IS NOT NULL)::bigint,
                    COUNT(*) FILTER (WHERE score = $1)::bigint
             FROM records",
        )
        .bind(IRRELEVANT_LABEL)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            total: row.get(0),
            unscored: row.get(1),
            scored: row.get(2),
            located: row.get(3),
            irrelevant: row.get(4),
        })
    }

    async fn keyword_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx_core::query::query(
            "SELECT keyword, COUNT(*)::bigint AS n FROM records
             GROUP BY keyword
             ORDER BY n DESC, keyword ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
            .collect())
    }

    async fn delete_irrelevant(&self) -> Result<usize> {
        let result = sqlx_core::query::query("DELETE FROM records WHERE score = $1")
            .bind(IRRELEVANT_LABEL)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
