//! Per-location SQLite store for ISMR records.
//!
//! Writes are keyed on `(weeknumber, timeofweek, SVID)`. A batch is one
//! file's worth of rows and is either committed completely or not at all.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Row, Sqlite, SqlitePool,
};
use tracing::{debug, warn};

use crate::{
    error::Result,
    models::{IsmrRecord, Layout, HEADER_NAMES, TIMESTAMP_NAME},
    query::{build_select, ReadingTable, ReadingsQuery},
    schema::{create_schema, validate_table_name},
};

/// Rows per `INSERT` statement. At 63 columns (full layout) this stays below
/// SQLite's 32766 bound-variable limit.
const ROWS_PER_STATEMENT: usize = 250;

// ---

/// Result of an all-or-nothing batch insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Every keyed row of the batch was committed.
    Inserted { rows: u64 },
    /// The batch hit an existing primary key and was rolled back.
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct ScintStore {
    pool: SqlitePool,
    table: String,
    layout: Layout,
}

impl ScintStore {
    /// Open (creating if missing) the database file and ensure the table.
    ///
    /// One connection only: the ingestion path is a single writer.
    pub async fn open(path: &Path, table: &str, layout: Layout) -> Result<Self> {
        // ---
        validate_table_name(table)?;
        debug!("Connect to SQLite db {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, table, layout).await
    }

    /// Wrap an existing pool and ensure the table exists.
    pub async fn with_pool(pool: SqlitePool, table: &str, layout: Layout) -> Result<Self> {
        // ---
        validate_table_name(table)?;
        let store = ScintStore {
            pool,
            table: table.to_string(),
            layout,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        create_schema(&self.pool, &self.table, self.layout).await
    }

    /// Insert one file's records in a single transaction.
    ///
    /// A primary-key conflict anywhere in the batch rolls the whole batch
    /// back and yields [`AppendOutcome::AlreadyPresent`]. Rows without a
    /// complete key cannot be deduplicated and are dropped.
    pub async fn append_batch(&self, records: &[IsmrRecord]) -> Result<AppendOutcome> {
        // ---
        let rows = self.keyed_rows(records);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut qb = self.insert_builder("INSERT", chunk);
            match qb.build().execute(&mut *tx).await {
                Ok(done) => inserted += done.rows_affected(),
                Err(e) if is_key_conflict(&e) => {
                    debug!("Already present in {}: {}", self.table, e);
                    tx.rollback().await?;
                    return Ok(AppendOutcome::AlreadyPresent);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(AppendOutcome::Inserted { rows: inserted })
    }

    /// Insert-or-ignore per row; returns the number of rows that were new.
    ///
    /// Used for repair runs where a file may be partially present.
    pub async fn merge_batch(&self, records: &[IsmrRecord]) -> Result<u64> {
        // ---
        let rows = self.keyed_rows(records);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut qb = self.insert_builder("INSERT OR IGNORE", chunk);
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Newest stored timestamp, `None` for an empty table.
    pub async fn latest_timestamp(&self) -> Result<Option<i64>> {
        // ---
        let latest: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX({TIMESTAMP_NAME}) FROM {}",
            self.table
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    pub async fn count(&self) -> Result<i64> {
        // ---
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Run a read query; values of every selected column come back as `f64`.
    pub async fn query(&self, query: &ReadingsQuery) -> Result<ReadingTable> {
        // ---
        let (columns, mut qb) = build_select(&self.table, self.layout, query)?;
        debug!("Start reading: {}", qb.sql());

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.try_get::<Option<f64>, _>(i))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Shape of data: {} x {}", rows.len(), columns.len());
        Ok(ReadingTable { columns, rows })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ---

    fn keyed_rows(&self, records: &[IsmrRecord]) -> Vec<IsmrRecord> {
        // ---
        let rows: Vec<IsmrRecord> = records
            .iter()
            .filter(|r| r.header.key().is_some())
            .map(|r| r.project(self.layout))
            .collect();

        let dropped = records.len() - rows.len();
        if dropped > 0 {
            warn!("{} rows without (weeknumber, timeofweek, SVID) not stored", dropped);
        }
        rows
    }

    fn insert_builder<'a>(&self, verb: &str, rows: &'a [IsmrRecord]) -> QueryBuilder<'a, Sqlite> {
        // ---
        let columns = HEADER_NAMES
            .iter()
            .chain(self.layout.measurement_columns())
            .chain(std::iter::once(&TIMESTAMP_NAME))
            .copied()
            .collect::<Vec<_>>()
            .join(", ");

        let mut qb = QueryBuilder::new(format!("{verb} INTO {} ({columns}) ", self.table));
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.header.weeknumber)
                .push_bind(r.header.timeofweek)
                .push_bind(r.header.svid)
                .push_bind(r.header.fieldblockvalue);
            for v in &r.values {
                b.push_bind(*v);
            }
            b.push_bind(r.timestamp);
        });
        qb
    }
}

/// SQLite reports duplicate keys as SQLITE_CONSTRAINT_PRIMARYKEY (1555) or
/// SQLITE_CONSTRAINT_UNIQUE (2067).
fn is_key_conflict(err: &sqlx::Error) -> bool {
    // ---
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() || matches!(db.code().as_deref(), Some("1555") | Some("2067"))
        }
        _ => false,
    }
}
