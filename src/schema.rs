//! Database schema management for the scintillation stores.
//!
//! Ensures the per-location table and its timestamp index exist before any
//! ingestion or query runs. Safe to call on every open.

use sqlx::SqlitePool;

use crate::{
    error::{Result, ScintError},
    models::{Layout, HEADER_NAMES, TIMESTAMP_NAME},
};

// ---

/// Table names are spliced into DDL, so only `[A-Za-z0-9_]` is allowed.
pub fn validate_table_name(name: &str) -> Result<()> {
    // ---
    let ok = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ScintError::InvalidTableName(name.to_string()))
    }
}

/// `CREATE TABLE` statement for a layout: header columns as INTEGER,
/// measurements as REAL, derived timestamp as INTEGER, natural primary key.
pub fn create_table_sql(table: &str, layout: Layout) -> String {
    // ---
    let columns = HEADER_NAMES
        .iter()
        .map(|name| format!("{name} INTEGER"))
        .chain(layout.measurement_columns().iter().map(|name| format!("{name} REAL")))
        .chain(std::iter::once(format!("{TIMESTAMP_NAME} INTEGER")))
        .collect::<Vec<_>>()
        .join(",\n            ");

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            {columns},
            PRIMARY KEY (weeknumber, timeofweek, SVID)
        );
        "#
    )
}

/// Create the location table and its index (idempotent).
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool, table: &str, layout: Layout) -> Result<()> {
    // ---
    validate_table_name(table)?;
    let mut tx = pool.begin().await?;

    sqlx::query(&create_table_sql(table, layout))
        .execute(&mut *tx)
        .await?;

    // Queries always restrict on time
    sqlx::query(&format!(
        r#"
        CREATE INDEX IF NOT EXISTS idx_{table}_timestamp
            ON {table} ({TIMESTAMP_NAME});
        "#
    ))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
