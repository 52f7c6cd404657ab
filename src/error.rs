//! Error taxonomy for the ingestion pipeline.
//!
//! "Already ingested" has no variant here: a primary-key conflict on a
//! batch insert is reported through [`crate::store::AppendOutcome`], not as an
//! error.

use std::path::PathBuf;

use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum ScintError {
    /// File content does not match the ISMR column layout.
    #[error("parse error in {path} (line {line}): {reason}")]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// Date argument is not `YYYYMMDD`.
    #[error("does not match YYYYMMDD format: {0}")]
    InvalidDateFormat(String),

    /// Remote archive connection, listing or retrieval failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Column name not part of the table layout.
    #[error("unknown column: {0}")]
    InvalidColumn(String),

    #[error("invalid table name: {0}")]
    InvalidTableName(String),

    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("upload of {file} failed: {reason}")]
    Upload { file: String, reason: String },
}

impl ScintError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScintError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScintError>;
