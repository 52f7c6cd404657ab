//! Date and archive-directory resolution.
//!
//! Daily partitions of the archive are named `YYDOY`: two-digit year plus
//! zero-padded day of year, e.g. `18001` for 2018-01-01. Fixed width makes
//! lexical order equal to chronological order within a century.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use walkdir::WalkDir;

use crate::{
    error::{Result, ScintError},
    models::Location,
};

/// Top-level directory of the archive below the configured root.
pub const ARCHIVE_DIR: &str = "IONO";

// ---

/// `true` for exactly five ASCII digits.
pub fn is_day_dir(name: &str) -> bool {
    name.len() == 5 && name.bytes().all(|b| b.is_ascii_digit())
}

pub fn day_dir_for_date(date: NaiveDate) -> String {
    date.format("%y%j").to_string()
}

/// Day directory that a stored record with this Unix timestamp belongs to.
pub fn day_dir_for_timestamp(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| day_dir_for_date(dt.date_naive()))
}

/// Convert `YYYYMMDD` to the `YYDOY` directory name.
pub fn resolve_directory_for_date(date: &str) -> Result<String> {
    // ---
    let date = date.trim();
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ScintError::InvalidDateFormat(date.to_string()));
    }
    let parsed = NaiveDate::parse_from_str(date, "%Y%m%d")
        .map_err(|_| ScintError::InvalidDateFormat(date.to_string()))?;

    Ok(day_dir_for_date(parsed))
}

/// `{root}/IONO/{SITE}` or `{root}/IONO/{SITE}/CAL`.
pub fn location_dir(root: &Path, location: Location) -> PathBuf {
    // ---
    let mut dir = root.join(ARCHIVE_DIR).join(location.site.code());
    if let Some(sub) = location.stream.subdir() {
        dir.push(sub);
    }
    dir
}

/// Day directories present locally for a location, ascending.
///
/// A missing location directory is an empty archive, not an error. The
/// `CAL` subtree never matches the day-directory pattern so the regular
/// stream excludes it.
pub fn list_day_dirs(root: &Path, location: Location) -> Result<Vec<String>> {
    // ---
    let base = location_dir(root, location);
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(&base).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
            ScintError::io(path, e.into())
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str().filter(|n| is_day_dir(n)) {
            dirs.push(name.to_string());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Newest local day directory of a location, `None` when nothing is there.
pub fn find_latest_ingested_directory(root: &Path, location: Location) -> Result<Option<String>> {
    Ok(list_day_dirs(root, location)?.pop())
}
