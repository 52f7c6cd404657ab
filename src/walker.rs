//! Incremental ingestion of the local ISMR archive into the stores.
//!
//! Two drivers share one walk:
//! - routine: newest day directory first, skip what the store's cursor says is
//!   covered, stop once `stop_after` consecutive files are already present;
//! - forced: oldest first, never skip or stop, merge row by row so partially
//!   present files are completed.
//!
//! Per-file problems are collected in the [`IngestReport`] and never abort
//! the walk.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::{
    config::Config,
    error::{Result, ScintError},
    models::{Location, Site, Stream},
    parser::read_ismr,
    resolver::{day_dir_for_timestamp, find_latest_ingested_directory, list_day_dirs, location_dir},
    store::{AppendOutcome, ScintStore},
};

pub const ISMR_EXTENSION: &str = "ismr";

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Routine,
    Forced,
}

/// Parameters of one stream walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub mode: IngestMode,
    /// Consecutive already-present files that end a routine walk.
    pub stop_after: u32,
    /// Day directories older than this are skipped in routine mode.
    pub cursor: Option<String>,
    /// Restrict the walk to one day directory.
    pub only_dir: Option<String>,
}

impl WalkOptions {
    pub fn routine(stop_after: u32, cursor: Option<String>) -> Self {
        WalkOptions {
            mode: IngestMode::Routine,
            stop_after: stop_after.max(1),
            cursor,
            only_dir: None,
        }
    }

    pub fn forced(only_dir: Option<String>) -> Self {
        WalkOptions {
            mode: IngestMode::Forced,
            stop_after: u32::MAX,
            cursor: None,
            only_dir,
        }
    }
}

/// A file or directory that could not be ingested for a reason other than
/// its data already being stored.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Day directories entered, in walk order.
    pub dirs_visited: Vec<String>,
    pub files_ingested: usize,
    pub files_already_present: usize,
    pub files_empty: usize,
    pub rows_written: u64,
    pub stopped_early: bool,
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        // ---
        self.dirs_visited.extend(other.dirs_visited);
        self.files_ingested += other.files_ingested;
        self.files_already_present += other.files_already_present;
        self.files_empty += other.files_empty;
        self.rows_written += other.rows_written;
        self.stopped_early |= other.stopped_early;
        self.failures.extend(other.failures);
    }

    /// Operator summary; failures are listed but never change the exit code.
    pub fn log_summary(&self) {
        // ---
        info!(
            "Ingested {} files ({} rows), {} already present, {} empty, {} failed",
            self.files_ingested,
            self.rows_written,
            self.files_already_present,
            self.files_empty,
            self.failures.len()
        );
        if !self.failures.is_empty() {
            warn!("Failed to ingest the following files");
            for f in &self.failures {
                warn!("  {}: {}", f.path.display(), f.reason);
            }
        }
    }

    fn fail(&mut self, path: &Path, err: &ScintError) {
        // ---
        warn!("Skipping {}: {}", path.display(), err);
        self.failures.push(FileFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Ingested { rows: u64 },
    AlreadyPresent,
    Empty,
}

// ---

/// `.ismr` files directly inside `dir`, sorted by name.
pub fn list_ismr_files(dir: &Path) -> Result<Vec<PathBuf>> {
    // ---
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| ScintError::io(dir, e.into()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == ISMR_EXTENSION) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Ingestion cursor of a location: the day directory of the store's newest
/// record, capped at the newest local day directory so that a row dated
/// past the archive cannot put every real directory behind the cursor.
pub async fn store_cursor(store: &ScintStore, root: &Path, location: Location) -> Result<Option<String>> {
    // ---
    let stored = store.latest_timestamp().await?.and_then(day_dir_for_timestamp);
    let newest_local = find_latest_ingested_directory(root, location)?;
    Ok(bounded_cursor(stored, newest_local))
}

fn bounded_cursor(stored: Option<String>, newest_local: Option<String>) -> Option<String> {
    // ---
    match (stored, newest_local) {
        (Some(stored), Some(local)) if stored > local => {
            warn!("Newest stored record ({}) is past the archive ({}), using {}", stored, local, local);
            Some(local)
        }
        (stored, Some(_)) => stored,
        (_, None) => None,
    }
}

async fn ingest_file(store: &ScintStore, path: &Path, mode: IngestMode) -> Result<FileOutcome> {
    // ---
    let records = read_ismr(path, store.layout())?;
    if records.is_empty() {
        return Ok(FileOutcome::Empty);
    }

    match mode {
        IngestMode::Routine => match store.append_batch(&records).await? {
            AppendOutcome::Inserted { rows } => Ok(FileOutcome::Ingested { rows }),
            AppendOutcome::AlreadyPresent => Ok(FileOutcome::AlreadyPresent),
        },
        IngestMode::Forced => match store.merge_batch(&records).await? {
            0 => Ok(FileOutcome::AlreadyPresent),
            rows => Ok(FileOutcome::Ingested { rows }),
        },
    }
}

/// Walk one location's day directories and write new files to `store`.
///
/// Only errors that make the whole location unreadable are returned; file
/// and directory problems end up in the report.
pub async fn ingest_stream(
    store: &ScintStore,
    root: &Path,
    location: Location,
    opts: &WalkOptions,
) -> Result<IngestReport> {
    // ---
    let mut report = IngestReport::default();
    let base = location_dir(root, location);

    let mut dirs = list_day_dirs(root, location)?;
    if let Some(only) = &opts.only_dir {
        dirs.retain(|d| d == only);
    }
    if opts.mode == IngestMode::Routine {
        dirs.reverse();
    }
    debug!("Walking {} day directories under {}", dirs.len(), base.display());

    let mut consecutive_present = 0u32;

    for dir in dirs {
        if opts.mode == IngestMode::Routine {
            if let Some(cursor) = opts.cursor.as_deref().filter(|c| dir.as_str() < *c) {
                debug!("Directory {} older than cursor {}, done", dir, cursor);
                break;
            }
        }

        let dir_path = base.join(&dir);
        report.dirs_visited.push(dir.clone());

        let mut files = match list_ismr_files(&dir_path) {
            Ok(files) => files,
            Err(e) => {
                report.fail(&dir_path, &e);
                continue;
            }
        };
        if opts.mode == IngestMode::Routine {
            files.reverse();
        }

        for path in files {
            debug!("Reading {}", path.display());
            match ingest_file(store, &path, opts.mode).await {
                Ok(FileOutcome::Ingested { rows }) => {
                    consecutive_present = 0;
                    report.files_ingested += 1;
                    report.rows_written += rows;
                }
                Ok(FileOutcome::Empty) => report.files_empty += 1,
                Ok(FileOutcome::AlreadyPresent) => {
                    debug!("Already present in the database: {}", path.display());
                    report.files_already_present += 1;
                    consecutive_present += 1;
                    if opts.mode == IngestMode::Routine && consecutive_present >= opts.stop_after {
                        info!("Reached end of new files at {} for {}", path.display(), location);
                        report.stopped_early = true;
                        return Ok(report);
                    }
                }
                Err(e) => report.fail(&path, &e),
            }
        }
    }

    Ok(report)
}

// ---

pub async fn open_store(cfg: &Config, location: Location) -> Result<ScintStore> {
    ScintStore::open(&cfg.db_path(location), &cfg.table_name(location.site), cfg.layout).await
}

/// Routine incremental run over `sites`, regular stream then calibration.
///
/// The regular stream resumes from the store's cursor; the calibration
/// stream always scans fully because its files arrive out of band.
pub async fn ingest_routine(cfg: &Config, sites: &[Site]) -> IngestReport {
    // ---
    let run_id = Uuid::new_v4();
    let mut report = IngestReport::default();

    for &site in sites {
        for stream in [Stream::Regular, Stream::Calibration] {
            let location = Location::new(site, stream);
            let span = tracing::info_span!("ingest", run_id = %run_id, location = %location);

            let result: Result<IngestReport> = async {
                // ---
                if !location_dir(&cfg.archive_root, location).is_dir() {
                    debug!("No archive directory for {}", location);
                    return Ok(IngestReport::default());
                }
                let store = open_store(cfg, location).await?;
                info!("Writing to {}", cfg.db_path(location).display());

                let cursor = match stream {
                    Stream::Regular => store_cursor(&store, &cfg.archive_root, location).await?,
                    Stream::Calibration => None,
                };
                debug!("Cursor for {}: {:?}", location, cursor);

                let opts = WalkOptions::routine(cfg.stop_after, cursor);
                let walked = ingest_stream(&store, &cfg.archive_root, location, &opts).await;
                store.close().await;
                walked
            }
            .instrument(span)
            .await;

            absorb(&mut report, cfg, location, result);
        }
    }

    report
}

/// Forced run: re-read one day directory for `sites`, both streams.
pub async fn ingest_forced(cfg: &Config, day_dir: &str, sites: &[Site]) -> IngestReport {
    // ---
    let run_id = Uuid::new_v4();
    let mut report = IngestReport::default();

    for &site in sites {
        for stream in [Stream::Regular, Stream::Calibration] {
            let location = Location::new(site, stream);
            let span = tracing::info_span!("force", run_id = %run_id, location = %location, day = day_dir);

            let result: Result<IngestReport> = async {
                // ---
                if !location_dir(&cfg.archive_root, location).join(day_dir).is_dir() {
                    debug!("No directory {} for {}", day_dir, location);
                    return Ok(IngestReport::default());
                }
                let store = open_store(cfg, location).await?;
                info!("Writing to {}", cfg.db_path(location).display());

                let opts = WalkOptions::forced(Some(day_dir.to_string()));
                let walked = ingest_stream(&store, &cfg.archive_root, location, &opts).await;
                store.close().await;
                walked
            }
            .instrument(span)
            .await;

            absorb(&mut report, cfg, location, result);
        }
    }

    report
}

/// A location-level error is recorded against the location's database and
/// the run moves on to the next location.
fn absorb(report: &mut IngestReport, cfg: &Config, location: Location, result: Result<IngestReport>) {
    // ---
    match result {
        Ok(r) => report.merge(r),
        Err(e) => {
            warn!("Ingestion of {} aborted: {}", location, e);
            report.failures.push(FileFailure {
                path: cfg.db_path(location),
                reason: e.to_string(),
            });
        }
    }
}
