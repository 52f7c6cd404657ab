//! Mirror of the remote ISMR archive into the local archive tree.
//!
//! Remote access goes through [`RemoteArchive`]; [`FtpArchive`] is the
//! production implementation. The mirror only adds files: anything already
//! present locally is left alone, and the remote side is never modified.

use std::{
    fs,
    path::{Path, PathBuf},
};

use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use crate::{
    config::FtpSettings,
    error::{Result, ScintError},
    models::{Location, Site, Stream},
    resolver::{find_latest_ingested_directory, is_day_dir, location_dir},
    walker::{FileFailure, ISMR_EXTENSION},
};

// ---

/// Read-only view of a remote archive laid out like the local one.
pub trait RemoteArchive {
    /// Day directory names available for a location (any order).
    fn list_day_dirs(&mut self, location: Location) -> Result<Vec<String>>;

    /// Plain file names inside one day directory (any order).
    fn list_files(&mut self, location: Location, day_dir: &str) -> Result<Vec<String>>;

    fn fetch(&mut self, location: Location, day_dir: &str, name: &str) -> Result<Vec<u8>>;
}

fn transport(err: impl std::fmt::Display) -> ScintError {
    ScintError::Transport(err.to_string())
}

/// FTP session on the archive server.
pub struct FtpArchive {
    stream: FtpStream,
    home: String,
    root: String,
}

impl FtpArchive {
    /// Connect and log in. A failure here is fatal for the run.
    pub fn connect(settings: &FtpSettings) -> Result<Self> {
        // ---
        let addr = if settings.host.contains(':') {
            settings.host.clone()
        } else {
            format!("{}:21", settings.host)
        };
        info!("Connecting to ftp://{}@{}", settings.user, addr);

        let mut stream = FtpStream::connect(&addr).map_err(transport)?;
        stream
            .login(&settings.user, &settings.password)
            .map_err(transport)?;
        let home = stream.pwd().map_err(transport)?;

        Ok(FtpArchive {
            stream,
            home,
            root: settings.root.clone(),
        })
    }

    pub fn quit(mut self) -> Result<()> {
        self.stream.quit().map_err(transport)
    }

    /// Change into `root/SITE[/CAL][/day_dir]` starting from the login dir.
    fn enter(&mut self, location: Location, day_dir: Option<&str>) -> Result<()> {
        // ---
        let mut parts = vec![self.home.clone(), self.root.clone(), location.site.code().to_string()];
        parts.extend(location.stream.subdir().map(str::to_string));
        parts.extend(day_dir.map(str::to_string));

        for part in parts {
            self.stream.cwd(&part).map_err(transport)?;
        }
        Ok(())
    }

    fn names(&mut self) -> Result<Vec<String>> {
        // ---
        let listing = self.stream.nlst(None).map_err(transport)?;
        Ok(listing
            .iter()
            .filter_map(|item| item.rsplit('/').next())
            .map(str::to_string)
            .collect())
    }
}

impl RemoteArchive for FtpArchive {
    fn list_day_dirs(&mut self, location: Location) -> Result<Vec<String>> {
        self.enter(location, None)?;
        self.names()
    }

    fn list_files(&mut self, location: Location, day_dir: &str) -> Result<Vec<String>> {
        self.enter(location, Some(day_dir))?;
        self.names()
    }

    fn fetch(&mut self, location: Location, day_dir: &str, name: &str) -> Result<Vec<u8>> {
        // ---
        self.enter(location, Some(day_dir))?;
        let buf = self.stream.retr_as_buffer(name).map_err(transport)?;
        Ok(buf.into_inner())
    }
}

// ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorReport {
    pub dirs_checked: usize,
    pub dirs_skipped: usize,
    pub files_fetched: usize,
    pub files_present: usize,
    pub failures: Vec<FileFailure>,
}

impl MirrorReport {
    pub fn merge(&mut self, other: MirrorReport) {
        // ---
        self.dirs_checked += other.dirs_checked;
        self.dirs_skipped += other.dirs_skipped;
        self.files_fetched += other.files_fetched;
        self.files_present += other.files_present;
        self.failures.extend(other.failures);
    }

    pub fn log_summary(&self) {
        // ---
        info!(
            "Mirror: {} directories checked ({} skipped), {} files fetched, {} already local, {} failed",
            self.dirs_checked,
            self.dirs_skipped,
            self.files_fetched,
            self.files_present,
            self.failures.len()
        );
        for f in &self.failures {
            warn!("  {}: {}", f.path.display(), f.reason);
        }
    }
}

/// Create a directory tree; an existing directory is success.
pub fn ensure_dir(path: &Path) -> Result<()> {
    // ---
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => {
            debug!("No need to create {}", path.display());
            Ok(())
        }
        Err(_) => fs::create_dir_all(path).map_err(|e| ScintError::io(path, e)),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    // ---
    let mut partial = PathBuf::from(path);
    partial.set_extension(format!("{ISMR_EXTENSION}.part"));
    fs::write(&partial, bytes).map_err(|e| ScintError::io(&partial, e))?;
    fs::rename(&partial, path).map_err(|e| ScintError::io(path, e))
}

/// Download the `.ismr` files of one location that are missing locally.
///
/// Remote directories older than `cursor` are skipped; the cursor directory
/// itself is re-checked because it may have been mirrored mid-day. A
/// transport error aborts this location.
pub fn mirror_stream<R: RemoteArchive + ?Sized>(
    remote: &mut R,
    root: &Path,
    location: Location,
    cursor: Option<&str>,
) -> Result<MirrorReport> {
    // ---
    let mut report = MirrorReport::default();

    let mut dirs: Vec<String> = remote
        .list_day_dirs(location)?
        .into_iter()
        .filter(|d| is_day_dir(d))
        .collect();
    dirs.sort();
    debug!("{}: remote directories {:?}", location, dirs);

    for dir in dirs {
        if cursor.is_some_and(|c| dir.as_str() < c) {
            report.dirs_skipped += 1;
            continue;
        }
        report.dirs_checked += 1;

        let local_dir = location_dir(root, location).join(&dir);
        if let Err(e) = ensure_dir(&local_dir) {
            warn!("Cannot create {}: {}", local_dir.display(), e);
            report.failures.push(FileFailure {
                path: local_dir,
                reason: e.to_string(),
            });
            continue;
        }

        let mut files: Vec<String> = remote
            .list_files(location, &dir)?
            .into_iter()
            .filter(|name| {
                Path::new(name).extension().is_some_and(|ext| ext == ISMR_EXTENSION) && !name.contains("..")
            })
            .collect();
        files.sort();

        for name in files {
            let local_file = local_dir.join(&name);
            if local_file.is_file() {
                report.files_present += 1;
                continue;
            }
            debug!("getting {}", name);
            let bytes = remote.fetch(location, &dir, &name)?;
            match write_file(&local_file, &bytes) {
                Ok(()) => report.files_fetched += 1,
                Err(e) => report.failures.push(FileFailure {
                    path: local_file,
                    reason: e.to_string(),
                }),
            }
        }
    }

    Ok(report)
}

/// Mirror the regular and calibration subtrees of `sites`.
///
/// The regular stream resumes from the newest local day directory; the
/// calibration stream is always scanned in full. A failing location is
/// reported and the next one is still attempted.
pub fn mirror_sites<R: RemoteArchive + ?Sized>(remote: &mut R, root: &Path, sites: &[Site]) -> MirrorReport {
    // ---
    let mut report = MirrorReport::default();

    for &site in sites {
        for stream in [Stream::Regular, Stream::Calibration] {
            let location = Location::new(site, stream);
            let cursor = match stream {
                Stream::Regular => find_latest_ingested_directory(root, location),
                Stream::Calibration => Ok(None),
            };

            let result = cursor.and_then(|c| {
                info!("Mirroring {} from {:?}", location, c);
                mirror_stream(remote, root, location, c.as_deref())
            });

            match result {
                Ok(r) => report.merge(r),
                Err(e) => {
                    warn!("Mirror of {} aborted: {}", location, e);
                    report.failures.push(FileFailure {
                        path: location_dir(root, location),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    report
}
