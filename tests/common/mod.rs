//! Synthetic archive helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use scintflow::{config, models::MEASUREMENT_NAMES, Config};

/// GPS week covering 2018-07-15 .. 2018-07-21.
pub const WEEK: i64 = 2010;

/// Time of week at 00:00 UTC of the day directory `18198 + offset`.
pub fn tow_for_day(offset: i64) -> i64 {
    172_800 + offset * 86_400
}

/// One 62-field ISMR line. Measurements count up from `base`.
pub fn ismr_line(week: i64, tow: i64, svid: i64, base: f64) -> String {
    // ---
    let mut fields = vec![week.to_string(), tow.to_string(), svid.to_string(), "0".to_string()];
    fields.extend((0..MEASUREMENT_NAMES.len()).map(|i| format!("{:.2}", base + i as f64)));
    fields.join(",")
}

/// `IONO/{site}[/CAL]/{day_dir}`, created if missing.
pub fn day_path(root: &Path, site: &str, cal: bool, day_dir: &str) -> Result<PathBuf> {
    // ---
    let mut dir = root.join("IONO").join(site);
    if cal {
        dir.push("CAL");
    }
    dir.push(day_dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write `dir/name` with one line per SVID for each minute in `minutes`,
/// counted from `tow_start`.
pub fn write_ismr(dir: &Path, name: &str, tow_start: i64, minutes: std::ops::Range<i64>, svids: &[i64]) -> Result<PathBuf> {
    // ---
    let mut lines = Vec::new();
    for minute in minutes {
        for &svid in svids {
            lines.push(ismr_line(WEEK, tow_start + minute * 60, svid, svid as f64 + minute as f64 / 100.0));
        }
    }
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n") + "\n")?;
    Ok(path)
}

/// Configuration rooted at a temporary archive and database directory.
pub fn test_config(archive_root: &Path, db_dir: &Path, extra: &[(&str, &str)]) -> Result<Config> {
    // ---
    let archive_root = archive_root.to_string_lossy().into_owned();
    let db_dir = db_dir.to_string_lossy().into_owned();
    config::load_with(|name| match name {
        "SCINT_ARCHIVE_ROOT" => Some(archive_root.clone()),
        "SCINT_DB_DIR" => Some(db_dir.clone()),
        other => extra.iter().find(|(k, _)| *k == other).map(|(_, v)| v.to_string()),
    })
}
