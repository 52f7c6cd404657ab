//! ISMR file parser.
//!
//! An ISMR file is a headerless CSV with a fixed column order: the four
//! header fields followed by the measurement columns of
//! [`MEASUREMENT_NAMES`](crate::models::MEASUREMENT_NAMES). Missing values are
//! written as `nan` and come out as `None`.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::{
    error::{Result, ScintError},
    gps_time::gps_timestamp,
    models::{IsmrRecord, Layout, RecordHeader, ISMR_FIELD_COUNT},
};

// ---

/// Read one ISMR file into records carrying the columns of `layout`.
///
/// A file without data lines yields an empty vector.
pub fn read_ismr(path: &Path, layout: Layout) -> Result<Vec<IsmrRecord>> {
    // ---
    debug!("Parsing {}", path.display());
    let file = File::open(path).map_err(|e| ScintError::io(path, e))?;
    parse_ismr(file, path, layout)
}

/// Reduced read used by the production store.
pub fn read_reduced_ismr(path: &Path) -> Result<Vec<IsmrRecord>> {
    read_ismr(path, Layout::Reduced)
}

/// Parse ISMR content from any reader. `origin` is only used in errors.
pub fn parse_ismr<R: Read>(reader: R, origin: &Path, layout: Layout) -> Result<Vec<IsmrRecord>> {
    // ---
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let indices = layout.source_indices();
    let mut out = Vec::new();

    for result in rdr.records() {
        let rec = result.map_err(|e| parse_error(origin, e.position().map_or(0, |p| p.line()), e.to_string()))?;
        let line = rec.position().map_or(0, |p| p.line());

        if rec.iter().all(str::is_empty) {
            continue;
        }
        if rec.len() != ISMR_FIELD_COUNT {
            return Err(parse_error(
                origin,
                line,
                format!("expected {} columns, found {}", ISMR_FIELD_COUNT, rec.len()),
            ));
        }

        out.push(parse_record(&rec, &indices, layout).map_err(|reason| parse_error(origin, line, reason))?);
    }

    debug!("{} records from {}", out.len(), origin.display());
    Ok(out)
}

fn parse_record(rec: &StringRecord, indices: &[usize], layout: Layout) -> std::result::Result<IsmrRecord, String> {
    // ---
    let weeknumber = parse_integer(&rec[0])?;
    let tow = parse_real(&rec[1])?;
    let header = RecordHeader {
        weeknumber,
        timeofweek: tow.map(|t| t.floor() as i64),
        svid: parse_integer(&rec[2])?,
        fieldblockvalue: parse_integer(&rec[3])?,
    };

    let values = indices
        .iter()
        .map(|&i| parse_real(&rec[4 + i]))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(IsmrRecord {
        header,
        values,
        timestamp: gps_timestamp(weeknumber, tow),
        layout,
    })
}

fn is_missing(field: &str) -> bool {
    field.is_empty() || field.eq_ignore_ascii_case("nan")
}

fn parse_real(field: &str) -> std::result::Result<Option<f64>, String> {
    // ---
    if is_missing(field) {
        return Ok(None);
    }
    field
        .parse::<f64>()
        .map(|v| Some(v).filter(|v| !v.is_nan()))
        .map_err(|_| format!("not a number: '{field}'"))
}

/// Integers may be written with a trailing `.0` by some firmware versions.
fn parse_integer(field: &str) -> std::result::Result<Option<i64>, String> {
    // ---
    if let Ok(v) = field.parse::<i64>() {
        return Ok(Some(v));
    }
    match parse_real(field)? {
        None => Ok(None),
        Some(v) if v.is_finite() => Ok(Some(v.floor() as i64)),
        Some(_) => Err(format!("not an integer: '{field}'")),
    }
}

fn parse_error(path: &Path, line: u64, reason: String) -> ScintError {
    ScintError::Parse {
        path: PathBuf::from(path),
        line,
        reason,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{MEASUREMENT_NAMES, REDUCED_NAMES};

    /// Build one ISMR line whose measurement `i` is `base + i`.
    fn line(week: &str, tow: &str, svid: u32, base: f64) -> String {
        // ---
        let mut fields = vec![week.to_string(), tow.to_string(), svid.to_string(), "0".to_string()];
        fields.extend((0..MEASUREMENT_NAMES.len()).map(|i| format!("{:.3}", base + i as f64)));
        fields.join(",")
    }

    fn origin() -> &'static Path {
        Path::new("test.ismr")
    }

    #[test]
    fn test_parse_full_line() {
        // ---
        let text = line("2010", "259260", 12, 100.0);
        let records = parse_ismr(text.as_bytes(), origin(), Layout::Full).unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.header.key(), Some((2010, 259_260, 12)));
        assert_eq!(r.values.len(), MEASUREMENT_NAMES.len());
        assert_eq!(r.value("azimuth"), Some(100.0));
        assert_eq!(r.value("sig3_T"), Some(157.0));
        assert_eq!(r.timestamp, Some(1_531_872_060));
    }

    #[test]
    fn test_nan_is_absent_not_zero() {
        // ---
        let mut text = line("nan", "259260", 12, 1.0);
        text = text.replacen(",1.000,", ",nan,", 1);
        let records = parse_ismr(text.as_bytes(), origin(), Layout::Full).unwrap();

        let r = &records[0];
        assert_eq!(r.header.weeknumber, None);
        assert_eq!(r.timestamp, None);
        assert_eq!(r.value("azimuth"), None);
        assert_eq!(r.value("elevation"), Some(2.0));
    }

    #[test]
    fn test_empty_file_has_no_rows() {
        // ---
        let records = parse_ismr("".as_bytes(), origin(), Layout::Reduced).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_wrong_column_count_is_parse_error() {
        // ---
        let text = format!("{}\n2010,259320,12,0,1.0,2.0\n", line("2010", "259260", 12, 1.0));
        let err = parse_ismr(text.as_bytes(), origin(), Layout::Full).unwrap_err();
        match err {
            ScintError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_garbage_value_is_parse_error() {
        // ---
        let text = line("2010", "259260", 12, 1.0).replacen("1.000", "abc", 1);
        assert!(matches!(
            parse_ismr(text.as_bytes(), origin(), Layout::Full),
            Err(ScintError::Parse { .. })
        ));
    }

    #[test]
    fn test_reduced_matches_projection_of_full() {
        // ---
        let text = [
            line("2010", "259260", 12, 10.0),
            line("2010", "259260", 15, 20.0),
            line("2010", "259320", 12, 30.0).replacen(",58.000,", ",nan,", 1),
        ]
        .join("\n");

        let full = parse_ismr(text.as_bytes(), origin(), Layout::Full).unwrap();
        let reduced = parse_ismr(text.as_bytes(), origin(), Layout::Reduced).unwrap();

        assert_eq!(full.len(), reduced.len());
        for (f, r) in full.iter().zip(&reduced) {
            assert_eq!(f.header, r.header);
            assert_eq!(f.timestamp, r.timestamp);
            assert_eq!(r.values.len(), REDUCED_NAMES.len());
            assert_eq!(&f.project(Layout::Reduced), r);
            for name in REDUCED_NAMES {
                assert_eq!(f.value(name), r.value(name));
            }
        }
    }

    #[test]
    fn test_trailing_point_zero_integers() {
        // ---
        let text = line("2010.0", "259260.0", 12, 1.0);
        let records = parse_ismr(text.as_bytes(), origin(), Layout::Reduced).unwrap();
        assert_eq!(records[0].header.key(), Some((2010, 259_260, 12)));
    }

    #[test]
    fn test_oversized_week_blanks_timestamp() {
        // ---
        let text = format!("{}\n{}", line("99999999999999", "0", 9, 1.0), line("2010", "259260", 12, 1.0));
        let records = parse_ismr(text.as_bytes(), origin(), Layout::Reduced).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header.weeknumber, Some(99_999_999_999_999));
        assert_eq!(records[0].timestamp, None);
        assert_eq!(records[1].timestamp, Some(1_531_872_060));
    }
}
