//! Data models for the scintillation pipeline: receiver sites, archive
//! streams, column layouts and parsed ISMR records.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::ScintError;

// ---

/// Identifier columns that open every ISMR line. They form the natural key
/// `(weeknumber, timeofweek, SVID)` plus the block tag.
pub const HEADER_NAMES: [&str; 4] = ["weeknumber", "timeofweek", "SVID", "fieldblockvalue"];

/// Measurement columns of an ISMR line, in file order after the header.
pub const MEASUREMENT_NAMES: [&str; 58] = [
    "azimuth",
    "elevation",
    "sig1_CNO_avg_min",
    "sig1_S4",
    "sig1_S4_corr",
    "sig1_phi01",
    "sig1_phi03",
    "sig1_phi10",
    "sig1_phi30",
    "sig1_phi60",
    "sig1_avgccd",
    "sig1_sigmaccd",
    "sig1_TEC_m45",
    "sig1_dTEC_m60_m45",
    "sig1_TEC_m30",
    "sig1_dTEC_m45_m30",
    "sig1_TEC_m15",
    "sig1_dTEC_m30_m15",
    "sig1_TEC",
    "sig1_dTEC_m15_0",
    "sig1_locktime",
    "sbf2ismr_version",
    "sig1_f2_locktime",
    "sig1_f2_avg",
    "sig1_SI",
    "sig1_SI_nom",
    "p_sig1",
    "sig2_CNO_avg_min",
    "sig2_S4",
    "sig2_S4_corr",
    "sig2_phi01",
    "sig2_phi03",
    "sig2_phi10",
    "sig2_phi30",
    "sig2_phi60",
    "sig2_avgccd",
    "sig2_sigmaccd",
    "sig2_locktime",
    "sig2_SI",
    "sig2_SI_nom",
    "p_sig2",
    "sig3_CNO_avg_min",
    "sig3_S4",
    "sig3_S4_corr",
    "sig3_phi01",
    "sig3_phi03",
    "sig3_phi10",
    "sig3_phi30",
    "sig3_phi60",
    "sig3_avgccd",
    "sig3_sigmaccd",
    "sig3_locktime",
    "sig3_SI",
    "sig3_SI_nom",
    "p_sig3",
    "sig1_T",
    "sig2_T",
    "sig3_T",
];

/// Subset kept by the production store.
pub const REDUCED_NAMES: [&str; 9] = [
    "azimuth",
    "elevation",
    "sig1_TEC",
    "sig1_S4",
    "sig1_S4_corr",
    "sig2_S4",
    "sig2_S4_corr",
    "sig3_S4",
    "sig3_S4_corr",
];

/// Derived UTC column appended to every stored row.
pub const TIMESTAMP_NAME: &str = "timestamp";

/// Total number of comma-separated fields on one ISMR line.
pub const ISMR_FIELD_COUNT: usize = HEADER_NAMES.len() + MEASUREMENT_NAMES.len();

// ---

/// Receiver site operated for scintillation monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Site {
    Saba,
    Seut,
}

impl Site {
    pub const ALL: [Site; 2] = [Site::Saba, Site::Seut];

    /// Archive/site code as used in directory and table names.
    pub fn code(self) -> &'static str {
        match self {
            Site::Saba => "SABA",
            Site::Seut => "SEUT",
        }
    }

    /// Receiver position as (latitude, longitude) in degrees.
    pub fn coordinates(self) -> (f64, f64) {
        match self {
            Site::Saba => (17.62048, -63.24323),
            Site::Seut => (17.47140, -62.97570),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Site {
    type Err = ScintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SABA" => Ok(Site::Saba),
            "SEUT" => Ok(Site::Seut),
            _ => Err(ScintError::UnknownSite(s.to_string())),
        }
    }
}

/// Site selection as accepted on the command line: one site or `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteSelection {
    All,
    One(Site),
}

impl SiteSelection {
    pub fn sites(self) -> Vec<Site> {
        match self {
            SiteSelection::All => Site::ALL.to_vec(),
            SiteSelection::One(site) => vec![site],
        }
    }
}

impl FromStr for SiteSelection {
    type Err = ScintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(SiteSelection::All)
        } else {
            s.parse().map(SiteSelection::One)
        }
    }
}

/// Archive subtree of a site. Calibration files live under `CAL/` and are
/// ingested as an independent stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Regular,
    Calibration,
}

impl Stream {
    /// Directory component below the site directory, if any.
    pub fn subdir(self) -> Option<&'static str> {
        match self {
            Stream::Regular => None,
            Stream::Calibration => Some("CAL"),
        }
    }
}

/// One ingestion target: a site plus the stream that feeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub site: Site,
    pub stream: Stream,
}

impl Location {
    pub fn new(site: Site, stream: Stream) -> Self {
        Location { site, stream }
    }

    pub fn regular(site: Site) -> Self {
        Location::new(site, Stream::Regular)
    }

    pub fn calibration(site: Site) -> Self {
        Location::new(site, Stream::Calibration)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            Stream::Regular => write!(f, "{}", self.site),
            Stream::Calibration => write!(f, "{}/CAL", self.site),
        }
    }
}

// ---

/// Which measurement columns a table (or a parsed record) carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    Full,
    #[default]
    Reduced,
}

impl Layout {
    pub fn measurement_columns(self) -> &'static [&'static str] {
        match self {
            Layout::Full => &MEASUREMENT_NAMES,
            Layout::Reduced => &REDUCED_NAMES,
        }
    }

    /// Positions of this layout's measurement columns within the full layout.
    pub fn source_indices(self) -> Vec<usize> {
        self.measurement_columns()
            .iter()
            .filter_map(|name| MEASUREMENT_NAMES.iter().position(|n| n == name))
            .collect()
    }

    /// Resolve a user supplied column name to the static name used in SQL.
    ///
    /// Only header columns, `timestamp` and this layout's measurement
    /// columns are accepted, so the returned value is always safe to splice
    /// into a statement as an identifier.
    pub fn column(self, name: &str) -> Result<&'static str, ScintError> {
        HEADER_NAMES
            .iter()
            .chain(self.measurement_columns())
            .chain(std::iter::once(&TIMESTAMP_NAME))
            .find(|c| c.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| ScintError::InvalidColumn(name.to_string()))
    }
}

impl FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Layout::Full),
            "reduced" => Ok(Layout::Reduced),
            other => Err(format!("unknown layout '{other}', expected full|reduced")),
        }
    }
}

// ---

/// Identifier fields of one ISMR line. Any of them may be `nan` in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub weeknumber: Option<i64>,
    pub timeofweek: Option<i64>,
    pub svid: Option<i64>,
    pub fieldblockvalue: Option<i64>,
}

impl RecordHeader {
    /// The natural key, present only when all three parts are.
    pub fn key(&self) -> Option<(i64, i64, i64)> {
        Some((self.weeknumber?, self.timeofweek?, self.svid?))
    }
}

/// One satellite-observation epoch parsed from an ISMR file.
#[derive(Debug, Clone, PartialEq)]
pub struct IsmrRecord {
    pub header: RecordHeader,
    /// Measurement values in the order of `layout.measurement_columns()`.
    pub values: Vec<Option<f64>>,
    /// UTC Unix seconds derived from week number and time of week.
    pub timestamp: Option<i64>,
    pub layout: Layout,
}

impl IsmrRecord {
    /// Value of a named measurement column, `None` if absent or not in layout.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.layout
            .measurement_columns()
            .iter()
            .position(|c| *c == name)
            .and_then(|i| self.values.get(i).copied().flatten())
    }

    /// Project a full record onto a narrower layout. Header and timestamp
    /// are carried over unchanged.
    pub fn project(&self, target: Layout) -> IsmrRecord {
        // ---
        if self.layout == target {
            return self.clone();
        }
        let values = target
            .measurement_columns()
            .iter()
            .map(|name| self.value(name))
            .collect();

        IsmrRecord {
            header: self.header,
            values,
            timestamp: self.timestamp,
            layout: target,
        }
    }
}
