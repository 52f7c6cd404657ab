//! Read-side query assembly for the scintillation store.
//!
//! Column identifiers are resolved against the table layout whitelist;
//! every numeric restriction is a bound parameter.

use std::str::FromStr;

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    error::{Result, ScintError},
    models::{Layout, HEADER_NAMES, TIMESTAMP_NAME},
};

// ---

/// Satellite restriction of a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SvidFilter {
    #[default]
    All,
    One(i64),
    Many(Vec<i64>),
}

impl FromStr for SvidFilter {
    type Err = ScintError;

    /// Accepts `all`, a single id (`12`) or a comma separated list (`12,15`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // ---
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(SvidFilter::All);
        }
        let ids = s
            .split(',')
            .map(|p| p.trim().parse::<i64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ScintError::InvalidColumn(format!("SVID filter '{s}'")))?;

        if ids.len() == 1 {
            Ok(SvidFilter::One(ids[0]))
        } else {
            Ok(SvidFilter::Many(ids))
        }
    }
}

/// Inclusive numeric restriction on one column, written `column:min:max`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub column: String,
    pub min: f64,
    pub max: f64,
}

impl FromStr for RangeFilter {
    type Err = ScintError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // ---
        let bad = || ScintError::InvalidColumn(format!("range filter '{s}'"));
        let mut parts = s.split(':');
        let (Some(column), Some(min), Some(max), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(bad());
        };
        let min = min.trim().parse::<f64>().map_err(|_| bad())?;
        let max = max.trim().parse::<f64>().map_err(|_| bad())?;
        if !(min.is_finite() && max.is_finite()) {
            return Err(bad());
        }
        Ok(RangeFilter {
            column: column.trim().to_string(),
            min,
            max,
        })
    }
}

/// Parameters of one selection. An empty variable list selects every column.
#[derive(Debug, Clone, Default)]
pub struct ReadingsQuery {
    pub variables: Vec<String>,
    pub svid: SvidFilter,
    /// Inclusive Unix-second bounds on `timestamp`.
    pub time_range: Option<(i64, i64)>,
    pub ranges: Vec<RangeFilter>,
    pub limit: Option<u32>,
}

/// Column-major header plus row values, every value widened to `f64`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReadingTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Option<f64>>>,
}

// ---

/// Resolve the requested variables to whitelisted column names.
pub fn select_columns(layout: Layout, variables: &[String]) -> Result<Vec<&'static str>> {
    // ---
    if variables.is_empty() {
        return Ok(HEADER_NAMES
            .iter()
            .chain(layout.measurement_columns())
            .chain(std::iter::once(&TIMESTAMP_NAME))
            .copied()
            .collect());
    }
    variables.iter().map(|v| layout.column(v.trim())).collect()
}

/// Build the `SELECT` for `query` against `table`.
///
/// `table` must already be validated; it is the only identifier that does
/// not come from the layout whitelist.
pub fn build_select(
    table: &str,
    layout: Layout,
    query: &ReadingsQuery,
) -> Result<(Vec<&'static str>, QueryBuilder<'static, Sqlite>)> {
    // ---
    let columns = select_columns(layout, &query.variables)?;
    let select_list = columns
        .iter()
        .map(|c| format!("CAST({c} AS REAL) AS {c}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut qb = QueryBuilder::new(format!("SELECT {select_list} FROM {table} WHERE 1 = 1"));

    match &query.svid {
        SvidFilter::All => {}
        SvidFilter::One(id) => {
            qb.push(" AND SVID = ").push_bind(*id);
        }
        SvidFilter::Many(ids) => {
            qb.push(" AND SVID IN (");
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
        }
    }

    if let Some((start, end)) = query.time_range {
        qb.push(format!(" AND {TIMESTAMP_NAME} BETWEEN "))
            .push_bind(start)
            .push(" AND ")
            .push_bind(end);
    }

    for range in &query.ranges {
        let column = layout.column(&range.column)?;
        qb.push(format!(" AND {column} BETWEEN "))
            .push_bind(range.min)
            .push(" AND ")
            .push_bind(range.max);
    }

    qb.push(format!(" ORDER BY {TIMESTAMP_NAME}, SVID"));
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(i64::from(limit));
    }

    Ok((columns, qb))
}
