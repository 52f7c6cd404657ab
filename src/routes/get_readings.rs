use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::AppState;
use crate::{
    error::ScintError,
    models::{Location, Site},
    query::{RangeFilter, ReadingsQuery},
};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/readings/{site}", get(handler))
}

/// Query parameters for selecting stored readings
#[derive(Debug, Deserialize)]
pub struct ReadingsParams {
    /// Comma separated column names; empty selects every column
    vars: Option<String>,
    /// `all`, one SVID or a comma separated list
    svid: Option<String>,
    /// Unix seconds, RFC 3339 or `YYYYMMDDHHMMSS`
    start: Option<String>,
    end: Option<String>,
    /// Extra restrictions, `column:min:max` separated by `;`
    range: Option<String>,
    /// Read the calibration store instead of the regular one
    #[serde(default)]
    cal: bool,
    limit: Option<u32>,
}

async fn handler(
    Path(site): Path<String>,
    Query(params): Query<ReadingsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // ---
    info!("GET /readings/{} {:?}", site, params);

    let site = match site.parse::<Site>() {
        Ok(site) => site,
        Err(e) => return (StatusCode::NOT_FOUND, Json(e.to_string())).into_response(),
    };
    let location = if params.cal {
        Location::calibration(site)
    } else {
        Location::regular(site)
    };
    let Some(store) = state.stores.get(&location) else {
        return (StatusCode::NOT_FOUND, Json(format!("no store for {location}"))).into_response();
    };

    let query = match to_query(&params) {
        Ok(q) => q,
        Err(e) => {
            debug!("Rejected query: {}", e);
            return (StatusCode::BAD_REQUEST, Json(e.to_string())).into_response();
        }
    };

    match store.query(&query).await {
        Ok(table) => {
            info!("Returning {} readings for {}", table.rows.len(), location);
            (StatusCode::OK, Json(table)).into_response()
        }
        Err(e @ ScintError::InvalidColumn(_)) => (StatusCode::BAD_REQUEST, Json(e.to_string())).into_response(),
        Err(e) => {
            error!("Failed to query {}: {}", location, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to query data")).into_response()
        }
    }
}

/// Validate the raw parameters into a store query.
fn to_query(params: &ReadingsParams) -> Result<ReadingsQuery, ScintError> {
    // ---
    let variables = params
        .vars
        .as_deref()
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let svid = params.svid.as_deref().unwrap_or("all").parse()?;

    let time_range = match (params.start.as_deref(), params.end.as_deref()) {
        (None, None) => None,
        (start, end) => Some((
            start.map(parse_instant).transpose()?.unwrap_or(i64::MIN),
            end.map(parse_instant).transpose()?.unwrap_or(i64::MAX),
        )),
    };

    let ranges = params
        .range
        .as_deref()
        .map(|r| {
            r.split(';')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse::<RangeFilter>)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(ReadingsQuery {
        variables,
        svid,
        time_range,
        ranges,
        limit: Some(params.limit.unwrap_or(10_000)),
    })
}

fn parse_instant(s: &str) -> Result<i64, ScintError> {
    // ---
    let s = s.trim();
    if let Ok(ts) = s.parse::<i64>() {
        if s.len() != 14 {
            return Ok(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| ScintError::InvalidDateFormat(s.to_string()))
}
