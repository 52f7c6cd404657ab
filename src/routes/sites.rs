//! `GET /sites`: receiver sites, their coordinates and which streams have a
//! store attached.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;
use crate::models::{Location, Site};

// ---

#[derive(Debug, Serialize)]
struct SiteInfo {
    code: &'static str,
    latitude: f64,
    longitude: f64,
    regular: bool,
    calibration: bool,
}

async fn sites(State(state): State<AppState>) -> Json<Vec<SiteInfo>> {
    // ---
    let infos = Site::ALL
        .iter()
        .map(|&site| {
            let (latitude, longitude) = site.coordinates();
            SiteInfo {
                code: site.code(),
                latitude,
                longitude,
                regular: state.stores.contains_key(&Location::regular(site)),
                calibration: state.stores.contains_key(&Location::calibration(site)),
            }
        })
        .collect();
    Json(infos)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/sites", get(sites))
}
