//! Liveness endpoint for the scintillation query API. Answers without
//! touching SQLite.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Locations with an open store, e.g. `SABA` or `SABA/CAL`.
    stores: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    // ---
    let mut stores: Vec<String> = state.stores.keys().map(ToString::to_string).collect();
    stores.sort();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stores,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
