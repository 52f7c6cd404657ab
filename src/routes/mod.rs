use std::{collections::HashMap, sync::Arc};

use axum::Router;

use crate::{models::Location, store::ScintStore};

mod get_readings;
mod health;
mod sites;

// ---

/// Shared state of the query API: one open store per location.
#[derive(Clone, Default)]
pub struct AppState {
    pub stores: Arc<HashMap<Location, ScintStore>>,
}

pub fn router(stores: HashMap<Location, ScintStore>) -> Router {
    // ---
    Router::new()
        .merge(get_readings::router())
        .merge(sites::router())
        .merge(health::router())
        .with_state(AppState { stores: Arc::new(stores) })
}
