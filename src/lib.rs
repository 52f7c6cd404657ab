//! Incremental ingestion of ISMR scintillation files into per-site SQLite
//! stores, with an FTP mirror, a read-only query API and a data-platform
//! uploader around it.
//!
//! The binary in `main.rs` wires these modules to the command line; the
//! library is what the integration tests drive.

pub mod config;
pub mod error;
pub mod gps_time;
pub mod mirror;
pub mod models;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod store;
pub mod upload;
pub mod walker;

pub use config::Config;
pub use error::{Result, ScintError};
pub use models::{IsmrRecord, Layout, Location, Site, SiteSelection, Stream};
pub use store::{AppendOutcome, ScintStore};
