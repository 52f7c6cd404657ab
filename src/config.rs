//! Configuration loader for the `scintflow` ingestion service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). Command-line flags override the loaded
//! values once, in `main.rs`; after that the struct is never mutated.
//!
use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Result};

use crate::{
    models::{Layout, Location, Site, Stream},
    schema::validate_table_name,
};

/// Parse an optional integer variable with a default value.
macro_rules! parse_env_u32 {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a variable that becomes required once its group is enabled.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name).ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Optional string variable with a default.
macro_rules! env_or {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name).unwrap_or_else(|| $default.to_string())
    };
}

pub const DEFAULT_DATAPLATFORM_URL: &str = "https://api.dataplatform.knmi.nl/dataset-content/v1/datasets";

// ---

/// Remote archive credentials. Only needed by `mirror`.
#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    /// IONO directory relative to the login directory.
    pub root: String,
}

/// Data-platform uploader target.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub dataset: String,
    pub version: String,
    pub max_workers: u32,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Directory containing the `IONO/` archive tree.
    pub archive_root: PathBuf,

    /// Directory holding the SQLite files.
    pub db_dir: PathBuf,

    /// File name template for the regular stream, `{site}` is substituted.
    pub db_template: String,

    /// File name template for the calibration stream.
    pub cal_db_template: String,

    /// Table name template, `{site}` is substituted.
    pub table_template: String,

    /// Column layout of the stores.
    pub layout: Layout,

    /// Consecutive already-present files that end a routine walk.
    pub stop_after: u32,

    /// Address of the query API.
    pub http_bind: SocketAddr,

    pub ftp: Option<FtpSettings>,

    pub upload: Option<UploadSettings>,
}

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<Config> {
    load_with(|name| env::var(name).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// Optional:
/// - `SCINT_ARCHIVE_ROOT` – archive root (default: `.`)
/// - `SCINT_DB_DIR` – database directory (default: `.`)
/// - `SCINT_DB_TEMPLATE` / `SCINT_CAL_DB_TEMPLATE` / `SCINT_TABLE_TEMPLATE`
/// - `SCINT_LAYOUT` – `reduced` (default) or `full`
/// - `SCINT_STOP_AFTER` – early-stop threshold (default: 1)
/// - `HTTP_BIND` – query API address (default: `0.0.0.0:8080`)
/// - `FTP_HOST`, then required `FTP_USER`, `FTP_PASSWORD`; `FTP_ROOT`
/// - `DATAPLATFORM_API_KEY`, then required `DATAPLATFORM_API_SECRET`,
///   `DATAPLATFORM_DATASET`; `DATAPLATFORM_URL`, `DATAPLATFORM_VERSION`,
///   `UPLOAD_MAX_WORKERS` (default: 20)
///
/// Returns an error if any value is invalid or a group is half configured.
pub fn load_with<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    let archive_root = PathBuf::from(env_or!(lookup, "SCINT_ARCHIVE_ROOT", "."));
    let db_dir = PathBuf::from(env_or!(lookup, "SCINT_DB_DIR", "."));
    let db_template = env_or!(lookup, "SCINT_DB_TEMPLATE", "scint_reduced_{site}.db");
    let cal_db_template = env_or!(lookup, "SCINT_CAL_DB_TEMPLATE", "scint_reduced_cal_{site}.db");
    let table_template = env_or!(lookup, "SCINT_TABLE_TEMPLATE", "sep_data_{site}");

    let layout = env_or!(lookup, "SCINT_LAYOUT", "reduced")
        .parse::<Layout>()
        .map_err(|e| anyhow!("Invalid SCINT_LAYOUT: {}", e))?;

    let stop_after = parse_env_u32!(lookup, "SCINT_STOP_AFTER", 1).max(1);

    let http_bind = env_or!(lookup, "HTTP_BIND", "0.0.0.0:8080")
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid HTTP_BIND: {}", e))?;

    let ftp = match lookup("FTP_HOST") {
        Some(host) => Some(FtpSettings {
            host,
            user: require_env!(lookup, "FTP_USER"),
            password: require_env!(lookup, "FTP_PASSWORD"),
            root: env_or!(lookup, "FTP_ROOT", "../IONO"),
        }),
        None => None,
    };

    let upload = match lookup("DATAPLATFORM_API_KEY") {
        Some(api_key) => Some(UploadSettings {
            base_url: env_or!(lookup, "DATAPLATFORM_URL", DEFAULT_DATAPLATFORM_URL),
            api_key,
            api_secret: require_env!(lookup, "DATAPLATFORM_API_SECRET"),
            dataset: require_env!(lookup, "DATAPLATFORM_DATASET"),
            version: env_or!(lookup, "DATAPLATFORM_VERSION", "v1"),
            max_workers: parse_env_u32!(lookup, "UPLOAD_MAX_WORKERS", 20).max(1),
        }),
        None => None,
    };

    let cfg = Config {
        archive_root,
        db_dir,
        db_template,
        cal_db_template,
        table_template,
        layout,
        stop_after,
        http_bind,
        ftp,
        upload,
    };

    for site in Site::ALL {
        validate_table_name(&cfg.table_name(site)).map_err(|e| anyhow!("Invalid SCINT_TABLE_TEMPLATE: {}", e))?;
    }
    Ok(cfg)
}

impl Config {
    /// Replace the archive root (command-line override).
    pub fn with_archive_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.archive_root = root;
        }
        self
    }

    /// Replace the database directory (command-line override).
    pub fn with_db_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.db_dir = dir;
        }
        self
    }

    /// Database file of one location.
    pub fn db_path(&self, location: Location) -> PathBuf {
        // ---
        let template = match location.stream {
            Stream::Regular => &self.db_template,
            Stream::Calibration => &self.cal_db_template,
        };
        self.db_dir.join(template.replace("{site}", location.site.code()))
    }

    pub fn table_name(&self, site: Site) -> String {
        self.table_template.replace("{site}", site.code())
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the FTP password and the data-platform secret.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SCINT_ARCHIVE_ROOT : {}", self.archive_root.display());
        tracing::info!("  SCINT_DB_DIR       : {}", self.db_dir.display());
        tracing::info!("  SCINT_DB_TEMPLATE  : {}", self.db_template);
        tracing::info!("  SCINT_CAL_DB_TEMPL : {}", self.cal_db_template);
        tracing::info!("  SCINT_TABLE_TEMPL  : {}", self.table_template);
        tracing::info!("  SCINT_LAYOUT       : {:?}", self.layout);
        tracing::info!("  SCINT_STOP_AFTER   : {}", self.stop_after);
        tracing::info!("  HTTP_BIND          : {}", self.http_bind);
        match &self.ftp {
            Some(ftp) => tracing::info!("  FTP                : {}@{}:{} (password ****)", ftp.user, ftp.host, ftp.root),
            None => tracing::info!("  FTP                : not configured"),
        }
        match &self.upload {
            Some(up) => tracing::info!(
                "  DATAPLATFORM       : {}/{}/{} key {} (secret ****), {} workers",
                up.base_url,
                up.dataset,
                up.version,
                up.api_key,
                up.max_workers
            ),
            None => tracing::info!("  DATAPLATFORM       : not configured"),
        }
    }
}
