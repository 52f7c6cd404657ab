//! Command-line entry point for the `scintflow` ingestion service.
//!
//! Startup sequence shared by every subcommand:
//! - Initializing structured logging/tracing
//! - Loading configuration from environment variables or `.env`
//! - Applying command-line overrides, then logging the effective values
//!
//! Subcommands:
//! - `ingest`  – routine incremental run (optionally mirroring first)
//! - `force`   – re-read one day directory, filling gaps
//! - `mirror`  – copy new remote files into the local archive
//! - `serve`   – read-only HTTP query API over the stores
//! - `upload`  – push a directory of ISMR files to the data platform
//! - `resolve` – print the day directory for a `YYYYMMDD` date
//!
//! # Environment Variables
//! - `SCINT_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `SCINT_SPAN_EVENTS` (optional) – span event mode for tracing
//! - see `config.rs` for the rest
use std::{collections::HashMap, env, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use scintflow::{
    config::{self, Config},
    mirror::{mirror_sites, FtpArchive, MirrorReport},
    models::{Location, Site, SiteSelection, Stream},
    resolver::resolve_directory_for_date,
    routes,
    upload::upload_directory,
    walker::{ingest_forced, ingest_routine, open_store},
};

#[derive(Debug, Parser)]
#[command(name = "scintflow", version, about = "ISMR scintillation archive ingestion")]
struct Cli {
    /// Directory containing the `IONO/` archive tree (overrides SCINT_ARCHIVE_ROOT)
    #[arg(long, global = true)]
    archive_root: Option<PathBuf>,

    /// Directory holding the SQLite files (overrides SCINT_DB_DIR)
    #[arg(long, global = true)]
    db_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Routine incremental ingestion of both sites
    Ingest {
        /// SABA, SEUT or all
        #[arg(long)]
        site: Option<String>,
        /// Mirror the remote archive before ingesting
        #[arg(long)]
        mirror: bool,
    },
    /// Re-ingest one day directory, merging rows that are missing
    Force {
        /// Date as YYYYMMDD
        date: String,
        /// SABA, SEUT or all
        #[arg(short, long, default_value = "all")]
        location: String,
    },
    /// Mirror new remote files into the local archive
    Mirror {
        #[arg(long)]
        site: Option<String>,
    },
    /// Serve the read-only query API
    Serve,
    /// Upload every .ismr file in a directory to the data platform
    Upload { dir: PathBuf },
    /// Print the day directory name for a YYYYMMDD date
    Resolve { date: String },
}

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_from_env()?
        .with_archive_root(cli.archive_root)
        .with_db_dir(cli.db_dir);
    cfg.log_config();

    match cli.command {
        Command::Ingest { site, mirror } => {
            let sites = selected_sites(site.as_deref())?;
            if mirror {
                run_mirror(&cfg, &sites).await?.log_summary();
            }
            ingest_routine(&cfg, &sites).await.log_summary();
        }
        Command::Force { date, location } => {
            let day_dir = resolve_directory_for_date(&date)?;
            let sites = location.parse::<SiteSelection>()?.sites();
            tracing::info!("Forced ingestion of {} for {:?}", day_dir, sites);
            ingest_forced(&cfg, &day_dir, &sites).await.log_summary();
        }
        Command::Mirror { site } => {
            let sites = selected_sites(site.as_deref())?;
            run_mirror(&cfg, &sites).await?.log_summary();
        }
        Command::Serve => serve(&cfg).await?,
        Command::Upload { dir } => {
            let settings = cfg
                .upload
                .as_ref()
                .ok_or_else(|| anyhow!("DATAPLATFORM_API_KEY must be set in .env or environment"))?;
            upload_directory(settings, &dir).await?.log_summary(&settings.dataset);
        }
        Command::Resolve { date } => println!("{}", resolve_directory_for_date(&date)?),
    }

    Ok(())
}

fn selected_sites(site: Option<&str>) -> Result<Vec<Site>> {
    // ---
    match site {
        Some(s) => Ok(s.parse::<SiteSelection>()?.sites()),
        None => Ok(Site::ALL.to_vec()),
    }
}

/// Run the blocking FTP mirror off the async runtime.
async fn run_mirror(cfg: &Config, sites: &[Site]) -> Result<MirrorReport> {
    // ---
    let settings = cfg
        .ftp
        .clone()
        .ok_or_else(|| anyhow!("FTP_HOST must be set in .env or environment"))?;
    let root = cfg.archive_root.clone();
    let sites = sites.to_vec();

    let report = tokio::task::spawn_blocking(move || -> scintflow::Result<MirrorReport> {
        let mut remote = FtpArchive::connect(&settings)?;
        let report = mirror_sites(&mut remote, &root, &sites);
        if let Err(e) = remote.quit() {
            tracing::warn!("FTP logout failed: {}", e);
        }
        Ok(report)
    })
    .await
    .context("mirror task panicked")??;

    Ok(report)
}

async fn serve(cfg: &Config) -> Result<()> {
    // ---
    let mut stores = HashMap::new();
    for site in Site::ALL {
        for stream in [Stream::Regular, Stream::Calibration] {
            let location = Location::new(site, stream);
            if !cfg.db_path(location).exists() {
                tracing::debug!("No database for {}", location);
                continue;
            }
            let store = open_store(cfg, location)
                .await
                .with_context(|| format!("Failed to open store for {location}"))?;
            stores.insert(location, store);
        }
    }
    tracing::info!("Serving {} stores", stores.len());

    let app = routes::router(stores);

    tracing::info!("Listening on {}", cfg.http_bind);
    let listener = tokio::net::TcpListener::bind(cfg.http_bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `SCINT_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `SCINT_LOG_LEVEL` env var
///
/// Logs go to stderr so that `resolve` output stays clean on stdout.
fn init_tracing() {
    // ---
    let span_events = match env::var("SCINT_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to SCINT_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("SCINT_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,suppaftp=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
