mod common;

use std::collections::HashMap;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use scintflow::{
    models::{Location, Site},
    routes,
    walker::{ingest_routine, open_store},
};
use serde::Deserialize;
use tempfile::TempDir;

use common::{day_path, test_config, tow_for_day, write_ismr};

#[derive(Debug, Deserialize)]
struct ReadingTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct SiteInfo {
    code: String,
    regular: bool,
    calibration: bool,
}

/// Ingest one SABA day and serve it on an ephemeral port.
async fn spawn_api(archive: &TempDir, db: &TempDir) -> Result<String> {
    // ---
    let cfg = test_config(archive.path(), db.path(), &[])?;
    let dir = day_path(archive.path(), "SABA", false, "18199")?;
    write_ismr(&dir, "SABA199a.18_.ismr", tow_for_day(1), 0..10, &[3, 5, 7])?;
    ingest_routine(&cfg, &[Site::Saba]).await;

    let location = Location::regular(Site::Saba);
    let mut stores = HashMap::new();
    stores.insert(location, open_store(&cfg, location).await?);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, routes::router(stores)).await;
    });

    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn readings_endpoint_filters_rows() -> Result<()> {
    // ---
    let (archive, db) = (TempDir::new()?, TempDir::new()?);
    let base = spawn_api(&archive, &db).await?;
    let client = Client::new();

    let url = format!(
        "{base}/readings/saba?vars=SVID,timestamp,sig1_S4&svid=5&start=2018-07-18T00:03:00Z&range=elevation:0:100"
    );
    let table: ReadingTable = client.get(&url).send().await?.error_for_status()?.json().await?;

    assert_eq!(table.columns, vec!["SVID", "timestamp", "sig1_S4"]);
    assert_eq!(table.rows.len(), 7);
    assert!(table.rows.iter().all(|r| r[0] == Some(5.0)));
    assert_eq!(table.rows[0][1], Some(1_531_872_180.0));

    let limited: ReadingTable = client
        .get(format!("{base}/readings/SABA?limit=4"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(limited.rows.len(), 4);
    assert_eq!(limited.columns.len(), 4 + 9 + 1);

    Ok(())
}

#[tokio::test]
async fn readings_endpoint_rejects_bad_requests() -> Result<()> {
    // ---
    let (archive, db) = (TempDir::new()?, TempDir::new()?);
    let base = spawn_api(&archive, &db).await?;
    let client = Client::new();

    let status = |path: &'static str| {
        let client = client.clone();
        let url = format!("{base}{path}");
        async move { client.get(url).send().await.map(|r| r.status()) }
    };

    assert_eq!(status("/readings/SABA?vars=sig1_phi60").await?, StatusCode::BAD_REQUEST);
    assert_eq!(status("/readings/SABA?vars=SVID;DROP").await?, StatusCode::BAD_REQUEST);
    assert_eq!(status("/readings/SABA?svid=G05").await?, StatusCode::BAD_REQUEST);
    assert_eq!(status("/readings/SABA?start=tomorrow").await?, StatusCode::BAD_REQUEST);
    assert_eq!(status("/readings/XXXX").await?, StatusCode::NOT_FOUND);
    assert_eq!(status("/readings/SEUT").await?, StatusCode::NOT_FOUND);
    assert_eq!(status("/readings/SABA?cal=true").await?, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn health_and_sites() -> Result<()> {
    // ---
    let (archive, db) = (TempDir::new()?, TempDir::new()?);
    let base = spawn_api(&archive, &db).await?;
    let client = Client::new();

    let health: serde_json::Value = client.get(format!("{base}/health")).send().await?.json().await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["stores"], serde_json::json!(["SABA"]));

    let sites: Vec<SiteInfo> = client.get(format!("{base}/sites")).send().await?.json().await?;
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[0].code, "SABA");
    assert!(sites[0].regular && !sites[0].calibration);
    assert!(!sites[1].regular);

    Ok(())
}
