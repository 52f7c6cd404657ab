mod common;

use anyhow::Result;
use scintflow::{
    models::{Location, Site},
    query::{ReadingsQuery, SvidFilter},
    walker::{ingest_forced, ingest_routine, ingest_stream, open_store, WalkOptions},
};
use tempfile::TempDir;

use common::{day_path, ismr_line, test_config, tow_for_day, write_ismr};

const SVIDS: [i64; 3] = [3, 5, 7];

/// Two hourly files in each of `days` (offsets from 18198).
fn populate(root: &std::path::Path, days: &[i64]) -> Result<()> {
    // ---
    for &offset in days {
        let day = format!("{}", 18198 + offset);
        let dir = day_path(root, "SABA", false, &day)?;
        write_ismr(&dir, &format!("SABA{}a.18_.ismr", &day[2..]), tow_for_day(offset), 0..5, &SVIDS)?;
        write_ismr(&dir, &format!("SABA{}b.18_.ismr", &day[2..]), tow_for_day(offset), 60..65, &SVIDS)?;
    }
    Ok(())
}

async fn stored_rows(cfg: &scintflow::Config, location: Location) -> Result<i64> {
    // ---
    let store = open_store(cfg, location).await?;
    let n = store.count().await?;
    store.close().await;
    Ok(n)
}

#[tokio::test]
async fn routine_run_stops_at_first_known_file() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;
    let saba = Location::regular(Site::Saba);

    populate(archive.path(), &[0, 1])?;
    let first = ingest_routine(&cfg, &[Site::Saba]).await;
    assert!(first.failures.is_empty(), "{:?}", first.failures);
    assert_eq!(first.dirs_visited, vec!["18199", "18198"]);
    assert_eq!(first.files_ingested, 4);
    assert_eq!(first.rows_written, 60);
    assert!(!first.stopped_early);

    populate(archive.path(), &[2])?;
    let second = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(second.dirs_visited, vec!["18200", "18199"]);
    assert_eq!(second.files_ingested, 2);
    assert_eq!(second.files_already_present, 1);
    assert!(second.stopped_early);
    assert_eq!(stored_rows(&cfg, saba).await?, 90);

    // nothing new: only the newest file is probed
    let third = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(third.dirs_visited, vec!["18200"]);
    assert_eq!(third.files_ingested, 0);
    assert!(third.stopped_early);
    assert_eq!(stored_rows(&cfg, saba).await?, 90);

    Ok(())
}

#[tokio::test]
async fn cursor_bounds_the_walk_when_stop_threshold_is_high() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[("SCINT_STOP_AFTER", "5")])?;

    populate(archive.path(), &[0, 1])?;
    ingest_routine(&cfg, &[Site::Saba]).await;

    populate(archive.path(), &[2])?;
    let report = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(report.dirs_visited, vec!["18200", "18199"]);
    assert_eq!(report.files_ingested, 2);
    assert_eq!(report.files_already_present, 2);
    assert!(!report.stopped_early);

    Ok(())
}

#[tokio::test]
async fn forced_walk_visits_every_directory() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;
    let saba = Location::regular(Site::Saba);

    populate(archive.path(), &[0, 1])?;
    ingest_routine(&cfg, &[Site::Saba]).await;
    populate(archive.path(), &[2])?;

    let store = open_store(&cfg, saba).await?;
    let report = ingest_stream(&store, archive.path(), saba, &WalkOptions::forced(None)).await?;
    store.close().await;

    assert_eq!(report.dirs_visited, vec!["18198", "18199", "18200"]);
    assert_eq!(report.files_already_present, 4);
    assert_eq!(report.files_ingested, 2);
    assert!(!report.stopped_early);
    assert_eq!(stored_rows(&cfg, saba).await?, 90);

    Ok(())
}

#[tokio::test]
async fn forced_run_fills_partially_present_file() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;
    let saba = Location::regular(Site::Saba);
    let dir = day_path(archive.path(), "SABA", false, "18198")?;

    write_ismr(&dir, "SABA198a.18_.ismr", tow_for_day(0), 0..5, &SVIDS)?;
    ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(stored_rows(&cfg, saba).await?, 15);

    // the file grew after it was ingested: routine mode rejects the whole batch
    write_ismr(&dir, "SABA198a.18_.ismr", tow_for_day(0), 0..10, &SVIDS)?;
    let routine = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(routine.files_already_present, 1);
    assert_eq!(stored_rows(&cfg, saba).await?, 15);

    let forced = ingest_forced(&cfg, "18198", &[Site::Saba]).await;
    assert_eq!(forced.dirs_visited, vec!["18198"]);
    assert_eq!(forced.rows_written, 15);
    assert_eq!(stored_rows(&cfg, saba).await?, 30);

    let again = ingest_forced(&cfg, "18198", &[Site::Saba]).await;
    assert_eq!(again.rows_written, 0);
    assert_eq!(again.files_already_present, 1);

    Ok(())
}

#[tokio::test]
async fn bad_files_are_reported_and_skipped() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;

    populate(archive.path(), &[0])?;
    let dir = day_path(archive.path(), "SABA", false, "18198")?;
    std::fs::write(dir.join("SABA198c.18_.ismr"), "2010,172800,3,0,1.0,2.0\n")?;
    std::fs::write(dir.join("SABA198d.18_.ismr"), "")?;

    let report = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(report.files_ingested, 2);
    assert_eq!(report.files_empty, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("SABA198c.18_.ismr"));

    Ok(())
}

#[tokio::test]
async fn calibration_files_go_to_their_own_store() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;

    populate(archive.path(), &[1])?;
    let cal_dir = day_path(archive.path(), "SABA", true, "18150")?;
    write_ismr(&cal_dir, "SABA150a.18_.ismr", 0, 0..2, &[12])?;

    let report = ingest_routine(&cfg, &Site::ALL).await;
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.dirs_visited, vec!["18199", "18150"]);

    assert_eq!(stored_rows(&cfg, Location::regular(Site::Saba)).await?, 30);
    assert_eq!(stored_rows(&cfg, Location::calibration(Site::Saba)).await?, 2);
    assert!(db.path().join("scint_reduced_cal_SABA.db").exists());
    assert!(!db.path().join("scint_reduced_SEUT.db").exists());

    Ok(())
}

#[tokio::test]
async fn stored_readings_can_be_selected() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;
    populate(archive.path(), &[0, 1])?;
    ingest_routine(&cfg, &[Site::Saba]).await;

    let store = open_store(&cfg, Location::regular(Site::Saba)).await?;
    let day_start = 1_531_612_800 + tow_for_day(1);
    let table = store
        .query(&ReadingsQuery {
            variables: vec!["SVID".into(), "timestamp".into(), "elevation".into()],
            svid: SvidFilter::Many(vec![3, 7]),
            time_range: Some((day_start, day_start + 3600)),
            ..Default::default()
        })
        .await?;
    store.close().await;

    // minutes 0..5 of 18199 plus the row at exactly +3600, ordered by time then SVID
    let expected: Vec<Vec<Option<f64>>> = [0, 1, 2, 3, 4, 60]
        .iter()
        .flat_map(|&minute: &i64| {
            [3_i64, 7].map(|svid| {
                // elevation is measurement 1 of the line written for (svid, minute)
                let elevation = format!("{:.2}", svid as f64 + minute as f64 / 100.0 + 1.0).parse::<f64>().ok();
                vec![Some(svid as f64), Some((day_start + minute * 60) as f64), elevation]
            })
        })
        .collect();

    assert_eq!(table.columns, vec!["SVID", "timestamp", "elevation"]);
    assert_eq!(table.rows, expected);

    Ok(())
}

#[tokio::test]
async fn row_dated_past_the_archive_does_not_block_new_days() -> Result<()> {
    // ---
    let archive = TempDir::new()?;
    let db = TempDir::new()?;
    let cfg = test_config(archive.path(), db.path(), &[])?;
    let saba = Location::regular(Site::Saba);

    populate(archive.path(), &[0])?;
    let poisoned = day_path(archive.path(), "SABA", false, "18198")?.join("SABA198a.18_.ismr");
    let mut content = std::fs::read_to_string(&poisoned)?;
    content.push_str(&ismr_line(99_999, 0, 9, 1.0));
    content.push('\n');
    std::fs::write(&poisoned, content)?;

    let first = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(first.files_ingested, 2);
    assert_eq!(stored_rows(&cfg, saba).await?, 31);

    populate(archive.path(), &[1])?;
    let second = ingest_routine(&cfg, &[Site::Saba]).await;
    assert_eq!(second.dirs_visited, vec!["18199", "18198"]);
    assert_eq!(second.files_ingested, 2);
    assert!(second.stopped_early);
    assert_eq!(stored_rows(&cfg, saba).await?, 61);

    Ok(())
}
